//! Arrival-rate schedule: a piecewise-linear ramp over ordered stages.
//!
//! The instantaneous target rate at time `t` inside stage `i` interpolates
//! linearly from the previous stage's end rate to stage `i`'s target over the
//! stage's duration. The first anchor is `start_rate` at `t = 0`. A stage
//! with `target_rate = 0` is a cooldown window: issuance slopes to zero and
//! only in-flight work drains.

use std::time::Duration;

use crate::error::{Result, StampedeError};

/// One ramp segment
#[derive(Clone, Debug)]
pub struct Stage {
    /// Rate to reach by the end of this stage, per the plan's time unit
    pub target_rate: f64,

    /// How long the ramp towards `target_rate` takes
    pub duration: Duration,

    /// Latency samples issued during this stage are additionally recorded
    /// under this tag
    pub phase: Option<String>,
}

impl Stage {
    pub fn new(target_rate: f64, duration: Duration) -> Self {
        Self {
            target_rate,
            duration,
            phase: None,
        }
    }

    pub fn tagged(target_rate: f64, duration: Duration, phase: &str) -> Self {
        Self {
            target_rate,
            duration,
            phase: Some(phase.to_string()),
        }
    }
}

/// Immutable arrival-rate plan, owned by the scheduler for one run
#[derive(Clone, Debug)]
pub struct RatePlan {
    /// Interpolation anchor at `t = 0`
    pub start_rate: f64,

    /// Rates are expressed per this unit
    pub time_unit: Duration,

    /// Ordered, non-empty stage sequence
    pub stages: Vec<Stage>,
}

impl RatePlan {
    /// Plan with rates per second
    pub fn per_second(start_rate: f64, stages: Vec<Stage>) -> Self {
        Self {
            start_rate,
            time_unit: Duration::from_secs(1),
            stages,
        }
    }

    pub fn validate(&self, scenario: &str) -> Result<()> {
        let invalid = |reason: String| StampedeError::InvalidScenario {
            name: scenario.to_string(),
            reason,
        };

        if self.stages.is_empty() {
            return Err(invalid("stage sequence is empty".to_string()));
        }
        if self.time_unit.is_zero() {
            return Err(invalid("time unit must be positive".to_string()));
        }
        if !self.start_rate.is_finite() || self.start_rate < 0.0 {
            return Err(invalid(format!("start rate {} out of range", self.start_rate)));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(invalid(format!("stage {} has zero duration", i)));
            }
            if !stage.target_rate.is_finite() || stage.target_rate < 0.0 {
                return Err(invalid(format!(
                    "stage {} target rate {} out of range",
                    i, stage.target_rate
                )));
            }
        }
        Ok(())
    }

    /// Wall-clock length of the whole schedule
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Instantaneous target rate (per `time_unit`) at `elapsed` since start.
    /// Past the final stage boundary the final target is held; the governor
    /// stops consulting the plan once `total_duration` has passed.
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        let mut t = elapsed.as_secs_f64();
        let mut previous = self.start_rate;
        for stage in &self.stages {
            let d = stage.duration.as_secs_f64();
            if t < d {
                return previous + (stage.target_rate - previous) * (t / d);
            }
            t -= d;
            previous = stage.target_rate;
        }
        previous
    }

    /// Instantaneous target rate normalized to per-second
    pub fn rate_per_sec_at(&self, elapsed: Duration) -> f64 {
        self.rate_at(elapsed) / self.time_unit.as_secs_f64()
    }

    /// Phase tag of the stage containing `elapsed`, if any
    pub fn phase_at(&self, elapsed: Duration) -> Option<&str> {
        let mut t = elapsed.as_secs_f64();
        for stage in &self.stages {
            let d = stage.duration.as_secs_f64();
            if t < d {
                return stage.phase.as_deref();
            }
            t -= d;
        }
        self.stages.last().and_then(|s| s.phase.as_deref())
    }
}
