//! Run statistics: concurrent accumulation, final snapshot, threshold
//! verdicts.
//!
//! Counter writes are atomic and histogram inserts take a short write lock,
//! so workers never serialize on each other for long. Mid-run reads are
//! approximate; the final snapshot is taken after all workers have drained
//! and is exact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::Outcome;
use crate::scenario::Thresholds;

fn latency_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, 60_000_000, 3).unwrap() // 1µs to 60s
}

/// Shared mutable run state
pub struct RunStats {
    outcome_counts: [AtomicU64; Outcome::COUNT],
    dispatched: AtomicU64,
    checks_passed: AtomicU64,
    checks_total: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency_all: RwLock<Histogram<u64>>,
    latency_by_phase: RwLock<HashMap<String, Histogram<u64>>>,
    error_kinds: RwLock<HashMap<String, u64>>,
    started: RwLock<Option<Instant>>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            outcome_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            dispatched: AtomicU64::new(0),
            checks_passed: AtomicU64::new(0),
            checks_total: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency_all: RwLock::new(latency_histogram()),
            latency_by_phase: RwLock::new(HashMap::new()),
            error_kinds: RwLock::new(HashMap::new()),
            started: RwLock::new(None),
        }
    }

    pub fn mark_started(&self) {
        *self.started.write() = Some(Instant::now());
    }

    /// Record one classified attempt
    pub fn record(
        &self,
        outcome: Outcome,
        latency: Duration,
        phase: Option<&str>,
        check_passed: bool,
        error_kind: Option<&str>,
    ) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.outcome_counts[outcome.index()].fetch_add(1, Ordering::Relaxed);
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        if check_passed {
            self.checks_passed.fetch_add(1, Ordering::Relaxed);
        }

        let micros = latency.as_micros().max(1) as u64;
        if let Err(e) = self.latency_all.write().record(micros) {
            warn!("failed to record latency: {}", e);
        }
        if let Some(phase) = phase {
            let mut by_phase = self.latency_by_phase.write();
            let histogram = by_phase
                .entry(phase.to_string())
                .or_insert_with(latency_histogram);
            if let Err(e) = histogram.record(micros) {
                warn!("failed to record phase latency: {}", e);
            }
        }
        if let Some(kind) = error_kind {
            *self.error_kinds.write().entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// A dispatch entered the wire; tracks the concurrency high-water mark
    pub fn enter_flight(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_flight.fetch_max(now, Ordering::Relaxed);
    }

    pub fn exit_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Immutable snapshot of everything accumulated so far
    pub fn snapshot(&self, scenario: &str) -> RunSummary {
        let duration_secs = self
            .started
            .read()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let mut outcomes = OutcomeCounts::default();
        for outcome in Outcome::ALL {
            outcomes.set(outcome, self.outcome_counts[outcome.index()].load(Ordering::Relaxed));
        }

        let dispatched = self.dispatched.load(Ordering::Relaxed);
        let failures = outcomes.server_error + outcomes.network_error;
        let checks_total = self.checks_total.load(Ordering::Relaxed);
        let checks_passed = self.checks_passed.load(Ordering::Relaxed);

        let latency = LatencySummary::from_histogram(&self.latency_all.read());
        let latency_by_phase = self
            .latency_by_phase
            .read()
            .iter()
            .map(|(phase, histogram)| (phase.clone(), LatencySummary::from_histogram(histogram)))
            .collect();

        RunSummary {
            scenario: scenario.to_string(),
            duration_secs,
            dispatched,
            outcomes,
            failure_rate: if dispatched > 0 {
                failures as f64 / dispatched as f64
            } else {
                0.0
            },
            check_rate: if checks_total > 0 {
                checks_passed as f64 / checks_total as f64
            } else {
                1.0
            },
            avg_rps: if duration_secs > 0.0 {
                dispatched as f64 / duration_secs
            } else {
                0.0
            },
            max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
            latency,
            latency_by_phase,
            error_kinds: self.error_kinds.read().clone(),
        }
    }
}

/// Per-outcome counters
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub created: u64,
    pub replayed: u64,
    pub in_progress: u64,
    pub conflict: u64,
    pub duplicate_suspect: u64,
    pub server_error: u64,
    pub network_error: u64,
    pub other: u64,
}

impl OutcomeCounts {
    pub fn get(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Created => self.created,
            Outcome::Replayed => self.replayed,
            Outcome::InProgress => self.in_progress,
            Outcome::Conflict => self.conflict,
            Outcome::DuplicateSuspect => self.duplicate_suspect,
            Outcome::ServerError => self.server_error,
            Outcome::NetworkError => self.network_error,
            Outcome::Other => self.other,
        }
    }

    fn set(&mut self, outcome: Outcome, value: u64) {
        match outcome {
            Outcome::Created => self.created = value,
            Outcome::Replayed => self.replayed = value,
            Outcome::InProgress => self.in_progress = value,
            Outcome::Conflict => self.conflict = value,
            Outcome::DuplicateSuspect => self.duplicate_suspect = value,
            Outcome::ServerError => self.server_error = value,
            Outcome::NetworkError => self.network_error = value,
            Outcome::Other => self.other = value,
        }
    }

    pub fn total(&self) -> u64 {
        Outcome::ALL.iter().map(|o| self.get(*o)).sum()
    }
}

/// Latency percentiles in milliseconds
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub samples: u64,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        let ms = |us: u64| us as f64 / 1000.0;
        Self {
            p50_ms: ms(histogram.value_at_quantile(0.50)),
            p90_ms: ms(histogram.value_at_quantile(0.90)),
            p95_ms: ms(histogram.value_at_quantile(0.95)),
            p99_ms: ms(histogram.value_at_quantile(0.99)),
            max_ms: ms(histogram.max()),
            mean_ms: histogram.mean() / 1000.0,
            samples: histogram.len(),
        }
    }
}

/// Final run summary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub scenario: String,
    pub duration_secs: f64,
    pub dispatched: u64,
    pub outcomes: OutcomeCounts,
    pub failure_rate: f64,
    pub check_rate: f64,
    pub avg_rps: f64,
    pub max_in_flight: usize,
    pub latency: LatencySummary,
    pub latency_by_phase: HashMap<String, LatencySummary>,
    pub error_kinds: HashMap<String, u64>,
}

impl RunSummary {
    /// Evaluate the scenario's declared thresholds; pure comparison
    pub fn evaluate(&self, thresholds: &Thresholds) -> ThresholdReport {
        let mut checks = Vec::new();

        if let Some(max) = thresholds.max_failure_rate {
            checks.push(ThresholdCheck {
                name: "failure rate".to_string(),
                passed: self.failure_rate < max,
                actual: format!("{:.4}", self.failure_rate),
                expected: format!("<{}", max),
            });
        }

        if let Some(bound_ms) = thresholds.max_p95_ms {
            // a phase with no samples falls back to the overall distribution
            let (name, p95_ms) = match thresholds
                .p95_phase
                .as_deref()
                .and_then(|phase| self.latency_by_phase.get(phase).map(|l| (phase, l)))
            {
                Some((phase, latency)) => (format!("p95 latency ({})", phase), latency.p95_ms),
                None => ("p95 latency".to_string(), self.latency.p95_ms),
            };
            checks.push(ThresholdCheck {
                name,
                passed: p95_ms < bound_ms as f64,
                actual: format!("{:.1}ms", p95_ms),
                expected: format!("<{}ms", bound_ms),
            });
        }

        if let Some(min) = thresholds.min_check_rate {
            checks.push(ThresholdCheck {
                name: "check rate".to_string(),
                passed: self.check_rate > min,
                actual: format!("{:.4}", self.check_rate),
                expected: format!(">{}", min),
            });
        }

        ThresholdReport {
            passed: checks.iter().all(|c| c.passed),
            checks,
        }
    }

    /// Print the formatted run report
    pub fn print_report(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    STAMPEDE RUN RESULTS                      ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Scenario:         {:>42} ║", self.scenario);
        println!("║ Duration:         {:>40.2}s  ║", self.duration_secs);
        println!("║ Dispatched:       {:>42} ║", self.dispatched);
        println!("║ Avg rate:         {:>36.2} req/s ║", self.avg_rps);
        println!("║ Max in-flight:    {:>42} ║", self.max_in_flight);
        println!("║ Failure rate:     {:>41.4} ║", self.failure_rate);
        println!("║ Check rate:       {:>41.4} ║", self.check_rate);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ OUTCOMES                                                     ║");
        for outcome in Outcome::ALL {
            let count = self.outcomes.get(outcome);
            if count > 0 {
                println!("║   {:<18} {:>39} ║", outcome.as_str(), count);
            }
        }
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ LATENCY (ms)                                                 ║");
        println!("║   p50:            {:>41.1} ║", self.latency.p50_ms);
        println!("║   p90:            {:>41.1} ║", self.latency.p90_ms);
        println!("║   p95:            {:>41.1} ║", self.latency.p95_ms);
        println!("║   p99:            {:>41.1} ║", self.latency.p99_ms);
        println!("║   max:            {:>41.1} ║", self.latency.max_ms);
        for (phase, latency) in &self.latency_by_phase {
            println!("║   p95 ({:<10}) {:>41.1} ║", phase, latency.p95_ms);
        }
        if !self.error_kinds.is_empty() {
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ ERRORS                                                       ║");
            for (kind, count) in &self.error_kinds {
                println!("║   {:<18} {:>39} ║", kind, count);
            }
        }
        println!("╚══════════════════════════════════════════════════════════════╝\n");
    }
}

/// Pass/fail verdict against the declared thresholds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub passed: bool,
    pub checks: Vec<ThresholdCheck>,
}

/// One named threshold comparison
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub name: String,
    pub passed: bool,
    pub actual: String,
    pub expected: String,
}

impl ThresholdReport {
    pub fn print_report(&self) {
        println!("═══════════════════════════════════════════════════════════════");
        println!("                      THRESHOLD VERDICT");
        println!("═══════════════════════════════════════════════════════════════");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            println!("  [{}] {}", status, check.name);
            println!("        actual:   {}", check.actual);
            println!("        expected: {}", check.expected);
        }
        println!("───────────────────────────────────────────────────────────────");
        if self.passed {
            println!("  OVERALL: PASS");
        } else {
            println!("  OVERALL: FAIL");
        }
        println!("═══════════════════════════════════════════════════════════════\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            max_failure_rate: Some(0.01),
            max_p95_ms: Some(600),
            p95_phase: Some("burst".to_string()),
            min_check_rate: Some(0.99),
        }
    }

    #[test]
    fn test_counts_sum_to_dispatched() {
        let stats = RunStats::new();
        stats.mark_started();

        stats.record(Outcome::Created, Duration::from_millis(10), Some("burst"), true, None);
        stats.record(Outcome::DuplicateSuspect, Duration::from_millis(12), Some("burst"), true, None);
        stats.record(Outcome::NetworkError, Duration::from_millis(30), None, false, Some("timeout"));

        let summary = stats.snapshot("t");
        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.outcomes.total(), summary.dispatched);
        assert_eq!(summary.outcomes.created, 1);
        assert_eq!(summary.outcomes.network_error, 1);
        assert_eq!(summary.error_kinds.get("timeout"), Some(&1));
    }

    #[test]
    fn test_rates() {
        let stats = RunStats::new();
        stats.mark_started();

        for _ in 0..99 {
            stats.record(Outcome::Created, Duration::from_millis(5), None, true, None);
        }
        stats.record(Outcome::ServerError, Duration::from_millis(5), None, false, None);

        let summary = stats.snapshot("t");
        assert!((summary.failure_rate - 0.01).abs() < 1e-9);
        assert!((summary.check_rate - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_empty_run_has_neutral_rates() {
        let summary = RunStats::new().snapshot("t");
        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.failure_rate, 0.0);
        assert_eq!(summary.check_rate, 1.0);
    }

    #[test]
    fn test_in_flight_high_water_mark() {
        let stats = RunStats::new();

        stats.enter_flight();
        stats.enter_flight();
        stats.enter_flight();
        stats.exit_flight();
        stats.enter_flight();

        assert_eq!(stats.snapshot("t").max_in_flight, 3);
    }

    #[test]
    fn test_phase_scoped_latency() {
        let stats = RunStats::new();
        stats.record(Outcome::Created, Duration::from_millis(100), Some("burst"), true, None);
        stats.record(Outcome::Created, Duration::from_millis(1), Some("cooldown"), true, None);

        let summary = stats.snapshot("t");
        assert_eq!(summary.latency_by_phase.len(), 2);
        assert!(summary.latency_by_phase["burst"].p95_ms > summary.latency_by_phase["cooldown"].p95_ms);
        assert_eq!(summary.latency.samples, 2);
    }

    #[test]
    fn test_threshold_pass_and_fail() {
        let stats = RunStats::new();
        stats.mark_started();
        for _ in 0..200 {
            stats.record(Outcome::Created, Duration::from_millis(20), Some("burst"), true, None);
        }

        let report = stats.snapshot("t").evaluate(&thresholds());
        assert!(report.passed);
        assert_eq!(report.checks.len(), 3);

        let failing = RunStats::new();
        failing.mark_started();
        for _ in 0..10 {
            failing.record(Outcome::ServerError, Duration::from_millis(20), Some("burst"), false, None);
        }
        let report = failing.snapshot("t").evaluate(&thresholds());
        assert!(!report.passed);
        assert!(report.checks.iter().any(|c| c.name == "failure rate" && !c.passed));
        assert!(report.checks.iter().any(|c| c.name == "check rate" && !c.passed));
    }

    #[test]
    fn test_p95_falls_back_to_overall_without_phase_samples() {
        let stats = RunStats::new();
        stats.record(Outcome::Created, Duration::from_millis(700), None, true, None);

        let report = stats.snapshot("t").evaluate(&thresholds());
        let p95 = report.checks.iter().find(|c| c.name.starts_with("p95")).unwrap();
        assert_eq!(p95.name, "p95 latency");
        assert!(!p95.passed);
    }

    #[test]
    fn test_latency_samples_are_positive() {
        let stats = RunStats::new();
        stats.record(Outcome::Created, Duration::ZERO, None, true, None);

        let summary = stats.snapshot("t");
        assert!(summary.latency.max_ms > 0.0);
    }
}
