//! Scenario declaration surface.
//!
//! Every workload variant is a [`ScenarioSpec`] value over the one shared
//! engine; there is no per-variant code. The [`presets`] module holds the
//! stock variants for probing an idempotency-key contract before and after
//! a fix is deployed.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{Result, StampedeError};
use crate::schedule::{RatePlan, Stage};

/// How the harness supplies `Idempotency-Key` headers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPolicy {
    /// No key header at all, the baseline before the key contract exists
    Bare,

    /// One key shared by every call in the run
    Single,

    /// Uniform-random choice among a pool generated at setup
    Pooled { count: usize },

    /// A fresh key for every iteration
    PerCall,
}

/// What one worker iteration does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallScript {
    /// One create call
    Single,

    /// Two sequential calls with the same key and identical payload
    RepeatPair,

    /// Two sequential calls with the same key and a mutated payload
    ConflictPair,
}

/// Classification policy for a 2xx response to a scripted repeat.
///
/// Whether a 2xx on a repeat is a defect or an acceptable idempotent replay
/// is a property of the server contract being probed, so the harness keeps
/// both readings selectable instead of resolving the question one way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RepeatPolicy {
    /// Count a 2xx repeat as a duplicate suspect
    #[default]
    FlagDuplicate,

    /// Count a 2xx repeat as a replay of the prior result
    AcceptReplay,
}

/// Executor shape
#[derive(Clone, Debug)]
pub enum Workload {
    /// Fixed worker set looping with a think-time pause between iterations
    SteadyVus {
        vus: usize,
        duration: Duration,
        think_time: Duration,
    },

    /// Arrival-rate ramp over stages
    ArrivalRate(RatePlan),
}

/// Payload shape per call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadPlan {
    /// Identical body on every call
    Fixed,

    /// Body title carries a short prefix of the key, identical per key
    KeyTagged,
}

impl PayloadPlan {
    /// Render the create body for one call
    pub fn render(&self, title: &str, key: Option<&str>) -> Value {
        let title = match (self, key) {
            (PayloadPlan::KeyTagged, Some(key)) => {
                let short = &key[..key.len().min(8)];
                format!("{}:{}", title, short)
            }
            _ => title.to_string(),
        };
        json!({
            "title": title,
            "content": "same",
            "entryDate": "2025-10-01",
            "isPublic": true,
        })
    }

    /// Mutate a rendered body so it no longer matches the first use of its
    /// key
    pub fn mutate(body: &Value) -> Value {
        let mut mutated = body.clone();
        mutated["content"] = Value::String("DIFFERENT".to_string());
        mutated
    }
}

/// Declarative thresholds evaluated once at run end
#[derive(Clone, Debug, Default)]
pub struct Thresholds {
    /// (server errors + network errors) / dispatched must stay below this
    pub max_failure_rate: Option<f64>,

    /// p95 latency bound in milliseconds
    pub max_p95_ms: Option<u64>,

    /// Scope the p95 bound to samples tagged with this phase
    pub p95_phase: Option<String>,

    /// Fraction of calls whose status lands in the acceptable set
    pub min_check_rate: Option<f64>,
}

/// A complete scenario: workload shape, contention plan, classification
/// policy and verdict thresholds
#[derive(Clone, Debug)]
pub struct ScenarioSpec {
    pub name: String,
    pub summary: String,
    pub workload: Workload,
    pub script: CallScript,
    pub key_policy: KeyPolicy,
    pub payload: PayloadPlan,
    pub repeat_policy: RepeatPolicy,

    /// Status codes the scenario accepts, the per-call "check"
    pub accept_statuses: Vec<u16>,

    /// Workers created eagerly before the run starts
    pub pre_allocated_vus: usize,

    /// Hard cap on concurrently running workers
    pub max_vus: usize,

    pub request_timeout: Duration,
    pub thresholds: Thresholds,
}

impl ScenarioSpec {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| StampedeError::InvalidScenario {
            name: self.name.clone(),
            reason,
        };

        if self.max_vus == 0 {
            return Err(invalid("max_vus must be at least 1".to_string()));
        }
        if self.pre_allocated_vus > self.max_vus {
            return Err(invalid(format!(
                "pre_allocated_vus {} exceeds max_vus {}",
                self.pre_allocated_vus, self.max_vus
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request timeout must be positive".to_string()));
        }
        if let KeyPolicy::Pooled { count } = self.key_policy {
            if count == 0 {
                return Err(invalid("key pool must hold at least one key".to_string()));
            }
        }
        match &self.workload {
            Workload::SteadyVus { vus, duration, .. } => {
                if *vus == 0 {
                    return Err(invalid("steady workload needs at least one vu".to_string()));
                }
                if *vus > self.max_vus {
                    return Err(invalid(format!("vus {} exceeds max_vus {}", vus, self.max_vus)));
                }
                if duration.is_zero() {
                    return Err(invalid("steady workload duration must be positive".to_string()));
                }
                Ok(())
            }
            Workload::ArrivalRate(plan) => plan.validate(&self.name),
        }
    }

    /// Scheduled wall-clock length, excluding drain
    pub fn total_duration(&self) -> Duration {
        match &self.workload {
            Workload::SteadyVus { duration, .. } => *duration,
            Workload::ArrivalRate(plan) => plan.total_duration(),
        }
    }
}

/// Stock scenario variants
pub mod presets {
    use super::*;

    pub fn all() -> Vec<ScenarioSpec> {
        vec![
            replay_with_key(),
            duplicate_no_key(),
            conflict_payload(),
            burst_single_key(),
            burst_key_pool(),
            burst_no_key(),
        ]
    }

    pub fn by_name(name: &str) -> Result<ScenarioSpec> {
        all()
            .into_iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| StampedeError::UnknownScenario(name.to_string()))
    }

    /// One worker, fresh key per iteration, two identical calls per key.
    /// Probes whether a same-key replay returns the prior result.
    pub fn replay_with_key() -> ScenarioSpec {
        ScenarioSpec {
            name: "replay-with-key".to_string(),
            summary: "sequential same-key same-payload pair, replay accepted".to_string(),
            workload: Workload::SteadyVus {
                vus: 1,
                duration: Duration::from_secs(120),
                think_time: Duration::from_secs(1),
            },
            script: CallScript::RepeatPair,
            key_policy: KeyPolicy::PerCall,
            payload: PayloadPlan::Fixed,
            repeat_policy: RepeatPolicy::AcceptReplay,
            accept_statuses: vec![200, 201],
            pre_allocated_vus: 1,
            max_vus: 1,
            request_timeout: Duration::from_secs(30),
            thresholds: Thresholds {
                max_failure_rate: Some(0.05),
                max_p95_ms: Some(600),
                p95_phase: None,
                min_check_rate: None,
            },
        }
    }

    /// One worker, no key header, identical payload sent twice.
    /// The pre-contract duplicate baseline.
    pub fn duplicate_no_key() -> ScenarioSpec {
        ScenarioSpec {
            name: "duplicate-no-key".to_string(),
            summary: "sequential keyless duplicate pair".to_string(),
            workload: Workload::SteadyVus {
                vus: 1,
                duration: Duration::from_secs(120),
                think_time: Duration::from_secs(1),
            },
            script: CallScript::RepeatPair,
            key_policy: KeyPolicy::Bare,
            payload: PayloadPlan::Fixed,
            repeat_policy: RepeatPolicy::FlagDuplicate,
            accept_statuses: vec![200, 201, 409, 500],
            pre_allocated_vus: 1,
            max_vus: 1,
            request_timeout: Duration::from_secs(30),
            thresholds: Thresholds {
                max_failure_rate: Some(0.05),
                max_p95_ms: Some(600),
                p95_phase: None,
                min_check_rate: None,
            },
        }
    }

    /// One worker, same key with a mutated second payload.
    /// The second call must be rejected as a policy conflict.
    pub fn conflict_payload() -> ScenarioSpec {
        ScenarioSpec {
            name: "conflict-payload".to_string(),
            summary: "sequential same-key mutated-payload pair".to_string(),
            workload: Workload::SteadyVus {
                vus: 1,
                duration: Duration::from_secs(60),
                think_time: Duration::from_secs(1),
            },
            script: CallScript::ConflictPair,
            key_policy: KeyPolicy::PerCall,
            payload: PayloadPlan::Fixed,
            repeat_policy: RepeatPolicy::AcceptReplay,
            accept_statuses: vec![200, 201, 400, 409, 422],
            pre_allocated_vus: 1,
            max_vus: 1,
            request_timeout: Duration::from_secs(30),
            thresholds: Thresholds {
                max_failure_rate: Some(0.05),
                max_p95_ms: Some(600),
                p95_phase: None,
                min_check_rate: None,
            },
        }
    }

    /// Heavy ramp hammering one shared key to surface in-progress handling
    pub fn burst_single_key() -> ScenarioSpec {
        ScenarioSpec {
            name: "burst-single-key".to_string(),
            summary: "ramp to 600 rps against a single shared key".to_string(),
            workload: Workload::ArrivalRate(RatePlan::per_second(
                100.0,
                vec![
                    Stage::tagged(300.0, Duration::from_secs(40), "burst"),
                    Stage::tagged(600.0, Duration::from_secs(40), "burst"),
                    Stage::tagged(0.0, Duration::from_secs(10), "cooldown"),
                ],
            )),
            script: CallScript::Single,
            key_policy: KeyPolicy::Single,
            payload: PayloadPlan::KeyTagged,
            repeat_policy: RepeatPolicy::FlagDuplicate,
            accept_statuses: vec![200, 201, 202],
            pre_allocated_vus: 300,
            max_vus: 1000,
            request_timeout: Duration::from_secs(30),
            thresholds: Thresholds {
                max_failure_rate: Some(0.01),
                max_p95_ms: Some(600),
                p95_phase: Some("burst".to_string()),
                min_check_rate: Some(0.99),
            },
        }
    }

    /// Ramp over a shared ten-key pool, identical payload per key
    pub fn burst_key_pool() -> ScenarioSpec {
        ScenarioSpec {
            name: "burst-key-pool".to_string(),
            summary: "ramp to 100 rps racing a ten-key pool".to_string(),
            workload: Workload::ArrivalRate(RatePlan::per_second(
                10.0,
                vec![
                    Stage::tagged(50.0, Duration::from_secs(30), "burst"),
                    Stage::tagged(100.0, Duration::from_secs(30), "burst"),
                    Stage::tagged(0.0, Duration::from_secs(20), "cooldown"),
                ],
            )),
            script: CallScript::Single,
            key_policy: KeyPolicy::Pooled { count: 10 },
            payload: PayloadPlan::KeyTagged,
            repeat_policy: RepeatPolicy::FlagDuplicate,
            accept_statuses: vec![200, 201, 202],
            pre_allocated_vus: 50,
            max_vus: 100,
            request_timeout: Duration::from_secs(30),
            thresholds: Thresholds {
                max_failure_rate: Some(0.01),
                max_p95_ms: Some(600),
                p95_phase: Some("burst".to_string()),
                min_check_rate: None,
            },
        }
    }

    /// Same ramp with no key header at all, the before-fix comparison run
    pub fn burst_no_key() -> ScenarioSpec {
        ScenarioSpec {
            name: "burst-no-key".to_string(),
            summary: "keyless burst of identical payloads".to_string(),
            workload: Workload::ArrivalRate(RatePlan::per_second(
                10.0,
                vec![
                    Stage::tagged(50.0, Duration::from_secs(30), "burst"),
                    Stage::tagged(100.0, Duration::from_secs(30), "burst"),
                    Stage::tagged(0.0, Duration::from_secs(20), "cooldown"),
                ],
            )),
            script: CallScript::Single,
            key_policy: KeyPolicy::Bare,
            payload: PayloadPlan::Fixed,
            repeat_policy: RepeatPolicy::FlagDuplicate,
            accept_statuses: vec![200, 201, 202, 409],
            pre_allocated_vus: 50,
            max_vus: 100,
            request_timeout: Duration::from_secs(30),
            thresholds: Thresholds {
                max_failure_rate: Some(0.01),
                max_p95_ms: Some(600),
                p95_phase: Some("burst".to_string()),
                min_check_rate: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_validate() {
        for spec in presets::all() {
            spec.validate().unwrap_or_else(|e| panic!("{}: {}", spec.name, e));
        }
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(presets::by_name("burst-key-pool").unwrap().name, "burst-key-pool");
        assert!(matches!(
            presets::by_name("no-such-scenario"),
            Err(StampedeError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_validation_rejects_vu_bound_violation() {
        let mut spec = presets::burst_key_pool();
        spec.pre_allocated_vus = spec.max_vus + 1;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_key_pool() {
        let mut spec = presets::burst_key_pool();
        spec.key_policy = KeyPolicy::Pooled { count: 0 };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_key_tagged_payload_carries_key_prefix() {
        let body = PayloadPlan::KeyTagged.render("burst", Some("0123456789abcdef"));
        assert_eq!(body["title"], "burst:01234567");

        let fixed = PayloadPlan::Fixed.render("burst", Some("0123456789abcdef"));
        assert_eq!(fixed["title"], "burst");
    }

    #[test]
    fn test_payload_mutation_differs_only_in_content() {
        let body = PayloadPlan::Fixed.render("t", None);
        let mutated = PayloadPlan::mutate(&body);
        assert_ne!(body, mutated);
        assert_eq!(body["title"], mutated["title"]);
        assert_eq!(mutated["content"], "DIFFERENT");
    }

    #[test]
    fn test_total_duration_matches_workload() {
        assert_eq!(
            presets::burst_key_pool().total_duration(),
            Duration::from_secs(80)
        );
        assert_eq!(
            presets::replay_with_key().total_duration(),
            Duration::from_secs(120)
        );
    }
}
