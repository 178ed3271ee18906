//! # Stampede
//!
//! Concurrent load harness for probing the idempotency-key contract of a
//! "create resource" endpoint under bursty, racing traffic.
//!
//! ## Features
//!
//! - **Arrival-rate ramps**: piecewise-linear stage schedules driven by a
//!   token governor, with client-side backpressure at the worker bound
//! - **Deliberate contention**: shared key pools sized to manufacture
//!   same-key and same-payload races
//! - **Outcome taxonomy**: created / replayed / in-progress / conflict /
//!   duplicate-suspect / server-error / network-error
//! - **Threshold verdicts**: declarative pass/fail checks over failure
//!   rate, p95 latency and check rate
//!
//! ## Usage
//!
//! ```bash
//! # race a ten-key pool against a local target
//! stampede run burst-key-pool --base-url http://localhost:8080 \
//!     --email op@example.com --password secret
//!
//! # sequential same-key replay probe, results to JSON
//! stampede run replay-with-key --env-file env/local.json -o results.json
//! ```

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod runner;
pub mod scenario;
pub mod schedule;
pub mod session;
pub mod stats;

pub use classify::{classify, CallContext, Outcome};
pub use config::{EnvFile, TargetEnv};
pub use error::{Result, StampedeError};
pub use keys::{KeyPool, KeySelection};
pub use runner::Runner;
pub use scenario::{
    presets, CallScript, KeyPolicy, PayloadPlan, RepeatPolicy, ScenarioSpec, Thresholds, Workload,
};
pub use schedule::{RatePlan, Stage};
pub use session::{authenticate, Session};
pub use stats::{RunStats, RunSummary, ThresholdCheck, ThresholdReport};
