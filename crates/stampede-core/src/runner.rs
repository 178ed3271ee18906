//! Scenario execution: a governor-paced dispatch stream over a reusable
//! worker pool.
//!
//! The governor converts the arrival-rate plan into semaphore tokens on a
//! fixed tick, carrying the fractional remainder between ticks so the
//! long-term average matches the schedule. Workers are the only token
//! consumers and there are never more than `max_vus` of them, which is the
//! whole backpressure story: when every worker is busy, released tokens pool
//! up to a bounded cap and issuance stalls instead of queueing without
//! bound. `pre_allocated_vus` workers exist before the first token; the pool
//! grows towards `max_vus` whenever a tick finds tokens nobody consumed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classify::{classify, CallContext, Outcome};
use crate::config::TargetEnv;
use crate::dispatch::{self, CallPlan};
use crate::error::Result;
use crate::keys::KeyPool;
use crate::scenario::{CallScript, PayloadPlan, ScenarioSpec, Workload};
use crate::schedule::RatePlan;
use crate::session::{self, Session};
use crate::stats::{RunStats, RunSummary};

const GOVERNOR_TICK: Duration = Duration::from_millis(100);

/// Shared state for one run; written only during setup apart from the
/// statistics and the phase marker
struct RunContext {
    client: reqwest::Client,
    session: Session,
    keys: KeyPool,
    stats: Arc<RunStats>,
    spec: ScenarioSpec,
    resource_url: String,
    current_phase: RwLock<Option<String>>,
}

/// Executes one scenario against one target
pub struct Runner {
    spec: ScenarioSpec,
    env: TargetEnv,
    stats: Arc<RunStats>,
}

impl Runner {
    pub fn new(spec: ScenarioSpec, env: TargetEnv) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            env,
            stats: Arc::new(RunStats::new()),
        })
    }

    /// Live statistics handle; mid-run reads are approximate
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Run the scenario to completion and return the final snapshot
    pub async fn run(&self) -> Result<RunSummary> {
        let client = dispatch::build_client(self.spec.request_timeout, self.spec.max_vus)?;

        // setup barrier: no worker exists until the session is ready
        let session = session::authenticate(&client, &self.env).await?;
        let keys = KeyPool::generate(self.spec.key_policy.clone());

        let ctx = Arc::new(RunContext {
            client,
            session,
            keys,
            stats: Arc::clone(&self.stats),
            spec: self.spec.clone(),
            resource_url: self.env.resource_url(),
            current_phase: RwLock::new(None),
        });

        info!(scenario = %self.spec.name, target = %self.env.base_url, "run starting");
        self.stats.mark_started();

        match self.spec.workload.clone() {
            Workload::SteadyVus {
                vus,
                duration,
                think_time,
            } => run_steady(ctx, vus, duration, think_time).await,
            Workload::ArrivalRate(plan) => {
                run_ramp(ctx, plan, self.spec.pre_allocated_vus, self.spec.max_vus).await
            }
        }

        info!(
            scenario = %self.spec.name,
            dispatched = self.stats.dispatched(),
            "run complete"
        );
        Ok(self.stats.snapshot(&self.spec.name))
    }
}

/// Fixed worker set looping until the duration elapses
async fn run_steady(ctx: Arc<RunContext>, vus: usize, duration: Duration, think_time: Duration) {
    let handles: Vec<JoinHandle<()>> = (0..vus)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                let started = tokio::time::Instant::now();
                while started.elapsed() < duration {
                    run_iteration(&ctx).await;
                    if !think_time.is_zero() {
                        tokio::time::sleep(think_time).await;
                    }
                }
            })
        })
        .collect();

    drain(handles, duration + drain_grace(&ctx.spec)).await;
}

/// Governor loop driving the arrival-rate plan
async fn run_ramp(ctx: Arc<RunContext>, plan: RatePlan, pre_allocated: usize, max_vus: usize) {
    let tokens = Arc::new(Semaphore::new(0));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers: Mutex<Vec<JoinHandle<()>>> = Mutex::new(Vec::new());
    let spawned = AtomicUsize::new(0);

    spawn_workers(
        &ctx,
        &tokens,
        &shutdown_rx,
        &workers,
        &spawned,
        pre_allocated,
        max_vus,
    );

    let started = tokio::time::Instant::now();
    let total = plan.total_duration();
    let mut interval = tokio::time::interval(GOVERNOR_TICK);
    let mut carry = 0.0_f64;

    loop {
        interval.tick().await;
        let elapsed = started.elapsed();
        if elapsed >= total {
            break;
        }

        // a full tick with unconsumed tokens means every worker is busy
        let leftover = tokens.available_permits();
        if leftover > 0 {
            let current = spawned.load(Ordering::Relaxed);
            if current < max_vus {
                let grow = leftover.min(max_vus - current);
                debug!(grow, "growing worker pool");
                spawn_workers(&ctx, &tokens, &shutdown_rx, &workers, &spawned, grow, max_vus);
            }
        }

        let phase = plan.phase_at(elapsed).map(str::to_string);
        if *ctx.current_phase.read() != phase {
            *ctx.current_phase.write() = phase;
        }

        let due = plan.rate_per_sec_at(elapsed) * GOVERNOR_TICK.as_secs_f64() + carry;
        let add = due.floor() as usize;
        carry = due - add as f64;
        if add > 0 {
            // stored tokens are capped so a stall cannot burst past the
            // worker bound once capacity frees up
            let room = max_vus.saturating_sub(tokens.available_permits());
            tokens.add_permits(add.min(room));
        }
    }

    let _ = shutdown_tx.send(true);
    let handles = std::mem::take(&mut *workers.lock());
    drain(handles, drain_grace(&ctx.spec)).await;
}

fn spawn_workers(
    ctx: &Arc<RunContext>,
    tokens: &Arc<Semaphore>,
    shutdown: &watch::Receiver<bool>,
    workers: &Mutex<Vec<JoinHandle<()>>>,
    spawned: &AtomicUsize,
    count: usize,
    max_vus: usize,
) {
    let mut guard = workers.lock();
    for _ in 0..count {
        if spawned.fetch_add(1, Ordering::Relaxed) >= max_vus {
            spawned.fetch_sub(1, Ordering::Relaxed);
            break;
        }
        guard.push(tokio::spawn(worker_loop(
            Arc::clone(ctx),
            Arc::clone(tokens),
            shutdown.clone(),
        )));
    }
}

/// One reusable execution unit: consume a token, run one iteration, idle
async fn worker_loop(
    ctx: Arc<RunContext>,
    tokens: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            permit = tokens.acquire() => {
                match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => break,
                }
                run_iteration(&ctx).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Wait for workers to drain in-flight work, aborting past the deadline so a
/// stalled target can never hang the run; whatever was recorded up to the
/// abort stays in the aggregate
async fn drain(handles: Vec<JoinHandle<()>>, deadline: Duration) {
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
    if tokio::time::timeout(deadline, join_all(handles)).await.is_err() {
        warn!("drain deadline exceeded, aborting stragglers");
        for abort in aborts {
            abort.abort();
        }
    }
}

fn drain_grace(spec: &ScenarioSpec) -> Duration {
    // worst case one full iteration: a pair of calls at the timeout bound
    spec.request_timeout * 2 + Duration::from_secs(5)
}

/// One scripted iteration, one or two calls
async fn run_iteration(ctx: &RunContext) {
    let selection = ctx.keys.pick();
    let key = selection.key.as_deref();
    let body = ctx.spec.payload.render(&ctx.spec.name, key);
    let opening = if selection.expect_repeat {
        CallContext::repeat()
    } else {
        CallContext::first()
    };

    match ctx.spec.script {
        CallScript::Single => {
            do_call(ctx, key, body, opening).await;
        }
        CallScript::RepeatPair => {
            do_call(ctx, key, body.clone(), opening).await;
            do_call(ctx, key, body, CallContext::repeat()).await;
        }
        CallScript::ConflictPair => {
            do_call(ctx, key, body.clone(), opening).await;
            do_call(
                ctx,
                key,
                PayloadPlan::mutate(&body),
                CallContext::mismatched_repeat(),
            )
            .await;
        }
    }
}

async fn do_call(ctx: &RunContext, key: Option<&str>, body: Value, call_ctx: CallContext) {
    let plan = CallPlan {
        url: ctx.resource_url.clone(),
        key: key.map(str::to_string),
        body,
    };
    let phase = ctx.current_phase.read().clone();

    ctx.stats.enter_flight();
    let result = dispatch::execute(&ctx.client, &ctx.session, &plan, ctx.spec.request_timeout).await;
    ctx.stats.exit_flight();

    let outcome = classify(result.status, call_ctx, ctx.spec.repeat_policy);
    if outcome == Outcome::Other {
        warn!(status = ?result.status, "response outside the known taxonomy");
    }
    let check_passed = match result.status {
        Some(status) => ctx.spec.accept_statuses.contains(&status),
        None => false,
    };
    ctx.stats.record(
        outcome,
        result.latency,
        phase.as_deref(),
        check_passed,
        result.error_kind,
    );
}
