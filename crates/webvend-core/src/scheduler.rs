//! The step scheduler: one run, one timeline, one tick at a time.
//!
//! # Architecture
//!
//! [`StepScheduler`] owns the single run slot behind a `tokio` mutex and a
//! recurring timer task per active run. Each tick:
//!
//! 1. Reads the decision context from the [`SimulationStore`]
//! 2. Renders the prompt and asks the [`DecisionSource`] under a deadline
//! 3. Parses and resolves the action, then plays one tick of demand
//! 4. Re-checks the run under the slot lock and commits in one store write
//!
//! An in-flight flag with a drop guard suppresses overlapping ticks, so a
//! run never applies the same step twice. Any failure in steps 1-3 moves
//! the run to [`RunStatus::Error`]; nothing retries on its own.
//!
//! The timer task holds only a [`Weak`] reference to the scheduler and is
//! aborted on pause, reset, and failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use webvend_types::{AgentAction, Event, RunId, RunStatus, SimulationRun, StepLog};

use crate::actions::{resolve_action, simulate_demand};
use crate::config::{CatalogEntry, WebvendConfig};
use crate::decision::{DecisionError, DecisionSource};
use crate::parse::parse_decision;
use crate::prompt::{DecisionContext, PromptEngine, PromptError};
use crate::store::{CUSTOMER_AGENT, ClearReceipt, SimulationStore};

/// Errors returned by scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// `start` was called while a run is already active.
    #[error("run {0} is already active")]
    AlreadyActive(RunId),

    /// There is no run to act on.
    #[error("no simulation run exists")]
    NoRun,

    /// The named run is not the current run.
    #[error("unknown run: {0}")]
    UnknownRun(RunId),

    /// The run exists but is not active.
    #[error("run {run_id} is {status}, not active")]
    RunNotActive {
        /// The run.
        run_id: RunId,
        /// Its current status.
        status: RunStatus,
    },

    /// A manual step named a step number other than the current one.
    #[error("stale step: run is at step {current}, request named {requested}")]
    StaleStep {
        /// The run's current step number.
        current: u64,
        /// The step number in the request.
        requested: u64,
    },

    /// The decision did not arrive within the step budget.
    #[error("decision timed out after {0}ms")]
    UpstreamTimeout(u64),

    /// The decision source could not be reached or broke off.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The decision source answered with nothing usable.
    #[error("malformed decision payload: {0}")]
    MalformedPayload(String),

    /// The prompt could not be rendered.
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// A local fault in the scheduler.
    #[error("internal scheduler error: {0}")]
    Internal(String),
}

impl From<DecisionError> for SchedulerError {
    fn from(err: DecisionError) -> Self {
        match err {
            DecisionError::Network(msg) => Self::TransientNetwork(msg),
            DecisionError::Malformed(msg) => Self::MalformedPayload(msg),
            DecisionError::Internal(msg) => Self::Internal(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings and results
// ---------------------------------------------------------------------------

/// Scheduler tuning, usually taken from [`WebvendConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Time between automatic ticks.
    pub tick_interval: Duration,
    /// Wall-clock budget for one decision.
    pub step_timeout: Duration,
    /// Per-product chance of a customer sale each tick.
    pub purchase_probability: f64,
    /// Recent sales and decisions shown in the prompt.
    pub recent_history: usize,
    /// Agent name on operator events and step logs.
    pub agent_name: String,
    /// Products the operator may buy.
    pub catalog: Vec<CatalogEntry>,
    /// Demand seed. Random when absent.
    pub seed: Option<u64>,
}

impl SchedulerSettings {
    /// Settings from a loaded config.
    pub fn from_config(config: &WebvendConfig) -> Self {
        let sim = &config.simulation;
        Self {
            tick_interval: Duration::from_millis(sim.tick_interval_ms),
            step_timeout: Duration::from_millis(sim.step_timeout_ms),
            purchase_probability: sim.customer_purchase_probability,
            recent_history: sim.recent_history,
            agent_name: sim.agent_name.clone(),
            catalog: config.catalog.clone(),
            seed: sim.seed,
        }
    }
}

/// What one applied step did.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// The run.
    pub run_id: RunId,
    /// Step number after this step.
    pub step_number: u64,
    /// The parsed action.
    pub action: AgentAction,
    /// Why the action was not applied, if it was rejected.
    pub rejection: Option<String>,
    /// Customer sales simulated this step.
    pub sales: usize,
    /// Events appended to the log.
    pub events_appended: usize,
    /// Events downgraded by inventory validation.
    pub downgraded: usize,
}

/// Outcome of a tick that did not fail.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// The step was committed.
    Applied(StepReport),
    /// Another tick was in flight; nothing happened.
    Suppressed,
    /// The run was paused, reset, or replaced while deciding; nothing committed.
    Discarded,
}

impl TickOutcome {
    /// Whether a step was committed.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Snapshot of the scheduler for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// The current run, if any.
    pub run: Option<SimulationRun>,
    /// Effective status (`idle` when there is no run).
    pub status: RunStatus,
    /// Milliseconds between automatic ticks.
    pub tick_interval_ms: u64,
    /// Decision budget in milliseconds.
    pub step_timeout_ms: u64,
    /// Whether a tick is currently running.
    pub tick_in_flight: bool,
}

// ---------------------------------------------------------------------------
// In-flight guard
// ---------------------------------------------------------------------------

/// Holds the in-flight flag for the duration of one tick.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunSlot {
    run: SimulationRun,
    timer: Option<JoinHandle<()>>,
}

impl RunSlot {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Which run a tick is for.
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Whatever run is current.
    Current,
    /// A specific run, optionally at a specific step.
    Run(RunId, Option<u64>),
}

/// Drives one simulation run at a time.
pub struct StepScheduler {
    decisions: Arc<dyn DecisionSource>,
    store: Arc<SimulationStore>,
    prompts: PromptEngine,
    settings: SchedulerSettings,
    slot: Mutex<Option<RunSlot>>,
    in_flight: AtomicBool,
    rng: StdMutex<StdRng>,
}

impl std::fmt::Debug for StepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepScheduler")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl StepScheduler {
    /// Create a scheduler with no run.
    pub fn new(
        decisions: Arc<dyn DecisionSource>,
        store: Arc<SimulationStore>,
        prompts: PromptEngine,
        settings: SchedulerSettings,
    ) -> Self {
        let rng = settings
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            decisions,
            store,
            prompts,
            settings,
            slot: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            rng: StdMutex::new(rng),
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &Arc<SimulationStore> {
        &self.store
    }

    /// Start a new run, or resume a paused or failed one.
    ///
    /// A resumed run keeps its id and step number. `model_id` replaces the
    /// model the run asks.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyActive`] if the run is active.
    pub async fn start(self: &Arc<Self>, model_id: &str) -> Result<SimulationRun, SchedulerError> {
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot.as_mut() {
            if current.run.status == RunStatus::Active {
                return Err(SchedulerError::AlreadyActive(current.run.run_id));
            }
            let previous = current.run.status;
            current.run.status = RunStatus::Active;
            current.run.model_id = model_id.to_owned();
            current.stop_timer();
            current.timer = Some(self.spawn_timer(current.run.run_id));
            info!(
                run_id = %current.run.run_id,
                step = current.run.step_number,
                from = %previous,
                model_id,
                "simulation run resumed"
            );
            return Ok(current.run.clone());
        }

        let run = SimulationRun {
            run_id: RunId::new(),
            model_id: model_id.to_owned(),
            step_number: 0,
            status: RunStatus::Active,
            started_at: Utc::now(),
        };
        let timer = self.spawn_timer(run.run_id);
        info!(run_id = %run.run_id, model_id, "simulation run started");
        *slot = Some(RunSlot {
            run: run.clone(),
            timer: Some(timer),
        });
        Ok(run)
    }

    /// Stop the timer and keep the run for a later resume.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRun`] or [`SchedulerError::RunNotActive`].
    pub async fn pause(&self) -> Result<SimulationRun, SchedulerError> {
        let mut slot = self.slot.lock().await;
        let current = slot.as_mut().ok_or(SchedulerError::NoRun)?;
        if current.run.status != RunStatus::Active {
            return Err(SchedulerError::RunNotActive {
                run_id: current.run.run_id,
                status: current.run.status,
            });
        }
        current.stop_timer();
        current.run.status = RunStatus::Paused;
        info!(run_id = %current.run.run_id, step = current.run.step_number, "simulation run paused");
        Ok(current.run.clone())
    }

    /// Drop the run and clear the store. Returns once the clear is done.
    pub async fn reset(&self) -> ClearReceipt {
        let mut slot = self.slot.lock().await;
        if let Some(mut current) = slot.take() {
            current.stop_timer();
            info!(run_id = %current.run.run_id, "simulation run reset");
        }
        // Still holding the slot: a concurrent start waits for the clear.
        self.store.clear().await
    }

    /// Current scheduler state.
    pub async fn status(&self) -> SchedulerStatus {
        let run = self.slot.lock().await.as_ref().map(|s| s.run.clone());
        SchedulerStatus {
            status: run.as_ref().map_or(RunStatus::Idle, |r| r.status),
            run,
            tick_interval_ms: duration_ms(self.settings.tick_interval),
            step_timeout_ms: duration_ms(self.settings.step_timeout),
            tick_in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Tick the current run once.
    ///
    /// # Errors
    ///
    /// Fails if there is no active run or the step fails. A failed step
    /// moves the run to [`RunStatus::Error`].
    pub async fn tick(&self) -> Result<TickOutcome, SchedulerError> {
        self.execute(Target::Current).await
    }

    /// Manually step a named run, optionally guarding on its step number.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownRun`], [`SchedulerError::RunNotActive`],
    /// or [`SchedulerError::StaleStep`] before doing anything, and the
    /// errors of [`StepScheduler::tick`] after.
    pub async fn step(
        &self,
        run_id: RunId,
        step_number: Option<u64>,
    ) -> Result<TickOutcome, SchedulerError> {
        self.execute(Target::Run(run_id, step_number)).await
    }

    // -----------------------------------------------------------------------
    // Tick internals
    // -----------------------------------------------------------------------

    fn spawn_timer(self: &Arc<Self>, run_id: RunId) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.tick_interval;
        tokio::spawn(async move {
            let first = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                match scheduler.execute(Target::Run(run_id, None)).await {
                    Ok(TickOutcome::Applied(_) | TickOutcome::Suppressed) => {}
                    Ok(TickOutcome::Discarded) => break,
                    Err(e) => {
                        debug!(run_id = %run_id, error = %e, "timer stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Check the target against the slot and return the run to tick.
    async fn select_run(&self, target: Target) -> Result<SimulationRun, SchedulerError> {
        let slot = self.slot.lock().await;
        let current = match (slot.as_ref(), target) {
            (None, Target::Current) => return Err(SchedulerError::NoRun),
            (None, Target::Run(run_id, _)) => return Err(SchedulerError::UnknownRun(run_id)),
            (Some(current), Target::Run(run_id, _)) if current.run.run_id != run_id => {
                return Err(SchedulerError::UnknownRun(run_id));
            }
            (Some(current), _) => current,
        };
        if current.run.status != RunStatus::Active {
            return Err(SchedulerError::RunNotActive {
                run_id: current.run.run_id,
                status: current.run.status,
            });
        }
        if let Target::Run(_, Some(requested)) = target
            && requested != current.run.step_number
        {
            return Err(SchedulerError::StaleStep {
                current: current.run.step_number,
                requested,
            });
        }
        Ok(current.run.clone())
    }

    async fn execute(&self, target: Target) -> Result<TickOutcome, SchedulerError> {
        let run = self.select_run(target).await?;
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!(run_id = %run.run_id, "tick suppressed, previous tick still in flight");
            return Ok(TickOutcome::Suppressed);
        };

        match self.decide_and_commit(&run).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(run.run_id, e).await),
        }
    }

    async fn decide_and_commit(&self, run: &SimulationRun) -> Result<TickOutcome, SchedulerError> {
        let view = self.store.planning_view(self.settings.recent_history).await;
        let context = DecisionContext::build(&view, &self.settings.catalog);
        let prompt = self.prompts.render(&context)?;

        let budget = self.settings.step_timeout;
        let response =
            match tokio::time::timeout(budget, self.decisions.decide(&run.model_id, &prompt)).await
            {
                Ok(result) => result?,
                Err(_) => return Err(SchedulerError::UpstreamTimeout(duration_ms(budget))),
            };
        if response.trim().is_empty() {
            return Err(SchedulerError::MalformedPayload("empty model response".to_owned()));
        }

        let parsed = parse_decision(&response);
        let (action_events, rejection) =
            match resolve_action(&parsed.action, &view.book, view.balance, &self.settings.catalog) {
                Ok(events) => (events, None),
                Err(reason) => {
                    info!(
                        run_id = %run.run_id,
                        action = parsed.action.label(),
                        item = ?parsed.action.item_name(),
                        reason = %reason,
                        "action rejected"
                    );
                    (Vec::new(), Some(reason.to_string()))
                }
            };

        // Customers see the prices and stock the action just set.
        let mut projected = view.book.clone();
        for kind in &action_events {
            if let Err(e) = projected.apply(kind) {
                debug!(error = %e, "action event does not project");
            }
        }
        let sales = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| SchedulerError::Internal("demand rng lock poisoned".to_owned()))?;
            simulate_demand(&projected, self.settings.purchase_probability, &mut *rng)
        };
        let sales_count = sales.len();

        let agent_response = json!({
            "response": response,
            "action": parsed.action,
        });
        let mut events: Vec<Event> = action_events
            .into_iter()
            .map(|kind| {
                Event::new(
                    kind,
                    Some(self.settings.agent_name.clone()),
                    agent_response.clone(),
                )
            })
            .collect();
        events.extend(sales.into_iter().map(|kind| {
            Event::new(
                kind,
                Some(CUSTOMER_AGENT.to_owned()),
                json!({"message": "customer purchase"}),
            )
        }));

        // Commit phase: the run must still be the same active run.
        let mut slot = self.slot.lock().await;
        let Some(current) = slot.as_mut() else {
            debug!(run_id = %run.run_id, "run reset during tick, discarding");
            return Ok(TickOutcome::Discarded);
        };
        if current.run.run_id != run.run_id
            || current.run.status != RunStatus::Active
            || current.run.step_number != run.step_number
        {
            debug!(run_id = %run.run_id, status = %current.run.status, "run changed during tick, discarding");
            return Ok(TickOutcome::Discarded);
        }

        let step_number = current.run.step_number.saturating_add(1);
        let log = StepLog {
            run_id: run.run_id,
            step_number,
            agent_name: self.settings.agent_name.clone(),
            prompt,
            response,
            parsed_action: json!({
                "action": parsed.action,
                "strategy": parsed.strategy.as_str(),
                "rejection": rejection,
            }),
            created_at: Utc::now(),
        };
        let receipt = self.store.commit_step(events, Some(log)).await;
        current.run.step_number = step_number;
        drop(slot);

        info!(
            run_id = %run.run_id,
            step = step_number,
            action = parsed.action.label(),
            item = ?parsed.action.item_name(),
            sales = sales_count,
            events = receipt.events.len(),
            "step applied"
        );
        Ok(TickOutcome::Applied(StepReport {
            run_id: run.run_id,
            step_number,
            action: parsed.action,
            rejection,
            sales: sales_count,
            events_appended: receipt.events.len(),
            downgraded: receipt.downgraded,
        }))
    }

    /// Move the run to `error` and stop its timer.
    async fn fail(&self, run_id: RunId, error: SchedulerError) -> SchedulerError {
        let mut slot = self.slot.lock().await;
        if let Some(current) = slot.as_mut()
            && current.run.run_id == run_id
            && current.run.status == RunStatus::Active
        {
            current.run.status = RunStatus::Error;
            current.stop_timer();
            warn!(
                run_id = %run_id,
                step = current.run.step_number,
                error = %error,
                "tick failed, run moved to error"
            );
        }
        error
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use rust_decimal::Decimal;

    use super::*;
    use crate::config::default_catalog;
    use crate::decision::StubDecisionSource;

    fn settings(tick_ms: u64, timeout_ms: u64) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: Duration::from_millis(tick_ms),
            step_timeout: Duration::from_millis(timeout_ms),
            purchase_probability: 0.0,
            recent_history: 5,
            agent_name: "VendingMachine".to_owned(),
            catalog: default_catalog(),
            seed: Some(1),
        }
    }

    fn scheduler(source: StubDecisionSource, settings: SchedulerSettings) -> Arc<StepScheduler> {
        let seed = settings.catalog.iter().map(CatalogEntry::to_item).collect();
        let store = Arc::new(SimulationStore::new(seed, Decimal::ONE_HUNDRED));
        Arc::new(StepScheduler::new(
            Arc::new(source),
            store,
            PromptEngine::new().unwrap(),
            settings,
        ))
    }

    const HOUR: u64 = 3_600_000;

    #[tokio::test(start_paused = true)]
    async fn second_start_fails() {
        let s = scheduler(StubDecisionSource::default(), settings(HOUR, 1000));
        let run = s.start("m").await.unwrap();
        assert_eq!(run.status, RunStatus::Active);
        assert_eq!(run.step_number, 0);
        assert!(matches!(
            s.start("m").await,
            Err(SchedulerError::AlreadyActive(id)) if id == run.run_id
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ticks_apply_exactly_one_step() {
        let source = StubDecisionSource::default().with_delay(Duration::from_millis(50));
        let s = scheduler(source, settings(HOUR, 1000));
        s.start("m").await.unwrap();

        let (a, b) = tokio::join!(s.tick(), s.tick());
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| o.is_applied()).count(), 1);
        assert_eq!(
            outcomes.iter().filter(|o| matches!(o, TickOutcome::Suppressed)).count(),
            1
        );
        assert_eq!(s.status().await.run.unwrap().step_number, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_moves_run_to_error_and_start_resumes() {
        let source = StubDecisionSource::default().with_delay(Duration::from_secs(10));
        let s = scheduler(source, settings(HOUR, 1000));
        let run = s.start("m").await.unwrap();

        assert!(matches!(s.tick().await, Err(SchedulerError::UpstreamTimeout(1000))));
        assert_eq!(s.status().await.status, RunStatus::Error);
        assert!(matches!(s.tick().await, Err(SchedulerError::RunNotActive { .. })));

        let resumed = s.start("m").await.unwrap();
        assert_eq!(resumed.run_id, run.run_id);
        assert_eq!(resumed.step_number, 0);
        assert_eq!(resumed.status, RunStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_after_pause() {
        let s = scheduler(StubDecisionSource::default(), settings(1000, 500));
        s.start("m").await.unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let paused = s.pause().await.unwrap();
        assert!(paused.step_number >= 1);
        let logs_at_pause = s.store().logs(paused.run_id).await.len();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let status = s.status().await;
        assert_eq!(status.status, RunStatus::Paused);
        assert_eq!(status.run.unwrap().step_number, paused.step_number);
        assert_eq!(s.store().logs(paused.run_id).await.len(), logs_at_pause);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_step_validation() {
        let s = scheduler(StubDecisionSource::default(), settings(HOUR, 1000));
        assert!(matches!(s.tick().await, Err(SchedulerError::NoRun)));
        let run = s.start("m").await.unwrap();

        assert!(matches!(
            s.step(RunId::new(), None).await,
            Err(SchedulerError::UnknownRun(_))
        ));
        assert!(matches!(
            s.step(run.run_id, Some(4)).await,
            Err(SchedulerError::StaleStep { current: 0, requested: 4 })
        ));
        assert!(s.step(run.run_id, Some(0)).await.unwrap().is_applied());

        s.pause().await.unwrap();
        assert!(matches!(
            s.step(run.run_id, None).await,
            Err(SchedulerError::RunNotActive { status: RunStatus::Paused, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn buy_decision_moves_cash_and_logs_step() {
        let source = StubDecisionSource::new("Action: BUY, Item: 'Classic Cola', Quantity: 10");
        let s = scheduler(source, settings(HOUR, 1000));
        let run = s.start("m").await.unwrap();

        match s.tick().await.unwrap() {
            TickOutcome::Applied(report) => {
                assert_eq!(report.step_number, 1);
                assert_eq!(report.events_appended, 1);
                assert!(report.rejection.is_none());
            }
            other => panic!("expected applied step, got {other:?}"),
        }
        assert_eq!(s.store().balance().await, Decimal::new(95, 0));

        let logs = s.store().logs(run.run_id).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs.first().unwrap().parsed_action["action"]["action"], "BUY");
    }

    #[tokio::test(start_paused = true)]
    async fn failures_and_rejections() {
        let source = StubDecisionSource::new("Action: BUY, Item: 'Caviar', Quantity: 1")
            .with_script(vec![Ok("   ".to_owned())]);
        let s = scheduler(source, settings(HOUR, 1000));
        s.start("m").await.unwrap();

        // Empty answers fail the step.
        assert!(matches!(s.tick().await, Err(SchedulerError::MalformedPayload(_))));
        assert_eq!(s.status().await.status, RunStatus::Error);

        // A rejected action still applies the step.
        s.start("m").await.unwrap();
        match s.tick().await.unwrap() {
            TickOutcome::Applied(report) => {
                assert!(report.rejection.is_some());
                assert_eq!(report.events_appended, 0);
            }
            other => panic!("expected applied step, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_run_and_store() {
        let s = scheduler(StubDecisionSource::default(), settings(HOUR, 1000));
        s.start("m").await.unwrap();
        s.tick().await.unwrap();

        let receipt = s.reset().await;
        assert_eq!(receipt.cleared_logs, 1);
        let status = s.status().await;
        assert!(status.run.is_none());
        assert_eq!(status.status, RunStatus::Idle);
        assert_eq!(s.store().version().await, 2);

        let fresh = s.start("m").await.unwrap();
        assert_eq!(fresh.step_number, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_stops_the_timer() {
        let source = StubDecisionSource::default()
            .with_script(vec![Err(DecisionError::Network("down".to_owned()))]);
        let s = scheduler(source, settings(1000, 500));
        s.start("m").await.unwrap();

        tokio::time::sleep(Duration::from_millis(5500)).await;
        let status = s.status().await;
        assert_eq!(status.status, RunStatus::Error);
        assert_eq!(status.run.unwrap().step_number, 0);
    }
}
