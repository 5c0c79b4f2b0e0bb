//! Reset scheduler.
//!
//! # Design
//!
//! One [`ResetScheduler`] instance owns the whole daily cycle: the midnight
//! timer, the re-entrancy guard, the idempotency short-circuit against the
//! reset ledger, the bounded single-recovery policy and the manual trigger.
//! All of them funnel into one private `run_cycle`, so every path (timer,
//! recovery, operator) shares the same guard, the same ledger checks and the
//! same audit trail.
//!
//! Locking rule: the cycle/last/timer mutexes are plain `std::sync` mutexes
//! and are never held across an `.await`. Guards are taken, the transition is
//! applied, and the guard is dropped before any store call.
//!
//! Recovery policy: only a *scheduled* cycle arms the delayed recovery
//! attempt, and a recovery attempt never re-arms itself. A manual trigger
//! reports its failure synchronously to the operator instead; retrying is the
//! operator's call. This bounds unattended attempts per day to two.

use crate::activity::{self, ActivityLogger};
use crate::clock;
use crate::executor::{DailyResetExecutor, ResetError};
use crate::state::{CycleEvent, CyclePhase, ResetCycle};
use crate::store::{ResetStore, StoreError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use qdk_schemas::{NewResetLogEntry, ResetEvent, ResetOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scheduler knobs, filled from the `reset` and `queue` config sections.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Shop timezone that defines the queue day and the midnight boundary.
    pub timezone: Tz,
    /// Pause before the single recovery attempt after a scheduled failure.
    pub recovery_delay: Duration,
    /// Hard deadline for one rollover attempt.
    pub execute_timeout: Duration,
    /// When false, `start` is a no-op and only manual triggers run.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Manila,
            recovery_delay: Duration::from_secs(300),
            execute_timeout: Duration::from_secs(120),
            enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Status / trigger types
// ---------------------------------------------------------------------------

/// Point-in-time scheduler snapshot served by the daemon status route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the midnight timer task is alive.
    pub is_scheduled: bool,
    pub is_running: bool,
    pub recovery_pending: bool,
    pub phase: CyclePhase,
    pub next_reset_at: DateTime<Utc>,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<ResetOutcome>,
    pub last_error: Option<String>,
    pub timezone: String,
}

/// Where a cycle came from. Recorded in the ledger-adjacent audit entries and
/// on broadcast events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTrigger {
    Scheduled,
    Manual,
    Recovery,
}

impl ResetTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Recovery => "recovery",
        }
    }
}

/// Result of one cycle, whatever its trigger.
#[derive(Debug)]
pub enum CycleResult {
    /// The cycle never started: another one is in flight or a recovery is
    /// armed. Carries the phase that refused the trigger.
    Skipped { phase: CyclePhase },
    /// The cycle finished with an outcome (possibly an idempotent no-op).
    Completed(ResetOutcome),
    /// The cycle started and failed.
    Failed(ResetError),
}

/// Returned by [`ResetScheduler::trigger_manual_reset`].
#[derive(Debug)]
pub enum TriggerError {
    /// Refused: a cycle is running or a recovery is armed.
    Busy { phase: CyclePhase },
    /// Accepted but the rollover failed.
    Execution(ResetError),
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerError::Busy { phase } => {
                write!(f, "reset refused: cycle is {phase}")
            }
            TriggerError::Execution(e) => write!(f, "reset failed: {e}"),
        }
    }
}

impl std::error::Error for TriggerError {}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct LastReset {
    at: DateTime<Utc>,
    outcome: Option<ResetOutcome>,
    error: Option<String>,
}

pub struct ResetScheduler {
    store: Arc<dyn ResetStore>,
    activity: Arc<dyn ActivityLogger>,
    executor: DailyResetExecutor,
    config: SchedulerConfig,
    cycle: Mutex<ResetCycle>,
    last: Mutex<Option<LastReset>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ResetEvent>,
}

// A poisoned guard only means another thread panicked mid-section; the phase
// data is still coherent, so recover the guard instead of propagating panics.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResetScheduler {
    pub fn new(
        store: Arc<dyn ResetStore>,
        activity: Arc<dyn ActivityLogger>,
        config: SchedulerConfig,
    ) -> Self {
        let executor = DailyResetExecutor::new(Arc::clone(&store), config.execute_timeout);
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            activity,
            executor,
            config,
            cycle: Mutex::new(ResetCycle::new()),
            last: Mutex::new(None),
            timer: Mutex::new(None),
            events,
        }
    }

    /// Subscribe to completed-reset events. Every cycle that produces an
    /// outcome (including no-ops) is broadcast; failed cycles are not.
    pub fn subscribe(&self) -> broadcast::Receiver<ResetEvent> {
        self.events.subscribe()
    }

    /// UTC instant of the next midnight boundary after `now`.
    pub fn next_reset_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        clock::next_local_midnight(now, self.config.timezone)
    }

    pub fn is_scheduled(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn status(&self) -> SchedulerStatus {
        let phase = lock(&self.cycle).phase();
        let (last_reset_at, last_outcome, last_error) = match lock(&self.last).as_ref() {
            Some(last) => (Some(last.at), last.outcome.clone(), last.error.clone()),
            None => (None, None, None),
        };
        SchedulerStatus {
            is_scheduled: self.is_scheduled(),
            is_running: phase == CyclePhase::Running,
            recovery_pending: phase == CyclePhase::RecoveryPending,
            phase,
            next_reset_at: self.next_reset_time(Utc::now()),
            last_reset_at,
            last_outcome,
            last_error,
            timezone: self.config.timezone.name().to_string(),
        }
    }

    /// Start the midnight timer. No-op when disabled by config or already
    /// started.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("reset scheduler disabled by config; not starting timer");
            return;
        }
        let mut timer = lock(&self.timer);
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("reset scheduler already started");
            return;
        }
        let sched = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = clock::next_local_midnight(now, sched.config.timezone);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                // The cycle runs on its own task so stopping the timer can
                // never abort a rollover mid-flight.
                let runner = Arc::clone(&sched);
                tokio::spawn(async move {
                    runner.run_scheduled_cycle().await;
                });
            }
        }));
        drop(timer);
        info!(timezone = %self.config.timezone, "reset scheduler started");
        self.audit(
            activity::ACTION_SCHEDULER_STARTED,
            json!({ "timezone": self.config.timezone.name() }),
        );
    }

    /// Stop the midnight timer. An armed recovery attempt is deliberately
    /// left running: aborting it would strand the cycle in `RecoveryPending`
    /// and lock out every later trigger.
    pub fn stop(&self) {
        let handle = lock(&self.timer).take();
        if let Some(handle) = handle {
            handle.abort();
            info!("reset scheduler stopped");
            self.audit(activity::ACTION_SCHEDULER_STOPPED, json!({}));
        }
    }

    /// Run one timer-initiated cycle now. Called by the timer task at each
    /// midnight boundary; exposed so tests and tooling can fire a boundary
    /// without waiting for one.
    pub async fn run_scheduled_cycle(self: &Arc<Self>) -> CycleResult {
        self.run_cycle(ResetTrigger::Scheduled).await
    }

    /// Operator-initiated reset.
    ///
    /// Accepted only from a resting phase; a running cycle or an armed
    /// recovery refuses it with [`TriggerError::Busy`]. The accepted path is
    /// identical to a scheduled cycle (same short-circuit, same ledger
    /// writes) except that a failure is returned to the caller instead of
    /// arming a recovery attempt.
    pub async fn trigger_manual_reset(self: &Arc<Self>) -> Result<ResetOutcome, TriggerError> {
        match self.run_cycle(ResetTrigger::Manual).await {
            CycleResult::Completed(outcome) => Ok(outcome),
            CycleResult::Skipped { phase } => Err(TriggerError::Busy { phase }),
            CycleResult::Failed(e) => Err(TriggerError::Execution(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Cycle internals
    // -----------------------------------------------------------------------

    async fn run_cycle(self: &Arc<Self>, trigger: ResetTrigger) -> CycleResult {
        // Guard and transition in one step: `Begin` is only legal from a
        // resting phase, so a busy cycle rejects the event and we skip.
        let begin = if trigger == ResetTrigger::Recovery {
            CycleEvent::BeginRecovery
        } else {
            CycleEvent::Begin
        };
        if let Err(refused) = lock(&self.cycle).apply(begin) {
            warn!(
                phase = %refused.from,
                trigger = trigger.as_str(),
                "reset skipped: cycle busy"
            );
            self.audit(
                activity::ACTION_RESET_SKIPPED,
                json!({ "trigger": trigger.as_str(), "phase": refused.from.as_str() }),
            );
            return CycleResult::Skipped {
                phase: refused.from,
            };
        }

        let started = Instant::now();
        let now = Utc::now();
        let day = clock::local_day(now, self.config.timezone);
        info!(%day, trigger = trigger.as_str(), "daily reset cycle started");
        self.audit(
            activity::ACTION_RESET_STARTED,
            json!({ "reset_date": day, "trigger": trigger.as_str() }),
        );

        // Idempotency short-circuit: a recorded success makes the day final.
        match self.store.reset_succeeded_on(day).await {
            Ok(true) => {
                info!(%day, "reset already completed for this day; no-op");
                let outcome = ResetOutcome::no_op(day);
                self.finish_success(&outcome, trigger);
                return CycleResult::Completed(outcome);
            }
            Ok(false) => {}
            Err(e) => {
                // Ledger unreadable: running blind could double-execute the
                // day, so treat it as a failed attempt.
                return self
                    .finish_failure(day, ResetError::Store(e), trigger, started)
                    .await;
            }
        }

        match self.executor.execute(day, now).await {
            Ok(outcome) => {
                match self
                    .store
                    .record_reset(&NewResetLogEntry::success(&outcome))
                    .await
                {
                    Ok(()) => {
                        self.finish_success(&outcome, trigger);
                        CycleResult::Completed(outcome)
                    }
                    Err(StoreError::DuplicateSuccess) => {
                        // Another instance recorded the day first. Its
                        // rollover won; converge on the no-op outcome.
                        info!(%day, "success already recorded elsewhere; converging to no-op");
                        let outcome = ResetOutcome::no_op(day);
                        self.finish_success(&outcome, trigger);
                        CycleResult::Completed(outcome)
                    }
                    Err(e) => {
                        // The rollover is committed; only the ledger entry is
                        // missing. Re-running would archive a second time, so
                        // the cycle still counts as succeeded. Surface loudly.
                        error!(%day, error = %e, "reset succeeded but ledger write failed");
                        self.audit(
                            activity::ACTION_RESET_LEDGER_WRITE_FAILED,
                            json!({ "reset_date": day, "error": e.to_string() }),
                        );
                        self.finish_success(&outcome, trigger);
                        CycleResult::Completed(outcome)
                    }
                }
            }
            Err(e) => self.finish_failure(day, e, trigger, started).await,
        }
    }

    fn finish_success(&self, outcome: &ResetOutcome, trigger: ResetTrigger) {
        self.apply_or_log(CycleEvent::Succeed);
        *lock(&self.last) = Some(LastReset {
            at: Utc::now(),
            outcome: Some(outcome.clone()),
            error: None,
        });

        let action = if outcome.no_op {
            activity::ACTION_RESET_NOOP
        } else {
            activity::ACTION_RESET_COMPLETED
        };
        self.audit(
            action,
            json!({
                "reset_date": outcome.reset_date,
                "trigger": trigger.as_str(),
                "archived": outcome.archived,
                "carried_forward": outcome.carried_forward,
                "processed": outcome.processed,
                "duration_ms": outcome.duration_ms,
            }),
        );
        if trigger == ResetTrigger::Recovery {
            info!(day = %outcome.reset_date, "recovery attempt succeeded");
            self.audit(
                activity::ACTION_RECOVERY_SUCCESS,
                json!({ "reset_date": outcome.reset_date }),
            );
        } else {
            info!(
                day = %outcome.reset_date,
                archived = outcome.archived,
                carried_forward = outcome.carried_forward,
                no_op = outcome.no_op,
                "daily reset cycle completed"
            );
        }

        let _ = self.events.send(ResetEvent {
            outcome: outcome.clone(),
            trigger: trigger.as_str().to_string(),
            ts_utc: Utc::now(),
        });
    }

    async fn finish_failure(
        self: &Arc<Self>,
        day: chrono::NaiveDate,
        err: ResetError,
        trigger: ResetTrigger,
        started: Instant,
    ) -> CycleResult {
        let duration_ms = started.elapsed().as_millis() as i64;
        error!(%day, trigger = trigger.as_str(), error = %err, "daily reset cycle failed");

        // Failure entries are informational; losing one is log-worthy only.
        let entry = NewResetLogEntry::failure(day, err.to_string(), duration_ms);
        if let Err(rec_err) = self.store.record_reset(&entry).await {
            warn!(%day, error = %rec_err, "could not record failed reset attempt");
        }

        self.apply_or_log(CycleEvent::Fail);
        *lock(&self.last) = Some(LastReset {
            at: Utc::now(),
            outcome: None,
            error: Some(err.to_string()),
        });
        let failure_action = if trigger == ResetTrigger::Recovery {
            activity::ACTION_RECOVERY_FAILED
        } else {
            activity::ACTION_RESET_FAILED
        };
        self.audit(
            failure_action,
            json!({
                "reset_date": day,
                "trigger": trigger.as_str(),
                "error": err.to_string(),
            }),
        );

        match trigger {
            ResetTrigger::Scheduled => self.arm_recovery(day),
            ResetTrigger::Manual => {
                // Reported synchronously; retrying is the operator's call.
            }
            ResetTrigger::Recovery => {
                warn!(%day, "recovery attempt failed; waiting for manual trigger");
            }
        }

        CycleResult::Failed(err)
    }

    /// Arm the single delayed recovery attempt for a failed scheduled cycle.
    fn arm_recovery(self: &Arc<Self>, day: chrono::NaiveDate) {
        if let Err(e) = lock(&self.cycle).apply(CycleEvent::ArmRecovery) {
            error!(%day, error = %e, "could not arm recovery attempt");
            return;
        }
        let delay = self.config.recovery_delay;
        info!(%day, delay_secs = delay.as_secs(), "recovery attempt armed");
        self.audit(
            activity::ACTION_RECOVERY_SCHEDULED,
            json!({ "reset_date": day, "delay_secs": delay.as_secs() }),
        );
        let sched = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sched.run_cycle(ResetTrigger::Recovery).await;
        });
    }

    fn apply_or_log(&self, event: CycleEvent) {
        if let Err(e) = lock(&self.cycle).apply(event) {
            // Unreachable from a well-formed cycle; a bug if it fires.
            error!(error = %e, "reset cycle transition rejected");
        }
    }

    fn audit(&self, action: &str, details: serde_json::Value) {
        if let Err(e) = self
            .activity
            .log(activity::SYSTEM_ACTOR_ID, action, activity::SYSTEM_ORIGIN, details)
        {
            warn!(action, error = %e, "activity log write failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use qdk_schemas::{Customer, PurgeCounts, RolloverCounts};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store double that keeps a real ledger but scripts the rollover.
    struct LedgerStore {
        entries: Mutex<Vec<NewResetLogEntry>>,
        rollover_calls: AtomicU32,
        fail_rollovers: AtomicU32,
    }

    impl LedgerStore {
        fn healthy() -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(Vec::new()),
                rollover_calls: AtomicU32::new(0),
                fail_rollovers: AtomicU32::new(0),
            })
        }

        fn failing(times: u32) -> Arc<Self> {
            let store = Self::healthy();
            store.fail_rollovers.store(times, Ordering::SeqCst);
            store
        }

        fn calls(&self) -> u32 {
            self.rollover_calls.load(Ordering::SeqCst)
        }

        fn entries(&self) -> Vec<NewResetLogEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResetStore for LedgerStore {
        async fn reset_succeeded_on(&self, day: NaiveDate) -> Result<bool, StoreError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .any(|e| e.reset_date == day && e.success))
        }

        async fn record_reset(&self, entry: &NewResetLogEntry) -> Result<(), StoreError> {
            let mut entries = self.entries.lock().unwrap();
            if entry.success
                && entries
                    .iter()
                    .any(|e| e.reset_date == entry.reset_date && e.success)
            {
                return Err(StoreError::DuplicateSuccess);
            }
            entries.push(entry.clone());
            Ok(())
        }

        async fn rollover_day(
            &self,
            _day: NaiveDate,
            _now: DateTime<Utc>,
        ) -> Result<RolloverCounts, StoreError> {
            self.rollover_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_rollovers.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_rollovers.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("scripted outage".to_string()));
            }
            Ok(RolloverCounts {
                archived: 2,
                carried_forward: 1,
                processed: 3,
            })
        }

        async fn purge_history_before(
            &self,
            _cutoff: NaiveDate,
        ) -> Result<PurgeCounts, StoreError> {
            Ok(PurgeCounts::default())
        }

        async fn fetch_live_queue(&self) -> Result<Vec<Customer>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct RecordingLog {
        actions: Mutex<Vec<String>>,
    }

    impl RecordingLog {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                actions: Mutex::new(Vec::new()),
            })
        }

        fn actions(&self) -> Vec<String> {
            self.actions.lock().unwrap().clone()
        }

        fn count(&self, action: &str) -> usize {
            self.actions().iter().filter(|a| *a == action).count()
        }
    }

    impl ActivityLogger for RecordingLog {
        fn log(
            &self,
            _actor_id: i64,
            action: &str,
            _origin: &str,
            _details: Value,
        ) -> Result<(), crate::activity::ActivityError> {
            self.actions.lock().unwrap().push(action.to_string());
            Ok(())
        }
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            recovery_delay: Duration::ZERO,
            ..SchedulerConfig::default()
        }
    }

    fn scheduler(
        store: Arc<LedgerStore>,
        log: Arc<RecordingLog>,
        config: SchedulerConfig,
    ) -> Arc<ResetScheduler> {
        Arc::new(ResetScheduler::new(store, log, config))
    }

    /// Yield until `done` holds or the budget runs out. The recovery task is
    /// spawned on the same current-thread runtime, so yielding drives it.
    async fn settle(mut done: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition did not settle");
    }

    #[tokio::test]
    async fn manual_trigger_runs_rollover_and_records_success() {
        let store = LedgerStore::healthy();
        let log = RecordingLog::new();
        let sched = scheduler(store.clone(), log.clone(), fast_config());
        let mut events = sched.subscribe();

        let outcome = sched.trigger_manual_reset().await.unwrap();
        assert_eq!(outcome.archived, 2);
        assert_eq!(outcome.carried_forward, 1);
        assert_eq!(outcome.processed, 3);
        assert!(!outcome.no_op);

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);
        assert_eq!(entries[0].archived, 2);

        let actions = log.actions();
        assert!(actions.contains(&activity::ACTION_RESET_STARTED.to_string()));
        assert!(actions.contains(&activity::ACTION_RESET_COMPLETED.to_string()));

        let event = events.try_recv().unwrap();
        assert_eq!(event.trigger, "manual");
        assert_eq!(event.outcome.processed, 3);
    }

    #[tokio::test]
    async fn second_trigger_same_day_short_circuits_to_noop() {
        let store = LedgerStore::healthy();
        let log = RecordingLog::new();
        let sched = scheduler(store.clone(), log.clone(), fast_config());

        let first = sched.trigger_manual_reset().await.unwrap();
        assert!(!first.no_op);
        let second = sched.trigger_manual_reset().await.unwrap();
        assert!(second.no_op);
        assert_eq!(second.processed, 0);

        assert_eq!(store.calls(), 1, "rollover must not run twice");
        assert_eq!(store.entries().len(), 1, "no second ledger entry");
        assert_eq!(log.count(activity::ACTION_RESET_NOOP), 1);
    }

    #[tokio::test]
    async fn scheduled_failure_arms_exactly_one_recovery() {
        let store = LedgerStore::failing(u32::MAX); // every attempt fails
        let log = RecordingLog::new();
        let sched = scheduler(store.clone(), log.clone(), fast_config());

        let result = sched.run_scheduled_cycle().await;
        assert!(matches!(result, CycleResult::Failed(_)));

        // Recovery fires once (delay is zero) and fails too.
        settle(|| store.calls() == 2 && log.count(activity::ACTION_RECOVERY_FAILED) == 1).await;
        assert_eq!(store.calls(), 2, "exactly one recovery attempt");
        assert_eq!(log.count(activity::ACTION_RECOVERY_SCHEDULED), 1);
        assert_eq!(sched.status().phase, CyclePhase::Failed);
        assert!(!sched.status().recovery_pending, "recovery must not re-arm");

        // Both attempts left failure entries in the ledger.
        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.success));
    }

    #[tokio::test]
    async fn recovery_succeeds_after_transient_failure() {
        let store = LedgerStore::failing(1); // first attempt fails, rest succeed
        let log = RecordingLog::new();
        let sched = scheduler(store.clone(), log.clone(), fast_config());

        let result = sched.run_scheduled_cycle().await;
        assert!(matches!(result, CycleResult::Failed(_)));
        assert_eq!(sched.status().phase, CyclePhase::RecoveryPending);

        settle(|| log.count(activity::ACTION_RECOVERY_SUCCESS) == 1).await;
        assert_eq!(sched.status().phase, CyclePhase::Succeeded);
        assert_eq!(store.calls(), 2);

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].success);
        assert!(entries[1].success);
    }

    #[tokio::test]
    async fn manual_failure_reports_synchronously_without_recovery() {
        let store = LedgerStore::failing(u32::MAX);
        let log = RecordingLog::new();
        let sched = scheduler(store.clone(), log.clone(), fast_config());

        let err = sched.trigger_manual_reset().await.unwrap_err();
        assert!(matches!(err, TriggerError::Execution(_)));
        assert_eq!(sched.status().phase, CyclePhase::Failed);

        // Give any (buggy) recovery task a chance to run, then confirm none did.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.calls(), 1, "manual failure must not arm recovery");
        assert_eq!(log.count(activity::ACTION_RECOVERY_SCHEDULED), 0);

        // The operator may retry immediately.
        let retry = sched.trigger_manual_reset().await.unwrap_err();
        assert!(matches!(retry, TriggerError::Execution(_)));
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn manual_trigger_refused_while_recovery_pending() {
        let config = SchedulerConfig {
            recovery_delay: Duration::from_secs(3600),
            ..SchedulerConfig::default()
        };
        let store = LedgerStore::failing(u32::MAX);
        let log = RecordingLog::new();
        let sched = scheduler(store.clone(), log.clone(), config);

        sched.run_scheduled_cycle().await;
        assert_eq!(sched.status().phase, CyclePhase::RecoveryPending);

        let err = sched.trigger_manual_reset().await.unwrap_err();
        match err {
            TriggerError::Busy { phase } => assert_eq!(phase, CyclePhase::RecoveryPending),
            other => panic!("expected busy, got {other}"),
        }
        assert_eq!(log.count(activity::ACTION_RESET_SKIPPED), 1);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn start_then_stop_toggles_the_timer() {
        let store = LedgerStore::healthy();
        let log = RecordingLog::new();
        let sched = scheduler(store, log.clone(), fast_config());

        assert!(!sched.is_scheduled());
        sched.start();
        assert!(sched.is_scheduled());
        sched.start(); // second start is a no-op
        sched.stop();
        assert!(!sched.is_scheduled());
        assert_eq!(log.count(activity::ACTION_SCHEDULER_STARTED), 1);
        assert_eq!(log.count(activity::ACTION_SCHEDULER_STOPPED), 1);
    }

    #[tokio::test]
    async fn disabled_config_never_starts_the_timer() {
        let config = SchedulerConfig {
            enabled: false,
            ..SchedulerConfig::default()
        };
        let store = LedgerStore::healthy();
        let sched = scheduler(store, RecordingLog::new(), config);

        sched.start();
        assert!(!sched.is_scheduled());
    }

    #[tokio::test]
    async fn status_reports_phase_and_future_boundary() {
        let store = LedgerStore::healthy();
        let sched = scheduler(store, RecordingLog::new(), fast_config());

        let status = sched.status();
        assert_eq!(status.phase, CyclePhase::Idle);
        assert!(!status.is_running);
        assert!(status.next_reset_at > Utc::now());
        assert_eq!(status.timezone, "Asia/Manila");
        assert!(status.last_reset_at.is_none());

        sched.trigger_manual_reset().await.unwrap();
        let status = sched.status();
        assert_eq!(status.phase, CyclePhase::Succeeded);
        assert!(status.last_reset_at.is_some());
        assert_eq!(status.last_outcome.as_ref().map(|o| o.processed), Some(3));
    }
}
