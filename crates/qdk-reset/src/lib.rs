//! qdk-reset: the daily queue reset engine.
//!
//! Everything that decides *when* and *whether* a rollover runs lives here;
//! *how* rows move is behind the [`store::ResetStore`] trait. Module map:
//!
//! - [`clock`]: queue-day and midnight-boundary math for the shop timezone
//! - [`state`]: explicit state machine for the one cycle per instance
//! - [`executor`]: one rollover attempt, bounded by a deadline
//! - [`scheduler`]: timer, idempotency short-circuit, recovery, manual trigger
//! - [`cleanup`]: retention purge on its own ticker
//! - [`store`] / [`activity`]: the persistence and audit seams

pub mod activity;
pub mod cleanup;
pub mod clock;
pub mod executor;
pub mod scheduler;
pub mod state;
pub mod store;

pub use activity::{ActivityError, ActivityLogger, SYSTEM_ACTOR_ID, SYSTEM_ORIGIN};
pub use cleanup::{CleanupConfig, RetentionCleanup};
pub use executor::{DailyResetExecutor, ResetError};
pub use scheduler::{
    CycleResult, ResetScheduler, ResetTrigger, SchedulerConfig, SchedulerStatus, TriggerError,
};
pub use state::{CycleEvent, CyclePhase, ResetCycle, TransitionError};
pub use store::{ResetStore, StoreError};
