//! Reset cycle state machine.
//!
//! # Design
//!
//! Explicit state machine for the one reset cycle an engine instance may run
//! at a time. Every lifecycle event is applied via [`ResetCycle::apply`],
//! which enforces one invariant: **legal transitions only.** Illegal events
//! return [`TransitionError`] and leave the phase untouched, which is exactly
//! how the scheduler implements its re-entrancy guard: a second trigger
//! while a cycle is in flight fails the `Begin` transition and is skipped.
//!
//! # State diagram
//!
//! ```text
//!            Begin                    Succeed
//!   Idle ───────────► Running ─────────────────► Succeeded ──┐
//!    ▲                   │  ▲                                 │ Begin
//!    │ (process start)   │  │ BeginRecovery                   ▼
//!    │              Fail │  │                             (next day)
//!    │                   ▼  │
//!    └─────────────── Failed ──────► RecoveryPending
//!            Begin            ArmRecovery
//! ```
//!
//! `Succeeded` and `Failed` are resting phases: the next `Begin` (scheduled,
//! manual, or the next day's timer) starts a fresh cycle from either.
//! `RecoveryPending` accepts only `BeginRecovery`, so at most one recovery
//! attempt can ever be armed per failure.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// CyclePhase
// ---------------------------------------------------------------------------

/// All phases the reset cycle can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// No cycle has run since process start.
    Idle,
    /// A rollover is executing right now.
    Running,
    /// The last cycle completed (including idempotent no-ops).
    Succeeded,
    /// The last cycle failed and no recovery is armed.
    Failed,
    /// The last cycle failed and one delayed recovery attempt is armed.
    RecoveryPending,
}

impl CyclePhase {
    /// Phases in which a new trigger must be refused.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Running | Self::RecoveryPending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::RecoveryPending => "recovery_pending",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CycleEvent
// ---------------------------------------------------------------------------

/// Events that drive transitions in a [`ResetCycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    /// A scheduled or manual cycle wants to start.
    Begin,
    /// The running cycle finished with an outcome.
    Succeed,
    /// The running cycle failed.
    Fail,
    /// A delayed recovery attempt was armed after a failure.
    ArmRecovery,
    /// The armed recovery attempt is starting.
    BeginRecovery,
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event cannot legally be applied in the current phase.
///
/// For `Begin` this is the normal "cycle busy" signal and callers skip the
/// trigger. For every other event it indicates a scheduler bug and is logged
/// at error level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    /// The phase the cycle was in when the event was rejected.
    pub from: CyclePhase,
    /// Debug string of the rejected event.
    pub event: String,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal reset cycle transition: {} + {}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// ResetCycle
// ---------------------------------------------------------------------------

/// The reset cycle tracked through an explicit state machine.
#[derive(Debug, Clone)]
pub struct ResetCycle {
    phase: CyclePhase,
}

impl ResetCycle {
    /// A fresh cycle in the `Idle` phase.
    pub fn new() -> Self {
        Self {
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Apply an event to the cycle.
    ///
    /// # Errors
    /// Returns [`TransitionError`] for illegal transitions; the phase is
    /// unchanged when that happens.
    pub fn apply(&mut self, event: CycleEvent) -> Result<(), TransitionError> {
        use CycleEvent::*;
        use CyclePhase::*;

        match (self.phase, event) {
            // A new cycle may start from any resting phase.
            (Idle | Succeeded | Failed, Begin) => self.phase = Running,

            (Running, Succeed) => self.phase = Succeeded,
            (Running, Fail) => self.phase = Failed,

            // One recovery attempt per failure; it runs as a normal cycle.
            (Failed, ArmRecovery) => self.phase = RecoveryPending,
            (RecoveryPending, BeginRecovery) => self.phase = Running,

            (phase, ev) => {
                return Err(TransitionError {
                    from: phase,
                    event: format!("{ev:?}"),
                });
            }
        }

        Ok(())
    }
}

impl Default for ResetCycle {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
