use crate::core::{EngineError, Result};
use std::fmt;
use tracing::{Level, event};

/// Progress of one update call.
///
/// ```text
/// Idle ──> Reading ──> Merging ──> Committing ──> Done
///   │         │                        ├────────> Conflict
///   └─────────┴────────────────────────┴────────> Failed
/// ```
/// `Idle -> Failed` covers precondition and lock-acquisition failures,
/// which happen before any read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Reading,
    Merging,
    Committing,
    Done,
    Conflict,
    Failed,
}

impl UpdatePhase {
    pub fn can_advance_to(self, next: UpdatePhase) -> bool {
        use UpdatePhase::*;
        matches!(
            (self, next),
            (Idle, Reading)
                | (Idle, Failed)
                | (Reading, Merging)
                | (Reading, Failed)
                | (Merging, Committing)
                | (Committing, Done)
                | (Committing, Conflict)
                | (Committing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Conflict | Self::Failed)
    }

    /// Terminal phase reached by a finished call.
    pub fn terminal_for<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Done,
            Err(EngineError::Conflict(_)) => Self::Conflict,
            Err(_) => Self::Failed,
        }
    }
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Reading => "reading",
            Self::Merging => "merging",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Walks one call through [`UpdatePhase`] and logs the outcome.
pub(crate) struct PhaseTracker {
    strategy: &'static str,
    phase: UpdatePhase,
}

impl PhaseTracker {
    pub(crate) fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            phase: UpdatePhase::Idle,
        }
    }

    pub(crate) fn advance(&mut self, next: UpdatePhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal update transition {} -> {}",
            self.phase,
            next
        );
        event!(Level::TRACE, strategy = self.strategy, from = %self.phase, to = %next, "update phase");
        self.phase = next;
    }

    pub(crate) fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        let terminal = UpdatePhase::terminal_for(&result);
        let failed_in = self.phase;
        self.advance(terminal);

        match &result {
            Ok(_) => event!(Level::DEBUG, strategy = self.strategy, "person updated"),
            Err(err @ (EngineError::Validation(_) | EngineError::NotFound(_))) => {
                event!(Level::DEBUG, strategy = self.strategy, error = %err, "update rejected")
            }
            Err(err @ EngineError::Conflict(_)) => {
                event!(Level::INFO, strategy = self.strategy, error = %err, "update lost a race")
            }
            Err(err) => event!(
                Level::ERROR,
                strategy = self.strategy,
                phase = %failed_in,
                error = %err,
                "update failed"
            ),
        }
        result
    }
}
