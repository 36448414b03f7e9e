//! Per-kind fetch deduplication.
//!
//! Each resource kind has its own guard. A tick that finds its guard in
//! flight is dropped, not queued.

use serde::Serialize;
use tokio::time::Instant;

use crate::Generation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FetchKind {
    Metadata,
    Contents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    InFlight {
        generation: Generation,
        since: Instant,
    },
}

/// Returned by [`FetchGuard::try_acquire`] when a fetch is already outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy {
    pub generation: Generation,
}

#[derive(Debug)]
pub struct FetchGuard {
    kind: FetchKind,
    state: GuardState,
}

impl FetchGuard {
    pub fn new(kind: FetchKind) -> Self {
        Self {
            kind,
            state: GuardState::Idle,
        }
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, GuardState::Idle)
    }

    /// Idle -> InFlight. Fails without changing state if already in flight.
    pub fn try_acquire(&mut self, generation: Generation) -> Result<(), Busy> {
        match self.state {
            GuardState::Idle => {
                self.state = GuardState::InFlight {
                    generation,
                    since: Instant::now(),
                };
                Ok(())
            }
            GuardState::InFlight { generation, .. } => Err(Busy { generation }),
        }
    }

    /// InFlight -> Idle. Returns the generation the finished fetch was issued
    /// for, or `None` if nothing was in flight.
    pub fn release(&mut self) -> Option<Generation> {
        match std::mem::replace(&mut self.state, GuardState::Idle) {
            GuardState::Idle => {
                tracing::warn!(kind = %self.kind, "released an idle fetch guard");
                None
            }
            GuardState::InFlight { generation, .. } => Some(generation),
        }
    }
}
