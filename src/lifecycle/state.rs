//! Grain lifecycle state machine.
//!
//! ```text
//! Uninitialized → Initialized → Listening → ShuttingDown → Stopped
//!       ↓
//!     Failed
//! ```
//!
//! Transitions only move forward. `Failed` is terminal: init already consumed
//! the hooks it ran, so it cannot be retried.

use std::fmt;

use crate::error::HttpError;

/// Lifecycle state of an [`HttpGrain`](crate::HttpGrain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Listening,
    ShuttingDown,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// Fail with [`HttpError::InvalidState`] unless the state is `expected`.
    pub(crate) fn expect(
        self,
        expected: LifecycleState,
        operation: &'static str,
    ) -> Result<(), HttpError> {
        if self == expected {
            Ok(())
        } else {
            Err(HttpError::InvalidState {
                operation,
                state: self,
            })
        }
    }

    /// Move to `next`. Backward moves are a programming error and are ignored.
    pub(crate) fn advance(&mut self, next: LifecycleState) {
        debug_assert!(next > *self, "lifecycle cannot move from {self} to {next}");
        if next > *self {
            tracing::debug!(from = %self, to = %next, "lifecycle transition");
            *self = next;
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Listening => "listening",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}
