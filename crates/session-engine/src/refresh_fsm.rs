//! Refresh window state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │      Idle       │ (initial)
//! └────────┬────────┘
//!          │ AuthFailure (first token-invalid response)
//!          ▼
//! ┌─────────────────┐
//! │   Refreshing    │ ◄── RefreshRetry (transient exchange failure)
//! └────────┬────────┘
//!          │ RefreshSucceeded / RefreshFailed
//!          ▼
//!        Idle
//! ```
//!
//! Requests that hit a token-invalid response while `Refreshing` do not feed
//! the machine; they join the pending queue.

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub refresh_machine(Idle)

    Idle => {
        AuthFailure => Refreshing
    },
    Refreshing => {
        RefreshRetry => Refreshing,
        RefreshSucceeded => Idle,
        RefreshFailed => Idle
    }
}

pub use refresh_machine::Input as RefreshMachineInput;
pub use refresh_machine::State as RefreshMachineState;
pub use refresh_machine::StateMachine as RefreshMachine;

/// Public view of the refresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    /// No exchange in flight.
    Idle,
    /// One exchange in flight; token-invalid failures queue behind it.
    Refreshing,
}

impl From<&RefreshMachineState> for RefreshState {
    fn from(state: &RefreshMachineState) -> Self {
        match state {
            RefreshMachineState::Idle => RefreshState::Idle,
            RefreshMachineState::Refreshing => RefreshState::Refreshing,
        }
    }
}

/// Retry behavior for the refresh exchange.
///
/// The default is one exchange per window: a lost response may already have
/// rotated the refresh token, so resending it can fail for good. Raising
/// `max_retries` retries transient failures (network, 5xx) with backoff; a
/// rejected refresh token always fails immediately.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of exchange attempts per window.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// A single attempt with no retries. Same as the default.
    pub fn single_attempt() -> Self {
        Self::default()
    }

    /// Up to `max_retries` attempts, retrying transient failures.
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
