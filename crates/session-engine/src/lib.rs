//! Session core for the gym client.
//!
//! This crate provides:
//! - [`SessionController`]: bootstrap, sign-in, sign-out and profile updates,
//!   with subscribers notified after every change
//! - [`RequestGateway`]: authorized requests with single-flight token refresh
//!   (one exchange per window, queued requests replayed in order)
//! - [`GymApi`]: typed calls to the domain endpoints
//! - An explicit rust-fsm machine for the refresh window

mod api_client;
mod controller;
mod coordinator;
mod error;
mod gateway;
mod gym_api;
mod refresh_fsm;
mod request;
mod state;

pub use api_client::{ApiClient, AuthenticatedSession, TOKEN_INVALID_MESSAGES};
pub use controller::{SessionController, SessionSubscriber, SubscriptionId};
pub use error::{SessionError, SessionResult};
pub use gateway::{RefreshAttempt, RefreshListener, RequestGateway};
pub use gym_api::{AccountUpdate, Exercise, GymApi, HistoryDay, HistoryEntry};
pub use refresh_fsm::refresh_machine;
pub use refresh_fsm::{
    RefreshConfig, RefreshMachine, RefreshMachineInput, RefreshMachineState, RefreshState,
};
pub use request::{ApiRequest, ApiResponse};
pub use state::{SessionSnapshot, SessionState};

pub use credential_store::{TokenPair, UserProfile};
