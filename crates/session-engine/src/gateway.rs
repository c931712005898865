//! The only path to the network for authorized calls.
//!
//! Every request gets the live bearer token attached. A token-invalid
//! response does not reach the caller: the request is handed to the
//! [`RefreshCoordinator`](crate::coordinator), which either parks it behind
//! the exchange already in flight or opens a new refresh window. The exchange
//! and the replays run on a spawned task, so a caller dropping its future
//! never strands the others.

use crate::api_client::{ApiClient, AuthenticatedSession, Dispatch};
use crate::coordinator::{Admission, PendingRequest, RefreshCoordinator, ReplyReceiver};
use crate::refresh_fsm::{RefreshConfig, RefreshState};
use crate::request::{ApiRequest, ApiResponse};
use crate::state::SessionState;
use crate::{SessionError, SessionResult};
use credential_store::TokenPair;
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// One refresh exchange: the window it runs in and the refresh token it spends.
#[derive(Clone)]
pub struct RefreshAttempt {
    pub window: u64,
    pub refresh_token: String,
}

/// Receives the outcome of a refresh exchange.
///
/// The session controller implements this so that refreshed tokens are
/// persisted and a failed refresh signs the user out. Both calls run on the
/// blocking pool and may do storage I/O. An implementation must ignore an
/// attempt that [`RequestGateway::is_attempt_current`] rejects, checked under
/// the same lock that guards its own session writes.
pub trait RefreshListener: Send + Sync {
    /// Apply a new token pair. Returns false if the pair was dropped because
    /// the session ended or changed while the exchange was in flight.
    fn tokens_refreshed(&self, attempt: &RefreshAttempt, tokens: &TokenPair) -> bool;

    /// The exchange failed for good. Returns false if the attempt was stale
    /// and the session was left alone.
    fn refresh_failed(&self, attempt: &RefreshAttempt, reason: &str) -> bool;
}

struct GatewayShared {
    client: ApiClient,
    session: Arc<SessionState>,
    coordinator: RefreshCoordinator,
    refresh_config: RefreshConfig,
    listener: RwLock<Option<Weak<dyn RefreshListener>>>,
}

/// Cheaply cloneable handle; clones share one coordinator.
#[derive(Clone)]
pub struct RequestGateway {
    shared: Arc<GatewayShared>,
}

impl RequestGateway {
    pub fn new(client: ApiClient, session: Arc<SessionState>) -> Self {
        Self::with_refresh_config(client, session, RefreshConfig::default())
    }

    pub fn with_refresh_config(
        client: ApiClient,
        session: Arc<SessionState>,
        refresh_config: RefreshConfig,
    ) -> Self {
        Self {
            shared: Arc::new(GatewayShared {
                client,
                session,
                coordinator: RefreshCoordinator::new(),
                refresh_config,
                listener: RwLock::new(None),
            }),
        }
    }

    /// Wire refresh outcomes to `listener` for the lifetime of the gateway.
    pub fn set_refresh_listener(&self, listener: Weak<dyn RefreshListener>) {
        *self.shared.listener.write() = Some(listener);
    }

    pub fn client(&self) -> &ApiClient {
        &self.shared.client
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.shared.session
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.shared.coordinator.state()
    }

    /// Requests currently parked behind a refresh.
    pub fn pending_requests(&self) -> usize {
        self.shared.coordinator.pending_len()
    }

    // ==========================================
    // Authorized path
    // ==========================================

    /// Send `request` with the current bearer token, refreshing once if the
    /// server says the token is no longer valid.
    pub async fn send(&self, request: ApiRequest) -> SessionResult<ApiResponse> {
        let bearer = self.shared.session.bearer();
        match self.shared.client.dispatch(&request, bearer.as_deref()).await? {
            Dispatch::Completed(response) => Ok(response),
            Dispatch::TokenRejected => self.recover(request, bearer).await,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    // ==========================================
    // Unauthenticated path
    // ==========================================

    /// Send `request` without a bearer token and without refresh handling.
    pub async fn send_unauthenticated(&self, request: ApiRequest) -> SessionResult<ApiResponse> {
        self.shared.client.send_unauthenticated(&request).await
    }

    /// `POST /sessions`.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> SessionResult<AuthenticatedSession> {
        self.shared.client.create_session(email, password).await
    }

    /// Reject everything parked behind the current refresh and discard its
    /// result when it arrives. Returns how many requests were rejected.
    pub fn abort_pending(&self, reason: &str) -> usize {
        self.shared.coordinator.abort(reason)
    }

    /// Whether `attempt` may still change the session: its window has not
    /// been closed and the live session still holds the refresh token it spent.
    pub fn is_attempt_current(&self, attempt: &RefreshAttempt) -> bool {
        self.shared.coordinator.is_current(attempt.window)
            && self
                .shared
                .session
                .tokens()
                .is_some_and(|tokens| tokens.refresh_token == attempt.refresh_token)
    }

    // ==========================================
    // Refresh handling
    // ==========================================

    async fn recover(
        &self,
        request: ApiRequest,
        used_bearer: Option<String>,
    ) -> SessionResult<ApiResponse> {
        let admission = self.shared.coordinator.admit(
            request,
            used_bearer.as_deref(),
            &self.shared.session,
        )?;

        match admission {
            Admission::NoSession => Err(SessionError::NotAuthenticated),
            Admission::Replay { request, token } => {
                debug!(path = request.path(), "Bearer was outdated, replaying with current token");
                self.replay(&request, &token).await
            }
            Admission::Queued(receiver) => Self::await_outcome(receiver).await,
            Admission::Leader {
                window,
                refresh_token,
                receiver,
            } => {
                info!(window, "Access token rejected, refreshing session");
                let gateway = self.clone();
                let attempt = RefreshAttempt {
                    window,
                    refresh_token,
                };
                tokio::spawn(async move {
                    gateway.run_refresh(attempt).await;
                });
                Self::await_outcome(receiver).await
            }
        }
    }

    async fn await_outcome(receiver: ReplyReceiver) -> SessionResult<ApiResponse> {
        receiver.await.unwrap_or_else(|_| {
            Err(SessionError::TokenRefreshFailed(
                "refresh task ended without an outcome".to_string(),
            ))
        })
    }

    /// Resend once with `token`. A second token rejection is returned as a
    /// plain 401 rather than starting another refresh.
    async fn replay(&self, request: &ApiRequest, token: &str) -> SessionResult<ApiResponse> {
        match self.shared.client.dispatch(request, Some(token)).await? {
            Dispatch::Completed(response) => Ok(response),
            Dispatch::TokenRejected => Err(SessionError::Server {
                status: 401,
                message: "token rejected after refresh".to_string(),
            }),
        }
    }

    async fn run_refresh(&self, attempt: RefreshAttempt) {
        let window = attempt.window;
        match self.exchange(window, &attempt.refresh_token).await {
            Ok(tokens) => {
                if !self.apply_tokens(&attempt, &tokens).await {
                    let rejected = self
                        .shared
                        .coordinator
                        .fail(window, "session changed during token refresh");
                    debug!(window, rejected, "Refreshed tokens discarded, session changed");
                    return;
                }

                let Some(pending) = self.shared.coordinator.complete(window) else {
                    debug!(window, "Refresh window was aborted, result discarded");
                    return;
                };

                info!(window, replays = pending.len(), "Token refreshed, replaying requests");
                self.replay_all(pending, &tokens.access_token).await;
            }
            Err(e) => {
                let reason = e.to_string();
                if self.notify_refresh_failed(&attempt, &reason).await {
                    warn!(window, error = %reason, "Token refresh failed, session ended");
                } else {
                    debug!(window, error = %reason, "Stale refresh failed, session left alone");
                }
                self.shared.coordinator.fail(window, &reason);
            }
        }
    }

    /// Exchange the refresh token. Transient failures are retried with backoff
    /// only when `RefreshConfig::max_retries` allows more than one attempt.
    async fn exchange(&self, window: u64, refresh_token: &str) -> SessionResult<TokenPair> {
        let config = &self.shared.refresh_config;
        let mut last_error = None;

        for attempt in 0..config.max_retries {
            match self.shared.client.refresh_tokens(refresh_token).await {
                Ok(tokens) => return Ok(tokens),
                Err(e) if e.is_transient() => {
                    last_error = Some(e);

                    if attempt + 1 < config.max_retries {
                        self.shared.coordinator.record_retry(window);

                        let delay = config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SessionError::Config("refresh attempts must be at least 1".to_string())
        }))
    }

    async fn replay_all(&self, pending: Vec<PendingRequest>, token: &str) {
        let replays = pending.into_iter().map(|pending| {
            let gateway = self.clone();
            let token = token.to_string();
            async move {
                let result = gateway.replay(&pending.request, &token).await;
                pending.resolve(result);
            }
        });
        join_all(replays).await;
    }

    fn listener(&self) -> Option<Arc<dyn RefreshListener>> {
        self.shared
            .listener
            .read()
            .as_ref()
            .and_then(|listener| listener.upgrade())
    }

    async fn apply_tokens(&self, attempt: &RefreshAttempt, tokens: &TokenPair) -> bool {
        let Some(listener) = self.listener() else {
            return self.is_attempt_current(attempt)
                && self.shared.session.replace_tokens(tokens.clone());
        };

        let (attempt, tokens) = (attempt.clone(), tokens.clone());
        tokio::task::spawn_blocking(move || listener.tokens_refreshed(&attempt, &tokens))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Refresh listener task failed");
                false
            })
    }

    async fn notify_refresh_failed(&self, attempt: &RefreshAttempt, reason: &str) -> bool {
        let Some(listener) = self.listener() else {
            return self.is_attempt_current(attempt) && self.shared.session.clear();
        };

        let (attempt, reason) = (attempt.clone(), reason.to_string());
        tokio::task::spawn_blocking(move || listener.refresh_failed(&attempt, &reason))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Refresh listener task failed");
                false
            })
    }
}
