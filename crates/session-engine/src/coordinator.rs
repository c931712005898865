//! Single-flight refresh coordination.
//!
//! One mutex guards the refresh machine, the window counter, and the queue of
//! requests waiting on the current exchange. The exchange itself runs outside
//! the lock (see `gateway`); only admission and result application happen
//! inside it.

use crate::refresh_fsm::{RefreshMachine, RefreshMachineInput, RefreshState};
use crate::request::{ApiRequest, ApiResponse};
use crate::state::SessionState;
use crate::{SessionError, SessionResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::debug;

pub(crate) type ReplyReceiver = oneshot::Receiver<SessionResult<ApiResponse>>;

/// A request parked until the current refresh window closes.
pub(crate) struct PendingRequest {
    pub(crate) request: ApiRequest,
    reply: oneshot::Sender<SessionResult<ApiResponse>>,
}

impl PendingRequest {
    fn new(request: ApiRequest) -> (Self, ReplyReceiver) {
        let (reply, receiver) = oneshot::channel();
        (Self { request, reply }, receiver)
    }

    pub(crate) fn resolve(self, result: SessionResult<ApiResponse>) {
        if self.reply.send(result).is_err() {
            debug!(path = self.request.path(), "Caller went away before its request resolved");
        }
    }

    fn reject(self, reason: &str) {
        self.resolve(Err(SessionError::TokenRefreshFailed(reason.to_string())));
    }
}

/// What a request that hit a token-invalid response should do next.
pub(crate) enum Admission {
    /// The request went out with an outdated bearer; resend with `token`.
    Replay { request: ApiRequest, token: String },
    /// Nothing to refresh.
    NoSession,
    /// Joined the window already in flight.
    Queued(ReplyReceiver),
    /// Opened a new window. The caller must run the exchange for `window`.
    Leader {
        window: u64,
        refresh_token: String,
        receiver: ReplyReceiver,
    },
}

struct CoordinatorInner {
    machine: RefreshMachine,
    /// Identifies the current (or last) refresh window
    window: u64,
    pending: VecDeque<PendingRequest>,
}

impl CoordinatorInner {
    fn state(&self) -> RefreshState {
        RefreshState::from(self.machine.state())
    }

    fn is_current(&self, window: u64) -> bool {
        self.window == window && self.state() == RefreshState::Refreshing
    }

    fn transition(&mut self, input: &RefreshMachineInput) -> SessionResult<RefreshState> {
        let old_state = self.state();

        self.machine.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_state
            ))
        })?;

        let new_state = self.state();
        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                window = self.window,
                "Refresh state transition"
            );
        }
        Ok(new_state)
    }
}

pub(crate) struct RefreshCoordinator {
    inner: Mutex<CoordinatorInner>,
}

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(CoordinatorInner {
                machine: RefreshMachine::new(),
                window: 0,
                pending: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn state(&self) -> RefreshState {
        self.inner.lock().state()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Decide what to do with a request whose bearer was rejected.
    ///
    /// `used_bearer` is the token the request was sent with; `session` is read
    /// under the coordinator lock so the stale check and the window opening
    /// are one step.
    pub(crate) fn admit(
        &self,
        request: ApiRequest,
        used_bearer: Option<&str>,
        session: &SessionState,
    ) -> SessionResult<Admission> {
        let mut inner = self.inner.lock();

        if inner.state() == RefreshState::Refreshing {
            let (pending, receiver) = PendingRequest::new(request);
            inner.pending.push_back(pending);
            debug!(queued = inner.pending.len(), window = inner.window, "Joined token refresh");
            return Ok(Admission::Queued(receiver));
        }

        let Some(tokens) = session.tokens() else {
            return Ok(Admission::NoSession);
        };

        if used_bearer != Some(tokens.access_token.as_str()) {
            return Ok(Admission::Replay {
                request,
                token: tokens.access_token,
            });
        }

        inner.transition(&RefreshMachineInput::AuthFailure)?;
        inner.window += 1;

        let (pending, receiver) = PendingRequest::new(request);
        inner.pending.push_back(pending);

        Ok(Admission::Leader {
            window: inner.window,
            refresh_token: tokens.refresh_token,
            receiver,
        })
    }

    /// Whether `window` is still open. Refresh results for a closed window
    /// must not touch the session.
    pub(crate) fn is_current(&self, window: u64) -> bool {
        self.inner.lock().is_current(window)
    }

    /// Note a transient exchange failure that will be retried.
    pub(crate) fn record_retry(&self, window: u64) {
        let mut inner = self.inner.lock();
        if inner.is_current(window) {
            let _ = inner.transition(&RefreshMachineInput::RefreshRetry);
        }
    }

    /// Close `window` successfully and hand back its queue in FIFO order.
    /// Returns `None` if the window was already closed by an abort.
    pub(crate) fn complete(&self, window: u64) -> Option<Vec<PendingRequest>> {
        let mut inner = self.inner.lock();
        if !inner.is_current(window) {
            return None;
        }
        inner.transition(&RefreshMachineInput::RefreshSucceeded).ok()?;
        Some(inner.pending.drain(..).collect())
    }

    /// Close `window` as failed, rejecting its queue. No-op for a window that
    /// is no longer current.
    pub(crate) fn fail(&self, window: u64, reason: &str) -> usize {
        let drained = {
            let mut inner = self.inner.lock();
            if !inner.is_current(window) {
                return 0;
            }
            Self::close_failed(&mut inner)
        };
        Self::reject_all(drained, reason)
    }

    /// Close whatever window is open, rejecting its queue. A late result for
    /// that window is discarded.
    pub(crate) fn abort(&self, reason: &str) -> usize {
        let drained = {
            let mut inner = self.inner.lock();
            if inner.state() != RefreshState::Refreshing {
                return 0;
            }
            let drained = Self::close_failed(&mut inner);
            inner.window += 1;
            drained
        };
        Self::reject_all(drained, reason)
    }

    fn close_failed(inner: &mut CoordinatorInner) -> Vec<PendingRequest> {
        let _ = inner.transition(&RefreshMachineInput::RefreshFailed);
        inner.pending.drain(..).collect()
    }

    fn reject_all(pending: Vec<PendingRequest>, reason: &str) -> usize {
        let count = pending.len();
        for request in pending {
            request.reject(reason);
        }
        count
    }
}
