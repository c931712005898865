//! Session lifecycle: bootstrap, sign-in, sign-out, profile updates.
//!
//! The controller owns the live [`SessionState`] and the durable
//! [`CredentialStore`], and keeps them in step. It is also the gateway's
//! [`RefreshListener`], so refreshed tokens land in both copies and a failed
//! refresh signs the user out.
//!
//! Every write to either copy happens under `write_lock`. Storage is
//! synchronous: `bootstrap`, `sign_in` and the refresh listener run it on the
//! blocking pool, while `sign_out` and `update_profile` write on the calling
//! thread.

use crate::api_client::ApiClient;
use crate::gateway::{RefreshAttempt, RefreshListener, RequestGateway};
use crate::refresh_fsm::RefreshConfig;
use crate::state::{SessionSnapshot, SessionState};
use crate::{SessionError, SessionResult};
use credential_store::{CredentialStore, TokenPair, UserProfile};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Callback invoked synchronously after every session change.
pub type SessionSubscriber = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

/// Handle returned by [`SessionController::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct ControllerInner {
    store: Arc<CredentialStore>,
    session: Arc<SessionState>,
    gateway: RequestGateway,
    subscribers: Mutex<Vec<(SubscriptionId, SessionSubscriber)>>,
    next_subscription: AtomicU64,
    /// Serializes writers so sign-out, profile updates and refreshed tokens
    /// never interleave between the live and durable copies.
    write_lock: Mutex<()>,
}

/// Owner of the process's one session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    pub fn new(store: CredentialStore, client: ApiClient) -> Self {
        Self::with_refresh_config(store, client, RefreshConfig::default())
    }

    pub fn with_refresh_config(
        store: CredentialStore,
        client: ApiClient,
        refresh_config: RefreshConfig,
    ) -> Self {
        let session = Arc::new(SessionState::new());
        let gateway = RequestGateway::with_refresh_config(client, session.clone(), refresh_config);

        let inner = Arc::new(ControllerInner {
            store: Arc::new(store),
            session,
            gateway,
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        });

        let weak = Arc::downgrade(&inner);
        let listener: Weak<dyn RefreshListener> = weak;
        inner.gateway.set_refresh_listener(listener);

        Self { inner }
    }

    /// Gateway for authorized calls made on behalf of this session.
    pub fn gateway(&self) -> &RequestGateway {
        &self.inner.gateway
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.session.profile()
    }

    // ==========================================
    // Subscriptions
    // ==========================================

    /// Register `callback`; it runs after every change, outside any lock.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    // ==========================================
    // Lifecycle
    // ==========================================

    /// Restore a saved session, if a complete one exists.
    ///
    /// Never fails: unreadable, corrupt or partial storage all leave the
    /// session signed out.
    pub async fn bootstrap(&self) {
        self.inner.set_loading(true);

        let store = self.inner.store.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load()).await;

        match loaded {
            Ok(Ok(credentials)) => match (credentials.profile, credentials.tokens) {
                (Some(profile), Some(tokens)) => {
                    let user_id = profile.id.clone();
                    {
                        let _guard = self.inner.write_lock.lock();
                        self.inner.session.establish(profile, tokens);
                    }
                    info!(user_id = %user_id, "Restored saved session");
                }
                (None, None) => debug!("No saved session"),
                (profile, tokens) => warn!(
                    has_profile = profile.is_some(),
                    has_tokens = tokens.is_some(),
                    "Saved session is incomplete, starting signed out"
                ),
            },
            Ok(Err(e)) => warn!(error = %e, "Credential store unreadable, starting signed out"),
            Err(e) => warn!(error = %e, "Credential load task failed, starting signed out"),
        }

        self.inner.set_loading(false);
    }

    /// Authenticate and persist the new session. Returns the user's display
    /// name.
    ///
    /// On any failure the live session is untouched. If persisting fails, the
    /// store is put back to what it held before: the current session's
    /// credentials, or nothing.
    pub async fn sign_in(&self, email: &str, password: &str) -> SessionResult<String> {
        let authenticated = self.inner.gateway.authenticate(email, password).await?;
        let name = authenticated.profile.name.clone();
        let user_id = authenticated.profile.id.clone();

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            inner.install_session(authenticated.profile, authenticated.tokens)
        })
        .await
        .map_err(|e| SessionError::StorageUnavailable(format!("credential save task failed: {}", e)))?
        .inspect_err(|e| warn!(error = %e, "Failed to persist new session"))?;

        self.inner.notify();

        info!(user_id = %user_id, "Signed in");
        Ok(name)
    }

    /// End the session. Safe to call any number of times, from any thread.
    pub fn sign_out(&self) {
        self.inner.end_session("signed out");
    }

    /// Replace the stored and live profile. Persists first, then publishes.
    pub fn update_profile(&self, profile: UserProfile) -> SessionResult<()> {
        {
            let _guard = self.inner.write_lock.lock();
            if !self.inner.session.is_authenticated() {
                return Err(SessionError::NotAuthenticated);
            }
            self.inner.store.save_profile(&profile)?;
            self.inner.session.replace_profile(profile);
        }
        self.inner.notify();
        debug!("Profile updated");
        Ok(())
    }
}

impl ControllerInner {
    fn set_loading(&self, loading: bool) {
        if self.session.set_loading(loading) {
            self.notify();
        }
    }

    /// Persist and publish a new session in one step, so a refresh result
    /// from the previous session cannot land in between.
    fn install_session(&self, profile: UserProfile, tokens: TokenPair) -> SessionResult<()> {
        let _guard = self.write_lock.lock();
        if let Err(e) = self.store.save(&profile, &tokens) {
            self.restore_store();
            return Err(e.into());
        }
        self.session.establish(profile, tokens);
        Ok(())
    }

    /// Put the store back in line with the live session after a failed save.
    /// Caller holds `write_lock`.
    fn restore_store(&self) {
        let restored = match (self.session.profile(), self.session.tokens()) {
            (Some(profile), Some(tokens)) => self.store.save(&profile, &tokens),
            _ => self.store.clear(),
        };
        if let Err(e) = restored {
            warn!(error = %e, "Failed to roll back partial credential write");
        }
    }

    /// Clear both copies and wake anything parked behind a refresh.
    fn end_session(&self, reason: &str) {
        let (changed, aborted) = {
            let _guard = self.write_lock.lock();
            self.end_session_locked(reason)
        };

        if changed {
            info!(reason, aborted, "Signed out");
            self.notify();
        }
    }

    /// Caller holds `write_lock`. Returns whether the live session changed
    /// and how many parked requests were rejected.
    fn end_session_locked(&self, reason: &str) -> (bool, usize) {
        let changed = self.session.clear();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        // Closed under the lock so no late result reaches the next session
        let aborted = self.gateway.abort_pending(reason);
        (changed, aborted)
    }

    fn notify(&self) {
        let snapshot = self.session.snapshot();
        let subscribers: Vec<SessionSubscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in subscribers {
            callback(&snapshot);
        }
    }
}

impl RefreshListener for ControllerInner {
    fn tokens_refreshed(&self, attempt: &RefreshAttempt, tokens: &TokenPair) -> bool {
        let _guard = self.write_lock.lock();
        if !self.gateway.is_attempt_current(attempt) {
            return false;
        }
        if let Err(e) = self.store.save_tokens(tokens) {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }
        self.session.replace_tokens(tokens.clone())
    }

    fn refresh_failed(&self, attempt: &RefreshAttempt, reason: &str) -> bool {
        let (changed, aborted) = {
            let _guard = self.write_lock.lock();
            if !self.gateway.is_attempt_current(attempt) {
                return false;
            }
            self.end_session_locked(reason)
        };

        if changed {
            info!(reason, aborted, "Signed out");
            self.notify();
        }
        true
    }
}
