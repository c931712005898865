//! Live session state.

use credential_store::{TokenPair, UserProfile};
use parking_lot::RwLock;
use serde::Serialize;

/// What subscribers see. Tokens are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub profile: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

#[derive(Default)]
struct LiveSession {
    profile: Option<UserProfile>,
    tokens: Option<TokenPair>,
    loading: bool,
}

/// In-memory copy of the current session.
///
/// Readers (the gateway, every request) take the read lock; writers are the
/// controller and the refresh path, and each write is a single critical
/// section.
#[derive(Default)]
pub struct SessionState {
    live: RwLock<LiveSession>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let live = self.live.read();
        SessionSnapshot {
            profile: live.profile.clone(),
            is_authenticated: live.tokens.is_some(),
            is_loading: live.loading,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.live.read().tokens.is_some()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.live.read().profile.clone()
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.live.read().tokens.clone()
    }

    /// Current access token, if signed in.
    pub fn bearer(&self) -> Option<String> {
        self.live
            .read()
            .tokens
            .as_ref()
            .map(|tokens| tokens.access_token.clone())
    }

    /// Install a full session.
    pub(crate) fn establish(&self, profile: UserProfile, tokens: TokenPair) {
        let mut live = self.live.write();
        live.profile = Some(profile);
        live.tokens = Some(tokens);
    }

    /// Swap the token pair of an existing session. Returns false (and changes
    /// nothing) when signed out.
    pub(crate) fn replace_tokens(&self, tokens: TokenPair) -> bool {
        let mut live = self.live.write();
        if live.tokens.is_none() {
            return false;
        }
        live.tokens = Some(tokens);
        true
    }

    /// Swap the profile of an existing session. Returns false when signed out.
    pub(crate) fn replace_profile(&self, profile: UserProfile) -> bool {
        let mut live = self.live.write();
        if live.tokens.is_none() {
            return false;
        }
        live.profile = Some(profile);
        true
    }

    /// Drop profile and tokens. Returns whether anything was cleared.
    pub(crate) fn clear(&self) -> bool {
        let mut live = self.live.write();
        let had_session = live.tokens.is_some() || live.profile.is_some();
        live.profile = None;
        live.tokens = None;
        had_session
    }

    /// Returns whether the flag changed.
    pub(crate) fn set_loading(&self, loading: bool) -> bool {
        let mut live = self.live.write();
        let changed = live.loading != loading;
        live.loading = loading;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> UserProfile {
        UserProfile {
            id: "1".to_string(),
            name: "Ana".to_string(),
            email: "a@b.com".to_string(),
            avatar: None,
        }
    }

    #[test]
    fn test_empty_state() {
        let state = SessionState::new();
        assert_eq!(state.snapshot(), SessionSnapshot::default());
        assert_eq!(state.bearer(), None);
    }

    #[test]
    fn test_establish_and_clear() {
        let state = SessionState::new();
        state.establish(ana(), TokenPair::new("t1", "r1"));

        let snapshot = state.snapshot();
        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.profile.unwrap().name, "Ana");
        assert_eq!(state.bearer().as_deref(), Some("t1"));

        assert!(state.clear());
        assert!(!state.clear());
        assert!(!state.is_authenticated());
        assert_eq!(state.profile(), None);
    }

    #[test]
    fn test_replace_requires_session() {
        let state = SessionState::new();
        assert!(!state.replace_tokens(TokenPair::new("t2", "r2")));
        assert!(!state.replace_profile(ana()));
        assert_eq!(state.tokens(), None);

        state.establish(ana(), TokenPair::new("t1", "r1"));
        assert!(state.replace_tokens(TokenPair::new("t2", "r2")));
        assert_eq!(state.bearer().as_deref(), Some("t2"));
        assert_eq!(state.profile(), Some(ana()));
    }

    #[test]
    fn test_loading_flag() {
        let state = SessionState::new();
        assert!(state.set_loading(true));
        assert!(!state.set_loading(true));
        assert!(state.snapshot().is_loading);
        assert!(state.set_loading(false));
    }

    #[test]
    fn test_snapshot_serializes_without_tokens() {
        let state = SessionState::new();
        state.establish(ana(), TokenPair::new("secret-t1", "secret-r1"));

        let json = serde_json::to_string(&state.snapshot()).unwrap();
        assert!(json.contains("\"is_authenticated\":true"));
        assert!(!json.contains("secret"));
    }
}
