//! Storage key constants.

/// Keys used by the credential store
pub struct StorageKeys;

impl StorageKeys {
    /// Signed-in user's profile (JSON)
    pub const USER_PROFILE: &'static str = "gymapp.user";

    /// Access/refresh token pair (JSON)
    pub const AUTH_TOKEN: &'static str = "gymapp.token";

    /// All keys owned by the credential store
    pub const ALL: [&'static str; 2] = [Self::USER_PROFILE, Self::AUTH_TOKEN];
}
