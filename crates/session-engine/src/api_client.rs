//! HTTP client for the gym API.
//!
//! Knows how to build URLs, attach a bearer token, and classify responses.
//! It never refreshes anything itself; that is the gateway's job.

use crate::request::{body_excerpt, ApiRequest, ApiResponse};
use crate::{SessionError, SessionResult};
use credential_store::{TokenPair, UserProfile};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Server messages that mark a 401 as "bearer token no longer valid".
pub const TOKEN_INVALID_MESSAGES: [&str; 2] = ["token.expired", "token.invalid"];

/// `{"status":"error","message":"..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// `POST /sessions/refresh-token` response.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
    refresh_token: String,
}

/// `POST /sessions` response.
#[derive(Debug, Deserialize)]
struct SignInResponse {
    user: UserProfile,
    token: String,
    refresh_token: String,
}

/// A freshly created session.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub profile: UserProfile,
    pub tokens: TokenPair,
}

/// Result of sending one request.
#[derive(Debug)]
pub(crate) enum Dispatch {
    /// 2xx response.
    Completed(ApiResponse),
    /// 401 saying the bearer token is expired or invalid.
    TokenRejected,
}

/// Thin wrapper around `reqwest::Client` bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client with reqwest's default settings.
    pub fn new(base_url: &str) -> SessionResult<Self> {
        Ok(Self {
            http_client: Client::new(),
            base_url: Self::parse_base_url(base_url)?,
        })
    }

    /// Create a client with a per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> SessionResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: Self::parse_base_url(base_url)?,
        })
    }

    fn parse_base_url(base_url: &str) -> SessionResult<Url> {
        let url = Url::parse(base_url)?;
        if url.cannot_be_a_base() {
            return Err(SessionError::Config(format!(
                "API base URL cannot be a base: {}",
                base_url
            )));
        }
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join an API path onto the base URL, keeping any path prefix the base
    /// already has (`https://host/api` + `/groups` = `https://host/api/groups`).
    pub fn endpoint_url(&self, path: &str) -> SessionResult<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    /// Send a request once, optionally with a bearer token.
    ///
    /// Non-2xx responses other than a token rejection become
    /// [`SessionError::Server`].
    pub(crate) async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> SessionResult<Dispatch> {
        let url = self.endpoint_url(request.path())?;

        let mut builder = self.http_client.request(request.method().clone(), url);
        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method(),
            path = request.path(),
            authorized = bearer.is_some(),
            "Dispatching API request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if status.is_success() {
            return Ok(Dispatch::Completed(ApiResponse::new(status, body)));
        }

        let message = error_message(&body);
        if is_token_invalid(status, message.as_deref()) {
            debug!(path = request.path(), "Bearer token rejected");
            return Ok(Dispatch::TokenRejected);
        }

        warn!(
            status = %status,
            method = %request.method(),
            path = request.path(),
            "API request failed"
        );
        Err(SessionError::Server {
            status: status.as_u16(),
            message: message.unwrap_or_else(|| body_excerpt(&body)),
        })
    }

    /// Send a request without a bearer token.
    ///
    /// A token rejection here means the endpoint needs a session.
    pub async fn send_unauthenticated(&self, request: &ApiRequest) -> SessionResult<ApiResponse> {
        match self.dispatch(request, None).await? {
            Dispatch::Completed(response) => Ok(response),
            Dispatch::TokenRejected => Err(SessionError::NotAuthenticated),
        }
    }

    /// `POST /sessions`: exchange credentials for a profile and token pair.
    ///
    /// 4xx responses become [`SessionError::AuthenticationFailed`] carrying the
    /// server's message; everything else passes through.
    pub async fn create_session(
        &self,
        email: &str,
        password: &str,
    ) -> SessionResult<AuthenticatedSession> {
        let request = ApiRequest::post("/sessions").json(&SignInRequest { email, password })?;

        let response = match self.send_unauthenticated(&request).await {
            Ok(response) => response,
            Err(SessionError::Server { status, message }) if (400..500).contains(&status) => {
                return Err(SessionError::AuthenticationFailed(message));
            }
            Err(SessionError::NotAuthenticated) => {
                return Err(SessionError::AuthenticationFailed(
                    "credentials rejected".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        let data: SignInResponse = response.json()?;
        Ok(AuthenticatedSession {
            profile: data.user,
            tokens: TokenPair::new(data.token, data.refresh_token),
        })
    }

    /// `POST /sessions/refresh-token`: one exchange attempt, errors unclassified.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> SessionResult<TokenPair> {
        let request =
            ApiRequest::post("/sessions/refresh-token").json(&RefreshRequest { refresh_token })?;

        let response = match self.dispatch(&request, None).await? {
            Dispatch::Completed(response) => response,
            Dispatch::TokenRejected => {
                return Err(SessionError::Server {
                    status: StatusCode::UNAUTHORIZED.as_u16(),
                    message: "refresh token rejected".to_string(),
                })
            }
        };

        let data: RefreshResponse = response.json()?;
        Ok(TokenPair::new(data.token, data.refresh_token))
    }
}

/// Extract `message` from an error body, if it is JSON and has one.
fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .filter(|message| !message.trim().is_empty())
}

/// A 401 whose message is one of [`TOKEN_INVALID_MESSAGES`]. Any other 401
/// (wrong password, missing permission) is an ordinary server error.
pub(crate) fn is_token_invalid(status: StatusCode, message: Option<&str>) -> bool {
    status == StatusCode::UNAUTHORIZED
        && message.is_some_and(|message| {
            TOKEN_INVALID_MESSAGES
                .iter()
                .any(|known| *known == message)
        })
}
