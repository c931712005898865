//! Typed calls to the gym API's domain endpoints.
//!
//! These are plain pass-throughs: authorized calls go through the
//! [`RequestGateway`] (and so get refresh handling for free), the sign-up call
//! goes out unauthenticated.

use crate::gateway::RequestGateway;
use crate::request::ApiRequest;
use crate::SessionResult;
use serde::{Deserialize, Deserializer, Serialize};
use url::form_urlencoded::byte_serialize;

/// One exercise from `GET /exercises/...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub series: u32,
    #[serde(default)]
    pub repetitions: u32,
    #[serde(default)]
    pub group: String,
    /// Demo animation file name
    #[serde(default)]
    pub demo: String,
    /// Thumbnail file name
    #[serde(default)]
    pub thumb: String,
}

/// Completed exercises for one day, as grouped by `GET /history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDay {
    /// Day label, e.g. "26.08.22"
    pub title: String,
    #[serde(default)]
    pub data: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group: String,
    /// Time of day the exercise was marked done, e.g. "08:30"
    #[serde(default)]
    pub hour: String,
}

/// Body of `PUT /users`. Unset fields are left out of the request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
}

#[derive(Serialize)]
struct NewAccount<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct HistoryRecord<'a> {
    exercise_id: &'a str,
}

/// Domain API bound to one gateway.
#[derive(Clone)]
pub struct GymApi {
    gateway: RequestGateway,
}

impl GymApi {
    pub fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }

    /// `POST /users`: create an account. Does not sign in.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> SessionResult<()> {
        let request = ApiRequest::post("/users").json(&NewAccount {
            name,
            email,
            password,
        })?;
        self.gateway.send_unauthenticated(request).await?;
        Ok(())
    }

    /// `GET /groups`
    pub async fn groups(&self) -> SessionResult<Vec<String>> {
        self.gateway.get_json("/groups").await
    }

    /// `GET /exercises/bygroup/{group}`
    pub async fn exercises_by_group(&self, group: &str) -> SessionResult<Vec<Exercise>> {
        self.gateway
            .get_json(&format!("/exercises/bygroup/{}", path_segment(group)))
            .await
    }

    /// `GET /exercises/{id}`
    pub async fn exercise(&self, exercise_id: &str) -> SessionResult<Exercise> {
        self.gateway
            .get_json(&format!("/exercises/{}", path_segment(exercise_id)))
            .await
    }

    /// `POST /history`: mark an exercise as done.
    pub async fn register_history(&self, exercise_id: &str) -> SessionResult<()> {
        let request = ApiRequest::post("/history").json(&HistoryRecord { exercise_id })?;
        self.gateway.send(request).await?;
        Ok(())
    }

    /// `GET /history`
    pub async fn history(&self) -> SessionResult<Vec<HistoryDay>> {
        self.gateway.get_json("/history").await
    }

    /// `PUT /users`: server-side profile change. The caller is expected to
    /// follow up with `SessionController::update_profile`.
    pub async fn update_account(&self, update: &AccountUpdate) -> SessionResult<()> {
        self.gateway.send(ApiRequest::put("/users").json(update)?).await?;
        Ok(())
    }

    pub fn avatar_url(&self, file: &str) -> String {
        self.asset_url(&["avatar", file])
    }

    pub fn exercise_demo_url(&self, exercise: &Exercise) -> String {
        self.asset_url(&["exercise", "demo", &exercise.demo])
    }

    pub fn exercise_thumb_url(&self, exercise: &Exercise) -> String {
        self.asset_url(&["exercise", "thumb", &exercise.thumb])
    }

    fn asset_url(&self, segments: &[&str]) -> String {
        let base = self.gateway.client().base_url().as_str().trim_end_matches('/');
        let path: Vec<String> = segments.iter().map(|s| path_segment(s)).collect();
        format!("{}/{}", base, path.join("/"))
    }
}

/// Percent-encode one path segment.
fn path_segment(segment: &str) -> String {
    byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
