//! Fixtures shared by the session-engine integration tests.

#![allow(dead_code)]

use credential_store::{
    CredentialStore, KeyValueStore, MemoryStorage, StorageError, StorageResult, StoredCredentials,
};
use serde_json::json;
use parking_lot::Mutex;
use session_engine::{ApiClient, RefreshConfig, SessionController, SessionSnapshot};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

/// Backend that fails on demand.
pub struct FailingStorage {
    fail_reads: bool,
    fail_writes: bool,
    /// Writes to this key fail; removals still succeed
    rejected_key: Mutex<Option<&'static str>>,
    inner: MemoryStorage,
}

impl FailingStorage {
    fn with_flags(fail_reads: bool, fail_writes: bool) -> Self {
        Self {
            fail_reads,
            fail_writes,
            rejected_key: Mutex::new(None),
            inner: MemoryStorage::new(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_flags(false, false)
    }

    pub fn unreadable() -> Self {
        Self::with_flags(true, false)
    }

    pub fn unwritable() -> Self {
        Self::with_flags(false, true)
    }

    pub fn reject_writes_to(&self, key: &'static str) {
        *self.rejected_key.lock() = Some(key);
    }
}

impl KeyValueStore for FailingStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if self.fail_writes || self.rejected_key.lock().is_some_and(|rejected| rejected == key) {
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        if self.fail_reads {
            return Err(StorageError::Unavailable("injected read failure".to_string()));
        }
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        if self.fail_writes {
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }
        self.inner.remove(key)
    }
}

/// Backend whose writes block the calling thread for `delay`.
pub struct SlowStorage {
    pub delay: Duration,
    pub inner: Arc<MemoryStorage>,
}

impl KeyValueStore for SlowStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        std::thread::sleep(self.delay);
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.inner.remove(key)
    }
}

pub fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri()).unwrap()
}

/// Controller over `storage` with a single refresh attempt.
pub fn controller_with(server: &MockServer, storage: impl KeyValueStore + 'static) -> SessionController {
    SessionController::with_refresh_config(
        CredentialStore::new(Box::new(storage)),
        client(server),
        RefreshConfig::single_attempt(),
    )
}

pub fn controller(server: &MockServer, storage: &Arc<MemoryStorage>) -> SessionController {
    controller_with(server, storage.clone())
}

/// What `storage` currently holds.
pub fn stored(storage: &Arc<MemoryStorage>) -> StoredCredentials {
    CredentialStore::new(Box::new(storage.clone())).load().unwrap()
}

/// `{"status":"error","message":"token.expired"}` with 401.
pub fn token_expired() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "status": "error",
        "message": "token.expired",
    }))
}

pub fn api_error(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "status": "error",
        "message": message,
    }))
}

/// `POST /sessions` for a@b.com / secret1 answering with Ana, t1, r1.
pub async fn mount_sign_in(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({ "email": "a@b.com", "password": "secret1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "name": "Ana" },
            "token": "t1",
            "refresh_token": "r1",
        })))
        .mount(server)
        .await;
}

/// `POST /sessions` for b@b.com / secret2 answering with Bea, t9, r9.
pub async fn mount_second_sign_in(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({ "email": "b@b.com", "password": "secret2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "id": 2, "name": "Bea", "email": "b@b.com" },
            "token": "t9",
            "refresh_token": "r9",
        })))
        .mount(server)
        .await;
}

/// `POST /sessions/refresh-token` carrying r1.
pub fn refresh_with_r1() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/sessions/refresh-token"))
        .and(body_json(json!({ "refresh_token": "r1" })))
}

/// Refresh response handing out t2/r2.
pub fn refreshed_t2() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token": "t2",
        "refresh_token": "r2",
    }))
}

/// A controller signed in as Ana with t1/r1.
pub async fn signed_in(server: &MockServer) -> (SessionController, Arc<MemoryStorage>) {
    mount_sign_in(server).await;
    let storage = Arc::new(MemoryStorage::new());
    let controller = controller(server, &storage);
    controller.sign_in("a@b.com", "secret1").await.unwrap();
    (controller, storage)
}

/// Record every snapshot published by `controller`.
pub fn record_snapshots(controller: &SessionController) -> Arc<Mutex<Vec<SessionSnapshot>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    controller.subscribe(move |snapshot| sink.lock().push(snapshot.clone()));
    seen
}
