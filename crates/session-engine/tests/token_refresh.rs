//! Integration tests for single-flight token refresh through the gateway.

mod common;

use common::{
    api_error, mount_second_sign_in, mount_sign_in, record_snapshots, refresh_with_r1,
    refreshed_t2, signed_in, stored, token_expired, SlowStorage,
};
use credential_store::{CredentialStore, MemoryStorage, TokenPair};
use futures_util::future::join_all;
use serde_json::json;
use session_engine::{
    ApiClient, ApiRequest, GymApi, RefreshConfig, RefreshState, RequestGateway,
    SessionController, SessionError, SessionState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_groups(server: &MockServer, bearer: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path("/groups"))
        .and(header("Authorization", format!("Bearer {}", bearer).as_str()))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn groups_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!(["costas"]))
}

async fn wait_for_refresh(controller: &SessionController) {
    let gateway = controller.gateway().clone();
    tokio::time::timeout(Duration::from_secs(2), async {
        while gateway.refresh_state() != RefreshState::Refreshing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("refresh window never opened");
}

/// Start `GET /groups` with t1, wait until its refresh is in flight, then
/// sign in as Bea, optionally signing Ana out first.
async fn switch_user_during_refresh(
    server: &MockServer,
    controller: &SessionController,
    sign_out_first: bool,
) -> tokio::task::JoinHandle<Result<Vec<String>, SessionError>> {
    mount_second_sign_in(server).await;

    let api = GymApi::new(controller.gateway().clone());
    let request = tokio::spawn(async move { api.groups().await });
    wait_for_refresh(controller).await;

    if sign_out_first {
        controller.sign_out();
    }
    controller.sign_in("b@b.com", "secret2").await.unwrap();
    request
}

fn assert_signed_in_as_bea(controller: &SessionController, storage: &Arc<MemoryStorage>) {
    assert!(controller.is_authenticated());
    assert_eq!(controller.profile().unwrap().name, "Bea");
    assert_eq!(controller.gateway().session().bearer().as_deref(), Some("t9"));

    let saved = stored(storage);
    assert_eq!(saved.profile.unwrap().name, "Bea");
    assert_eq!(saved.tokens, Some(TokenPair::new("t9", "r9")));
}

#[tokio::test]
async fn concurrent_token_failures_share_one_refresh() {
    let server = MockServer::start().await;
    let (controller, storage) = signed_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 5).await;
    mount_groups(&server, "t2", groups_ok(), 5).await;
    refresh_with_r1()
        .respond_with(refreshed_t2().set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let api = GymApi::new(controller.gateway().clone());
    let results = join_all((0..5).map(|_| api.groups())).await;

    for result in results {
        assert_eq!(result.unwrap(), vec!["costas"]);
    }

    assert_eq!(controller.gateway().refresh_state(), RefreshState::Idle);
    assert_eq!(controller.gateway().pending_requests(), 0);
    assert_eq!(controller.gateway().session().bearer().as_deref(), Some("t2"));
    assert_eq!(stored(&storage).tokens, Some(TokenPair::new("t2", "r2")));
    assert!(controller.is_authenticated());
}

#[tokio::test]
async fn queued_requests_replay_with_the_same_new_token() {
    let server = MockServer::start().await;
    let (controller, _storage) = signed_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    mount_groups(&server, "t2", groups_ok(), 1).await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .and(header("Authorization", "Bearer t1"))
        .respond_with(token_expired())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .and(header("Authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "title": "26.08.22", "data": [] }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    refresh_with_r1()
        .respond_with(refreshed_t2().set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let api = GymApi::new(controller.gateway().clone());
    let (groups, history) = tokio::join!(api.groups(), api.history());

    assert_eq!(groups.unwrap(), vec!["costas"]);
    assert_eq!(history.unwrap()[0].title, "26.08.22");
}

#[tokio::test]
async fn failed_refresh_rejects_everyone_and_signs_out_once() {
    let server = MockServer::start().await;
    let (controller, storage) = signed_in(&server).await;
    let snapshots = record_snapshots(&controller);

    mount_groups(&server, "t1", token_expired(), 3).await;
    Mock::given(method("POST"))
        .and(path("/sessions/refresh-token"))
        .respond_with(
            api_error(401, "Refresh token inválido.").set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = GymApi::new(controller.gateway().clone());
    let results = join_all((0..3).map(|_| api.groups())).await;

    for result in results {
        match result {
            Err(SessionError::TokenRefreshFailed(reason)) => {
                assert!(reason.contains("Refresh token inválido."), "reason: {}", reason)
            }
            other => panic!("expected TokenRefreshFailed, got {:?}", other),
        }
    }

    assert!(!controller.is_authenticated());
    assert!(storage.is_empty());
    assert_eq!(controller.gateway().refresh_state(), RefreshState::Idle);

    let seen = snapshots.lock();
    assert_eq!(seen.len(), 1, "exactly one sign-out notification");
    assert!(!seen[0].is_authenticated);
}

#[tokio::test]
async fn other_failures_pass_through_untouched() {
    let server = MockServer::start().await;
    let (controller, _storage) = signed_in(&server).await;

    mount_groups(&server, "t1", api_error(500, "boom"), 1).await;
    Mock::given(method("GET"))
        .and(path("/exercises/7"))
        .respond_with(api_error(401, "Usuário não autorizado."))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/refresh-token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let api = GymApi::new(controller.gateway().clone());

    match api.groups().await {
        Err(SessionError::Server { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected a server error, got {:?}", other),
    }
    assert!(matches!(
        api.exercise("7").await,
        Err(SessionError::Server { status: 401, .. })
    ));

    assert!(controller.is_authenticated());
    assert_eq!(controller.gateway().refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn replay_that_fails_again_is_not_refreshed_twice() {
    let server = MockServer::start().await;
    let (controller, _storage) = signed_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    mount_groups(&server, "t2", token_expired(), 1).await;
    refresh_with_r1()
        .respond_with(refreshed_t2())
        .expect(1)
        .mount(&server)
        .await;

    let result = GymApi::new(controller.gateway().clone()).groups().await;

    assert!(matches!(result, Err(SessionError::Server { status: 401, .. })));
    assert!(controller.is_authenticated());
    assert_eq!(controller.gateway().session().bearer().as_deref(), Some("t2"));
}

#[tokio::test]
async fn sign_out_during_refresh_aborts_waiters() {
    let server = MockServer::start().await;
    let (controller, storage) = signed_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    refresh_with_r1()
        .respond_with(refreshed_t2().set_delay(Duration::from_millis(400)))
        .expect(1)
        .mount(&server)
        .await;

    let api = GymApi::new(controller.gateway().clone());
    let request = tokio::spawn(async move { api.groups().await });
    wait_for_refresh(&controller).await;

    controller.sign_out();

    let result = tokio::time::timeout(Duration::from_millis(200), request)
        .await
        .expect("waiter was not released by sign-out")
        .unwrap();
    assert!(matches!(result, Err(SessionError::TokenRefreshFailed(_))));

    // Let the late exchange land; it must not resurrect the session
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!controller.is_authenticated());
    assert_eq!(controller.gateway().session().bearer(), None);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn late_refresh_success_does_not_reach_next_user() {
    let server = MockServer::start().await;
    let (controller, storage) = signed_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    refresh_with_r1()
        .respond_with(refreshed_t2().set_delay(Duration::from_millis(400)))
        .expect(1)
        .mount(&server)
        .await;

    let request = switch_user_during_refresh(&server, &controller, true).await;
    let result = request.await.unwrap();
    assert!(matches!(result, Err(SessionError::TokenRefreshFailed(_))));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_signed_in_as_bea(&controller, &storage);
}

#[tokio::test]
async fn late_refresh_failure_does_not_sign_out_next_user() {
    let server = MockServer::start().await;
    let (controller, storage) = signed_in(&server).await;
    let snapshots = record_snapshots(&controller);

    mount_groups(&server, "t1", token_expired(), 1).await;
    refresh_with_r1()
        .respond_with(
            api_error(401, "Refresh token inválido.").set_delay(Duration::from_millis(400)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = switch_user_during_refresh(&server, &controller, true).await;
    let result = request.await.unwrap();
    assert!(matches!(result, Err(SessionError::TokenRefreshFailed(_))));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_signed_in_as_bea(&controller, &storage);

    // Ana signed out, Bea signed in, nothing after that
    let seen = snapshots.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].is_authenticated);
}

#[tokio::test]
async fn refresh_for_replaced_session_is_discarded() {
    let server = MockServer::start().await;
    let (controller, storage) = signed_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    refresh_with_r1()
        .respond_with(refreshed_t2().set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    // Bea signs in over Ana's session while Ana's refresh is in flight
    let request = switch_user_during_refresh(&server, &controller, false).await;
    let result = tokio::time::timeout(Duration::from_secs(2), request)
        .await
        .expect("waiter never resolved")
        .unwrap();
    assert!(matches!(result, Err(SessionError::TokenRefreshFailed(_))));

    assert_signed_in_as_bea(&controller, &storage);
    assert_eq!(controller.gateway().refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn default_config_makes_a_single_exchange() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    Mock::given(method("POST"))
        .and(path("/sessions/refresh-token"))
        .respond_with(api_error(503, "unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let controller = SessionController::new(
        CredentialStore::new(Box::new(storage.clone())),
        ApiClient::new(&server.uri()).unwrap(),
    );
    controller.sign_in("a@b.com", "secret1").await.unwrap();

    let result = GymApi::new(controller.gateway().clone()).groups().await;

    assert!(matches!(result, Err(SessionError::TokenRefreshFailed(_))));
    assert!(!controller.is_authenticated());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn opted_in_retries_recover_from_transient_refresh_failure() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    mount_groups(&server, "t2", groups_ok(), 1).await;
    Mock::given(method("POST"))
        .and(path("/sessions/refresh-token"))
        .respond_with(api_error(503, "unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    refresh_with_r1()
        .respond_with(refreshed_t2())
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let controller = SessionController::with_refresh_config(
        CredentialStore::new(Box::new(storage.clone())),
        ApiClient::new(&server.uri()).unwrap(),
        RefreshConfig {
            initial_delay_ms: 10,
            max_delay_ms: 10,
            ..RefreshConfig::with_retries(2)
        },
    );
    controller.sign_in("a@b.com", "secret1").await.unwrap();

    let groups = GymApi::new(controller.gateway().clone()).groups().await.unwrap();
    assert_eq!(groups, vec!["costas"]);
    assert_eq!(stored(&storage).tokens, Some(TokenPair::new("t2", "r2")));
}

#[tokio::test]
async fn slow_token_write_does_not_stall_the_runtime() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;

    mount_groups(&server, "t1", token_expired(), 1).await;
    mount_groups(&server, "t2", groups_ok(), 1).await;
    refresh_with_r1()
        .respond_with(refreshed_t2())
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let controller = SessionController::new(
        CredentialStore::new(Box::new(SlowStorage {
            delay: Duration::from_millis(200),
            inner: storage.clone(),
        })),
        ApiClient::new(&server.uri()).unwrap(),
    );
    controller.sign_in("a@b.com", "secret1").await.unwrap();

    // Ticks only advance while the single-threaded test runtime is free
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    let groups = GymApi::new(controller.gateway().clone()).groups().await.unwrap();
    ticker.abort();

    assert_eq!(groups, vec!["costas"]);
    assert_eq!(stored(&storage).tokens, Some(TokenPair::new("t2", "r2")));
    assert!(
        ticks.load(Ordering::Relaxed) >= 15,
        "runtime stalled during token write: {} ticks",
        ticks.load(Ordering::Relaxed)
    );
}

#[tokio::test]
async fn token_rejection_without_session_is_not_authenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(token_expired())
        .expect(1)
        .mount(&server)
        .await;

    let gateway = RequestGateway::new(
        ApiClient::new(&server.uri()).unwrap(),
        Arc::new(SessionState::new()),
    );

    let result = gateway.send(ApiRequest::get("/groups")).await;
    assert!(matches!(result, Err(SessionError::NotAuthenticated)));
    assert_eq!(gateway.refresh_state(), RefreshState::Idle);
}
