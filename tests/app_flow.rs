//! End-to-end flow through `AppState` with both remote services mocked.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pawspective_lib::api::HttpChatApi;
use pawspective_lib::auth::{FirebaseIdentityProvider, Route};
use pawspective_lib::chat_list::LoadState;
use pawspective_lib::config::AppConfig;
use pawspective_lib::session::{SessionManager, SystemClock};
use pawspective_lib::state::AppState;
use pawspective_lib::storage::StorageManager;

async fn app(server: &MockServer) -> AppState {
    let config = AppConfig {
        api_base_url: server.uri(),
        identity_base_url: server.uri(),
        ..AppConfig::default()
    };
    let storage = StorageManager::in_memory().await.unwrap();
    let api = Arc::new(HttpChatApi::new(&server.uri(), Duration::from_secs(5)).unwrap());
    let identity =
        Arc::new(FirebaseIdentityProvider::new(&server.uri(), "test-key", Duration::from_secs(5)).unwrap());
    let sessions = SessionManager::in_memory(Arc::new(SystemClock));
    AppState::new(config, storage, api, identity, sessions)
}

#[tokio::test]
async fn sign_in_then_create_chat_and_list_it() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "localId": "u1",
            "email": "owner@shelter.org"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chats/u1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "success": true,
            "chatId": "abc123"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chats/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "chats": [{ "id": "abc123", "title": "Vet Visit" }]
        })))
        .mount(&server)
        .await;

    let state = app(&server).await;
    assert_eq!(state.auth.startup_route().await, Route::Onboarding);

    state
        .auth
        .sign_in("owner@shelter.org", "secret1", true)
        .await
        .unwrap();
    assert_eq!(state.auth.startup_route().await, Route::Home);
    assert!(state.storage.get_user("u1").await.unwrap().is_some());

    let chat_id = state.chats.create_chat("u1", "Vet Visit").await.unwrap();
    assert_eq!(chat_id, "abc123");

    state.chat_lists.refresh("u1", true).await;
    match state.chat_lists.current("u1") {
        LoadState::Ready(chats) => assert!(chats.iter().any(|c| c.id == "abc123")),
        other => panic!("unexpected state {:?}", other),
    }

    state.sign_out().await;
    assert_eq!(state.auth.startup_route().await, Route::Onboarding);
    assert_eq!(state.chat_lists.current("u1"), LoadState::Idle);
    assert!(state.storage.has_any_chats("u1").await.unwrap());

    state.shutdown().await;
}

#[tokio::test]
async fn cached_list_survives_server_outage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chats/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "chats": [{ "id": "c1", "title": "Fleas" }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chats/u1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let state = app(&server).await;
    let first = state.chats.get_user_chats("u1", true).await.unwrap();
    let second = state.chats.get_user_chats("u1", true).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second[0].title, "Fleas");
}
