mod common;

use std::{
    sync::{Arc, Mutex, atomic::Ordering},
    time::Duration,
};

use common::{CLIENT_ID, FakeServer, GOOD_CODE};
use reqwest::Url;
use spotiplayer::{
    SyncError, Synchronizer,
    config::ConfigStore,
    error::DenialReason,
    events::{EventKind, SyncEvent},
    spotify::auth::{AuthPhase, AuthorizationRequest},
    utils::generate_code_challenge,
};

fn query_param(url: &str, name: &str) -> String {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

fn record_connection(sync: &Synchronizer) -> Arc<Mutex<Vec<bool>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    sync.subscribe(EventKind::ConnectionChanged, move |event| {
        if let SyncEvent::ConnectionChanged(connected) = event {
            sink.lock().unwrap().push(*connected);
        }
    });
    seen
}

async fn hit_callback(request: &AuthorizationRequest, query: &str) -> String {
    reqwest::get(format!("{}?{}", request.redirect_uri, query))
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

async fn listener_is_closed(redirect_uri: &str) -> bool {
    reqwest::get(redirect_uri).await.is_err()
}

#[tokio::test]
async fn test_authorization_url_carries_pkce_parameters() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();

    let request = sync.begin_authorization().await.unwrap();

    assert!(request.url.starts_with(&format!("{}/authorize?", fake.base)));
    assert_eq!(query_param(&request.url, "client_id"), CLIENT_ID);
    assert_eq!(query_param(&request.url, "response_type"), "code");
    assert_eq!(query_param(&request.url, "code_challenge_method"), "S256");
    assert_eq!(query_param(&request.url, "redirect_uri"), request.redirect_uri);
    assert!(request.redirect_uri.starts_with("http://127.0.0.1:"));
    assert!(request.redirect_uri.ends_with("/callback"));
    assert!(query_param(&request.url, "scope").contains("user-modify-playback-state"));
    assert_eq!(sync.auth_phase().await, AuthPhase::AwaitingCallback);

    assert!(sync.cancel_authorization().await);
}

#[tokio::test]
async fn test_successful_callback_stores_tokens() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();
    let connection = record_connection(&sync);

    let request = sync.begin_authorization().await.unwrap();
    let state = query_param(&request.url, "state");
    let challenge = query_param(&request.url, "code_challenge");
    let redirect_uri = request.redirect_uri.clone();

    let page = hit_callback(&request, &format!("code={}&state={}", GOOD_CODE, state)).await;
    assert!(page.contains("Authorization successful"));
    request.wait().await.unwrap();

    {
        let tokens = sync.session().tokens().await;
        assert_eq!(tokens.access_token(), Some("access-1"));
        assert_eq!(tokens.refresh_token(), Some("refresh-1"));
        assert!(tokens.expires_at().is_some());
    }
    assert!(sync.is_connected());
    assert_eq!(*connection.lock().unwrap(), vec![true]);
    assert_eq!(sync.auth_phase().await, AuthPhase::Authenticated);

    // the verifier sent with the code matches the challenge in the URL
    let form = fake.state.last_code_form.lock().unwrap().clone();
    assert_eq!(generate_code_challenge(&form["code_verifier"]), challenge);
    assert_eq!(form["redirect_uri"], redirect_uri);
    assert_eq!(form["client_id"], CLIENT_ID);

    assert!(listener_is_closed(&redirect_uri).await);
}

#[tokio::test]
async fn test_state_mismatch_is_rejected_without_exchange() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();

    let request = sync.begin_authorization().await.unwrap();
    let redirect_uri = request.redirect_uri.clone();

    let page = hit_callback(&request, &format!("code={}&state=forged", GOOD_CODE)).await;
    assert!(page.contains("state parameter mismatch"));

    let err = request.wait().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::AuthorizationDenied(DenialReason::StateMismatch)
    ));
    assert_eq!(fake.state.code_calls.load(Ordering::SeqCst), 0);
    assert!(sync.session().tokens().await.access_token().is_none());
    assert!(matches!(sync.auth_phase().await, AuthPhase::Failed(_)));
    assert!(listener_is_closed(&redirect_uri).await);
}

#[tokio::test]
async fn test_remote_error_is_reported() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();

    let request = sync.begin_authorization().await.unwrap();
    let state = query_param(&request.url, "state");

    let page = hit_callback(&request, &format!("error=access_denied&state={}", state)).await;
    assert!(page.contains("access_denied"));

    let err = request.wait().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::AuthorizationDenied(DenialReason::Remote(ref e)) if e == "access_denied"
    ));
    assert_eq!(fake.state.code_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_code_is_rejected() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();

    let request = sync.begin_authorization().await.unwrap();
    let state = query_param(&request.url, "state");

    hit_callback(&request, &format!("state={}", state)).await;

    let err = request.wait().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::AuthorizationDenied(DenialReason::MissingCode)
    ));
}

#[tokio::test]
async fn test_rejected_code_reports_disconnect() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();
    let connection = record_connection(&sync);

    let request = sync.begin_authorization().await.unwrap();
    let state = query_param(&request.url, "state");

    hit_callback(&request, &format!("code=expired&state={}", state)).await;

    let err = request.wait().await.unwrap_err();
    assert!(matches!(err, SyncError::TokenExchange(_)));
    assert_eq!(fake.state.code_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*connection.lock().unwrap(), vec![false]);
    assert!(!sync.is_connected());
}

#[tokio::test]
async fn test_second_request_while_pending_is_rejected() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();

    let first = sync.begin_authorization().await.unwrap();
    let err = sync.begin_authorization().await.err().unwrap();
    assert!(matches!(err, SyncError::AuthorizationInProgress));

    assert!(sync.cancel_authorization().await);
    let err = first.wait().await.unwrap_err();
    assert!(matches!(err, SyncError::AuthorizationCancelled));

    // nothing pending any more, a new request may start
    assert!(!sync.cancel_authorization().await);
    let again = sync.begin_authorization().await.unwrap();
    assert!(sync.cancel_authorization().await);
    assert!(again.wait().await.is_err());
}

#[tokio::test]
async fn test_pending_request_times_out() {
    let fake = FakeServer::start().await;
    let mut options = fake.options();
    options.callback.timeout = Duration::from_millis(100);
    let sync = Synchronizer::new(options).unwrap();
    sync.stop_polling();

    let request = sync.begin_authorization().await.unwrap();
    let redirect_uri = request.redirect_uri.clone();

    let err = request.wait().await.unwrap_err();
    assert!(matches!(err, SyncError::AuthorizationTimedOut));
    assert!(matches!(sync.auth_phase().await, AuthPhase::Failed(_)));
    assert!(listener_is_closed(&redirect_uri).await);
}

#[tokio::test]
async fn test_fallback_port_is_used_when_primary_is_taken() {
    let fake = FakeServer::start().await;
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken_port = taken.local_addr().unwrap().port();

    let mut options = fake.options();
    options.callback.primary_port = taken_port;
    options.callback.fallback_port = 0;
    let sync = Synchronizer::new(options).unwrap();
    sync.stop_polling();

    let request = sync.begin_authorization().await.unwrap();
    let port: u16 = Url::parse(&request.redirect_uri)
        .unwrap()
        .port()
        .unwrap();

    assert_ne!(port, taken_port);
    assert_eq!(
        sync.session().redirect_uri().as_deref(),
        Some(request.redirect_uri.as_str())
    );
    assert!(sync.cancel_authorization().await);
}

#[tokio::test]
async fn test_both_ports_taken_fails_to_start() {
    let fake = FakeServer::start().await;
    let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let second = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

    let mut options = fake.options();
    options.callback.primary_port = first.local_addr().unwrap().port();
    options.callback.fallback_port = second.local_addr().unwrap().port();
    let sync = Synchronizer::new(options).unwrap();
    sync.stop_polling();

    let err = sync.begin_authorization().await.err().unwrap();
    assert!(matches!(err, SyncError::CallbackServer(_)));
    assert_eq!(sync.auth_phase().await, AuthPhase::Idle);
}

#[tokio::test]
async fn test_health_answers_while_waiting() {
    let fake = FakeServer::start().await;
    let sync = fake.synchronizer();

    let request = sync.begin_authorization().await.unwrap();
    let health_url = request.redirect_uri.replace("/callback", "/health");

    let body: serde_json::Value = reqwest::get(health_url)
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["authorization"], "awaiting_callback");
    assert_eq!(body["connected"], false);
    assert!(sync.cancel_authorization().await);
}

#[tokio::test]
async fn test_tokens_are_persisted_to_the_config_store() {
    let fake = FakeServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::open(dir.path().join("config.json"))
        .await
        .unwrap();
    let sync = Synchronizer::with_store(fake.options(), Arc::clone(&store)).unwrap();
    sync.stop_polling();

    let request = sync.begin_authorization().await.unwrap();
    let state = query_param(&request.url, "state");
    hit_callback(&request, &format!("code={}&state={}", GOOD_CODE, state)).await;
    request.wait().await.unwrap();

    assert_eq!(
        store.get_str("spotify.accessToken").await.as_deref(),
        Some("access-1")
    );
    assert_eq!(
        store.get_str("spotify.refreshToken").await.as_deref(),
        Some("refresh-1")
    );
    assert!(store.get("spotify.tokenExpiry").await.unwrap().is_i64());

    // a fresh store on the same file sees the tokens
    let reopened = ConfigStore::open(store.path().to_path_buf()).await.unwrap();
    assert_eq!(
        reopened.get_str("spotify.refreshToken").await.as_deref(),
        Some("refresh-1")
    );
}
