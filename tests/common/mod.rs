//! In-process stand-in for the Spotify accounts service and Web API.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use spotiplayer::{
    Synchronizer,
    config::Endpoints,
    management::{Credentials, TokenStore},
    spotify::auth::CallbackOptions,
    synchronizer::SyncOptions,
};
use tokio::net::TcpListener;

pub const CLIENT_ID: &str = "test-client";
pub const GOOD_CODE: &str = "good-code";

#[derive(Default)]
pub struct FakeSpotify {
    pub valid_token: Mutex<String>,
    pub issued: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub code_calls: AtomicUsize,
    pub api_calls: AtomicUsize,
    pub track_calls: AtomicUsize,
    pub player_calls: AtomicUsize,
    pub unauthorized: AtomicUsize,
    pub refresh_fails: AtomicBool,
    pub always_unauthorized: AtomicBool,
    pub track_fails: AtomicBool,
    pub refresh_delay_ms: AtomicUsize,
    pub currently_playing: Mutex<Option<Value>>,
    pub player: Mutex<Option<Value>>,
    pub commands: Mutex<Vec<(Method, String, HashMap<String, String>)>>,
    pub last_code_form: Mutex<HashMap<String, String>>,
}

impl FakeSpotify {
    pub fn set_track(&self, id: &str, progress_ms: u64) {
        *self.currently_playing.lock().unwrap() = Some(track_body(id, progress_ms));
    }

    pub fn clear_track(&self) {
        *self.currently_playing.lock().unwrap() = None;
    }

    pub fn set_player(&self, is_playing: bool, volume: u8, progress_ms: u64) {
        *self.player.lock().unwrap() = Some(player_body(is_playing, volume, progress_ms));
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

pub fn track_body(id: &str, progress_ms: u64) -> Value {
    json!({
        "is_playing": true,
        "progress_ms": progress_ms,
        "item": {
            "id": id,
            "name": format!("Song {}", id),
            "artists": [{ "name": "Artist" }],
            "album": { "name": "Album", "images": [{ "url": "https://img/cover" }] },
            "duration_ms": 200000,
            "uri": format!("spotify:track:{}", id),
            "external_urls": { "spotify": format!("https://open.spotify.com/track/{}", id) }
        }
    })
}

pub fn player_body(is_playing: bool, volume: u8, progress_ms: u64) -> Value {
    json!({
        "is_playing": is_playing,
        "shuffle_state": false,
        "repeat_state": "off",
        "progress_ms": progress_ms,
        "device": { "id": "device-1", "name": "Desk", "volume_percent": volume }
    })
}

pub struct FakeServer {
    pub state: Arc<FakeSpotify>,
    pub base: String,
}

impl FakeServer {
    pub async fn start() -> Self {
        let state = Arc::new(FakeSpotify::default());
        *state.valid_token.lock().unwrap() = "access-0".to_string();

        let app = Router::new()
            .route("/api/token", post(token))
            .route("/v1/me/player", get(player))
            .route("/v1/me/player/currently-playing", get(currently_playing))
            .route("/v1/me/player/{action}", post(command).put(command))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state, base }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::with_base(&self.base)
    }

    pub fn options(&self) -> SyncOptions {
        let mut options = SyncOptions::new(Credentials::new(CLIENT_ID, ""));
        options.endpoints = self.endpoints();
        options.poll_interval = Duration::from_millis(50);
        options.command_refresh_delay = Duration::from_millis(20);
        options.callback = CallbackOptions {
            primary_port: 0,
            fallback_port: 0,
            timeout: Duration::from_secs(5),
            ..CallbackOptions::default()
        };
        options
    }

    /// A synchronizer with background polling switched off, so only calls
    /// made by the test reach the fake.
    pub fn synchronizer(&self) -> Synchronizer {
        let sync = Synchronizer::new(self.options()).unwrap();
        sync.stop_polling();
        sync
    }
}

/// Seeds `sync` with an access token that expires in an hour.
pub async fn seed_tokens(sync: &Synchronizer, access: &str, refresh: Option<&str>) {
    let expiry = chrono::Utc::now().timestamp_millis() + 3_600_000;
    *sync.session().tokens().await = TokenStore::restore(
        Some(access.to_string()),
        refresh.map(str::to_string),
        Some(expiry),
    );
}

fn authorized(state: &FakeSpotify, headers: &HeaderMap) -> bool {
    state.api_calls.fetch_add(1, Ordering::SeqCst);
    if state.always_unauthorized.load(Ordering::SeqCst) {
        state.unauthorized.fetch_add(1, Ordering::SeqCst);
        return false;
    }
    let expected = format!("Bearer {}", state.valid_token.lock().unwrap());
    let ok = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        state.unauthorized.fetch_add(1, Ordering::SeqCst);
    }
    ok
}

fn issue_token(state: &FakeSpotify, refresh_token: Option<&str>) -> Value {
    let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
    let access = format!("access-{}", n);
    *state.valid_token.lock().unwrap() = access.clone();
    let mut body = json!({
        "access_token": access,
        "token_type": "Bearer",
        "scope": "user-read-playback-state",
        "expires_in": 3600
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = json!(refresh);
    }
    body
}

async fn token(
    State(state): State<Arc<FakeSpotify>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            state.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let delay = state.refresh_delay_ms.load(Ordering::SeqCst) as u64;
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if state.refresh_fails.load(Ordering::SeqCst) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant" })),
                )
                    .into_response();
            }
            Json(issue_token(&state, None)).into_response()
        }
        Some("authorization_code") => {
            state.code_calls.fetch_add(1, Ordering::SeqCst);
            *state.last_code_form.lock().unwrap() = form.clone();
            if form.get("code").map(String::as_str) != Some(GOOD_CODE) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant" })),
                )
                    .into_response();
            }
            Json(issue_token(&state, Some("refresh-1"))).into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn currently_playing(State(state): State<Arc<FakeSpotify>>, headers: HeaderMap) -> Response {
    state.track_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.track_fails.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response();
    }
    match state.currently_playing.lock().unwrap().clone() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn player(State(state): State<Arc<FakeSpotify>>, headers: HeaderMap) -> Response {
    state.player_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.player.lock().unwrap().clone() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn command(
    State(state): State<Arc<FakeSpotify>>,
    method: Method,
    Path(action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.commands.lock().unwrap().push((method, action, query));
    StatusCode::NO_CONTENT.into_response()
}

/// Waits until `condition` holds, polling every 10 ms for up to two seconds.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
