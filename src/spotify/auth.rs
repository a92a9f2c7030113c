use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use reqwest::{Client, Url};
use tokio::{
    sync::{Mutex, oneshot},
    task::JoinHandle,
};

use crate::{
    config::{ConfigStore, Endpoints},
    debug,
    error::{DenialReason, SyncError},
    management::{SAFETY_MARGIN, Session},
    server, success,
    types::{CallbackParams, TokenResponse},
    utils, warning,
};

/// Scopes requested during authorization.
pub const SCOPES: [&str; 4] = [
    "user-read-currently-playing",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-private",
];

pub const DEFAULT_CALLBACK_PORT: u16 = 3000;
pub const DEFAULT_FALLBACK_PORT: u16 = 8888;
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Where the local callback listener binds and how long it waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOptions {
    pub host: String,
    pub primary_port: u16,
    pub fallback_port: u16,
    pub timeout: Duration,
}

impl Default for CallbackOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            primary_port: DEFAULT_CALLBACK_PORT,
            fallback_port: DEFAULT_FALLBACK_PORT,
            timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    AwaitingCallback,
    Exchanging,
    Authenticated,
    Failed(String),
}

/// An access token together with the store generation it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct PendingAuthRequest {
    state: String,
    code_verifier: String,
    redirect_uri: String,
}

struct PendingFlow {
    request: PendingAuthRequest,
    shutdown: oneshot::Sender<()>,
    outcome: oneshot::Sender<Result<(), SyncError>>,
}

struct FlowState {
    phase: AuthPhase,
    pending: Option<PendingFlow>,
}

/// Handle returned by [`AuthFlow::begin_authorization`].
///
/// The caller sends the user's browser to `url`. [`wait`](Self::wait)
/// resolves once the callback was handled, the request timed out or was
/// cancelled, and the local listener has shut down.
pub struct AuthorizationRequest {
    pub url: String,
    pub redirect_uri: String,
    outcome: oneshot::Receiver<Result<(), SyncError>>,
    listener: JoinHandle<()>,
}

impl AuthorizationRequest {
    pub async fn wait(self) -> Result<(), SyncError> {
        let result = self
            .outcome
            .await
            .unwrap_or(Err(SyncError::AuthorizationCancelled));
        let _ = self.listener.await;
        result
    }
}

/// OAuth 2.0 PKCE flow against the Spotify accounts service.
pub struct AuthFlow {
    http: Client,
    endpoints: Endpoints,
    session: Arc<Session>,
    store: Option<Arc<ConfigStore>>,
    callback: CallbackOptions,
    flow: Mutex<FlowState>,
}

impl AuthFlow {
    pub fn new(
        http: Client,
        endpoints: Endpoints,
        session: Arc<Session>,
        callback: CallbackOptions,
    ) -> Self {
        Self {
            http,
            endpoints,
            session,
            store: None,
            callback,
            flow: Mutex::new(FlowState {
                phase: AuthPhase::Idle,
                pending: None,
            }),
        }
    }

    /// Persists every new token set into `store`.
    pub fn with_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn phase(&self) -> AuthPhase {
        self.flow.lock().await.phase.clone()
    }

    /// Starts a PKCE authorization: binds the callback listener and returns
    /// the URL the user has to visit.
    ///
    /// Only one request may be pending. A second call while the first is
    /// waiting for its callback (or exchanging the code) fails with
    /// [`SyncError::AuthorizationInProgress`].
    pub async fn begin_authorization(self: &Arc<Self>) -> Result<AuthorizationRequest, SyncError> {
        let mut flow = self.flow.lock().await;
        if flow.pending.is_some() || flow.phase == AuthPhase::Exchanging {
            return Err(SyncError::AuthorizationInProgress);
        }

        let client_id = self.session.client_id();
        let state = utils::generate_state();
        let code_verifier = utils::generate_code_verifier();
        let code_challenge = utils::generate_code_challenge(&code_verifier);

        let bound = server::bind_callback_listener(
            &self.callback.host,
            self.callback.primary_port,
            self.callback.fallback_port,
        )
        .await?;
        let redirect_uri = format!("http://{}:{}/callback", self.callback.host, bound.port);
        self.session.set_redirect_uri(redirect_uri.clone());

        let url = self.authorize_url(&client_id, &redirect_uri, &state, &code_challenge)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let listener = server::serve_callback(bound.listener, Arc::clone(self), shutdown_rx);

        flow.phase = AuthPhase::AwaitingCallback;
        flow.pending = Some(PendingFlow {
            request: PendingAuthRequest {
                state: state.clone(),
                code_verifier,
                redirect_uri: redirect_uri.clone(),
            },
            shutdown: shutdown_tx,
            outcome: outcome_tx,
        });
        drop(flow);

        let weak: Weak<Self> = Arc::downgrade(self);
        let timeout = self.callback.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(auth) = weak.upgrade() {
                auth.abort_pending(Some(&state), SyncError::AuthorizationTimedOut)
                    .await;
            }
        });

        debug!("Waiting for the authorization callback on {}", redirect_uri);
        Ok(AuthorizationRequest {
            url,
            redirect_uri,
            outcome: outcome_rx,
            listener,
        })
    }

    fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Result<String, SyncError> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.endpoints.auth_url,
            &[
                ("client_id", client_id),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("state", state),
                ("code_challenge_method", "S256"),
                ("code_challenge", code_challenge),
            ],
        )
        .map_err(|e| SyncError::Configuration(format!("invalid authorize URL: {}", e)))?;
        Ok(url.into())
    }

    /// Handles the single callback of the pending request.
    ///
    /// The listener is shut down whatever the outcome. The full error goes to
    /// the [`AuthorizationRequest`]; the returned message is what the
    /// callback page shows.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<(), String> {
        let pending = {
            let mut flow = self.flow.lock().await;
            let Some(pending) = flow.pending.take() else {
                return Err(SyncError::NoPendingAuthorization.to_string());
            };
            flow.phase = AuthPhase::Exchanging;
            pending
        };

        let result = self.resolve_callback(&pending.request, params).await;

        self.flow.lock().await.phase = match &result {
            Ok(()) => AuthPhase::Authenticated,
            Err(e) => AuthPhase::Failed(e.to_string()),
        };
        let _ = pending.shutdown.send(());

        let page = match &result {
            Ok(()) => {
                success!("Spotify authorization completed");
                Ok(())
            }
            Err(e) => {
                warning!("Spotify authorization failed: {}", e);
                Err(e.to_string())
            }
        };
        let _ = pending.outcome.send(result);
        page
    }

    async fn resolve_callback(
        &self,
        request: &PendingAuthRequest,
        params: CallbackParams,
    ) -> Result<(), SyncError> {
        if let Some(error) = params.error {
            return Err(SyncError::AuthorizationDenied(DenialReason::Remote(error)));
        }

        let state_matches = params
            .state
            .as_deref()
            .is_some_and(|state| utils::constant_time_eq(state, &request.state));
        if !state_matches {
            return Err(SyncError::AuthorizationDenied(DenialReason::StateMismatch));
        }

        let Some(code) = params.code.filter(|code| !code.is_empty()) else {
            return Err(SyncError::AuthorizationDenied(DenialReason::MissingCode));
        };

        match self.exchange_code(&code, request).await {
            Ok(response) => {
                self.store_tokens(&response).await;
                self.session.announce_connection(true);
                Ok(())
            }
            Err(e) => {
                self.session.announce_connection(false);
                Err(e)
            }
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        request: &PendingAuthRequest,
    ) -> Result<TokenResponse, SyncError> {
        let client_id = self.session.client_id();
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &request.redirect_uri),
            ("client_id", &client_id),
            ("code_verifier", &request.code_verifier),
        ])
        .await
    }

    /// Ends the pending request with `AuthorizationCancelled`. Returns false
    /// if nothing was pending.
    pub async fn cancel_authorization(&self) -> bool {
        self.abort_pending(None, SyncError::AuthorizationCancelled)
            .await
    }

    async fn abort_pending(&self, only_state: Option<&str>, reason: SyncError) -> bool {
        let pending = {
            let mut flow = self.flow.lock().await;
            let matches = match (&flow.pending, only_state) {
                (Some(pending), Some(state)) => pending.request.state == state,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !matches {
                return false;
            }
            flow.phase = AuthPhase::Failed(reason.to_string());
            flow.pending.take()
        };

        if let Some(pending) = pending {
            warning!("{}", reason);
            let _ = pending.shutdown.send(());
            let _ = pending.outcome.send(Err(reason));
        }
        true
    }

    /// Returns a usable access token, refreshing first when the stored one is
    /// within the safety margin of its expiry.
    pub async fn ensure_valid_token(&self) -> Result<AccessToken, SyncError> {
        let generation = {
            let tokens = self.session.tokens().await;
            let Some(access) = tokens.access_token() else {
                return Err(SyncError::NotAuthenticated);
            };
            if tokens.is_valid(Utc::now(), SAFETY_MARGIN) {
                return Ok(AccessToken {
                    value: access.to_string(),
                    generation: tokens.generation(),
                });
            }
            tokens.generation()
        };

        debug!("Access token expires soon, refreshing");
        self.refresh_after(generation).await
    }

    /// Exchanges the stored refresh token for a new access token.
    pub async fn refresh(&self) -> Result<AccessToken, SyncError> {
        let _gate = self.session.refresh_gate().await;
        self.refresh_locked().await
    }

    /// Single-flight refresh for a caller that read the token at
    /// `seen_generation`. If another refresh finished while this caller was
    /// waiting for the gate, its outcome is reused instead of exchanging the
    /// refresh token again.
    ///
    /// Without a refresh token the stale access token can never recover, so
    /// it is dropped and the session is marked disconnected.
    pub async fn refresh_after(&self, seen_generation: u64) -> Result<AccessToken, SyncError> {
        let _gate = self.session.refresh_gate().await;
        {
            let tokens = self.session.tokens().await;
            if tokens.generation() != seen_generation {
                return match tokens.access_token() {
                    Some(access) => Ok(AccessToken {
                        value: access.to_string(),
                        generation: tokens.generation(),
                    }),
                    None => Err(SyncError::NotAuthenticated),
                };
            }
        }

        match self.refresh_locked().await {
            Err(SyncError::MissingRefreshToken) => {
                self.session.tokens().await.invalidate();
                warning!("Access token rejected and no refresh token stored");
                self.session.set_connected(false);
                Err(SyncError::MissingRefreshToken)
            }
            result => result,
        }
    }

    // caller holds the refresh gate
    async fn refresh_locked(&self) -> Result<AccessToken, SyncError> {
        let refresh_token = self
            .session
            .tokens()
            .await
            .refresh_token()
            .map(str::to_string);
        let Some(refresh_token) = refresh_token else {
            return Err(SyncError::MissingRefreshToken);
        };

        let client_id = self.session.client_id();
        let result = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
                ("client_id", &client_id),
            ])
            .await;

        match result {
            Ok(response) => {
                let token = self.store_tokens(&response).await;
                debug!("Access token refreshed");
                self.session.announce_connection(true);
                Ok(token)
            }
            Err(e) => {
                self.session.tokens().await.invalidate();
                warning!("Failed to refresh access token: {}", e);
                self.session.announce_connection(false);
                Err(e)
            }
        }
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SyncError> {
        let res = self
            .http
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| SyncError::TokenExchange(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::TokenExchange(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        res.json::<TokenResponse>()
            .await
            .map_err(|e| SyncError::TokenExchange(e.to_string()))
    }

    async fn store_tokens(&self, response: &TokenResponse) -> AccessToken {
        let (token, refresh_token, expiry_ms) = {
            let mut tokens = self.session.tokens().await;
            tokens.apply(response, Utc::now());
            (
                AccessToken {
                    value: response.access_token.clone(),
                    generation: tokens.generation(),
                },
                tokens.refresh_token().map(str::to_string),
                tokens.expiry_ms(),
            )
        };

        if let Some(store) = &self.store {
            if let Err(e) = store
                .update_spotify_tokens(Some(&token.value), refresh_token.as_deref(), expiry_ms)
                .await
            {
                warning!("Failed to persist Spotify tokens: {}", e);
            }
        }
        token
    }
}
