//! The presentation-shell facing side of the crate.
//!
//! [`Synchronizer`] builds one [`Session`] and hands it to the auth flow, the
//! authenticated client, the poller and the transport controller. A shell
//! subscribes to [`EventKind`]s, calls [`Synchronizer::control_playback`] and
//! asks for an authorization URL; it never touches the components directly.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use reqwest::Client;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

use crate::{
    config::{ConfigStore, Endpoints},
    debug,
    error::SyncError,
    events::{EventBus, EventKind, SubscriptionId, SyncEvent},
    info,
    management::{Credentials, Session, TokenStore},
    spotify::{
        auth::{AccessToken, AuthFlow, AuthPhase, AuthorizationRequest, CallbackOptions},
        client::{AuthorizedClient, DEFAULT_UNAUTHORIZED_RETRIES},
        poller::{DEFAULT_POLL_INTERVAL, PlaybackPoller},
        transport::{ControlParams, DEFAULT_COMMAND_REFRESH_DELAY, TransportController},
    },
    types::{PlaybackState, Track},
    warning,
};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub poll_interval: Duration,
    pub command_refresh_delay: Duration,
    pub callback: CallbackOptions,
    pub max_unauthorized_retries: usize,
}

impl SyncOptions {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            endpoints: Endpoints::from_env(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            command_refresh_delay: DEFAULT_COMMAND_REFRESH_DELAY,
            callback: CallbackOptions::default(),
            max_unauthorized_retries: DEFAULT_UNAUTHORIZED_RETRIES,
        }
    }

    /// Reads credentials and `advanced.*` timings from the config store.
    pub async fn from_config(store: &ConfigStore) -> Self {
        let (client_id, client_secret) = store.credentials().await;
        let mut options = Self::new(Credentials::new(client_id, client_secret));

        if let Some(ms) = store.get_u64("advanced.pollingInterval").await {
            options.poll_interval = Duration::from_millis(ms.max(100));
        }
        if let Some(ms) = store.get_u64("advanced.commandRefreshDelay").await {
            options.command_refresh_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = store.get_u64("advanced.authTimeout").await {
            options.callback.timeout = Duration::from_secs(secs);
        }
        if let Some(port) = store.get_u64("advanced.callbackPort").await {
            options.callback.primary_port =
                port_or_default("advanced.callbackPort", port, options.callback.primary_port);
        }
        if let Some(port) = store.get_u64("advanced.fallbackCallbackPort").await {
            options.callback.fallback_port = port_or_default(
                "advanced.fallbackCallbackPort",
                port,
                options.callback.fallback_port,
            );
        }
        if store.get_str("advanced.logLevel").await.as_deref() == Some("debug") {
            crate::set_verbose(true);
        }
        options
    }
}

fn port_or_default(key: &str, port: u64, default: u16) -> u16 {
    u16::try_from(port).unwrap_or_else(|_| {
        warning!("{} = {} is not a valid port, using {}", key, port, default);
        default
    })
}

pub struct Synchronizer {
    session: Arc<Session>,
    events: Arc<EventBus>,
    auth: Arc<AuthFlow>,
    poller: Arc<PlaybackPoller>,
    transport: TransportController,
    store: Option<Arc<ConfigStore>>,
    polling_enabled: Arc<AtomicBool>,
    config_watch: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Result<Self, SyncError> {
        Self::build(options, None)
    }

    /// Builds a synchronizer whose tokens are persisted into `store`.
    pub fn with_store(options: SyncOptions, store: Arc<ConfigStore>) -> Result<Self, SyncError> {
        Self::build(options, Some(store))
    }

    pub async fn from_config(store: Arc<ConfigStore>) -> Result<Self, SyncError> {
        let options = SyncOptions::from_config(&store).await;
        Self::with_store(options, store)
    }

    fn build(options: SyncOptions, store: Option<Arc<ConfigStore>>) -> Result<Self, SyncError> {
        let events = Arc::new(EventBus::new());
        let session = Arc::new(Session::new(options.credentials, Arc::clone(&events))?);
        let http = Client::new();

        let mut auth = AuthFlow::new(
            http.clone(),
            options.endpoints.clone(),
            Arc::clone(&session),
            options.callback,
        );
        if let Some(store) = &store {
            auth = auth.with_store(Arc::clone(store));
        }
        let auth = Arc::new(auth);

        let client = Arc::new(
            AuthorizedClient::new(http, options.endpoints.api_url, Arc::clone(&auth))
                .with_max_retries(options.max_unauthorized_retries),
        );
        let poller = Arc::new(PlaybackPoller::new(
            Arc::clone(&client),
            Arc::clone(&events),
            options.poll_interval,
        ));
        let transport = TransportController::new(
            client,
            Arc::clone(&poller),
            options.command_refresh_delay,
        );

        // Follow the connection: poll while connected and polling was started.
        let polling_enabled = Arc::new(AtomicBool::new(false));
        let weak_poller = Arc::downgrade(&poller);
        let enabled = Arc::clone(&polling_enabled);
        events.subscribe(EventKind::ConnectionChanged, move |event| {
            let (SyncEvent::ConnectionChanged(connected), Some(poller)) =
                (event, weak_poller.upgrade())
            else {
                return;
            };
            if *connected && enabled.load(Ordering::SeqCst) {
                poller.start();
            } else if !*connected {
                poller.stop();
            }
        });

        Ok(Self {
            session,
            events,
            auth,
            poller,
            transport,
            store,
            polling_enabled,
            config_watch: Mutex::new(None),
        })
    }

    /// Restores persisted tokens and resumes the session.
    ///
    /// With a still-valid access token polling starts right away. With only
    /// a refresh token one refresh is attempted and its failure returned.
    /// Without tokens nothing happens and the shell should offer
    /// authorization; polling then starts once it connects.
    pub async fn initialize(&self) -> Result<(), SyncError> {
        self.polling_enabled.store(true, Ordering::SeqCst);
        if self.restore_session().await? {
            self.start_polling();
        } else {
            info!("Not authorized with Spotify yet");
        }
        Ok(())
    }

    /// Loads persisted tokens and refreshes them if needed, without starting
    /// the poller. Returns whether a usable access token is available.
    ///
    /// Polling stays off until [`Self::initialize`] or
    /// [`Self::start_polling`] runs, so one-shot commands never poll.
    pub async fn restore_session(&self) -> Result<bool, SyncError> {
        if let Some(store) = &self.store {
            let access = store.get_str("spotify.accessToken").await;
            let refresh = store.get_str("spotify.refreshToken").await;
            let expiry = store
                .get("spotify.tokenExpiry")
                .await
                .and_then(|v| v.as_i64());
            *self.session.tokens().await = TokenStore::restore(access, refresh, expiry);
        }

        let (valid, has_refresh) = {
            let tokens = self.session.tokens().await;
            (
                tokens.is_valid(chrono::Utc::now(), crate::management::SAFETY_MARGIN),
                tokens.refresh_token().is_some(),
            )
        };

        if valid {
            debug!("Restored a valid access token");
            Ok(true)
        } else if has_refresh {
            self.auth.refresh().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub async fn begin_authorization(&self) -> Result<AuthorizationRequest, SyncError> {
        self.auth.begin_authorization().await
    }

    /// Starts an authorization and returns only its URL. The outcome arrives
    /// as a `ConnectionChanged` event.
    pub async fn authorization_url(&self) -> Result<String, SyncError> {
        Ok(self.auth.begin_authorization().await?.url)
    }

    pub async fn cancel_authorization(&self) -> bool {
        self.auth.cancel_authorization().await
    }

    pub async fn auth_phase(&self) -> AuthPhase {
        self.auth.phase().await
    }

    pub async fn refresh(&self) -> Result<AccessToken, SyncError> {
        self.auth.refresh().await
    }

    pub async fn control_playback(
        &self,
        action: &str,
        params: &ControlParams,
    ) -> Result<(), SyncError> {
        self.transport.control_playback(action, params).await
    }

    /// Runs one poll cycle immediately.
    pub async fn poll_now(&self) -> Result<(), SyncError> {
        self.poller.poll_once().await
    }

    pub fn current_track(&self) -> Option<Track> {
        self.poller.current_track()
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.poller.playback_state()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn start_polling(&self) -> bool {
        self.polling_enabled.store(true, Ordering::SeqCst);
        self.poller.start()
    }

    pub fn stop_polling(&self) -> bool {
        self.polling_enabled.store(false, Ordering::SeqCst);
        self.poller.stop()
    }

    /// Applies config changes while running: new client credentials go to
    /// the session, a new `advanced.pollingInterval` restarts the poller.
    pub fn watch_config(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        let mut changes = store.subscribe();
        let store = Arc::clone(store);
        let session = Arc::downgrade(&self.session);
        let poller = Arc::downgrade(&self.poller);

        let handle = tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        warning!("Missed {} config changes", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let key = change.key.as_str();
                if matches!(key, "spotify.clientId" | "spotify.clientSecret" | "*") {
                    let Some(session) = session.upgrade() else {
                        break;
                    };
                    let (client_id, client_secret) = store.credentials().await;
                    match session.set_credentials(Credentials::new(client_id, client_secret)) {
                        Ok(()) => debug!("Client credentials updated"),
                        Err(e) => warning!("Ignoring config change: {}", e),
                    }
                }
                if matches!(key, "advanced.pollingInterval" | "*") {
                    let Some(poller) = poller.upgrade() else {
                        break;
                    };
                    if let Some(ms) = store.get_u64("advanced.pollingInterval").await {
                        poller.set_interval(Duration::from_millis(ms.max(100)));
                        debug!("Polling interval set to {} ms", ms);
                    }
                }
            }
        });

        let mut watch = self.config_watch.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = watch.replace(handle) {
            previous.abort();
        }
        true
    }

    /// Stops polling, abandons a pending authorization and drops all
    /// subscribers.
    pub async fn shutdown(&self) {
        self.stop_polling();
        self.auth.cancel_authorization().await;
        if let Some(handle) = self
            .config_watch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        self.events.clear();
    }
}
