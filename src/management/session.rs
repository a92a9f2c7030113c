use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Mutex, MutexGuard};

use crate::{
    error::SyncError,
    events::{EventBus, SyncEvent},
    management::TokenStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

/// The authenticated relationship with Spotify, shared by handle between the
/// auth flow, the poller and the transport controller.
pub struct Session {
    credentials: RwLock<Credentials>,
    redirect_uri: RwLock<Option<String>>,
    tokens: Mutex<TokenStore>,
    refresh_gate: Mutex<()>,
    connected: AtomicBool,
    events: Arc<EventBus>,
}

impl Session {
    /// Creates an empty session. Fails when no client id is configured.
    pub fn new(credentials: Credentials, events: Arc<EventBus>) -> Result<Self, SyncError> {
        if credentials.client_id.trim().is_empty() {
            return Err(SyncError::Configuration(
                "Spotify client id is missing. Set spotify.clientId or SPOTIFY_CLIENT_ID."
                    .to_string(),
            ));
        }

        Ok(Self {
            credentials: RwLock::new(credentials),
            redirect_uri: RwLock::new(None),
            tokens: Mutex::new(TokenStore::new()),
            refresh_gate: Mutex::new(()),
            connected: AtomicBool::new(false),
            events,
        })
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn client_id(&self) -> String {
        self.credentials().client_id
    }

    pub fn set_credentials(&self, credentials: Credentials) -> Result<(), SyncError> {
        if credentials.client_id.trim().is_empty() {
            return Err(SyncError::Configuration(
                "Spotify client id cannot be empty".to_string(),
            ));
        }
        *self.credentials.write().unwrap_or_else(|e| e.into_inner()) = credentials;
        Ok(())
    }

    /// Redirect URI of the last bound callback listener.
    pub fn redirect_uri(&self) -> Option<String> {
        self.redirect_uri
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_redirect_uri(&self, uri: String) {
        *self.redirect_uri.write().unwrap_or_else(|e| e.into_inner()) = Some(uri);
    }

    pub async fn tokens(&self) -> MutexGuard<'_, TokenStore> {
        self.tokens.lock().await
    }

    /// Serializes refreshes for this session. Hold the guard for the whole
    /// exchange.
    pub async fn refresh_gate(&self) -> MutexGuard<'_, ()> {
        self.refresh_gate.lock().await
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Records an authentication outcome and always notifies observers.
    pub fn announce_connection(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        self.events.emit(SyncEvent::ConnectionChanged(connected));
    }

    /// Updates the flag and notifies observers only when it flips.
    pub fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            self.events.emit(SyncEvent::ConnectionChanged(connected));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::events::EventKind;

    use super::*;

    #[test]
    fn empty_client_id_is_a_configuration_error() {
        let result = Session::new(Credentials::new("  ", ""), Arc::new(EventBus::new()));
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn set_connected_emits_only_on_transition() {
        let events = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        events.subscribe(EventKind::ConnectionChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let session = Session::new(Credentials::new("id", ""), events).unwrap();

        session.set_connected(true);
        session.set_connected(true);
        session.set_connected(false);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        session.announce_connection(false);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
