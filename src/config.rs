//! Configuration management for the overlay player.
//!
//! Settings live in a nested JSON document addressed by dotted keys
//! (`spotify.clientId`, `advanced.pollingInterval`). The document is stored in
//! the platform-specific local data directory and merged over the built-in
//! defaults on load, so files written by older versions keep working.
//!
//! Values are resolved in this order:
//! 1. Environment variables, for credentials left empty in the file and for
//!    the Spotify endpoint URLs
//! 2. `config.json` in the local data directory
//! 3. Application defaults

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, broadcast};

use crate::{debug, error::SyncError};

pub const APP_DIR: &str = "spotiplayer";

pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Loads environment variables from a `.env` file in the local data directory.
///
/// The file is optional. On Linux it is looked up at
/// `~/.local/share/spotiplayer/.env`, on macOS under
/// `~/Library/Application Support/spotiplayer/.env` and on Windows under
/// `%LOCALAPPDATA%/spotiplayer/.env`.
///
/// Setting `SPOTIPLAYER_DEBUG` (in the file or the environment) enables
/// verbose output.
pub async fn load_env() -> Result<(), String> {
    let path = app_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }

    if env::var_os("SPOTIPLAYER_DEBUG").is_some() {
        crate::set_verbose(true);
    }
    Ok(())
}

/// Returns `<data_local_dir>/spotiplayer`.
pub fn app_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Spotify endpoints. Overridable for testing against a local fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Reads `SPOTIFY_API_AUTH_URL`, `SPOTIFY_API_TOKEN_URL` and
    /// `SPOTIFY_API_URL`, falling back to the public Spotify URLs.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auth_url: env::var("SPOTIFY_API_AUTH_URL").unwrap_or(defaults.auth_url),
            token_url: env::var("SPOTIFY_API_TOKEN_URL").unwrap_or(defaults.token_url),
            api_url: env::var("SPOTIFY_API_URL").unwrap_or(defaults.api_url),
        }
    }

    /// Points every endpoint at one base URL, the layout of the local fake
    /// used in tests.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{}/authorize", base),
            token_url: format!("{}/api/token", base),
            api_url: format!("{}/v1", base),
        }
    }
}

/// The built-in settings tree.
pub fn default_config() -> Value {
    json!({
        "spotify": {
            "clientId": "",
            "clientSecret": "",
            "refreshToken": "",
            "accessToken": "",
            "tokenExpiry": null
        },
        "advanced": {
            "pollingInterval": 1000,
            "commandRefreshDelay": 100,
            "authTimeout": 300,
            "callbackPort": 3000,
            "fallbackCallbackPort": 8888,
            "logLevel": "info"
        }
    })
}

pub fn get_nested<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(root, |node, part| node.as_object()?.get(part))
}

/// Sets `key` inside `root`, creating intermediate objects as needed. A
/// non-object found on the path is replaced by an object.
pub fn set_nested(root: &mut Value, key: &str, value: Value) {
    let mut parts = key.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        node = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Recursively merges `overlay` into `base`. Objects merge key by key, any
/// other overlay value replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// Dotted key that changed, or `*` after a full reset.
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Persisted nested key-value settings with change notifications.
pub struct ConfigStore {
    path: PathBuf,
    values: Mutex<Value>,
    changes: broadcast::Sender<ConfigChange>,
}

impl ConfigStore {
    pub fn default_path() -> PathBuf {
        app_dir().join("config.json")
    }

    pub async fn open_default() -> Result<Arc<Self>, SyncError> {
        Self::open(Self::default_path()).await
    }

    /// Opens the store at `path` and loads it, creating the file with
    /// defaults when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>, SyncError> {
        let (changes, _) = broadcast::channel(32);
        let store = Self {
            path: path.into(),
            values: Mutex::new(default_config()),
            changes,
        };
        store.load().await?;
        Ok(Arc::new(store))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<(), SyncError> {
        if !self.path.is_file() {
            debug!("No config at {}, writing defaults", self.path.display());
            return self.save().await;
        }

        let content = async_fs::read_to_string(&self.path)
            .await
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let loaded: Value =
            serde_json::from_str(&content).map_err(|e| SyncError::Config(e.to_string()))?;

        let mut merged = default_config();
        deep_merge(&mut merged, loaded);
        *self.values.lock().await = merged;
        debug!("Config loaded from {}", self.path.display());
        Ok(())
    }

    pub async fn save(&self) -> Result<(), SyncError> {
        let values = self.values.lock().await;
        self.write(&values).await
    }

    /// Writes `values` to disk. Callers hold the lock for the whole write so
    /// that writes land in the order their changes were applied.
    async fn write(&self, values: &Value) -> Result<(), SyncError> {
        let json =
            serde_json::to_string_pretty(values).map_err(|e| SyncError::Config(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Config(e.to_string()))?;
        }
        async_fs::write(&self.path, json)
            .await
            .map_err(|e| SyncError::Config(e.to_string()))
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().await;
        get_nested(&values, key).cloned()
    }

    /// String value, with empty strings treated as absent.
    pub async fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key).await {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub async fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).await.and_then(|v| v.as_u64())
    }

    pub async fn all(&self) -> Value {
        self.values.lock().await.clone()
    }

    /// Sets a value, persists the document and notifies subscribers.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), SyncError> {
        let old_value = {
            let mut values = self.values.lock().await;
            let old_value = get_nested(&values, key).cloned();
            set_nested(&mut values, key, value.clone());
            self.write(&values).await?;
            old_value
        };

        // no receivers is fine
        let _ = self.changes.send(ConfigChange {
            key: key.to_string(),
            old_value,
            new_value: value,
        });
        Ok(())
    }

    /// Stores the session tokens in one write without broadcasting.
    pub async fn update_spotify_tokens(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        expiry_ms: Option<i64>,
    ) -> Result<(), SyncError> {
        let mut values = self.values.lock().await;
        if let Some(access) = access_token {
            set_nested(&mut values, "spotify.accessToken", json!(access));
        }
        if let Some(refresh) = refresh_token {
            set_nested(&mut values, "spotify.refreshToken", json!(refresh));
        }
        set_nested(&mut values, "spotify.tokenExpiry", json!(expiry_ms));
        self.write(&values).await
    }

    /// Restores defaults while keeping the client credentials and the
    /// refresh token.
    pub async fn reset_to_defaults(&self) -> Result<(), SyncError> {
        const PRESERVED: [&str; 3] = [
            "spotify.refreshToken",
            "spotify.clientId",
            "spotify.clientSecret",
        ];

        let (old_value, new_value) = {
            let mut values = self.values.lock().await;
            let old_value = values.clone();
            let mut fresh = default_config();
            for key in PRESERVED {
                if let Some(kept) = get_nested(&old_value, key) {
                    if !kept.is_null() {
                        set_nested(&mut fresh, key, kept.clone());
                    }
                }
            }
            *values = fresh.clone();
            self.write(&values).await?;
            (old_value, fresh)
        };

        let _ = self.changes.send(ConfigChange {
            key: "*".to_string(),
            old_value: Some(old_value),
            new_value,
        });
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }

    /// Client id and secret, falling back to `SPOTIFY_CLIENT_ID` and
    /// `SPOTIFY_CLIENT_SECRET` when the file leaves them empty.
    pub async fn credentials(&self) -> (String, String) {
        let client_id = match self.get_str("spotify.clientId").await {
            Some(id) => id,
            None => env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
        };
        let client_secret = match self.get_str("spotify.clientSecret").await {
            Some(secret) => secret,
            None => env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
        };
        (client_id, client_secret)
    }
}
