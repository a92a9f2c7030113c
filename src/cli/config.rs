use serde_json::Value;

use crate::{error, success, warning};

pub async fn config_get(key: Option<String>) {
    let store = super::open_store().await;
    let value = match key {
        Some(key) => match store.get(&key).await {
            Some(value) => value,
            None => {
                warning!("No config value at '{}'", key);
                return;
            }
        },
        None => store.all().await,
    };

    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Cannot print config. Err: {}", e),
    }
}

pub async fn config_set(key: String, raw: String) {
    let store = super::open_store().await;
    let value = parse_value(&raw);
    if let Err(e) = store.set(&key, value).await {
        error!("Cannot set '{}'. Err: {}", key, e);
    }
    success!("Set {}", key);
}

pub async fn config_path() {
    let store = super::open_store().await;
    println!("{}", store.path().display());
}

pub async fn config_reset() {
    let store = super::open_store().await;
    if let Err(e) = store.reset_to_defaults().await {
        error!("Cannot reset config. Err: {}", e);
    }
    success!("Config reset to defaults. Client credentials were kept.");
}

/// Reads `raw` as JSON, falling back to a plain string for bare words.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
