//! # CLI Module
//!
//! Command-line shell around the [`Synchronizer`]. Every command opens the
//! config store, builds a synchronizer from it and talks to Spotify only
//! through the synchronizer's operations and events.
//!
//! ## Commands
//!
//! - [`auth`] - Runs the PKCE authorization in the browser and stores tokens
//! - [`watch`] - Follows the remote player live until Ctrl-C
//! - [`status`] - Prints one snapshot of the current track and player state
//! - [`control`] - Sends a transport action (play, pause, seek, ...)
//! - [`config_get`], [`config_set`], [`config_path`], [`config_reset`] -
//!   Inspect and edit the JSON config file
//!
//! ## Usage
//!
//! ```bash
//! spotiplayer config set spotify.clientId <id>
//! spotiplayer auth
//! spotiplayer watch
//! spotiplayer control volume --volume 40
//! ```
//!
//! Failures are reported with the crate's logging macros. `error!` ends the
//! process, so these functions return only on success.

mod auth;
mod config;
mod control;
mod status;
mod watch;

use std::{sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};

use crate::{Synchronizer, config::ConfigStore, error};

pub use auth::auth;
pub use config::{config_get, config_path, config_reset, config_set};
pub use control::control;
pub use status::status;
pub use watch::watch;

async fn open_store() -> Arc<ConfigStore> {
    match ConfigStore::open_default().await {
        Ok(store) => store,
        Err(e) => error!("Cannot open config. Err: {}", e),
    }
}

async fn load_synchronizer() -> Synchronizer {
    let store = open_store().await;
    match Synchronizer::from_config(store).await {
        Ok(sync) => sync,
        Err(e) => error!(
            "{}\nSet it with: {} config set spotify.clientId <id>",
            e,
            env!("CARGO_PKG_NAME")
        ),
    }
}

/// Restores the stored session without starting the poller.
async fn restore(sync: &Synchronizer) {
    match sync.restore_session().await {
        Ok(true) => {}
        Ok(false) => error!(
            "Not authorized with Spotify. Run {} auth first.",
            env!("CARGO_PKG_NAME")
        ),
        Err(e) => error!(
            "Cannot restore session. Err: {}\nRun {} auth again.",
            e,
            env!("CARGO_PKG_NAME")
        ),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb
}
