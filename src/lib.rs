//! Spotify Overlay Player Sync Library
//!
//! This library keeps a local view of a remote Spotify playback session in
//! sync. It authenticates with OAuth 2.0 PKCE, polls the playback endpoints on
//! a fixed interval, detects track and state changes, and exposes transport
//! controls to whatever presentation shell sits on top of it.
//!
//! # Modules
//!
//! - `api` - HTTP handlers for the local OAuth callback server
//! - `cli` - Terminal front end built on the [`Synchronizer`] interface
//! - `config` - Persisted nested settings and environment overrides
//! - `error` - The [`SyncError`] taxonomy
//! - `events` - Typed publish/subscribe for change events
//! - `management` - Session and token state
//! - `server` - Short-lived local listener for the OAuth callback
//! - `spotify` - Spotify Web API integration (auth, polling, transport)
//! - `synchronizer` - Facade wiring all of the above together
//! - `types` - Data structures and wire formats
//! - `utils` - PKCE helpers and formatting
//!
//! # Example
//!
//! ```
//! use spotiplayer::{config::ConfigStore, events::EventKind, Synchronizer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), spotiplayer::SyncError> {
//!     let store = ConfigStore::open_default().await?;
//!     let sync = Synchronizer::from_config(store).await?;
//!     sync.subscribe(EventKind::TrackChanged, |event| println!("{:?}", event));
//!     sync.initialize().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod management;
pub mod server;
pub mod spotify;
pub mod synchronizer;
pub mod types;
pub mod utils;

pub use error::SyncError;
pub use synchronizer::Synchronizer;

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Enables or disables output of the [`debug!`] macro.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

/// Returns whether [`debug!`] output is enabled.
pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Polling started every {} ms", interval);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only the binary uses this macro. Library code reports failures through
/// [`SyncError`] and never terminates the process.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recoverable issues, such as a failed poll tick or a token that
/// could not be persisted.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a dimmed diagnostic message when verbose output is enabled.
///
/// Verbose output is switched on by `advanced.logLevel = "debug"` in the
/// config file, by the `SPOTIPLAYER_DEBUG` environment variable, or by the
/// `--verbose` flag of the binary.
#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => ({
    if $crate::verbose() {
      use colored::Colorize;
      println!("[{}] {}", "·".dimmed(), std::format_args!($($arg)*));
    }
  })
}
