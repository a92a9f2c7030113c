//! # API Module
//!
//! HTTP handlers served by the short-lived local listener that receives the
//! Spotify OAuth redirect.
//!
//! - [`callback`] - Completes the PKCE flow. Accepts `code`, `state` and
//!   `error` query parameters and answers with a small HTML page.
//! - [`health`] - Returns status, version, authorization phase and
//!   connection, handy for checking that the listener is up while the
//!   browser round trip is in progress.
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use spotiplayer::api::{callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback))
//!     .route("/health", get(health));
//! ```

mod callback;
mod health;

pub use callback::callback;
pub use health::health;
