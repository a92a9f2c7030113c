//! # Spotify Integration Module
//!
//! The playback session synchronizer's integration layer with the Spotify
//! Web API.
//!
//! ```text
//! Synchronizer / CLI
//!          ↓
//! ┌─────────────────────┬──────────────────────┐
//! │ PlaybackPoller      │ TransportController  │
//! └─────────┬───────────┴──────────┬───────────┘
//!           └──── AuthorizedClient ┘   (401 → refresh → retry once)
//!                        ↓
//!                    AuthFlow  ──→  Session / TokenStore
//!                        ↓
//!              Spotify accounts + Web API
//! ```
//!
//! ## Modules
//!
//! - [`auth`] - PKCE authorization, code exchange and single-flight token
//!   refresh. Owns the short-lived local callback listener.
//! - [`client`] - [`client::AuthorizedClient`], the one place where the
//!   refresh-and-retry policy for `401` responses lives.
//! - [`player`] - Reads of the currently playing track and the player state.
//! - [`poller`] - Fixed-interval polling with change detection.
//! - [`transport`] - Play, pause, skip, seek, volume, shuffle and repeat.
//!
//! ## Endpoints used
//!
//! - `GET /me/player/currently-playing`
//! - `GET /me/player`
//! - `PUT /me/player/{play,pause,seek,volume,shuffle,repeat}`
//! - `POST /me/player/{next,previous}`
//! - `POST /api/token` (authorization code and refresh token grants)
//!
//! ## Token lifecycle
//!
//! Access tokens are refreshed five minutes before they expire. Refreshes
//! are serialized per session, so callers racing on a stale token share one
//! exchange. A refresh failure drops the access token and marks the session
//! disconnected until the user authorizes again.

pub mod auth;
pub mod client;
pub mod player;
pub mod poller;
pub mod transport;
