use std::fmt;

use reqwest::StatusCode;

/// Why an authorization callback was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Spotify redirected back with an `error` parameter (e.g. `access_denied`).
    Remote(String),
    /// The `state` parameter did not match the pending request.
    StateMismatch,
    /// The callback carried neither an error nor an authorization code.
    MissingCode,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Remote(error) => write!(f, "Spotify returned '{}'", error),
            DenialReason::StateMismatch => write!(f, "state parameter mismatch"),
            DenialReason::MissingCode => write!(f, "authorization code missing"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(DenialReason),

    #[error("An authorization request is already waiting for its callback")]
    AuthorizationInProgress,

    #[error("No authorization request is pending")]
    NoPendingAuthorization,

    #[error("Authorization timed out before the callback arrived")]
    AuthorizationTimedOut,

    #[error("Authorization was cancelled")]
    AuthorizationCancelled,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("No refresh token stored. Authorize again.")]
    MissingRefreshToken,

    #[error("Not authenticated. Authorize again.")]
    NotAuthenticated,

    #[error("Spotify rejected the access token after a refresh")]
    Unauthorized,

    #[error("Invalid playback action: {0}")]
    InvalidAction(String),

    #[error("Spotify API returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Callback server error: {0}")]
    CallbackServer(#[source] std::io::Error),

    #[error("Config store error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns true for failures that require the user to run the
    /// authorization flow again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            SyncError::AuthorizationDenied(_)
                | SyncError::MissingRefreshToken
                | SyncError::NotAuthenticated
                | SyncError::Unauthorized
                | SyncError::TokenExchange(_)
        )
    }
}
