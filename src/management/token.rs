use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::TokenResponse;

/// Tokens are treated as expired this long before Spotify says they are.
pub const SAFETY_MARGIN: Duration = Duration::milliseconds(300_000);

/// Upper bound for the lifetime a token endpoint may announce.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::days(365);

/// Access/refresh token pair with its expiry.
///
/// Every mutation bumps `generation`, which lets concurrent refreshers tell
/// whether someone else already replaced the token they saw.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from persisted values. Empty strings count as absent.
    pub fn restore(
        access_token: Option<String>,
        refresh_token: Option<String>,
        expiry_ms: Option<i64>,
    ) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.is_empty()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at: expiry_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            generation: 0,
        }
    }

    /// True iff an access token exists and `now < expires_at - margin`.
    /// A token without a known expiry is not valid.
    pub fn is_valid(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at - margin,
            _ => false,
        }
    }

    /// Applies a token endpoint response. The refresh token is only replaced
    /// when the response carries a new one.
    pub fn apply(&mut self, response: &TokenResponse, now: DateTime<Utc>) {
        self.access_token = Some(response.access_token.clone());
        if let Some(refresh) = response.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.refresh_token = Some(refresh.to_string());
        }
        let lifetime = i64::try_from(response.expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .map_or(MAX_TOKEN_LIFETIME, |lifetime| lifetime.min(MAX_TOKEN_LIFETIME));
        // an unrepresentable expiry leaves the token invalid
        self.expires_at = now.checked_add_signed(lifetime);
        self.generation += 1;
    }

    /// Drops the access token. The refresh token is kept so an explicit
    /// refresh can still be attempted.
    pub fn invalidate(&mut self) {
        self.access_token = None;
        self.expires_at = None;
        self.generation += 1;
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn expiry_ms(&self) -> Option<i64> {
        self.expires_at.map(|at| at.timestamp_millis())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
