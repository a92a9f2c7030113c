use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{debug, error::SyncError, spotify::auth::AuthFlow, warning};

/// How many refresh-and-retry rounds a 401 may trigger.
pub const DEFAULT_UNAUTHORIZED_RETRIES: usize = 1;

/// The single path for bearer-authenticated Spotify Web API calls.
///
/// Every call first makes sure the access token is fresh. A `401` response
/// triggers a (single-flight) token refresh and one more attempt; a `401`
/// after the last retry is reported as [`SyncError::Unauthorized`] and is
/// never retried further.
pub struct AuthorizedClient {
    http: Client,
    api_url: String,
    auth: Arc<AuthFlow>,
    max_retries: usize,
}

impl AuthorizedClient {
    pub fn new(http: Client, api_url: impl Into<String>, auth: Arc<AuthFlow>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            auth,
            max_retries: DEFAULT_UNAUTHORIZED_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Issues the request produced by `build` with a valid bearer token.
    ///
    /// `build` is called once per attempt with the token to use. Non-success
    /// statuses other than `401` come back as [`SyncError::Api`].
    pub async fn send<F>(&self, build: F) -> Result<Response, SyncError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let session = self.auth.session();
        let mut token = self.auth.ensure_valid_token().await?;
        let mut retries_left = self.max_retries;

        loop {
            let response = build(&self.http, &token.value).send().await?;
            let status = response.status();

            if status != StatusCode::UNAUTHORIZED {
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(SyncError::Api { status, message });
                }
                session.set_connected(true);
                return Ok(response);
            }

            if retries_left == 0 {
                warning!("Spotify rejected the access token again after a refresh");
                session.tokens().await.invalidate();
                session.set_connected(false);
                return Err(SyncError::Unauthorized);
            }

            retries_left -= 1;
            debug!("Spotify answered 401, refreshing the token and retrying");
            token = self.auth.refresh_after(token.generation).await?;
        }
    }

    /// GETs `path` and decodes the JSON body. `204 No Content` and empty
    /// bodies yield `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, SyncError> {
        let url = self.url(path);
        let response = self
            .send(|http, token| http.get(&url).bearer_auth(token))
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }
}
