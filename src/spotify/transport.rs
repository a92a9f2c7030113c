use std::{sync::Arc, time::Duration};

use reqwest::{Method, header::CONTENT_LENGTH};
use serde::Deserialize;

use crate::{
    debug,
    error::SyncError,
    spotify::{client::AuthorizedClient, poller::PlaybackPoller},
    types::RepeatState,
    warning,
};

pub const DEFAULT_COMMAND_REFRESH_DELAY: Duration = Duration::from_millis(100);

pub const ACTIONS: [&str; 8] = [
    "play", "pause", "next", "previous", "seek", "volume", "shuffle", "repeat",
];

/// Loosely typed parameters accompanying an action name, as a presentation
/// shell sends them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlParams {
    pub position_ms: Option<u64>,
    pub volume_percent: Option<u64>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Next,
    Previous,
    Seek { position_ms: u64 },
    Volume { volume_percent: u8 },
    Shuffle { state: bool },
    Repeat { state: RepeatState },
}

impl PlaybackCommand {
    /// Validates an action name and its parameters without touching the
    /// network.
    pub fn parse(action: &str, params: &ControlParams) -> Result<Self, SyncError> {
        let command = match action {
            "play" => PlaybackCommand::Play,
            "pause" => PlaybackCommand::Pause,
            "next" => PlaybackCommand::Next,
            "previous" => PlaybackCommand::Previous,
            "seek" => PlaybackCommand::Seek {
                position_ms: params
                    .position_ms
                    .ok_or_else(|| invalid("seek requires positionMs"))?,
            },
            "volume" => {
                let volume = params
                    .volume_percent
                    .ok_or_else(|| invalid("volume requires volumePercent"))?;
                if volume > 100 {
                    return Err(invalid(&format!(
                        "volumePercent must be between 0 and 100, got {}",
                        volume
                    )));
                }
                PlaybackCommand::Volume {
                    volume_percent: volume as u8,
                }
            }
            "shuffle" => {
                let state = params
                    .state
                    .as_deref()
                    .ok_or_else(|| invalid("shuffle requires state"))?;
                let state = state.parse::<bool>().map_err(|_| {
                    invalid(&format!(
                        "shuffle state must be true or false, got '{}'",
                        state
                    ))
                })?;
                PlaybackCommand::Shuffle { state }
            }
            "repeat" => {
                let state = params
                    .state
                    .as_deref()
                    .ok_or_else(|| invalid("repeat requires state"))?;
                PlaybackCommand::Repeat {
                    state: state.parse::<RepeatState>().map_err(|e| invalid(&e))?,
                }
            }
            other => return Err(invalid(&format!("unknown action '{}'", other))),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackCommand::Play => "play",
            PlaybackCommand::Pause => "pause",
            PlaybackCommand::Next => "next",
            PlaybackCommand::Previous => "previous",
            PlaybackCommand::Seek { .. } => "seek",
            PlaybackCommand::Volume { .. } => "volume",
            PlaybackCommand::Shuffle { .. } => "shuffle",
            PlaybackCommand::Repeat { .. } => "repeat",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            PlaybackCommand::Next | PlaybackCommand::Previous => Method::POST,
            _ => Method::PUT,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            PlaybackCommand::Play => "/me/player/play",
            PlaybackCommand::Pause => "/me/player/pause",
            PlaybackCommand::Next => "/me/player/next",
            PlaybackCommand::Previous => "/me/player/previous",
            PlaybackCommand::Seek { .. } => "/me/player/seek",
            PlaybackCommand::Volume { .. } => "/me/player/volume",
            PlaybackCommand::Shuffle { .. } => "/me/player/shuffle",
            PlaybackCommand::Repeat { .. } => "/me/player/repeat",
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            PlaybackCommand::Seek { position_ms } => vec![("position_ms", position_ms.to_string())],
            PlaybackCommand::Volume { volume_percent } => {
                vec![("volume_percent", volume_percent.to_string())]
            }
            PlaybackCommand::Shuffle { state } => vec![("state", state.to_string())],
            PlaybackCommand::Repeat { state } => vec![("state", state.to_string())],
            _ => Vec::new(),
        }
    }
}

fn invalid(message: &str) -> SyncError {
    SyncError::InvalidAction(message.to_string())
}

/// Sends transport commands and lets the poller converge on the server's
/// state shortly afterwards.
pub struct TransportController {
    client: Arc<AuthorizedClient>,
    poller: Arc<PlaybackPoller>,
    refresh_delay: Duration,
}

impl TransportController {
    pub fn new(
        client: Arc<AuthorizedClient>,
        poller: Arc<PlaybackPoller>,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            client,
            poller,
            refresh_delay,
        }
    }

    pub async fn control_playback(
        &self,
        action: &str,
        params: &ControlParams,
    ) -> Result<(), SyncError> {
        let command = PlaybackCommand::parse(action, params)?;
        self.execute(&command).await
    }

    pub async fn execute(&self, command: &PlaybackCommand) -> Result<(), SyncError> {
        let url = self.client.url(command.path());
        let method = command.method();
        let query = command.query();

        self.client
            .send(|http, token| {
                http.request(method.clone(), &url)
                    .query(&query)
                    .bearer_auth(token)
                    .header(CONTENT_LENGTH, 0)
            })
            .await?;
        debug!("Sent '{}' to Spotify", command.name());

        // No optimistic update: re-read what the server settled on.
        let poller = Arc::clone(&self.poller);
        let delay = self.refresh_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = poller.poll_once().await {
                warning!("Refreshing state after command failed: {}", e);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ControlParams {
        ControlParams::default()
    }

    #[test]
    fn unknown_action_is_invalid() {
        let err = PlaybackCommand::parse("bogus", &params()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidAction(_)));
    }

    #[test]
    fn action_names_are_case_sensitive() {
        assert!(PlaybackCommand::parse("Play", &params()).is_err());
    }

    #[test]
    fn every_listed_action_parses_with_its_parameters() {
        let params = ControlParams {
            position_ms: Some(1000),
            volume_percent: Some(40),
            state: Some("true".to_string()),
        };
        for action in ACTIONS {
            let params = if action == "repeat" {
                ControlParams {
                    state: Some("context".to_string()),
                    ..params.clone()
                }
            } else {
                params.clone()
            };
            let command = PlaybackCommand::parse(action, &params).unwrap();
            assert_eq!(command.name(), action);
        }
    }

    #[test]
    fn seek_requires_position() {
        assert!(PlaybackCommand::parse("seek", &params()).is_err());
        let command = PlaybackCommand::parse(
            "seek",
            &ControlParams {
                position_ms: Some(65_000),
                ..params()
            },
        )
        .unwrap();
        assert_eq!(command.query(), vec![("position_ms", "65000".to_string())]);
        assert_eq!(command.method(), Method::PUT);
    }

    #[test]
    fn volume_is_bounded() {
        let over = ControlParams {
            volume_percent: Some(101),
            ..params()
        };
        assert!(PlaybackCommand::parse("volume", &over).is_err());

        let max = ControlParams {
            volume_percent: Some(100),
            ..params()
        };
        assert_eq!(
            PlaybackCommand::parse("volume", &max).unwrap(),
            PlaybackCommand::Volume { volume_percent: 100 }
        );
    }

    #[test]
    fn shuffle_and_repeat_states() {
        let bad = ControlParams {
            state: Some("maybe".to_string()),
            ..params()
        };
        assert!(PlaybackCommand::parse("shuffle", &bad).is_err());
        assert!(PlaybackCommand::parse("repeat", &bad).is_err());

        let off = ControlParams {
            state: Some("off".to_string()),
            ..params()
        };
        let command = PlaybackCommand::parse("repeat", &off).unwrap();
        assert_eq!(command.query(), vec![("state", "off".to_string())]);
    }

    #[test]
    fn skip_commands_use_post() {
        assert_eq!(PlaybackCommand::Next.method(), Method::POST);
        assert_eq!(PlaybackCommand::Previous.method(), Method::POST);
        assert_eq!(PlaybackCommand::Pause.method(), Method::PUT);
        assert!(PlaybackCommand::Play.query().is_empty());
    }

    #[test]
    fn params_deserialize_from_camel_case() {
        let params: ControlParams =
            serde_json::from_value(serde_json::json!({ "volumePercent": 30 })).unwrap();
        assert_eq!(params.volume_percent, Some(30));
    }
}
