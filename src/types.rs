use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Immutable snapshot of the track currently loaded on the remote player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artist_names: Vec<String>,
    pub album_name: String,
    pub album_art_url: Option<String>,
    pub duration_ms: u64,
    pub progress_ms: u64,
    pub is_playing: bool,
    pub uri: String,
    pub external_url: Option<String>,
}

impl Track {
    /// Change-detection equality: same track at the same position.
    pub fn same_moment(&self, other: &Track) -> bool {
        self.id == other.id && self.progress_ms == other.progress_ms
    }

    pub fn artists_display(&self) -> String {
        self.artist_names.join(", ")
    }
}

/// Compares two optional tracks with the `(id, progress_ms)` rule. Two
/// absent tracks are equal.
pub fn tracks_equal(a: Option<&Track>, b: Option<&Track>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_moment(b),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatState {
    #[default]
    Off,
    Track,
    Context,
}

impl RepeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatState::Off => "off",
            RepeatState::Track => "track",
            RepeatState::Context => "context",
        }
    }
}

impl fmt::Display for RepeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(RepeatState::Off),
            "track" => Ok(RepeatState::Track),
            "context" => Ok(RepeatState::Context),
            other => Err(format!(
                "unknown repeat state '{}', expected off, track or context",
                other
            )),
        }
    }
}

/// Immutable snapshot of the remote player's controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub shuffle_state: bool,
    pub repeat_state: RepeatState,
    pub progress_ms: u64,
    pub volume_percent: u8,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

impl PlaybackState {
    /// Change-detection equality. Progress is ignored so a playing track does
    /// not produce an event every tick.
    pub fn same_controls(&self, other: &PlaybackState) -> bool {
        self.is_playing == other.is_playing
            && self.shuffle_state == other.shuffle_state
            && self.repeat_state == other.repeat_state
            && self.volume_percent == other.volume_percent
    }
}

pub fn states_equal(a: Option<&PlaybackState>, b: Option<&PlaybackState>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_controls(b),
        _ => false,
    }
}

#[derive(Tabled)]
pub struct StatusTableRow {
    pub field: String,
    pub value: String,
}

/// Body returned by the token endpoint for both grant types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Query parameters Spotify appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentlyPlayingResponse {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<TrackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackItem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerResponse {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub shuffle_state: bool,
    #[serde(default)]
    pub repeat_state: RepeatState,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub device: Option<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

impl CurrentlyPlayingResponse {
    /// Converts the wire body into a [`Track`]. Returns `None` when nothing
    /// is loaded (e.g. during an ad break the `item` is null).
    pub fn into_track(self) -> Option<Track> {
        let item = self.item?;
        let (album_name, album_art_url) = match item.album {
            Some(album) => {
                let art = album.images.into_iter().next().map(|image| image.url);
                (album.name, art)
            }
            None => (String::new(), None),
        };

        Some(Track {
            // local files have no id; their uri is unique enough
            id: item.id.unwrap_or_else(|| item.uri.clone()),
            name: item.name,
            artist_names: item.artists.into_iter().map(|a| a.name).collect(),
            album_name,
            album_art_url,
            duration_ms: item.duration_ms,
            progress_ms: self.progress_ms.unwrap_or(0),
            is_playing: self.is_playing,
            uri: item.uri,
            external_url: item.external_urls.and_then(|urls| urls.spotify),
        })
    }
}

impl From<PlayerResponse> for PlaybackState {
    fn from(res: PlayerResponse) -> Self {
        let (device_id, device_name, volume_percent) = match res.device {
            Some(device) => (device.id, device.name, device.volume_percent.unwrap_or(0)),
            None => (None, None, 0),
        };

        PlaybackState {
            is_playing: res.is_playing,
            shuffle_state: res.shuffle_state,
            repeat_state: res.repeat_state,
            progress_ms: res.progress_ms.unwrap_or(0),
            volume_percent,
            device_id,
            device_name,
        }
    }
}
