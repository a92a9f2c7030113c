use crate::{
    error::SyncError,
    spotify::client::AuthorizedClient,
    types::{CurrentlyPlayingResponse, PlaybackState, PlayerResponse, Track},
};

/// `GET /me/player/currently-playing`. `None` when nothing is playing.
pub async fn current_track(client: &AuthorizedClient) -> Result<Option<Track>, SyncError> {
    let res: Option<CurrentlyPlayingResponse> =
        client.get_json("/me/player/currently-playing").await?;
    Ok(res.and_then(CurrentlyPlayingResponse::into_track))
}

/// `GET /me/player`. `None` when no device is active.
pub async fn playback_state(
    client: &AuthorizedClient,
) -> Result<Option<PlaybackState>, SyncError> {
    let res: Option<PlayerResponse> = client.get_json("/me/player").await?;
    Ok(res.map(PlaybackState::from))
}
