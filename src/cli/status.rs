use tabled::Table;

use crate::{
    error,
    types::{PlaybackState, StatusTableRow, Track},
    utils, warning,
};

pub async fn status() {
    let sync = super::load_synchronizer().await;
    super::restore(&sync).await;

    let pb = super::spinner("Fetching player state...");
    let result = sync.poll_now().await;
    pb.finish_and_clear();
    if let Err(e) = result {
        error!("Cannot fetch player state. Err: {}", e);
    }

    let track = sync.current_track();
    let state = sync.playback_state();
    if track.is_none() && state.is_none() {
        warning!("Nothing is playing on any device");
        return;
    }

    println!("{}", Table::new(status_rows(track.as_ref(), state.as_ref())));
}

pub(super) fn status_rows(track: Option<&Track>, state: Option<&PlaybackState>) -> Vec<StatusTableRow> {
    let mut rows = Vec::new();
    let mut push = |field: &str, value: String| {
        rows.push(StatusTableRow {
            field: field.to_string(),
            value,
        })
    };

    match track {
        Some(track) => {
            push("Track", track.name.clone());
            push("Artists", track.artists_display());
            push("Album", track.album_name.clone());
            push(
                "Progress",
                format!(
                    "{} {} / {}",
                    utils::progress_bar(track.progress_ms, track.duration_ms, 20),
                    utils::format_ms(track.progress_ms),
                    utils::format_ms(track.duration_ms)
                ),
            );
            if let Some(url) = &track.external_url {
                push("Link", url.clone());
            }
        }
        None => push("Track", "-".to_string()),
    }

    if let Some(state) = state {
        let playing = if state.is_playing { "playing" } else { "paused" };
        push("State", playing.to_string());
        push("Shuffle", if state.shuffle_state { "on" } else { "off" }.to_string());
        push("Repeat", state.repeat_state.to_string());
        push("Volume", format!("{}%", state.volume_percent));
        if let Some(device) = state.device_name.as_ref().or(state.device_id.as_ref()) {
            push("Device", device.clone());
        }
    }
    rows
}
