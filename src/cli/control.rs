use std::time::Duration;

use tabled::Table;
use tokio::time::sleep;

use crate::{error, spotify::transport::ControlParams, success, warning};

pub async fn control(action: &str, params: ControlParams) {
    let sync = super::load_synchronizer().await;
    super::restore(&sync).await;

    if let Err(e) = sync.control_playback(action, &params).await {
        error!("Cannot send '{}'. Err: {}", action, e);
    }
    success!("Sent '{}'", action);

    // give the player a moment to settle before reading it back
    sleep(Duration::from_millis(300)).await;
    match sync.poll_now().await {
        Ok(()) => {
            let track = sync.current_track();
            let state = sync.playback_state();
            println!(
                "{}",
                Table::new(super::status::status_rows(track.as_ref(), state.as_ref()))
            );
        }
        Err(e) => warning!("Cannot read back player state. Err: {}", e),
    }
    sync.shutdown().await;
}
