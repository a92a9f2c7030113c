use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    error,
    events::{EventKind, SyncEvent},
    info,
    types::{PlaybackState, Track},
    utils,
};

pub async fn watch() {
    let sync = super::load_synchronizer().await;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{msg}\n[{bar:40.green/blue}] {prefix}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─"),
    );
    pb.set_message("Waiting for Spotify...");

    let bar = pb.clone();
    sync.subscribe(EventKind::TrackChanged, move |event| {
        if let SyncEvent::TrackChanged(track) = event {
            show_track(&bar, track.as_ref());
        }
    });
    let bar = pb.clone();
    sync.subscribe(EventKind::PlaybackStateChanged, move |event| {
        if let SyncEvent::PlaybackStateChanged(state) = event {
            bar.println(describe_state(state));
        }
    });
    let bar = pb.clone();
    sync.subscribe(EventKind::ConnectionChanged, move |event| {
        if let SyncEvent::ConnectionChanged(connected) = event {
            let line = if *connected {
                format!("[{}] Connected to Spotify", "✓".green().bold())
            } else {
                format!(
                    "[{}] Disconnected. Run {} auth to reconnect.",
                    "!".yellow().bold(),
                    env!("CARGO_PKG_NAME")
                )
            };
            bar.println(line);
        }
    });

    sync.watch_config();
    if let Err(e) = sync.initialize().await {
        pb.finish_and_clear();
        error!("Cannot restore session. Err: {}", e);
    }
    if !sync.is_polling() {
        pb.finish_and_clear();
        error!(
            "Not authorized with Spotify. Run {} auth first.",
            env!("CARGO_PKG_NAME")
        );
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        pb.println(format!("Cannot listen for Ctrl-C: {}", e));
    }

    sync.shutdown().await;
    pb.finish_and_clear();
    info!("Stopped watching");
}

fn show_track(pb: &ProgressBar, track: Option<&Track>) {
    match track {
        Some(track) => {
            pb.set_message(format!(
                "{} {} {}",
                track.name.bold(),
                "by".dimmed(),
                track.artists_display()
            ));
            pb.set_length(track.duration_ms);
            pb.set_position(track.progress_ms.min(track.duration_ms));
            pb.set_prefix(format!(
                "{} / {}",
                utils::format_ms(track.progress_ms),
                utils::format_ms(track.duration_ms)
            ));
        }
        None => {
            pb.set_message("Nothing playing");
            pb.set_length(0);
            pb.set_position(0);
            pb.set_prefix("");
        }
    }
}

fn describe_state(state: &PlaybackState) -> String {
    let playing = if state.is_playing {
        "▶ playing".green()
    } else {
        "⏸ paused".yellow()
    };
    format!(
        "{}  shuffle {}  repeat {}  volume {}%",
        playing,
        if state.shuffle_state { "on" } else { "off" },
        state.repeat_state,
        state.volume_percent
    )
}
