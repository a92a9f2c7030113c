use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    debug,
    error::SyncError,
    events::{EventBus, SyncEvent},
    spotify::{client::AuthorizedClient, player},
    types::{PlaybackState, Track, states_equal, tracks_equal},
    warning,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Polls the current track and playback state on a fixed interval and emits
/// change events.
///
/// The loop awaits each tick before waiting for the next one and skips ticks
/// it missed, so a slow Spotify response never stacks ticks on top of each
/// other. A failing tick is logged and the loop carries on.
pub struct PlaybackPoller {
    client: Arc<AuthorizedClient>,
    events: Arc<EventBus>,
    interval: Mutex<Duration>,
    last_track: Mutex<Option<Track>>,
    last_state: Mutex<Option<PlaybackState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackPoller {
    pub fn new(client: Arc<AuthorizedClient>, events: Arc<EventBus>, interval: Duration) -> Self {
        Self {
            client,
            events,
            interval: Mutex::new(interval),
            last_track: Mutex::new(None),
            last_state: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Changes the interval, restarting the loop if it is running.
    pub fn set_interval(self: &Arc<Self>, interval: Duration) {
        *self.interval.lock().unwrap_or_else(|e| e.into_inner()) = interval;
        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        task.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Starts the polling loop. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let period = self.interval();
        let weak = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(poller) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = poller.poll_once().await {
                    warning!("Polling Spotify failed: {}", e);
                }
            }
        }));

        debug!("Polling started every {} ms", period.as_millis());
        true
    }

    /// Stops the loop. A tick in progress is dropped.
    pub fn stop(&self) -> bool {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        match handle {
            Some(handle) => {
                handle.abort();
                debug!("Polling stopped");
                true
            }
            None => false,
        }
    }

    /// Forgets the last-known snapshots so the next poll emits again.
    pub fn reset(&self) {
        *self.last_track.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.last_state.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Fetches track and state concurrently and runs change detection on
    /// both. Each half is processed even if the other failed; the first
    /// error is returned.
    pub async fn poll_once(&self) -> Result<(), SyncError> {
        let (track, state) = tokio::join!(
            player::current_track(&self.client),
            player::playback_state(&self.client)
        );

        let track_result = track.map(|track| {
            self.observe_track(track);
        });
        let state_result = state.map(|state| {
            if let Some(state) = state {
                self.observe_state(state);
            }
        });
        track_result.and(state_result)
    }

    /// Emits `TrackChanged` unless `track` has the same `(id, progress_ms)`
    /// as the last emitted one. Returns whether an event was emitted.
    pub fn observe_track(&self, track: Option<Track>) -> bool {
        {
            let mut last = self.last_track.lock().unwrap_or_else(|e| e.into_inner());
            if tracks_equal(last.as_ref(), track.as_ref()) {
                return false;
            }
            *last = track.clone();
        }
        self.events.emit(SyncEvent::TrackChanged(track));
        true
    }

    /// Emits `PlaybackStateChanged` unless play state, shuffle, repeat and
    /// volume all match the last emitted state.
    pub fn observe_state(&self, state: PlaybackState) -> bool {
        {
            let mut last = self.last_state.lock().unwrap_or_else(|e| e.into_inner());
            if states_equal(last.as_ref(), Some(&state)) {
                return false;
            }
            *last = Some(state.clone());
        }
        self.events.emit(SyncEvent::PlaybackStateChanged(state));
        true
    }

    pub fn current_track(&self) -> Option<Track> {
        self.last_track
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.last_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
