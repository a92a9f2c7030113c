//! Typed publish/subscribe for synchronizer events.
//!
//! Each [`EventKind`] keeps its own ordered observer list. [`EventBus::emit`]
//! delivers synchronously, in subscription order, on the task that detected
//! the change. Handlers run after the bus lock is released, so a handler may
//! subscribe or unsubscribe without deadlocking.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::types::{PlaybackState, Track};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    TrackChanged(Option<Track>),
    PlaybackStateChanged(PlaybackState),
    ConnectionChanged(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TrackChanged,
    PlaybackStateChanged,
    ConnectionChanged,
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::TrackChanged(_) => EventKind::TrackChanged,
            SyncEvent::PlaybackStateChanged(_) => EventKind::PlaybackStateChanged,
            SyncEvent::ConnectionChanged(_) => EventKind::ConnectionChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    observers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        observers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        for list in observers.values_mut() {
            if let Some(pos) = list.iter().position(|(sub, _)| *sub == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn emit(&self, event: SyncEvent) {
        let handlers: Vec<Handler> = {
            let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
            match observers.get(&event.kind()) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };

        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
        observers.get(&kind).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        observers.clear();
    }
}
