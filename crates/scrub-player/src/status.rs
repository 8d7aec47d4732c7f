//! Observable published state.
//!
//! The engine context owns the only [`StatusBoard`] and publishes after each
//! mutation. Readers hold a [`StatusReader`] and either take snapshots or subscribe
//! for change notifications.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
pub use scrub_player_types::{PlaybackEndReason, PlayerStatus, TransportState};

#[derive(Default)]
struct Shared {
    latest: PlayerStatus,
    subscribers: Vec<Sender<PlayerStatus>>,
}

/// Write side. Not `Clone`: exactly one publisher.
pub struct StatusBoard {
    shared: Arc<Mutex<Shared>>,
}

/// Read side, cheap to clone.
#[derive(Clone)]
pub struct StatusReader {
    shared: Arc<Mutex<Shared>>,
}

impl StatusBoard {
    pub fn new() -> (Self, StatusReader) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: shared.clone(),
            },
            StatusReader { shared },
        )
    }

    /// Replace the published state and notify subscribers if it changed.
    ///
    /// Returns `true` when a change was published.
    pub fn publish(&self, status: PlayerStatus) -> bool {
        let Ok(mut g) = self.shared.lock() else {
            return false;
        };
        if g.latest == status {
            return false;
        }
        g.subscribers
            .retain(|tx| tx.send(status.clone()).is_ok());
        g.latest = status;
        true
    }

    pub fn latest(&self) -> PlayerStatus {
        self.shared
            .lock()
            .map(|g| g.latest.clone())
            .unwrap_or_default()
    }
}

impl Drop for StatusBoard {
    /// Subscriptions end with the publisher.
    fn drop(&mut self) {
        if let Ok(mut g) = self.shared.lock() {
            g.subscribers.clear();
        }
    }
}

impl StatusReader {
    pub fn snapshot(&self) -> PlayerStatus {
        self.shared
            .lock()
            .map(|g| g.latest.clone())
            .unwrap_or_default()
    }

    /// Receive every published change from now on.
    ///
    /// The current state is delivered first. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<PlayerStatus> {
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut g) = self.shared.lock() {
            let _ = tx.send(g.latest.clone());
            g.subscribers.push(tx);
        }
        rx
    }
}
