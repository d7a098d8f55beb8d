//! Notifier
//!
//! Best-effort, at-most-once delivery of events to connected users. A send
//! never blocks and never fails the caller; it reports whether the
//! transport accepted the event.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::debug;

use common::{MatchEvent, UserId};

/// Result of handing an event to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Transport accepted the event
    Accepted,
    /// User has no live connection
    NoConnection,
    /// Connection existed but its receiver is gone
    Closed,
}

impl Delivery {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Delivery::Accepted)
    }
}

/// Delivers events to specific users
pub trait Notifier: Send + Sync {
    fn send(&self, user_id: &UserId, event: &MatchEvent) -> Delivery;
}

/// In-process notifier backed by one unbounded channel per connected user
#[derive(Default)]
pub struct ChannelNotifier {
    connections: RwLock<HashMap<UserId, mpsc::UnboundedSender<MatchEvent>>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any previous one for the user
    pub fn connect(&self, user_id: &UserId) -> mpsc::UnboundedReceiver<MatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().insert(user_id.clone(), tx);
        debug!(user = %user_id, "User connected");
        rx
    }

    pub fn disconnect(&self, user_id: &UserId) {
        if self.connections.write().remove(user_id).is_some() {
            debug!(user = %user_id, "User disconnected");
        }
    }

    pub fn connected(&self) -> usize {
        self.connections.read().len()
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, user_id: &UserId, event: &MatchEvent) -> Delivery {
        let sender = match self.connections.read().get(user_id) {
            Some(tx) => tx.clone(),
            None => return Delivery::NoConnection,
        };

        match sender.send(event.clone()) {
            Ok(()) => Delivery::Accepted,
            Err(_) => {
                self.connections.write().remove(user_id);
                Delivery::Closed
            }
        }
    }
}

/// Notifier that records every send, for tests
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, MatchEvent)>>,
    offline: HashSet<UserId>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat a user as not connected
    pub fn with_offline(mut self, user_id: impl Into<UserId>) -> Self {
        self.offline.insert(user_id.into());
        self
    }

    /// All accepted sends, in order
    pub fn sent(&self) -> Vec<(UserId, MatchEvent)> {
        self.sent.lock().clone()
    }

    /// Accepted events for one user
    pub fn sent_to(&self, user_id: &UserId) -> Vec<MatchEvent> {
        self.sent
            .lock()
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, user_id: &UserId, event: &MatchEvent) -> Delivery {
        if self.offline.contains(user_id) {
            return Delivery::NoConnection;
        }
        self.sent.lock().push((user_id.clone(), event.clone()));
        Delivery::Accepted
    }
}
