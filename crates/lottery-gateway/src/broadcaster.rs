//! Snapshot fan-out to every connected subscriber.

use crate::protocol::ServerMessage;
use lottery_core::{Broadcaster, RoundSnapshot};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Serialized `gameUpdate` frame shared by all receivers
pub type Frame = Arc<str>;

/// Broadcast channel behind the `Broadcaster` port.
///
/// Each snapshot is serialized once; every connection holds a receiver.
/// Lagging receivers skip stale snapshots rather than block the sender.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    tx: broadcast::Sender<Frame>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Broadcaster for WsBroadcaster {
    fn broadcast(&self, snapshot: &RoundSnapshot) {
        let frame: Frame = ServerMessage::GameUpdate(snapshot.clone()).to_json().into();
        // no receivers is not an error: nobody is watching yet
        let delivered = self.tx.send(frame).unwrap_or(0);
        trace!(round_id = snapshot.round_id, delivered, "Snapshot broadcast");
    }
}
