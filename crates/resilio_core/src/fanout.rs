//! Fan-out of committed mutations to every connected client session.
//!
//! Delivery is best-effort to sessions subscribed at publish time. A session that falls more than
//! the channel capacity behind, or connects late, re-synchronizes from the store instead of
//! replaying history.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::domain::{Incident, IncidentId};

pub const DEFAULT_FANOUT_CAPACITY: usize = 1024;

/// Event payload: full record for create/update, id-only tombstone for delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncidentEvent {
    Created { record: Incident },
    Updated { record: Incident },
    Deleted { id: IncidentId },
}

impl IncidentEvent {
    pub fn incident_id(&self) -> IncidentId {
        match self {
            IncidentEvent::Created { record } | IncidentEvent::Updated { record } => record.id,
            IncidentEvent::Deleted { id } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IncidentEvent::Created { .. } => "created",
            IncidentEvent::Updated { .. } => "updated",
            IncidentEvent::Deleted { .. } => "deleted",
        }
    }
}

/// Why a subscription could not yield the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedGap {
    /// Events were dropped for this subscriber; its view must be rebuilt from the store.
    Lagged(u64),
    /// The publisher is gone.
    Closed,
}

pub struct Fanout {
    sender: broadcast::Sender<IncidentEvent>,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers. Returns how many received it.
    pub fn publish(&self, event: IncidentEvent) -> usize {
        let id = event.incident_id();
        let kind = event.name();
        // No subscribers is not an error.
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::debug!(incident_id = id, event = kind, delivered, "broadcast");
        delivered
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_FANOUT_CAPACITY)
    }
}

/// One session's view of the broadcast topic. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<IncidentEvent>,
}

impl Subscription {
    /// Next queued event without waiting. `Ok(None)` means the queue is drained.
    pub fn try_next(&mut self) -> Result<Option<IncidentEvent>, FeedGap> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(n)) => Err(FeedGap::Lagged(n)),
            Err(TryRecvError::Closed) => Err(FeedGap::Closed),
        }
    }

    /// Block the calling thread until the next event. Must not be called from an async runtime.
    pub fn next_blocking(&mut self) -> Result<IncidentEvent, FeedGap> {
        self.receiver.blocking_recv().map_err(|e| match e {
            RecvError::Lagged(n) => FeedGap::Lagged(n),
            RecvError::Closed => FeedGap::Closed,
        })
    }
}
