use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionKind;
use crate::error::{StoreError, StoreResult};
use crate::store::EntityStore;

/// Unique identifier of a dispatcher subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Published after every transition that produced a new snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotEvent {
    /// Position of the transition, starting at 1.
    pub sequence: u64,
    /// When the transition was applied.
    pub applied_at: DateTime<Utc>,
    /// The action that produced the snapshot.
    pub kind: ActionKind,
    /// The new snapshot.
    pub snapshot: Arc<EntityStore>,
}

/// Receiving end of a dispatcher subscription.
///
/// Dropping the stream ends the subscription; the dispatcher prunes it on
/// its next publish.
#[derive(Debug)]
pub struct SnapshotStream {
    subscription_id: SubscriptionId,
    rx: Receiver<SnapshotEvent>,
}

impl SnapshotStream {
    pub(crate) fn new(subscription_id: SubscriptionId, rx: Receiver<SnapshotEvent>) -> Self {
        Self {
            subscription_id,
            rx,
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Number of events waiting to be received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    /// Returns `Disconnected` once the dispatcher is gone and the buffer is
    /// drained.
    pub fn recv(&self) -> StoreResult<SnapshotEvent> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event if one is buffered.
    ///
    /// # Errors
    /// Returns `Disconnected` once the dispatcher is gone and the buffer is
    /// drained.
    pub fn try_recv(&self) -> StoreResult<Option<SnapshotEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    /// Returns `Timeout` if nothing arrives in time, `Disconnected` if the
    /// dispatcher is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> StoreResult<SnapshotEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StoreError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }
}

fn disconnected() -> StoreError {
    StoreError::Disconnected {
        path: "snapshot_stream".to_string(),
    }
}
