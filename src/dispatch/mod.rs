//! Ordered application of actions and snapshot change notification.
//!
//! The dispatcher owns the current snapshot. Actions are applied one at a
//! time under a writer lock; each successful transition is published to
//! every subscriber with a non-blocking `try_send`, so a slow subscriber
//! never stalls a writer. Events that do not fit a subscriber's buffer are
//! dropped and counted.

mod stream;

pub use stream::{SnapshotEvent, SnapshotStream, SubscriptionId};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::action::Action;
use crate::error::{StoreError, StoreResult};
use crate::store::EntityStore;

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Per-subscription stream buffer capacity.
    pub stream_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 256,
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    tx: Sender<SnapshotEvent>,
}

/// Owner of the current store snapshot.
#[derive(Debug)]
pub struct StoreDispatcher {
    cfg: DispatcherConfig,
    current: RwLock<Arc<EntityStore>>,
    sequence: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    dropped_events: AtomicU64,
}

impl StoreDispatcher {
    /// Creates a dispatcher starting from `store`.
    #[must_use]
    pub fn new(store: EntityStore, cfg: DispatcherConfig) -> Self {
        Self {
            cfg,
            current: RwLock::new(Arc::new(store)),
            sequence: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// The current snapshot.
    ///
    /// # Errors
    /// Returns an internal error if a writer panicked while holding the lock.
    pub fn snapshot(&self) -> StoreResult<Arc<EntityStore>> {
        let current = self
            .current
            .read()
            .map_err(|_| StoreError::internal("snapshot lock poisoned"))?;
        Ok(Arc::clone(&current))
    }

    /// Applies `action` to the current snapshot and returns the snapshot
    /// that is current afterwards.
    ///
    /// Unrecognized actions and failed transitions leave the current
    /// snapshot in place (the same `Arc`) and publish nothing.
    ///
    /// # Errors
    /// Returns the transition's error, or an internal error on a poisoned
    /// lock.
    pub fn dispatch(&self, action: &Action) -> StoreResult<Arc<EntityStore>> {
        let mut current = self
            .current
            .write()
            .map_err(|_| StoreError::internal("snapshot lock poisoned"))?;

        if !action.is_recognized() {
            debug!("ignored unrecognized action");
            return Ok(Arc::clone(&current));
        }

        let next = Arc::new(current.apply(action)?);
        *current = Arc::clone(&next);

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish(&SnapshotEvent {
            sequence,
            applied_at: Utc::now(),
            kind: action.kind(),
            snapshot: Arc::clone(&next),
        })?;

        Ok(next)
    }

    /// Opens a stream receiving every snapshot published from now on.
    ///
    /// # Errors
    /// Returns an internal error on a poisoned lock.
    pub fn subscribe(&self) -> StoreResult<SnapshotStream> {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<SnapshotEvent>(self.cfg.stream_capacity.max(1));

        self.subscribers
            .lock()
            .map_err(|_| StoreError::internal("subscriber lock poisoned"))?
            .push(Subscriber { id, tx });

        debug!(subscription = %id, "subscribed to snapshots");
        Ok(SnapshotStream::new(id, rx))
    }

    /// Number of transitions applied so far.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Events dropped because a subscriber's buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map_or(0, |subs| subs.len())
    }

    fn publish(&self, event: &SnapshotEvent) -> StoreResult<()> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| StoreError::internal("subscriber lock poisoned"))?;

        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!(subscription = %sub.id, sequence = event.sequence, "dropped snapshot event");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(subscription = %sub.id, "pruned disconnected subscriber");
                false
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::schema::{EntitySchema, SchemaMap};
    use serde_json::json;
    use std::time::Duration;

    fn dispatcher(stream_capacity: usize) -> StoreDispatcher {
        let schemas = SchemaMap::new()
            .entity("users", EntitySchema::new())
            .entity("articles", EntitySchema::new().one("author", "users"));
        StoreDispatcher::new(
            EntityStore::new(schemas).unwrap(),
            DispatcherConfig { stream_capacity },
        )
    }

    #[test]
    fn publishes_in_order() {
        let dispatcher = dispatcher(8);
        let stream = dispatcher.subscribe().unwrap();

        dispatcher
            .dispatch(&Action::upsert_one("users", json!({"id": "u1"})))
            .unwrap();
        dispatcher
            .dispatch(&Action::delete_one("users", "u1"))
            .unwrap();

        let first = stream.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = stream.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.kind, ActionKind::UpsertOne);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.kind, ActionKind::DeleteOne);
        assert!(Arc::ptr_eq(&second.snapshot, &dispatcher.snapshot().unwrap()));
    }

    #[test]
    fn failures_and_unrecognized_keep_snapshot_identity() {
        let dispatcher = dispatcher(8);
        let stream = dispatcher.subscribe().unwrap();
        let before = dispatcher.snapshot().unwrap();

        let after = dispatcher.dispatch(&Action::Unrecognized).unwrap();
        assert!(Arc::ptr_eq(&before, &after));

        let err = dispatcher
            .dispatch(&Action::upsert_one("ghosts", json!({"id": "g"})))
            .unwrap_err();
        assert!(err.is_unknown_schema());
        assert!(Arc::ptr_eq(&before, &dispatcher.snapshot().unwrap()));

        assert!(stream.try_recv().unwrap().is_none());
        assert_eq!(dispatcher.sequence(), 0);
    }

    #[test]
    fn full_buffers_drop_events() {
        let dispatcher = dispatcher(1);
        let stream = dispatcher.subscribe().unwrap();

        for id in ["u1", "u2", "u3"] {
            dispatcher
                .dispatch(&Action::upsert_one("users", json!({"id": id})))
                .unwrap();
        }

        assert_eq!(dispatcher.dropped_events(), 2);
        assert_eq!(stream.recv().unwrap().sequence, 1);
        assert!(stream.try_recv().unwrap().is_none());
    }

    #[test]
    fn dropped_streams_are_pruned() {
        let dispatcher = dispatcher(4);
        let stream = dispatcher.subscribe().unwrap();
        assert_eq!(dispatcher.subscriber_count(), 1);
        drop(stream);

        dispatcher
            .dispatch(&Action::upsert_one("users", json!({"id": "u1"})))
            .unwrap();
        assert_eq!(dispatcher.subscriber_count(), 0);
        assert_eq!(dispatcher.dropped_events(), 0);
    }

    #[test]
    fn recv_timeout_reports_timeout() {
        let dispatcher = dispatcher(4);
        let stream = dispatcher.subscribe().unwrap();
        let err = stream.recv_timeout(Duration::from_millis(5)).unwrap_err();
        assert!(err.is_retryable());
    }
}
