//! Subscription registry and broadcast dispatcher.
//!
//! The registry maps a normalized prefix to the live connections subscribed
//! under it. Each connection registers exactly one prefix for its lifetime
//! and is addressed by a [`ConnectionId`].
//!
//! Matching is a linear scan over the registered prefixes: dispatching one
//! event costs O(distinct prefixes). Every registered prefix is tested
//! independently; there is no shared-prefix trie.

use flow_ids::Prefix;
use flow_types::{now_micros, Notification};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, Mutex, MutexGuard, RwLock};
use uuid::Uuid;

/// Identifies one live subscriber connection.
pub type ConnectionId = Uuid;

type Bucket = HashMap<ConnectionId, mpsc::Sender<String>>;

/// Live prefix subscriptions, shared between connection tasks and the
/// dispatcher.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    buckets: Arc<RwLock<HashMap<Prefix, Bucket>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection under `prefix` and returns its id.
    ///
    /// The prefix must already be resolved (16 or 32 lowercase hex
    /// characters). The registry holds the only long-lived sender for the
    /// connection's outbound queue; once it is unregistered the connection's
    /// receiver observes a closed channel.
    pub async fn register(&self, prefix: Prefix, sender: mpsc::Sender<String>) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        self.buckets
            .write()
            .await
            .entry(prefix)
            .or_default()
            .insert(connection_id, sender);
        connection_id
    }

    /// Removes a connection from `prefix`, dropping the bucket once empty.
    ///
    /// Returns `false` if the connection was not registered there, which is
    /// the case when the dispatcher already removed it.
    pub async fn unregister(&self, prefix: &Prefix, connection_id: ConnectionId) -> bool {
        let mut buckets = self.buckets.write().await;
        let Some(bucket) = buckets.get_mut(prefix) else {
            return false;
        };
        let removed = bucket.remove(&connection_id).is_some();
        if bucket.is_empty() {
            buckets.remove(prefix);
        }
        removed
    }

    /// Copies the current prefix→connections mapping.
    ///
    /// The copy is taken under the read lock and released before any send,
    /// so dispatch never iterates the live map while it is being mutated.
    pub async fn snapshot(&self) -> Vec<(Prefix, Vec<(ConnectionId, mpsc::Sender<String>)>)> {
        let buckets = self.buckets.read().await;
        buckets
            .iter()
            .map(|(prefix, bucket)| {
                let conns = bucket
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect();
                (prefix.clone(), conns)
            })
            .collect()
    }

    /// Number of distinct registered prefixes.
    pub async fn prefix_count(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// Number of live connections across all prefixes.
    pub async fn connection_count(&self) -> usize {
        self.buckets.read().await.values().map(HashMap::len).sum()
    }

    /// Number of connections registered under exactly `prefix`.
    pub async fn subscribers(&self, prefix: &Prefix) -> usize {
        self.buckets
            .read()
            .await
            .get(prefix)
            .map_or(0, HashMap::len)
    }
}

/// Notification frame pushed to subscribers: the metadata record tagged
/// with `"type": "event"`. The body is never included.
#[derive(Serialize)]
struct EventFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Outcome of one dispatch, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections whose queue accepted the notification.
    pub delivered: usize,
    /// Matching connections found dead and unregistered.
    pub dropped: usize,
}

/// Exclusive right to append one event and dispatch it.
///
/// While a slot is held no other producer can append, so the order in which
/// slots are taken is both the store's `seq` order and the order in which
/// every connection receives notifications.
pub struct AppendSlot<'a> {
    _clock: MutexGuard<'a, i64>,
    timestamp_us: i64,
}

impl AppendSlot<'_> {
    /// Timestamp for the event appended under this slot. Strictly greater
    /// than any timestamp issued before it by the same dispatcher.
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }
}

/// Fans out notifications for newly appended events. Owns the registry for
/// the lifetime of the server.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: SubscriptionRegistry,
    append_clock: Arc<Mutex<i64>>,
}

impl Dispatcher {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self {
            registry,
            append_clock: Arc::default(),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Waits for the append slot and issues the next timestamp.
    ///
    /// Hold the slot across the store append and [`Dispatcher::on_append`].
    pub async fn begin_append(&self) -> AppendSlot<'_> {
        let mut last = self.append_clock.lock().await;
        let timestamp_us = now_micros().max(*last + 1);
        *last = timestamp_us;
        AppendSlot {
            _clock: last,
            timestamp_us,
        }
    }

    /// Pushes `notification` to every connection whose prefix matches its id.
    ///
    /// Delivery is at most once and best effort. A connection whose queue is
    /// closed or full is treated as dead and unregistered; nothing is retried
    /// and no error reaches the caller.
    pub async fn on_append(&self, notification: &Notification) -> DispatchReport {
        let frame = match serde_json::to_string(&EventFrame {
            kind: "event",
            notification,
        }) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("failed to serialize notification frame: {}", e);
                return DispatchReport::default();
            }
        };

        let id_hex = notification.id.to_hex();
        let mut report = DispatchReport::default();
        let mut dead = Vec::new();

        for (prefix, conns) in self.registry.snapshot().await {
            if !prefix.matches(&id_hex) {
                continue;
            }
            for (connection_id, sender) in conns {
                match sender.try_send(frame.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            prefix = %prefix,
                            "dropping subscriber after failed delivery: {}",
                            e
                        );
                        dead.push((prefix.clone(), connection_id));
                    }
                }
            }
        }

        for (prefix, connection_id) in dead {
            if self.registry.unregister(&prefix, connection_id).await {
                report.dropped += 1;
            }
        }

        tracing::debug!(
            event_id = %id_hex,
            delivered = report.delivered,
            dropped = report.dropped,
            "dispatched event"
        );
        report
    }
}
