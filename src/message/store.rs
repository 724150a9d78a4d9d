//! Versioned concurrent map with live, coalescing change subscriptions.
//!
//! # Responsibilities
//! - Atomic point reads/writes over a keyed table
//! - Fan out every change to any number of independent subscribers
//! - Replay full current state to a new subscriber before switching
//!   it to incremental deltas
//! - Coalesce queued updates per key so slow subscribers only ever
//!   see the final state of each key
//!
//! # Design Decisions
//! - One mutex per store guards the table and all subscriber queues;
//!   stores are small and writes infrequent, so the lock is not hot
//! - A subscriber that lags never delays writers or other subscribers:
//!   writers only enqueue into the subscriber's pending map and return
//! - Cancellation is by dropping the `Subscription`; `close()` ends
//!   every subscription and discards undelivered updates

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::observability::metrics::names;

/// A single observed change to one key.
///
/// On `delete == true`, `value` carries the last-known value so that
/// observers can clean up by old value.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<K, V> {
    pub key: K,
    pub value: V,
    pub delete: bool,
}

/// One delivery to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<K: Eq + Hash, V> {
    /// Full table state, delivered exactly once as the first value of a
    /// subscription, reflecting the store at the instant of `subscribe`.
    Snapshot(HashMap<K, V>),
    /// The updates coalesced since the previous delivery. Per key only
    /// the most recent update survives; ordering across distinct keys
    /// is unspecified.
    Updates(Vec<Update<K, V>>),
}

struct SubscriberState<K, V> {
    /// Full-state snapshot captured at subscribe time, consumed by the
    /// first `recv`.
    init: Option<HashMap<K, V>>,
    /// Pending updates, coalesced per key (last write wins).
    pending: HashMap<K, Update<K, V>>,
    notify: Arc<Notify>,
}

struct Inner<K, V> {
    table: HashMap<K, V>,
    subscribers: HashMap<u64, SubscriberState<K, V>>,
    next_id: u64,
    closed: bool,
}

struct Shared<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> Shared<K, V> {
    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // A panicking holder cannot leave the table half-mutated: every
        // critical section completes its mutation before any fallible
        // call. Recover the guard instead of propagating the poison.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Concurrent associative container with live change subscriptions.
///
/// Cloning a `VersionedStore` yields another handle onto the same
/// table, which is how stores are shared between pipeline stages.
pub struct VersionedStore<K, V> {
    name: &'static str,
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for VersionedStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> VersionedStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty store. The name labels this store's metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    table: HashMap::new(),
                    subscribers: HashMap::new(),
                    next_id: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Upsert an entry and wake every subscriber. Never blocks beyond
    /// enqueueing into each subscriber's pending queue.
    pub fn store(&self, key: K, value: V) {
        let mut inner = self.shared.lock();
        if inner.closed {
            return;
        }
        inner.table.insert(key.clone(), value.clone());
        inner.fanout(Update {
            key,
            value,
            delete: false,
        });
        metrics::counter!(names::STORE_WRITES, "store" => self.name).increment(1);
    }

    /// Remove an entry if present, emitting a delete update carrying
    /// the last-known value. No-op when the key is absent.
    pub fn delete(&self, key: &K) {
        let mut inner = self.shared.lock();
        if inner.closed {
            return;
        }
        if let Some(value) = inner.table.remove(key) {
            inner.fanout(Update {
                key: key.clone(),
                value,
                delete: true,
            });
            metrics::counter!(names::STORE_DELETES, "store" => self.name).increment(1);
        }
    }

    /// Point-in-time read of one key. Never blocks on subscribers.
    pub fn load(&self, key: &K) -> Option<V> {
        self.shared.lock().table.get(key).cloned()
    }

    /// Point-in-time copy of the whole table.
    pub fn load_all(&self) -> HashMap<K, V> {
        self.shared.lock().table.clone()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.shared.lock().table.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a new subscriber. The subscription's first delivery is
    /// a full-state snapshot taken atomically here; every later
    /// delivery carries only the updates coalesced since the previous
    /// one. Subscribing to a closed store yields an ended subscription.
    pub fn subscribe(&self) -> Subscription<K, V> {
        let mut inner = self.shared.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        if !inner.closed {
            let init = inner.table.clone();
            inner.subscribers.insert(
                id,
                SubscriberState {
                    init: Some(init),
                    pending: HashMap::new(),
                    notify: Arc::new(Notify::new()),
                },
            );
        }
        Subscription {
            store_name: self.name,
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Terminate the store: every subscription ends and any buffered
    /// undelivered updates are discarded.
    pub fn close(&self) {
        let mut inner = self.shared.lock();
        inner.closed = true;
        inner.table.clear();
        for (_, state) in inner.subscribers.drain() {
            state.notify.notify_one();
        }
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Enqueue one update into every subscriber queue, collapsing it
    /// with any still-pending update for the same key.
    fn fanout(&mut self, update: Update<K, V>) {
        for state in self.subscribers.values_mut() {
            state.pending.insert(update.key.clone(), update.clone());
            state.notify.notify_one();
        }
    }
}

/// A live feed of one store's changes. Dropping the subscription
/// unregisters it; `recv` returns `None` once the store is closed.
pub struct Subscription<K, V> {
    store_name: &'static str,
    shared: Arc<Shared<K, V>>,
    id: u64,
}

impl<K, V> Subscription<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Wait for the next delivery. Returns `None` when the store has
    /// been closed.
    pub async fn recv(&mut self) -> Option<Event<K, V>> {
        loop {
            let notify = {
                let mut inner = self.shared.lock();
                let state = inner.subscribers.get_mut(&self.id)?;
                if let Some(init) = state.init.take() {
                    metrics::counter!(names::STORE_DELIVERIES, "store" => self.store_name)
                        .increment(1);
                    return Some(Event::Snapshot(init));
                }
                if !state.pending.is_empty() {
                    let updates = state.pending.drain().map(|(_, u)| u).collect();
                    metrics::counter!(names::STORE_DELIVERIES, "store" => self.store_name)
                        .increment(1);
                    return Some(Event::Updates(updates));
                }
                Arc::clone(&state.notify)
            };
            // notify_one leaves a permit if nobody is parked yet, so a
            // write landing between unlock and await is never missed.
            notify.notified().await;
        }
    }
}

impl<K, V> Drop for Subscription<K, V> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.remove(&self.id);
    }
}
