//! State bus: the single-writer, many-reader channel between control logic
//! and rendering surfaces.
//!
//! Every key carries a version that increases on each publish. Updates are
//! fanned out over a bounded broadcast channel while the snapshot map is still
//! write-locked, so every subscriber sees a key's versions in write order.
//! A subscriber that falls behind is resynchronized from the snapshot rather
//! than replayed, so it may skip intermediate values but never goes backwards.

pub mod keys;
pub mod store;

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, PoisonError, RwLock},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, warn};

pub use keys::StateKey;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoredEntries};

/// Default capacity of the fan-out channel
pub const DEFAULT_CAPACITY: usize = 256;

/// A key's value at a given version
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub key: StateKey,
    pub version: u64,
    pub value: Arc<Value>,
}

impl StateUpdate {
    /// Decode the value into its typed record
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.value.as_ref())
    }
}

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    value: Arc<Value>,
}

/// A pending durable write for the store-writer task
pub type PersistRequest = (StateKey, Arc<Value>);

#[derive(Debug)]
struct BusInner {
    entries: RwLock<HashMap<StateKey, Versioned>>,
    updates_tx: broadcast::Sender<StateUpdate>,
    persist_tx: Option<mpsc::UnboundedSender<PersistRequest>>,
}

/// Shared handle to the state bus; clones refer to the same bus
#[derive(Debug, Clone)]
pub struct StateBus {
    inner: Arc<BusInner>,
}

/// Receiving half of the durable write queue, consumed by
/// [`crate::tasks::store_writer_task`]
pub struct StoreWriter {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) requests: mpsc::UnboundedReceiver<PersistRequest>,
    pub(crate) entries: StoredEntries,
}

impl StateBus {
    /// Bus without durable storage
    pub fn in_memory(capacity: usize) -> Self {
        Self::build(capacity, None, StoredEntries::new())
    }

    /// Bus backed by `store`. Persisted keys are loaded first; if the store
    /// cannot be read the bus starts empty and the error is only logged.
    pub fn with_store(store: Arc<dyn KeyValueStore>, capacity: usize) -> (Self, StoreWriter) {
        let loaded = match store.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("State store unavailable, starting from defaults: {}", e);
                StoredEntries::new()
            }
        };
        let (persist_tx, requests) = mpsc::unbounded_channel();
        let bus = Self::build(capacity, Some(persist_tx), loaded.clone());
        let writer = StoreWriter {
            store,
            requests,
            entries: loaded,
        };
        (bus, writer)
    }

    fn build(
        capacity: usize,
        persist_tx: Option<mpsc::UnboundedSender<PersistRequest>>,
        loaded: StoredEntries,
    ) -> Self {
        let (updates_tx, _) = broadcast::channel(capacity.max(1));
        let mut entries = HashMap::new();
        for (name, value) in loaded {
            match StateKey::parse(&name) {
                Some(key) if key.is_persisted() => {
                    entries.insert(
                        key,
                        Versioned {
                            version: 1,
                            value: Arc::new(value),
                        },
                    );
                }
                _ => debug!("Ignoring stored key {}", name),
            }
        }
        Self {
            inner: Arc::new(BusInner {
                entries: RwLock::new(entries),
                updates_tx,
                persist_tx,
            }),
        }
    }

    /// Store `value` under `key` and notify every subscriber. Returns the new
    /// version of the key.
    pub fn publish<T: Serialize + ?Sized>(&self, key: StateKey, value: &T) -> u64 {
        let value = match serde_json::to_value(value) {
            Ok(value) => Arc::new(value),
            Err(e) => {
                warn!("Dropping unserializable value for {}: {}", key, e);
                return self.version(key);
            }
        };

        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let version = entries.get(&key).map_or(1, |entry| entry.version + 1);
        entries.insert(
            key,
            Versioned {
                version,
                value: Arc::clone(&value),
            },
        );

        if key.is_persisted() {
            if let Some(persist_tx) = &self.inner.persist_tx {
                if persist_tx.send((key, Arc::clone(&value))).is_err() {
                    warn!("Store writer is gone, {} not persisted", key);
                }
            }
        }

        // A send error only means nobody is listening right now
        match self.inner.updates_tx.send(StateUpdate { key, version, value }) {
            Ok(receivers) => debug!("Published {} v{} to {} subscribers", key, version, receivers),
            Err(_) => debug!("Published {} v{} with no subscribers", key, version),
        }
        version
    }

    /// Current version of `key`, 0 if it was never written
    pub fn version(&self, key: StateKey) -> u64 {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map_or(0, |entry| entry.version)
    }

    /// Consistent snapshot of the given keys. Keys that were never written
    /// are absent from the result.
    pub fn read_all(&self, keys: &[StateKey]) -> Vec<StateUpdate> {
        let entries = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        keys.iter()
            .filter_map(|key| {
                entries.get(key).map(|entry| StateUpdate {
                    key: *key,
                    version: entry.version,
                    value: Arc::clone(&entry.value),
                })
            })
            .collect()
    }

    /// Typed read of one key. A value that does not decode is treated as
    /// missing.
    pub fn read<T: DeserializeOwned>(&self, key: StateKey) -> Option<T> {
        let update = self.read_all(&[key]).pop()?;
        match update.decode() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Stored {} does not decode: {}", key, e);
                None
            }
        }
    }

    /// Subscribe to changes of `keys`
    pub fn subscribe(&self, keys: &[StateKey]) -> Subscription {
        Subscription {
            bus: self.clone(),
            keys: keys.iter().copied().collect(),
            updates_rx: self.inner.updates_tx.subscribe(),
            seen: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Run `callback` for every change of `keys` on a background task. The
    /// task ends when the returned handle is aborted or the bus is dropped.
    pub fn subscribe_with<F>(&self, keys: &[StateKey], mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(StateUpdate) + Send + 'static,
    {
        let mut subscription = self.subscribe(keys);
        tokio::spawn(async move {
            while let Some(update) = subscription.recv().await {
                callback(update);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.updates_tx.receiver_count()
    }
}

/// One subscriber's view of the bus.
///
/// Never yields a version of a key older than or equal to one it already
/// yielded.
pub struct Subscription {
    bus: StateBus,
    keys: HashSet<StateKey>,
    updates_rx: broadcast::Receiver<StateUpdate>,
    seen: HashMap<StateKey, u64>,
    pending: VecDeque<StateUpdate>,
}

impl Subscription {
    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.keys.iter()
    }

    /// Snapshot of the subscribed keys, used to bootstrap a fresh surface.
    /// Later notifications for the same versions are suppressed.
    pub fn bootstrap(&mut self) -> Vec<StateUpdate> {
        let snapshot = self.snapshot();
        snapshot
            .into_iter()
            .filter(|update| self.mark_seen(update))
            .collect()
    }

    /// Next update of a subscribed key, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<StateUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                if self.mark_seen(&update) {
                    return Some(update);
                }
                continue;
            }
            match self.updates_rx.recv().await {
                Ok(update) => {
                    if self.keys.contains(&update.key) && self.mark_seen(&update) {
                        return Some(update);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged by {} updates, resynchronizing", skipped);
                    let snapshot = self.snapshot();
                    self.pending.extend(snapshot);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn snapshot(&self) -> Vec<StateUpdate> {
        let mut keys: Vec<StateKey> = self.keys.iter().copied().collect();
        keys.sort();
        self.bus.read_all(&keys)
    }

    fn mark_seen(&mut self, update: &StateUpdate) -> bool {
        let last = self.seen.entry(update.key).or_insert(0);
        if update.version <= *last {
            return false;
        }
        *last = update.version;
        true
    }
}
