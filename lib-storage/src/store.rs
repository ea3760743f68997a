use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::StreamExt as _;
use lib_identity::NodeId;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, trace, warn};

/// Default byte budget for a backing store: 16 MiB.
pub const DEFAULT_BYTES_MAX: usize = 16 * 1024 * 1024;
/// Default key budget for a backing store.
pub const DEFAULT_KEYS_MAX: usize = 1024;
/// Time-to-live for a freshly stored value with `age == 0`.
pub const T_EXPIRE: Duration = Duration::from_secs(86_410);

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub bytes_max: usize,
    pub keys_max: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bytes_max: DEFAULT_BYTES_MAX,
            keys_max: DEFAULT_KEYS_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub bytes_used: usize,
    pub bytes_max: usize,
    pub keys_used: usize,
    pub keys_max: usize,
}

struct StoredValue {
    bytes: Vec<u8>,
    birth: SystemTime,
}

struct Inner {
    values: HashMap<NodeId, StoredValue>,
    bytes_used: usize,
    bytes_max: usize,
    keys_max: usize,
}

/// A TTL-expiring key/value store addressed by content hash.
///
/// Cheap to clone: every clone shares the same map and the same background
/// expiration worker. No operation ever returns an error — capacity
/// exhaustion surfaces as `store` returning `false` (see the failure model
/// in the backing-store component design).
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
    schedule_tx: mpsc::UnboundedSender<(NodeId, Duration)>,
    cancel: CancellationToken,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        let inner = Arc::new(RwLock::new(Inner {
            values: HashMap::new(),
            bytes_used: 0,
            bytes_max: config.bytes_max,
            keys_max: config.keys_max,
        }));
        let (schedule_tx, schedule_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(expiration_worker(
            inner.clone(),
            schedule_rx,
            cancel.clone(),
        ));

        Self {
            inner,
            schedule_tx,
            cancel,
        }
    }

    /// Stop the background expiration worker. Idempotent. In-flight
    /// expirations are abandoned without touching the store, matching the
    /// shutdown contract: expiration timers exit without mutating state.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Store `bytes` under `hash(bytes)`, recording its birth as
    /// `now - age` so republished values preserve their wall age.
    pub async fn store(&self, bytes: Vec<u8>, age: Duration) -> bool {
        let nid = NodeId::hash(&bytes);
        let len = bytes.len();
        let birth = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut inner = self.inner.write().await;

        if inner.values.contains_key(&nid) {
            trace!(nid = %nid, "store: key already present, no-op success");
            return true;
        }

        if inner.values.len() >= inner.keys_max {
            warn!(nid = %nid, "store: refused, key capacity exhausted");
            return false;
        }
        if inner.bytes_used + len > inner.bytes_max {
            warn!(nid = %nid, len, "store: refused, byte capacity exhausted");
            return false;
        }

        inner.bytes_used += len;
        inner.values.insert(nid, StoredValue { bytes, birth });
        drop(inner);

        let remaining = T_EXPIRE.saturating_sub(age);
        debug!(nid = %nid, len, remaining_secs = remaining.as_secs(), "store: accepted");
        // If the receiver end has shut down the worker already exited; the
        // key simply never expires, which only matters during shutdown.
        let _ = self.schedule_tx.send((nid, remaining));

        true
    }

    /// Fetch a value and its current age. Age is computed at call time and
    /// is never negative.
    pub async fn retrieve(&self, nid: &NodeId) -> Option<(Vec<u8>, Duration)> {
        let inner = self.inner.read().await;
        let value = inner.values.get(nid)?;
        let age = SystemTime::now()
            .duration_since(value.birth)
            .unwrap_or(Duration::ZERO);
        Some((value.bytes.clone(), age))
    }

    /// Snapshot of all locally stored keys. Order is unspecified.
    pub async fn get_all_keys(&self) -> Vec<NodeId> {
        self.inner.read().await.values.keys().copied().collect()
    }

    /// Snapshot of usage and capacity. Fields are not guaranteed consistent
    /// with each other beyond a one-operation drift.
    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        StoreStats {
            bytes_used: inner.bytes_used,
            bytes_max: inner.bytes_max,
            keys_used: inner.values.len(),
            keys_max: inner.keys_max,
        }
    }
}

/// Drives expiration for every stored key from a single background task,
/// replacing a one-thread-per-key design with one delay queue worker.
async fn expiration_worker(
    inner: Arc<RwLock<Inner>>,
    mut schedule_rx: mpsc::UnboundedReceiver<(NodeId, Duration)>,
    cancel: CancellationToken,
) {
    let mut queue: DelayQueue<NodeId> = DelayQueue::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("expiration worker: shutdown signal received");
                return;
            }

            msg = schedule_rx.recv() => {
                match msg {
                    Some((nid, ttl)) => {
                        queue.insert(nid, ttl);
                    }
                    None => {
                        // All Store handles dropped; nothing left to expire.
                        return;
                    }
                }
            }

            Some(expired) = queue.next(), if !queue.is_empty() => {
                let nid = expired.into_inner();
                let mut guard = inner.write().await;
                if let Some(value) = guard.values.remove(&nid) {
                    guard.bytes_used -= value.bytes.len();
                    debug!(nid = %nid, "expiration worker: key expired");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_retrieve_round_trip() {
        let store = Store::new(StoreConfig::default());
        let data = b"hello".to_vec();
        let nid = NodeId::hash(&data);

        assert!(store.store(data.clone(), Duration::ZERO).await);
        let (bytes, age) = store.retrieve(&nid).await.unwrap();
        assert_eq!(bytes, data);
        assert!(age < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn storing_existing_key_is_a_no_op_success() {
        let store = Store::new(StoreConfig::default());
        let data = b"hello".to_vec();
        assert!(store.store(data.clone(), Duration::ZERO).await);
        assert!(store.store(data.clone(), Duration::ZERO).await);
        assert_eq!(store.stats().await.keys_used, 1);
    }

    #[tokio::test]
    async fn byte_capacity_is_enforced() {
        let store = Store::new(StoreConfig {
            bytes_max: 10,
            keys_max: 1024,
        });
        assert!(store.store(b"abcdefghij".to_vec(), Duration::ZERO).await);
        assert!(!store.store(b"k".to_vec(), Duration::ZERO).await);
        assert_eq!(store.stats().await.bytes_used, 10);
    }

    #[tokio::test]
    async fn key_capacity_is_enforced() {
        let store = Store::new(StoreConfig {
            bytes_max: DEFAULT_BYTES_MAX,
            keys_max: 1,
        });
        assert!(store.store(b"a".to_vec(), Duration::ZERO).await);
        assert!(!store.store(b"b".to_vec(), Duration::ZERO).await);
    }

    #[tokio::test(start_paused = true)]
    async fn expiration_removes_key_and_decrements_keys_used() {
        let store = Store::new(StoreConfig::default());
        let data = b"short-lived".to_vec();
        let nid = NodeId::hash(&data);

        let age = T_EXPIRE - Duration::from_secs(1);
        assert!(store.store(data, age).await);
        assert_eq!(store.stats().await.keys_used, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        // Let the worker task observe the expiry.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        assert!(store.retrieve(&nid).await.is_none());
        assert_eq!(store.stats().await.keys_used, 0);
        // Capacity itself must not have moved.
        assert_eq!(store.stats().await.keys_max, DEFAULT_KEYS_MAX);
    }

    #[tokio::test]
    async fn birth_preserves_wall_age_on_republish() {
        let store = Store::new(StoreConfig::default());
        let data = b"aged".to_vec();
        let nid = NodeId::hash(&data);
        let age = Duration::from_secs(100);

        store.store(data, age).await;
        let (_, observed_age) = store.retrieve(&nid).await.unwrap();
        assert!(observed_age >= age);
        assert!(observed_age < age + Duration::from_secs(5));
    }
}
