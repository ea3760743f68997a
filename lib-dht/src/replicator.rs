use std::sync::Arc;
use std::time::Duration;

use lib_storage::Store;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::lookup::LookupEngine;

/// The periodic replication loop. Holds only a store handle and the lookup
/// capability it needs to re-publish keys — never a back-pointer to the
/// node that owns it.
pub struct Replicator {
    store: Arc<Store>,
    lookup: Arc<LookupEngine>,
    interval: Duration,
}

impl Replicator {
    pub fn new(store: Arc<Store>, lookup: Arc<LookupEngine>, interval: Duration) -> Self {
        Self {
            store,
            lookup,
            interval,
        }
    }

    /// Runs until `cancel` fires, re-publishing every locally held key each
    /// tick via `iterative_store`. This both refreshes TTLs across the
    /// network and re-establishes `k`-replication as membership shifts.
    #[instrument(skip(self, cancel))]
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let keys = self.store.get_all_keys().await;
            debug!(count = keys.len(), "replication tick");
            for key in keys {
                let Some((bytes, age)) = self.store.retrieve(&key).await else {
                    continue;
                };
                self.lookup.iterative_store(key, bytes, age).await;
            }
        }
    }
}
