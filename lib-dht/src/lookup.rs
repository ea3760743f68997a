use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lib_identity::{Contact, NodeId};
use lib_network::{FindValueOutcome, PeerStub, RpcError};
use lib_storage::{RoutingTable, Store, ALPHA, K};
use tracing::{debug, instrument, warn};

use crate::errors::LookupError;

/// Opens a [`PeerStub`] for a contact. Injected into [`LookupEngine`]
/// instead of a back-pointer to the owning node, so the engine holds only
/// the capabilities it needs.
#[async_trait]
pub trait StubOpener: Send + Sync {
    async fn open(&self, contact: &Contact) -> Result<PeerStub, RpcError>;
}

/// Opens stubs over a real or in-memory [`lib_network::Transport`].
pub struct TransportStubOpener {
    pub transport: Arc<dyn lib_network::Transport>,
    pub local_id: NodeId,
    pub local_port: u16,
    pub deadline: Duration,
}

#[async_trait]
impl StubOpener for TransportStubOpener {
    async fn open(&self, contact: &Contact) -> Result<PeerStub, RpcError> {
        PeerStub::connect(
            self.transport.as_ref(),
            contact,
            self.local_id,
            self.local_port,
            self.deadline,
        )
        .await
    }
}

/// Outcome of an `iterative_find_value` walk.
pub enum FindValueOutcomeOwned {
    Value {
        data: Vec<u8>,
        /// The contact that actually returned the value.
        source: NodeId,
        queried: Vec<Contact>,
    },
    NotFound {
        queried: Vec<Contact>,
    },
}

/// Runs α-parallel, progressive `FIND_NODE`/`FIND_VALUE` walks and the
/// best-effort fan-out STORE. Holds only the capabilities it needs
/// (routing table, store, stub opener) — no back-pointer to the node.
pub struct LookupEngine {
    local_id: NodeId,
    routing: Arc<RoutingTable>,
    store: Arc<Store>,
    opener: Arc<dyn StubOpener>,
}

enum Probe {
    Contacts(Vec<Contact>),
    Value(Vec<u8>),
}

impl LookupEngine {
    pub fn new(
        local_id: NodeId,
        routing: Arc<RoutingTable>,
        store: Arc<Store>,
        opener: Arc<dyn StubOpener>,
    ) -> Self {
        Self {
            local_id,
            routing,
            store,
            opener,
        }
    }

    #[instrument(skip(self))]
    pub async fn iterative_find_node(&self, target: NodeId) -> Result<Vec<Contact>, LookupError> {
        match self.walk(target, false).await? {
            FindValueOutcomeOwned::NotFound { queried } => Ok(queried),
            FindValueOutcomeOwned::Value { .. } => unreachable!("find_node walk never returns a value"),
        }
    }

    #[instrument(skip(self))]
    pub async fn iterative_find_value(
        &self,
        target: NodeId,
    ) -> Result<FindValueOutcomeOwned, LookupError> {
        self.walk(target, true).await
    }

    /// Keeps a local replica, locates contacts close to `key`, and issues
    /// `STORE` to each in parallel, aggregating failures silently. Keeping a
    /// local replica is what makes the publisher's own subsequent `find`
    /// succeed without network traffic.
    pub async fn iterative_store(&self, key: NodeId, data: Vec<u8>, age: Duration) {
        self.store.store(data.clone(), age).await;

        let contacts = match self.iterative_find_node(key).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "iterative_store could not locate any peers");
                return;
            }
        };
        let calls = contacts.into_iter().map(|c| {
            let opener = self.opener.clone();
            let data = data.clone();
            async move {
                match opener.open(&c).await {
                    Ok(stub) => {
                        let _ = stub.store(data, age).await;
                    }
                    Err(_) => {}
                }
            }
        });
        futures::future::join_all(calls).await;
    }

    /// The local node's `find`: serves from the local store when present
    /// (so a node that published or already cached a value pays no network
    /// traffic), otherwise runs `iterative_find_value`, caches the result
    /// locally and forwards a single cache-`STORE` to the closest queried
    /// peer that did not already hold it.
    pub async fn find(&self, target: NodeId) -> Result<Vec<u8>, LookupError> {
        if let Some((bytes, _age)) = self.store.retrieve(&target).await {
            return Ok(bytes);
        }

        match self.iterative_find_value(target).await? {
            FindValueOutcomeOwned::Value {
                data,
                source,
                queried,
            } => {
                self.store.store(data.clone(), Duration::ZERO).await;
                let cache_target = closest(&queried, target)
                    .into_iter()
                    .find(|c| c.nid != source);
                if let Some(contact) = cache_target {
                    if let Ok(stub) = self.opener.open(&contact).await {
                        let _ = stub.store(data.clone(), Duration::ZERO).await;
                    }
                }
                Ok(data)
            }
            FindValueOutcomeOwned::NotFound { .. } => Err(LookupError::NotFound),
        }
    }

    async fn walk(&self, target: NodeId, want_value: bool) -> Result<FindValueOutcomeOwned, LookupError> {
        let mut queried: Vec<Contact> = Vec::new();
        let mut queried_ids: HashSet<NodeId> = HashSet::new();
        let mut pending: VecDeque<Contact> = VecDeque::new();
        let mut seen: HashSet<NodeId> = HashSet::new();

        for c in self.routing.get_alpha(&target).await {
            if seen.insert(c.nid) {
                pending.push_back(c);
            }
        }

        let mut closest_so_far = self.local_id.distance(&target);

        loop {
            if pending.is_empty() {
                if queried.is_empty() {
                    return Err(LookupError::LookupExhausted);
                }
                return Ok(FindValueOutcomeOwned::NotFound {
                    queried: closest(&queried, target),
                });
            }

            let mut round = Vec::with_capacity(ALPHA);
            for _ in 0..ALPHA {
                match pending.pop_front() {
                    Some(c) => round.push(c),
                    None => break,
                }
            }

            let probes = round.iter().cloned().map(|contact| {
                let opener = self.opener.clone();
                async move {
                    let stub = opener.open(&contact).await?;
                    if want_value {
                        match stub.find_value(target).await? {
                            FindValueOutcome::Value(bytes) => Ok((contact, Probe::Value(bytes))),
                            FindValueOutcome::Contacts(contacts) => Ok((contact, Probe::Contacts(contacts))),
                        }
                    } else {
                        let contacts = stub.find_node(target).await?;
                        Ok((contact, Probe::Contacts(contacts)))
                    }
                }
            });

            let results: Vec<Result<(Contact, Probe), RpcError>> =
                futures::future::join_all(probes).await;

            let mut value_found: Option<(Vec<u8>, NodeId)> = None;
            for result in results {
                match result {
                    Err(_) => continue,
                    Ok((contact, Probe::Value(bytes))) => {
                        if queried_ids.insert(contact.nid) {
                            queried.push(contact.clone());
                        }
                        value_found = Some((bytes, contact.nid));
                    }
                    Ok((contact, Probe::Contacts(contacts))) => {
                        if queried_ids.insert(contact.nid) {
                            queried.push(contact.clone());
                        }
                        for c in contacts {
                            if c.nid != self.local_id && seen.insert(c.nid) {
                                pending.push_back(c);
                            }
                        }
                    }
                }
            }

            // Contacts whose probe errored were never queried; drop them
            // from routing since they failed to respond at all.
            for contact in &round {
                if !queried_ids.contains(&contact.nid) {
                    self.routing.drop_contact(&contact.nid).await;
                }
            }

            if let Some((data, source)) = value_found {
                return Ok(FindValueOutcomeOwned::Value {
                    data,
                    source,
                    queried: closest(&queried, target),
                });
            }

            let new_min = seen
                .iter()
                .map(|nid| target.distance(nid))
                .min()
                .unwrap_or(usize::MAX);

            if new_min >= closest_so_far {
                return Ok(FindValueOutcomeOwned::NotFound {
                    queried: closest(&queried, target),
                });
            }
            closest_so_far = new_min;
            debug!(new_min, "lookup round improved closest distance");

            if queried_ids.len() >= K {
                return Ok(FindValueOutcomeOwned::NotFound {
                    queried: closest(&queried, target),
                });
            }
        }
    }
}

/// Up to `k` contacts ordered by ascending XOR distance to `target`, ties
/// broken by NID, deduplicated by NID.
fn closest(contacts: &[Contact], target: NodeId) -> Vec<Contact> {
    let mut sorted: Vec<Contact> = contacts.to_vec();
    sorted.sort_by(|a, b| {
        target
            .distance(&a.nid)
            .cmp(&target.distance(&b.nid))
            .then_with(|| a.nid.cmp(&b.nid))
    });
    sorted.dedup_by(|a, b| a.nid == b.nid);
    sorted.truncate(K);
    sorted
}
