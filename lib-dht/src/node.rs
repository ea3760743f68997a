use std::sync::Arc;
use std::time::Duration;

use lib_identity::{Contact, NodeId};
use lib_network::{RpcServer, Transport};
use lib_storage::{RoutingTable, Store, StoreStats};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::NodeConfig;
use crate::errors::LookupError;
use crate::lookup::{LookupEngine, TransportStubOpener};
use crate::replicator::Replicator;

/// A fully wired DHT node: owns its routing table and the capabilities
/// needed to serve and issue RPCs. The store is shared with the
/// replication loop (see module docs).
pub struct Node {
    local_id: NodeId,
    local_port: u16,
    routing: Arc<RoutingTable>,
    store: Arc<Store>,
    lookup: Arc<LookupEngine>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl Node {
    /// Wires up a node from `config` over `transport`. Does not bind a
    /// listener or start the replication loop — see [`Node::rpc_server`]
    /// and [`Node::spawn_replicator`].
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let routing = Arc::new(RoutingTable::new(config.local_id));
        let store = Arc::new(Store::new(config.store));
        let opener = Arc::new(TransportStubOpener {
            transport: transport.clone(),
            local_id: config.local_id,
            local_port: config.local_port,
            deadline: config.rpc_deadline,
        });
        let lookup = Arc::new(LookupEngine::new(
            config.local_id,
            routing.clone(),
            store.clone(),
            opener,
        ));

        Arc::new(Self {
            local_id: config.local_id,
            local_port: config.local_port,
            routing,
            store,
            lookup,
            transport,
            cancel: CancellationToken::new(),
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Builds the RPC dispatcher backing this node's routing table and
    /// store. The caller is responsible for driving it over a concrete
    /// transport (`RpcServer::listen` for TCP, direct registration for
    /// [`lib_network::LoopbackNetwork`]).
    pub fn rpc_server(&self) -> Arc<RpcServer> {
        Arc::new(RpcServer::new(
            self.local_id,
            self.local_port,
            self.routing.clone(),
            self.store.clone(),
            self.transport.clone(),
        ))
    }

    /// Spawns the periodic replication loop, returning its join handle.
    pub fn spawn_replicator(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let replicator = Replicator::new(self.store.clone(), self.lookup.clone(), interval);
        let cancel = self.cancel.clone();
        tokio::spawn(replicator.run(cancel))
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Unconditionally registers a contact without a liveness check —
    /// used for bootstrap peers supplied out of band.
    pub async fn add_peer(&self, contact: Contact) -> Result<(), lib_storage::RoutingError> {
        self.routing.add(contact).await
    }

    /// Joins the overlay: handshakes with each bootstrap contact, then
    /// runs `iterative_find_node(self)` to populate the routing table with
    /// everything reachable from the bootstrap set.
    #[instrument(skip(self, bootstrap_contacts))]
    pub async fn join(&self, bootstrap_contacts: &[Contact]) -> Result<(), LookupError> {
        for contact in bootstrap_contacts {
            match lib_network::PeerStub::connect(
                self.transport.as_ref(),
                contact,
                self.local_id,
                self.local_port,
                Duration::from_secs(3),
            )
            .await
            {
                Ok(stub) => {
                    if stub.ping().await.is_ok() {
                        let _ = self.routing.add(contact.clone()).await;
                    }
                }
                Err(e) => warn!(endpoint = %contact.endpoint, error = %e, "bootstrap peer unreachable"),
            }
        }

        let found = self.lookup.iterative_find_node(self.local_id).await?;
        for contact in found {
            let _ = self.routing.add(contact).await;
        }
        info!(peers = self.routing.count().await, "join complete");
        Ok(())
    }

    /// Publishes `data`, keyed by its hash: keeps a local replica and fans
    /// `STORE` out to the `k` closest peers.
    pub async fn store(&self, data: Vec<u8>) -> NodeId {
        let key = NodeId::hash(&data);
        self.lookup.iterative_store(key, data, Duration::ZERO).await;
        key
    }

    /// Retrieves a previously published value by its key.
    pub async fn find(&self, key: NodeId) -> Result<Vec<u8>, LookupError> {
        self.lookup.find(key).await
    }

    pub async fn store_stats(&self) -> StoreStats {
        self.store.stats().await
    }

    pub async fn peer_count(&self) -> usize {
        self.routing.count().await
    }

    /// Sweeps the entire routing table, pinging every contact and dropping
    /// those that do not respond. A maintenance operation the distilled
    /// lookup/replication design does not itself require, but one real
    /// deployments run periodically to keep the table honest.
    #[instrument(skip(self))]
    pub async fn ping_all(&self) {
        let contacts = self.routing.get_all().await;
        for contact in contacts {
            let reachable = match lib_network::PeerStub::connect(
                self.transport.as_ref(),
                &contact,
                self.local_id,
                self.local_port,
                Duration::from_secs(3),
            )
            .await
            {
                Ok(stub) => stub.ping().await.is_ok(),
                Err(_) => false,
            };
            if !reachable {
                self.routing.drop_contact(&contact.nid).await;
            }
        }
    }
}
