use std::time::Duration;

use lib_identity::NodeId;
use lib_storage::StoreConfig;

/// Every `t*` constant and capacity override a node needs at construction
/// time. No file-based format backs this — a node is wired up
/// programmatically, the way the teacher's other services take a config
/// struct rather than parsing one of their own.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub local_id: NodeId,
    /// Port this node advertises to peers in the `port` handshake header.
    pub local_port: u16,
    pub store: StoreConfig,
    /// Per-RPC deadline used by every outbound client stub.
    pub rpc_deadline: Duration,
    /// Interval of the periodic replication loop (`tReplicate`).
    pub replicate_interval: Duration,
}

impl NodeConfig {
    pub fn new(local_id: NodeId, local_port: u16) -> Self {
        Self {
            local_id,
            local_port,
            store: StoreConfig::default(),
            rpc_deadline: Duration::from_secs(3),
            replicate_interval: Duration::from_secs(3_600),
        }
    }
}
