use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;

/// A peer's identity and the opaque location at which it can be reached.
///
/// `endpoint` is unparsed by this crate — it is sufficient to open a new RPC
/// channel (conventionally `host:port`) but the identity layer does not
/// interpret it. Two contacts compare equal iff their ids are equal; the
/// endpoint may be rewritten when a peer announces a new listening port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub nid: NodeId,
    pub endpoint: String,
}

impl Contact {
    pub fn new(nid: NodeId, endpoint: impl Into<String>) -> Self {
        Self {
            nid,
            endpoint: endpoint.into(),
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.nid == other.nid
    }
}

impl Eq for Contact {}
