use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::server::Dispatcher;
use crate::transport::{Channel, Transport, TransportError};

/// A shared, in-process registry of endpoint -> dispatcher, standing in for
/// a network of real listeners. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    dispatchers: Arc<RwLock<HashMap<String, Arc<dyn Dispatcher>>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, endpoint: impl Into<String>, dispatcher: Arc<dyn Dispatcher>) {
        self.dispatchers.write().await.insert(endpoint.into(), dispatcher);
    }

    pub async fn deregister(&self, endpoint: &str) {
        self.dispatchers.write().await.remove(endpoint);
    }
}

/// A [`Transport`] that resolves endpoints against a [`LoopbackNetwork`]
/// instead of opening real sockets, calling the target's [`Dispatcher`]
/// directly in-process.
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    own_endpoint: String,
}

impl LoopbackTransport {
    pub fn new(network: LoopbackNetwork, own_endpoint: impl Into<String>) -> Self {
        Self {
            network,
            own_endpoint: own_endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Channel>, TransportError> {
        let dispatcher = self
            .network
            .dispatchers
            .read()
            .await
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(format!("no peer registered at {endpoint}")))?;
        Ok(Box::new(LoopbackChannel {
            dispatcher,
            caller_host: host_of(&self.own_endpoint),
        }))
    }
}

/// Strips the trailing `:port` from an endpoint, mirroring the bare-host
/// string a real `TcpListener` would observe from `peer_addr().ip()`.
fn host_of(endpoint: &str) -> String {
    match endpoint.rsplit_once(':') {
        Some((host, _port)) => host.to_string(),
        None => endpoint.to_string(),
    }
}

struct LoopbackChannel {
    dispatcher: Arc<dyn Dispatcher>,
    caller_host: String,
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn call(&self, request: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        Ok(self.dispatcher.dispatch(&self.caller_host, request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::RpcServer;
    use lib_identity::NodeId;
    use lib_storage::{RoutingTable, Store, StoreConfig};

    #[tokio::test]
    async fn ping_across_loopback_network() {
        let network = LoopbackNetwork::new();

        let a_id = NodeId::random();
        let a_server = Arc::new(RpcServer::new(
            a_id,
            1,
            Arc::new(RoutingTable::new(a_id)),
            Arc::new(Store::new(StoreConfig::default())),
            Arc::new(LoopbackTransport::new(network.clone(), "a:1")),
        ));
        network.register("a:1", a_server.clone()).await;

        let b_id = NodeId::random();
        let b_transport = LoopbackTransport::new(network.clone(), "b:2");

        let stub = crate::client::PeerStub::connect_unknown(
            &b_transport,
            "a:1",
            b_id,
            2,
            std::time::Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(stub.peer_nid(), a_id);
        stub.ping().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let network = LoopbackNetwork::new();
        let transport = LoopbackTransport::new(network, "b:2");
        let err = transport.open("nowhere:1").await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }
}
