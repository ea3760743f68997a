use std::sync::Arc;
use std::time::Duration;

use lib_dht::{Node, NodeConfig};
use lib_identity::{Contact, NodeId};
use lib_network::{LoopbackNetwork, LoopbackTransport};

fn config_for(local_id: NodeId, port: u16) -> NodeConfig {
    let mut config = NodeConfig::new(local_id, port);
    config.rpc_deadline = Duration::from_millis(500);
    config
}

async fn spin_up(network: &LoopbackNetwork, endpoint: &str, port: u16) -> (Arc<Node>, String) {
    let local_id = NodeId::random();
    let transport = Arc::new(LoopbackTransport::new(network.clone(), endpoint.to_string()));
    let node = Node::new(config_for(local_id, port), transport);
    let server = node.rpc_server();
    network.register(endpoint, server).await;
    (node, endpoint.to_string())
}

#[tokio::test]
async fn single_node_store_and_find_round_trips_without_peers() {
    let network = LoopbackNetwork::new();
    let (a, _a_ep) = spin_up(&network, "a:9000", 9000).await;

    let key = a.store(b"hello".to_vec()).await;

    assert_eq!(a.find(key).await.unwrap(), b"hello");
}

#[tokio::test]
async fn two_node_store_and_retrieve() {
    let network = LoopbackNetwork::new();
    let (a, a_ep) = spin_up(&network, "a:9000", 9000).await;
    let (b, b_ep) = spin_up(&network, "b:9001", 9001).await;

    a.add_peer(Contact::new(b.local_id(), b_ep.clone())).await.unwrap();
    b.add_peer(Contact::new(a.local_id(), a_ep.clone())).await.unwrap();

    let key = a.store(b"hello world".to_vec()).await;

    let found = b.find(key).await.unwrap();
    assert_eq!(found, b"hello world");
}

#[tokio::test]
async fn find_on_unknown_key_fails() {
    let network = LoopbackNetwork::new();
    let (a, a_ep) = spin_up(&network, "a:9000", 9000).await;
    let (b, b_ep) = spin_up(&network, "b:9001", 9001).await;

    a.add_peer(Contact::new(b.local_id(), b_ep.clone())).await.unwrap();
    b.add_peer(Contact::new(a.local_id(), a_ep.clone())).await.unwrap();

    let random_key = NodeId::random();
    let result = a.find(random_key).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn join_discovers_transitive_peers() {
    let network = LoopbackNetwork::new();
    let (a, a_ep) = spin_up(&network, "a:9000", 9000).await;
    let (b, b_ep) = spin_up(&network, "b:9001", 9001).await;
    let (c, c_ep) = spin_up(&network, "c:9002", 9002).await;

    // a knows b, b knows c; c should be reachable from a after join.
    a.add_peer(Contact::new(b.local_id(), b_ep.clone())).await.unwrap();
    b.add_peer(Contact::new(a.local_id(), a_ep.clone())).await.unwrap();
    b.add_peer(Contact::new(c.local_id(), c_ep.clone())).await.unwrap();
    c.add_peer(Contact::new(b.local_id(), b_ep.clone())).await.unwrap();

    a.join(&[Contact::new(b.local_id(), b_ep.clone())]).await.unwrap();

    assert!(a.peer_count().await >= 2);
}

#[tokio::test]
async fn federated_store_replicates_to_reachable_peers() {
    let network = LoopbackNetwork::new();
    let (a, a_ep) = spin_up(&network, "a:9000", 9000).await;
    let (b, b_ep) = spin_up(&network, "b:9001", 9001).await;
    let (c, c_ep) = spin_up(&network, "c:9002", 9002).await;

    for (left, left_ep) in [(&a, &a_ep), (&b, &b_ep), (&c, &c_ep)] {
        for (right, right_ep) in [(&a, &a_ep), (&b, &b_ep), (&c, &c_ep)] {
            if left.local_id() == right.local_id() {
                continue;
            }
            left.add_peer(Contact::new(right.local_id(), right_ep.clone()))
                .await
                .unwrap();
        }
        let _ = left_ep;
    }

    let key = a.store(b"replicated payload".to_vec()).await;

    let from_b = b.find(key).await;
    let from_c = c.find(key).await;
    assert!(from_b.is_ok() || from_c.is_ok());
}

#[tokio::test]
async fn ping_all_drops_unreachable_contacts() {
    let network = LoopbackNetwork::new();
    let (a, _a_ep) = spin_up(&network, "a:9000", 9000).await;

    let ghost = Contact::new(NodeId::random(), "ghost:9999".to_string());
    a.add_peer(ghost.clone()).await.unwrap();
    assert_eq!(a.peer_count().await, 1);

    a.ping_all().await;
    assert_eq!(a.peer_count().await, 0);
}
