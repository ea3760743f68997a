use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lib_identity::{Contact, NodeId};
use lib_storage::{RoutingTable, Store};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use crate::errors::RpcError;
use crate::transport::{read_frame, write_frame, Transport};
use crate::wire::{
    decode, encode, FindValueResult, Headers, Request, RequestEnvelope, Response,
    ResponseEnvelope, WireContact, HEADER_NID, HEADER_PORT,
};

/// Maximum number of connections served concurrently by [`RpcServer::listen`].
const MAX_CONCURRENT_CONNECTIONS: usize = 256;

/// Dispatches a raw, already-decoded request to whatever owns the local
/// routing table and store. Implemented by [`RpcServer`]; kept as a trait
/// so in-process transports (see [`crate::loopback`]) can call it directly
/// without a socket.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// `observed_peer_addr` is the address the request actually arrived
    /// from — used together with the `port` header to build the contact
    /// the routing table learns, since callers cannot be trusted to
    /// report their own address honestly.
    async fn dispatch(&self, observed_peer_addr: &str, request: Vec<u8>) -> Vec<u8>;
}

/// The RPC endpoint: owns no sockets itself, only the handshake pipeline
/// and the four handlers. [`RpcServer::listen`] drives it over real TCP;
/// [`crate::loopback::LoopbackNetwork`] drives it in-process.
pub struct RpcServer {
    local_id: NodeId,
    local_port: u16,
    routing: Arc<RoutingTable>,
    store: Arc<Store>,
    /// Used only to open a probe channel back to a bucket's
    /// least-recently-seen contact during eviction (see `handle_inner`).
    transport: Arc<dyn Transport>,
}

impl RpcServer {
    pub fn new(
        local_id: NodeId,
        local_port: u16,
        routing: Arc<RoutingTable>,
        store: Arc<Store>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            local_id,
            local_port,
            routing,
            store,
            transport,
        }
    }

    /// Binds `addr` and serves connections until cancelled, bounding
    /// concurrency with a semaphore the way a pool of worker slots would.
    pub async fn listen(
        self: Arc<Self>,
        addr: SocketAddr,
        cancel: tokio_util::sync::CancellationToken,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_CONNECTIONS));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, peer_addr) = accepted?;
                    let permit = permits.clone().acquire_owned().await;
                    let server = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = server.serve_connection(stream, peer_addr).await {
                            warn!(%peer_addr, error = %e, "connection ended with error");
                        }
                    });
                }
            }
        }
    }

    async fn serve_connection(
        &self,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> std::io::Result<()> {
        loop {
            let request = match read_frame(&mut stream).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };
            let response = self.dispatch(&peer_addr.ip().to_string(), request).await;
            write_frame(&mut stream, &response).await?;
        }
    }

    /// The handshake pipeline: extract identity, reject self, extract port,
    /// update the routing table, always attach our own id to the response.
    #[instrument(skip(self, request_bytes))]
    async fn handle(&self, observed_host: &str, request_bytes: Vec<u8>) -> Response {
        match self.handle_inner(observed_host, request_bytes).await {
            Ok(resp) => resp,
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        }
    }

    async fn handle_inner(
        &self,
        observed_host: &str,
        request_bytes: Vec<u8>,
    ) -> Result<Response, RpcError> {
        let envelope: RequestEnvelope = decode(&request_bytes)
            .map_err(|e| RpcError::Unreachable(format!("malformed request: {e}")))?;

        let caller_nid = extract_nid(&envelope.headers)?;
        if caller_nid == self.local_id {
            return Err(RpcError::SelfReference);
        }
        let caller_port = extract_port(&envelope.headers)?;
        let caller_endpoint = format!("{observed_host}:{caller_port}");
        let caller_contact = Contact::new(caller_nid, caller_endpoint);

        let probe = crate::client::NetworkLivenessProbe {
            transport: self.transport.clone(),
            local_id: self.local_id,
            local_port: self.local_port,
            deadline: Duration::from_secs(3),
        };
        let _ = self.routing.update(caller_contact.clone(), &probe).await;

        match envelope.body {
            Request::Ping => Ok(Response::Ping),
            Request::Store { data, age_secs } => {
                let success = self
                    .store
                    .store(data, Duration::from_secs(age_secs))
                    .await;
                Ok(Response::Store { success })
            }
            Request::FindNode { target } => {
                let contacts = self
                    .routing
                    .find_node(&caller_nid, &NodeId::from_bytes(target))
                    .await
                    .iter()
                    .map(WireContact::from)
                    .collect();
                Ok(Response::FindNode { contacts })
            }
            Request::FindValue { target } => {
                let target_id = NodeId::from_bytes(target);
                match self.store.retrieve(&target_id).await {
                    Some((bytes, _age)) => Ok(Response::FindValue(FindValueResult::Found(bytes))),
                    None => {
                        let contacts = self
                            .routing
                            .find_node(&caller_nid, &target_id)
                            .await
                            .iter()
                            .map(WireContact::from)
                            .collect();
                        Ok(Response::FindValue(FindValueResult::NotFound { contacts }))
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Dispatcher for RpcServer {
    async fn dispatch(&self, observed_peer_addr: &str, request: Vec<u8>) -> Vec<u8> {
        let body = self.handle(observed_peer_addr, request).await;
        let mut headers = Headers::new();
        headers.insert(HEADER_NID.to_string(), self.local_id.as_bytes().to_vec());
        encode(&ResponseEnvelope::new(headers, body))
    }
}

fn extract_nid(headers: &Headers) -> Result<NodeId, RpcError> {
    let bytes = headers.get(HEADER_NID).ok_or(RpcError::MissingIdentity)?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| RpcError::MissingIdentity)?;
    Ok(NodeId::from_bytes(arr))
}

fn extract_port(headers: &Headers) -> Result<u16, RpcError> {
    let bytes = headers.get(HEADER_PORT).ok_or(RpcError::MissingPort)?;
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(RpcError::MissingPort)
}
