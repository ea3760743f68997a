use std::sync::Arc;
use std::time::Duration;

use lib_identity::{Contact, NodeId};
use tracing::instrument;

use crate::errors::RpcError;
use crate::transport::{Channel, Transport};
use crate::wire::{
    decode, encode, FindValueResult, Headers, Request, RequestEnvelope, Response,
    ResponseEnvelope, HEADER_NID, HEADER_PORT,
};

/// Default per-call RPC deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);

fn build_headers(local_id: NodeId, local_port: u16) -> Headers {
    let mut headers = Headers::new();
    headers.insert(HEADER_NID.to_string(), local_id.as_bytes().to_vec());
    headers.insert(HEADER_PORT.to_string(), local_port.to_string().into_bytes());
    headers
}

fn extract_nid(headers: &Headers) -> Result<NodeId, RpcError> {
    let bytes = headers.get(HEADER_NID).ok_or(RpcError::MissingIdentity)?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| RpcError::MissingIdentity)?;
    Ok(NodeId::from_bytes(arr))
}

async fn send(
    channel: &dyn Channel,
    deadline: Duration,
    local_id: NodeId,
    local_port: u16,
    body: Request,
) -> Result<(NodeId, Response), RpcError> {
    let envelope = RequestEnvelope::new(build_headers(local_id, local_port), body);
    let bytes = encode(&envelope);

    let call = channel.call(bytes);
    let resp_bytes = tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| RpcError::Timeout)?
        .map_err(|e| RpcError::Unreachable(e.to_string()))?;

    let resp: ResponseEnvelope =
        decode(&resp_bytes).map_err(|e| RpcError::Unreachable(format!("malformed response: {e}")))?;
    let responder_nid = extract_nid(&resp.headers)?;

    if let Response::Error { message } = resp.body {
        return Err(RpcError::RemoteError(message));
    }

    Ok((responder_nid, resp.body))
}

/// A per-peer client object: owns a channel and a per-call deadline. Every
/// call attaches the handshake headers and checks the response's nid
/// against the peer this stub was opened for.
pub struct PeerStub {
    channel: Box<dyn Channel>,
    local_id: NodeId,
    local_port: u16,
    peer_nid: NodeId,
    deadline: Duration,
}

impl PeerStub {
    /// Open a stub to a peer whose id is already known.
    #[instrument(skip(transport), fields(peer = %contact.nid))]
    pub async fn connect(
        transport: &dyn Transport,
        contact: &Contact,
        local_id: NodeId,
        local_port: u16,
        deadline: Duration,
    ) -> Result<Self, RpcError> {
        let channel = transport
            .open(&contact.endpoint)
            .await
            .map_err(|e| RpcError::Unreachable(e.to_string()))?;
        Ok(Self {
            channel,
            local_id,
            local_port,
            peer_nid: contact.nid,
            deadline,
        })
    }

    /// Open a stub to an endpoint without a known id: issues an initial
    /// `PING` to learn it. The learned id is then fixed for the stub's
    /// lifetime.
    pub async fn connect_unknown(
        transport: &dyn Transport,
        endpoint: &str,
        local_id: NodeId,
        local_port: u16,
        deadline: Duration,
    ) -> Result<Self, RpcError> {
        let channel = transport
            .open(endpoint)
            .await
            .map_err(|e| RpcError::Unreachable(e.to_string()))?;
        let (peer_nid, _) = send(channel.as_ref(), deadline, local_id, local_port, Request::Ping).await?;
        Ok(Self {
            channel,
            local_id,
            local_port,
            peer_nid,
            deadline,
        })
    }

    pub fn peer_nid(&self) -> NodeId {
        self.peer_nid
    }

    fn verify(&self, nid: NodeId) -> Result<(), RpcError> {
        if nid != self.peer_nid {
            return Err(RpcError::IdentityMismatch);
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), RpcError> {
        let (nid, resp) = send(
            self.channel.as_ref(),
            self.deadline,
            self.local_id,
            self.local_port,
            Request::Ping,
        )
        .await?;
        self.verify(nid)?;
        match resp {
            Response::Ping => Ok(()),
            _ => Err(RpcError::RemoteError("unexpected response to ping".into())),
        }
    }

    pub async fn store(&self, data: Vec<u8>, age: Duration) -> Result<bool, RpcError> {
        let (nid, resp) = send(
            self.channel.as_ref(),
            self.deadline,
            self.local_id,
            self.local_port,
            Request::Store {
                data,
                age_secs: age.as_secs(),
            },
        )
        .await?;
        self.verify(nid)?;
        match resp {
            Response::Store { success } => Ok(success),
            _ => Err(RpcError::RemoteError("unexpected response to store".into())),
        }
    }

    pub async fn find_node(&self, target: NodeId) -> Result<Vec<Contact>, RpcError> {
        let (nid, resp) = send(
            self.channel.as_ref(),
            self.deadline,
            self.local_id,
            self.local_port,
            Request::FindNode {
                target: *target.as_bytes(),
            },
        )
        .await?;
        self.verify(nid)?;
        match resp {
            Response::FindNode { contacts } => {
                Ok(contacts.into_iter().map(Into::into).collect())
            }
            _ => Err(RpcError::RemoteError("unexpected response to find_node".into())),
        }
    }

    /// Either a found value, or the peer's closest-known contacts.
    pub async fn find_value(&self, target: NodeId) -> Result<FindValueOutcome, RpcError> {
        let (nid, resp) = send(
            self.channel.as_ref(),
            self.deadline,
            self.local_id,
            self.local_port,
            Request::FindValue {
                target: *target.as_bytes(),
            },
        )
        .await?;
        self.verify(nid)?;
        match resp {
            Response::FindValue(FindValueResult::Found(bytes)) => Ok(FindValueOutcome::Value(bytes)),
            Response::FindValue(FindValueResult::NotFound { contacts }) => {
                Ok(FindValueOutcome::Contacts(contacts.into_iter().map(Into::into).collect()))
            }
            _ => Err(RpcError::RemoteError("unexpected response to find_value".into())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FindValueOutcome {
    Value(Vec<u8>),
    Contacts(Vec<Contact>),
}

/// Implements [`lib_storage::LivenessProbe`] by pinging the contact over a
/// transport — the concrete collaborator the routing table's eviction
/// policy is injected with.
pub struct NetworkLivenessProbe {
    pub transport: Arc<dyn Transport>,
    pub local_id: NodeId,
    pub local_port: u16,
    pub deadline: Duration,
}

#[async_trait::async_trait]
impl lib_storage::LivenessProbe for NetworkLivenessProbe {
    async fn is_alive(&self, contact: &Contact) -> bool {
        match PeerStub::connect(
            self.transport.as_ref(),
            contact,
            self.local_id,
            self.local_port,
            self.deadline,
        )
        .await
        {
            Ok(stub) => stub.ping().await.is_ok(),
            Err(_) => false,
        }
    }
}
