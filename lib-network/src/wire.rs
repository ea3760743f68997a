use std::collections::HashMap;

use lib_identity::NodeId;
use serde::{Deserialize, Serialize};

/// Header carrying the caller's/callee's 256-bit id, raw bytes.
pub const HEADER_NID: &str = "nid-bin";
/// Header carrying the caller's listening port, ASCII decimal (request only).
pub const HEADER_PORT: &str = "port";

/// Per-call metadata, analogous to the headers of an HTTP-like RPC.
pub type Headers = HashMap<String, Vec<u8>>;

/// A contact as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireContact {
    pub nid: [u8; 32],
    pub location: String,
}

impl From<&lib_identity::Contact> for WireContact {
    fn from(c: &lib_identity::Contact) -> Self {
        Self {
            nid: *c.nid.as_bytes(),
            location: c.endpoint.clone(),
        }
    }
}

impl From<WireContact> for lib_identity::Contact {
    fn from(w: WireContact) -> Self {
        lib_identity::Contact::new(NodeId::from_bytes(w.nid), w.location)
    }
}

/// One of the four RPC requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Ping,
    Store { data: Vec<u8>, age_secs: u64 },
    FindNode { target: [u8; 32] },
    FindValue { target: [u8; 32] },
}

/// `FindValueResponse`'s `oneof { found, not_found }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FindValueResult {
    Found(Vec<u8>),
    NotFound { contacts: Vec<WireContact> },
}

/// One of the four RPC responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ping,
    Store { success: bool },
    FindNode { contacts: Vec<WireContact> },
    FindValue(FindValueResult),
    /// Server-signalled protocol failure (missing identity/port, self-reference).
    Error { message: String },
}

/// A request or response plus its headers, as carried over the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub headers: Headers,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(headers: Headers, body: T) -> Self {
        Self { headers, body }
    }
}

pub type RequestEnvelope = Envelope<Request>;
pub type ResponseEnvelope = Envelope<Response>;

pub fn encode<T: Serialize>(value: &Envelope<T>) -> Vec<u8> {
    bincode::serialize(value).expect("envelope serialization is infallible for these types")
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<Envelope<T>, bincode::Error> {
    bincode::deserialize(bytes)
}
