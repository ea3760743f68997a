//! The peer-facing RPC protocol: wire types, a pluggable transport, the
//! server-side handshake/dispatch pipeline, and the client stub.

pub mod client;
pub mod errors;
pub mod loopback;
pub mod server;
pub mod transport;
pub mod wire;

pub use client::{FindValueOutcome, NetworkLivenessProbe, PeerStub, DEFAULT_DEADLINE};
pub use errors::RpcError;
pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use server::{Dispatcher, RpcServer};
pub use transport::{Channel, TcpTransport, Transport, TransportError};
pub use wire::{FindValueResult, Request, Response, WireContact};
