//! The DHT node: wires identity, storage, routing and the RPC endpoint
//! into iterative lookups, best-effort replication, and the public API.

pub mod config;
pub mod errors;
pub mod lookup;
pub mod node;
pub mod replicator;

pub use config::NodeConfig;
pub use errors::LookupError;
pub use lookup::{FindValueOutcomeOwned, LookupEngine, StubOpener, TransportStubOpener};
pub use node::Node;
pub use replicator::Replicator;
