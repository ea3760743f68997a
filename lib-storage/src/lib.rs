//! The backing value store and the Kademlia routing table.

pub mod routing;
pub mod store;

pub use routing::{LivenessProbe, RoutingError, RoutingTable, ALPHA, K};
pub use store::{Store, StoreConfig, StoreStats, DEFAULT_BYTES_MAX, DEFAULT_KEYS_MAX, T_EXPIRE};
