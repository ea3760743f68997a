//! Node identity: 256-bit ids, the XOR distance metric, and peer contacts.

mod contact;
mod error;
mod node_id;

pub use contact::Contact;
pub use error::IdentityError;
pub use node_id::{NodeId, BUCKET_COUNT, NID_LEN};
