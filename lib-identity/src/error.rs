use thiserror::Error;

/// User-facing errors surfaced by identity parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("malformed node id: {reason}")]
    MalformedId { reason: String },

    #[error("malformed endpoint: {reason}")]
    MalformedEndpoint { reason: String },
}
