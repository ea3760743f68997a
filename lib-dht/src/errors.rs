use thiserror::Error;

/// Failures from the iterative lookup engine. Transport-level and
/// protocol-level probe failures are absorbed internally (the failing
/// contact is dropped from the routing table and the walk proceeds); this
/// type only surfaces when the walk itself cannot make progress.
#[derive(Debug, Error)]
pub enum LookupError {
    /// `pending` emptied with nothing ever successfully queried.
    #[error("lookup exhausted all candidates without a single successful probe")]
    LookupExhausted,
    /// The walk located peers but none of them held the value.
    #[error("value not found")]
    NotFound,
}
