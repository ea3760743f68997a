use thiserror::Error;

/// Errors produced by the RPC endpoint: client stub failures and
/// server-signalled protocol rejections.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request carried no nid-bin header")]
    MissingIdentity,
    #[error("request carried no port header")]
    MissingPort,
    #[error("peer identified itself as the local node")]
    SelfReference,
    #[error("rpc timed out")]
    Timeout,
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("peer returned an unexpected nid")]
    IdentityMismatch,
    #[error("remote error: {0}")]
    RemoteError(String),
}
