use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Transport-level failures, independent of RPC protocol semantics.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),
}

/// A single bidirectional channel to one peer. Requests issued on the same
/// channel are ordered; channels are not shared across peers.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn call(&self, request: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// Opens channels to opaque endpoint strings (conventionally `host:port`,
/// unparsed by this crate beyond what a concrete transport needs).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Channel>, TransportError>;
}

/// Length-prefixed framing over a plain `TcpStream`: the default, reliable,
/// bidirectional transport the RPC endpoint assumes (see the wire protocol
/// design). One frame is a `u32` big-endian byte length followed by the
/// payload.
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Channel>, TransportError> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        Ok(Box::new(TcpChannel {
            stream: Mutex::new(stream),
        }))
    }
}

struct TcpChannel {
    stream: Mutex<TcpStream>,
}

#[async_trait]
impl Channel for TcpChannel {
    async fn call(&self, request: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &request)
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        read_frame(&mut *stream)
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))
    }
}

pub(crate) async fn write_frame(
    stream: &mut TcpStream,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

pub(crate) async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
