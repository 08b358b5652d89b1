use obtest_core::Endpoint;
use std::io;
use std::time::Duration;
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;
use tracing::debug;

/// Upper bound for a single connect attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Try a raw connect to `endpoint` and drop the connection immediately.
///
/// Nothing is sent; a successful handshake is all that is checked.
pub async fn probe(endpoint: &Endpoint) -> bool {
    match timeout(ATTEMPT_TIMEOUT, connect(endpoint)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("Failed to connect to server at {}: {}", endpoint, e);
            false
        }
        Err(_) => {
            debug!("Connect to server at {} timed out", endpoint);
            false
        }
    }
}

async fn connect(endpoint: &Endpoint) -> io::Result<()> {
    match endpoint {
        Endpoint::Tcp { port } => TcpStream::connect(("127.0.0.1", *port)).await.map(drop),
        Endpoint::Unix { path } => UnixStream::connect(path).await.map(drop),
    }
}
