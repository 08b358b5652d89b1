//! Socket client for the database server's text protocol
//!
//! A request is UTF-8 text followed by a single NUL byte. A response is text
//! terminated the same way, possibly spread over several reads; it is complete
//! once the last byte of a read chunk is NUL. There is no length prefix in
//! either direction.

use bytes::BytesMut;
use obtest_core::{Endpoint, ObtestError, Result};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Budget for each readiness wait while receiving a response.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK_SIZE: usize = 8192;
const TERMINATOR: u8 = 0;

enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Transport {
    async fn open(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp { port } => TcpStream::connect(("127.0.0.1", *port))
                .await
                .map(Transport::Tcp),
            Endpoint::Unix { path } => UnixStream::connect(path).await.map(Transport::Unix),
        }
    }

    async fn readable(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.readable().await,
            Transport::Unix(stream) => stream.readable().await,
        }
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.try_read(buf),
            Transport::Unix(stream) => stream.try_read(buf),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.write_all(data).await,
            Transport::Unix(stream) => stream.write_all(data).await,
        }
    }
}

/// One connection to the server.
///
/// Dropping the client releases the socket; `close` does the same eagerly and
/// may be called any number of times.
pub struct ProtocolClient {
    endpoint: Endpoint,
    transport: Option<Transport>,
    receive_timeout: Duration,
}

impl ProtocolClient {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        Self::connect_with_timeout(endpoint, DEFAULT_RECEIVE_TIMEOUT).await
    }

    pub async fn connect_with_timeout(endpoint: &Endpoint, receive_timeout: Duration) -> Result<Self> {
        let transport = Transport::open(endpoint).await.map_err(|e| {
            error!("Failed to connect to server at {}: {}", endpoint, e);
            ObtestError::Connection(format!("failed to connect to {endpoint}: {e}"))
        })?;
        debug!("connected to {}", endpoint);

        Ok(Self {
            endpoint: endpoint.clone(),
            transport: Some(transport),
            receive_timeout,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Send `text` followed by the NUL terminator.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let transport = self.transport.as_mut().ok_or_else(closed)?;

        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(TERMINATOR);

        transport
            .write_all(&frame)
            .await
            .map_err(|e| ObtestError::Connection(format!("send failed: {e}")))?;
        debug!("send command to server(size={}) '{}'", frame.len(), text);
        Ok(())
    }

    /// Receive one response using the client's configured budget.
    pub async fn receive(&mut self) -> Result<String> {
        self.receive_within(self.receive_timeout).await
    }

    /// Receive one response, waiting at most `budget` for each readiness notification.
    ///
    /// The returned text has the terminator removed, is right-trimmed, and
    /// ends with exactly one newline.
    pub async fn receive_within(&mut self, budget: Duration) -> Result<String> {
        let transport = self.transport.as_ref().ok_or_else(closed)?;
        let mut response = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match timeout(budget, transport.readable()).await {
                Err(_) => return Err(ObtestError::ProtocolTimeout(budget)),
                Ok(Err(e)) => {
                    info!("Failed to receive from server: {}", e);
                    return Err(ObtestError::Connection(format!("receive failed: {e}")));
                }
                Ok(Ok(())) => {}
            }

            match transport.try_read(&mut chunk) {
                Ok(0) => {
                    info!("receive from server returned nothing, the connection may be closed");
                    return Err(ObtestError::Connection(
                        "connection closed by server".to_owned(),
                    ));
                }
                Ok(n) => {
                    let data = &chunk[..n];
                    debug!(
                        "receive from server[size={}]: '{}'",
                        n,
                        String::from_utf8_lossy(data)
                    );
                    response.extend_from_slice(data);
                    if data[n - 1] == TERMINATOR {
                        return Ok(finish_response(&response));
                    }
                }
                // Spurious readiness; wait again.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    info!("Failed to receive from server: {}", e);
                    return Err(ObtestError::Connection(format!("receive failed: {e}")));
                }
            }
        }
    }

    /// Send a statement and wait for its response.
    pub async fn roundtrip(&mut self, text: &str) -> Result<String> {
        self.send(text).await?;
        let response = self.receive().await?;
        debug!("receive result from server '{}'", response);
        Ok(response)
    }

    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("closed connection to {}", self.endpoint);
        }
    }
}

fn closed() -> ObtestError {
    ObtestError::Connection("connection already closed".to_owned())
}

fn finish_response(raw: &[u8]) -> String {
    let body = raw.strip_suffix(&[TERMINATOR]).unwrap_or(raw);
    let mut text = String::from_utf8_lossy(body).trim_end().to_owned();
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_response_strips_terminator() {
        assert_eq!(finish_response(b"1|A\n2|B\0"), "1|A\n2|B\n");
    }

    #[test]
    fn test_finish_response_trims_trailing_newlines() {
        assert_eq!(finish_response(b"SUCCESS\n\n\0"), "SUCCESS\n");
    }

    #[test]
    fn test_finish_response_keeps_leading_text() {
        assert_eq!(finish_response(b"  id | name\n\0"), "  id | name\n");
    }

    #[test]
    fn test_finish_response_empty_body() {
        assert_eq!(finish_response(b"\0"), "\n");
    }

    #[test]
    fn test_finish_response_multibyte_split_across_chunks() {
        let mut raw = BytesMut::new();
        let text = "名字\0".as_bytes();
        raw.extend_from_slice(&text[..2]);
        raw.extend_from_slice(&text[2..]);
        assert_eq!(finish_response(&raw), "名字\n");
    }
}
