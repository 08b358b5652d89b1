//! Shared test utilities for the obtest workspace
//!
//! Provides `MockServer`, a loopback server that speaks the NUL-framed
//! protocol and answers through a handler closure. Only available when the
//! "test-utils" feature is enabled.

use crate::endpoint::Endpoint;
use camino::Utf8PathBuf;
use std::io;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};

const CHUNK_PAUSE: Duration = Duration::from_millis(20);

/// What the mock does with one request
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send the text followed by the NUL terminator
    Text(String),
    /// Send raw chunks verbatim with a short pause between them
    Chunks(Vec<Vec<u8>>),
    /// Never answer
    Silent,
    /// Close the connection
    HangUp,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

type Handler = Arc<dyn Fn(usize, &str) -> Reply + Send + Sync>;
type RequestLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// A NUL-framed test server bound to a random port or a temporary socket.
///
/// The handler receives a per-connection id (in accept order, starting at 0)
/// and the request text without its terminator.
pub struct MockServer {
    endpoint: Endpoint,
    requests: RequestLog,
    shutdown_tx: broadcast::Sender<()>,
    _socket_dir: Option<TempDir>,
}

/// A listener the mock can take streams from, TCP or unix.
trait Acceptor: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn next_stream(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn next_stream(&self) -> io::Result<TcpStream> {
        self.accept().await.map(|(stream, _)| stream)
    }
}

impl Acceptor for UnixListener {
    type Stream = UnixStream;

    async fn next_stream(&self) -> io::Result<UnixStream> {
        self.accept().await.map(|(stream, _)| stream)
    }
}

impl MockServer {
    /// Start a mock listening on 127.0.0.1 with an OS-assigned port.
    pub async fn tcp<F>(handler: F) -> io::Result<Self>
    where
        F: Fn(usize, &str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self::serve_on(listener, Endpoint::tcp(port), Arc::new(handler), None))
    }

    /// Start a mock listening on a unix socket inside a temporary directory.
    pub async fn unix<F>(handler: F) -> io::Result<Self>
    where
        F: Fn(usize, &str) -> Reply + Send + Sync + 'static,
    {
        let dir = TempDir::new()?;
        let path = Utf8PathBuf::from_path_buf(dir.path().join("mock.sock"))
            .map_err(|p| io::Error::other(format!("non UTF-8 socket path {}", p.display())))?;
        let listener = UnixListener::bind(&path)?;
        Ok(Self::serve_on(listener, Endpoint::unix(path), Arc::new(handler), Some(dir)))
    }

    fn serve_on<L: Acceptor>(
        listener: L,
        endpoint: Endpoint,
        handler: Handler,
        socket_dir: Option<TempDir>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let requests = RequestLog::default();

        let log = requests.clone();
        tokio::spawn(async move {
            let mut next_id = 0;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.next_stream() => {
                        let Ok(stream) = accepted else { break };
                        tokio::spawn(serve(stream, next_id, handler.clone(), log.clone()));
                        next_id += 1;
                    }
                }
            }
        });

        Self {
            endpoint,
            requests,
            shutdown_tx,
            _socket_dir: socket_dir,
        }
    }

    /// A mock that answers every request with the same text.
    pub async fn constant(text: &str) -> io::Result<Self> {
        let text = text.to_owned();
        Self::tcp(move |_, _| Reply::Text(text.clone())).await
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Raw request frames as received, terminator included.
    pub fn raw_requests(&self) -> Vec<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Request texts with the terminator removed.
    pub fn requests(&self) -> Vec<String> {
        self.raw_requests()
            .iter()
            .map(|frame| {
                let text = frame.strip_suffix(&[0]).unwrap_or(frame.as_slice());
                String::from_utf8_lossy(text).into_owned()
            })
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn serve<S>(mut stream: S, conn_id: usize, handler: Handler, log: RequestLog)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut pending = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);

        while let Some(pos) = pending.iter().position(|b| *b == 0) {
            let frame: Vec<u8> = pending.drain(..=pos).collect();
            let request = String::from_utf8_lossy(&frame[..pos]).into_owned();
            log.lock().unwrap_or_else(|e| e.into_inner()).push(frame);

            let written = match handler(conn_id, &request) {
                Reply::Text(text) => {
                    let mut out = text.into_bytes();
                    out.push(0);
                    stream.write_all(&out).await
                }
                Reply::Chunks(chunks) => write_chunks(&mut stream, chunks).await,
                Reply::Silent => Ok(()),
                Reply::HangUp => return,
            };
            if written.is_err() {
                return;
            }
        }
    }
}

async fn write_chunks<S>(stream: &mut S, chunks: Vec<Vec<u8>>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    for chunk in chunks {
        stream.write_all(&chunk).await?;
        stream.flush().await?;
        sleep(CHUNK_PAUSE).await;
    }
    Ok(())
}
