use camino::Utf8PathBuf;
use std::fmt;

/// Address the server listens on and clients connect to.
///
/// Exactly one bind method is in use per server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP on the loopback interface
    Tcp { port: u16 },
    /// Local-domain socket at a filesystem path
    Unix { path: Utf8PathBuf },
}

impl Endpoint {
    pub fn tcp(port: u16) -> Self {
        Endpoint::Tcp { port }
    }

    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Endpoint::Unix { path: path.into() }
    }

    /// Command-line flag pair that tells the server how to bind.
    pub fn server_args(&self) -> [String; 2] {
        match self {
            Endpoint::Tcp { port } => ["-p".to_owned(), port.to_string()],
            Endpoint::Unix { path } => ["-s".to_owned(), path.to_string()],
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { port } => write!(f, "127.0.0.1:{port}"),
            Endpoint::Unix { path } => write!(f, "unix:{path}"),
        }
    }
}
