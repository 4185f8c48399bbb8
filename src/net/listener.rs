//! Listen addresses, socket binding and the new-connection queue.
//!
//! # Responsibilities
//! - Parse listen addresses (`unix:/path` or `host:port`)
//! - Bind the listening socket, clearing a stale Unix socket file
//! - Hand upgraded connections to the application in FIFO order
//!
//! # Design Decisions
//! - The accept queue is bounded; a full queue holds new sessions back
//!   until the application accepts (admission control)
//! - `accept` has no timeout; callers bring their own cancellation

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::mpsc;

use crate::config::ConfigError;
use crate::relay::Connection;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The address string could not be parsed.
    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),

    /// The relay settings failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: ListenAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Where the relay listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl FromStr for ListenAddr {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ListenerError::InvalidAddress(s.to_string()));
            }
            return Ok(ListenAddr::Unix(PathBuf::from(path)));
        }
        s.parse()
            .map(ListenAddr::Tcp)
            .map_err(|_| ListenerError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "{}", addr),
            ListenAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A bound listening socket, ready to be served.
#[derive(Debug)]
pub enum BoundSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl BoundSocket {
    /// Bind `addr`. An existing Unix socket file at the path is removed first.
    pub async fn bind(addr: &ListenAddr) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            addr: addr.clone(),
            source,
        };

        let socket = match addr {
            ListenAddr::Tcp(socket_addr) => {
                BoundSocket::Tcp(TcpListener::bind(socket_addr).await.map_err(bind_error)?)
            }
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                remove_stale_socket(path).map_err(bind_error)?;
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                BoundSocket::Unix {
                    listener,
                    path: path.clone(),
                }
            }
            #[cfg(not(unix))]
            ListenAddr::Unix(_) => {
                return Err(bind_error(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix sockets are not supported on this platform",
                )))
            }
        };

        tracing::info!(address = %addr, "Listener bound");
        Ok(socket)
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> std::io::Result<ListenAddr> {
        match self {
            BoundSocket::Tcp(listener) => listener.local_addr().map(ListenAddr::Tcp),
            #[cfg(unix)]
            BoundSocket::Unix { path, .. } => Ok(ListenAddr::Unix(path.clone())),
        }
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            tracing::debug!(path = %path.display(), "Removing stale socket file");
            std::fs::remove_file(path)
        }
        Ok(_) => Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Queue of newly established connections.
#[derive(Debug)]
pub struct Listener {
    queue: mpsc::Receiver<Connection>,
}

/// Create an accept queue holding at most `capacity` pending connections.
pub(crate) fn accept_queue(capacity: usize) -> (mpsc::Sender<Connection>, Listener) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, Listener { queue: rx })
}

impl Listener {
    /// Wait for the next connection, in the order their upgrades completed.
    ///
    /// Returns `None` once the service has stopped and the queue is drained.
    pub async fn accept(&mut self) -> Option<Connection> {
        self.queue.recv().await
    }
}
