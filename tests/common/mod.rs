//! Shared utilities for integration testing.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio_tungstenite::WebSocketStream;
use ws_relay::relay::Interceptors;
use ws_relay::{Listener, RelayConfig, Shutdown};

pub type Client = WebSocketStream<UnixStream>;

/// A relay serving on a Unix socket in a private temp directory.
pub struct TestRelay {
    listener: Option<Listener>,
    pub shutdown: Shutdown,
    path: PathBuf,
    _dir: TempDir,
}

impl TestRelay {
    /// Start a relay with the default config, adjusted by `configure`.
    pub async fn start(configure: impl FnOnce(&mut RelayConfig), interceptors: Interceptors) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");

        let mut config = RelayConfig::default();
        config.listener.address = format!("unix:{}", path.display());
        configure(&mut config);

        let shutdown = Shutdown::new();
        let listener = ws_relay::listen(&config, interceptors, shutdown.subscribe())
            .await
            .unwrap();

        Self {
            listener: Some(listener),
            shutdown,
            path,
            _dir: dir,
        }
    }

    pub fn listener(&mut self) -> &mut Listener {
        self.listener.as_mut().expect("listener already dropped")
    }

    /// Stop accepting; later sessions find nobody to hand over to.
    #[allow(dead_code)]
    pub fn drop_listener(&mut self) {
        self.listener = None;
    }

    /// Open a WebSocket client against the relay's upgrade route.
    pub async fn connect(&self) -> Client {
        let stream = UnixStream::connect(&self.path).await.unwrap();
        let (ws, _response) = tokio_tungstenite::client_async("ws://localhost/websocket/", stream)
            .await
            .unwrap();
        ws
    }

    /// Send a raw HTTP request and return the response status line.
    #[allow(dead_code)]
    pub async fn raw_status(&self, request: &str) -> String {
        let mut stream = UnixStream::connect(&self.path).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        let mut chunk = [0u8; 512];
        while !response.windows(2).any(|w| w == b"\r\n") {
            let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut chunk))
                .await
                .expect("response timed out")
                .unwrap();
            if n == 0 {
                break;
            }
            response.extend_from_slice(&chunk[..n]);
        }

        let text = String::from_utf8_lossy(&response);
        text.lines().next().unwrap_or_default().to_string()
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
