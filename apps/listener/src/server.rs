//! Receiver used with --run-server: logs whatever the tunnel delivers

use std::net::SocketAddr;

use axum::{
    Router,
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct EmbeddedServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl EmbeddedServer {
    /// Bind an ephemeral loopback port and start serving; stops when `cancel` fires
    pub async fn start(cancel: CancellationToken) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let app = Router::new().fallback(log_request);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
            {
                warn!("Embedded server failed: {}", e);
            }
        });

        info!("Embedded server listening on {}", addr);
        Ok(Self { addr, task })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

async fn log_request(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
    let path = uri.path().to_string();
    info!("{} request for {}", method, path);
    for (name, value) in headers.iter() {
        info!("  {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    if !body.is_empty() {
        let text = String::from_utf8_lossy(&body);
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(json) => info!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| text.to_string())
            ),
            Err(_) => info!("{}", text),
        }
    }

    (StatusCode::OK, format!("{} request for {}\n", method, path))
}
