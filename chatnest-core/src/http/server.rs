//! HTTP server

use super::api::build_router;
use super::state::AppState;
use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// ChatNest API server
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(state: AppState, addr: impl Into<String>) -> Self {
        Self {
            state: Arc::new(state),
            addr: addr.into(),
        }
    }

    /// Bind the listener
    ///
    /// Returned separately from serving so callers can learn the port when
    /// binding to `:0`.
    pub async fn bind(self) -> Result<BoundServer> {
        let listener = TcpListener::bind(&self.addr).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "ChatNest API listening");
        Ok(BoundServer {
            state: self.state,
            listener,
            local_addr,
        })
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.bind().await?.serve(shutdown_signal()).await
    }
}

/// A server with a bound listener
pub struct BoundServer {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("ChatNest API stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_chat::{
        ChatSqlStore, CollabManagerImpl, CollabService, OutboxNotifier, TokenCodec, TokenSecret,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_serves_health_and_shuts_down() {
        let manager = CollabManagerImpl::new(
            ChatSqlStore::memory().unwrap(),
            TokenCodec::new(TokenSecret::generate()),
        );
        let service = CollabService::new(manager, Arc::new(OutboxNotifier::new()));
        let bound = ApiServer::new(AppState::new(service), "127.0.0.1:0")
            .bind()
            .await
            .unwrap();
        let addr = bound.local_addr();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(bound.serve(async {
            let _ = stop_rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"ok\""));

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
