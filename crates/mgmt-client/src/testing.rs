//! Test utilities for mgmt-client
//!
//! [`TestServer`] serves a bridge router on an ephemeral local port and hands
//! out bridged connections to it, so integration tests exercise the real
//! HTTP path end to end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mgmt_core::MgmtResult;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::connector::DEFAULT_PATH;
use crate::error::Result;
use crate::remote::RemoteConnection;
use crate::transport::HttpTransport;

/// Client timeouts used by [`TestServer::start`]
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Bridge served for the lifetime of a test; stopped when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub transport: Arc<HttpTransport>,
    serving: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl TestServer {
    /// Serve `router` on a free port of the loopback interface
    ///
    /// ```ignore
    /// use mgmt_client::testing::TestServer;
    /// use mgmt_api::{create_router, AppState};
    ///
    /// let server = TestServer::start(create_router(AppState::new(handler))).await?;
    /// let conn = server.connect().await?;
    /// assert_eq!(conn.object_count().await?, 1);
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        Self::start_with_timeout(router, REQUEST_TIMEOUT, CONNECT_TIMEOUT).await
    }

    /// [`start`](Self::start) with explicit transport timeouts
    pub async fn start_with_timeout<S>(
        router: axum::Router<S>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        // The socket accepts connections from here on, before the task runs
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app: axum::Router = router.into();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let stopped = async {
                stop_rx.await.ok();
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
            {
                tracing::warn!(%addr, error = %e, "Test server stopped with an error");
            }
        });

        let transport = HttpTransport::with_config(
            &format!("http://{}{}", addr, DEFAULT_PATH),
            timeout,
            connect_timeout,
        )?;
        tracing::debug!(%addr, "Test server listening");

        Ok(Self {
            addr,
            transport: Arc::new(transport),
            serving: Some((stop_tx, task)),
        })
    }

    /// `http://` root of the server, for raw requests
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `bridge://` service URL of the server
    pub fn service_url(&self) -> String {
        format!("bridge://{}{}", self.addr, DEFAULT_PATH)
    }

    /// New bridged connection; performs the version handshake
    pub async fn connect(&self) -> MgmtResult<RemoteConnection> {
        RemoteConnection::connect(self.transport.clone()).await
    }

    /// Stop serving and wait for in-flight requests to finish
    pub async fn shutdown(mut self) {
        if let Some((stop_tx, task)) = self.serving.take() {
            let _ = stop_tx.send(());
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some((stop_tx, task)) = self.serving.take() {
            let _ = stop_tx.send(());
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;

    use super::*;

    #[tokio::test]
    async fn urls_point_at_the_bound_port() {
        let router: axum::Router = axum::Router::new().route("/health", get(|| async { "OK" }));
        let server = TestServer::start(router).await.unwrap();
        let port = server.addr.port();

        assert_ne!(port, 0);
        assert_eq!(server.base_url(), format!("http://127.0.0.1:{}", port));
        assert_eq!(
            server.service_url(),
            format!("bridge://127.0.0.1:{}/bridge", port)
        );
        assert_eq!(
            server.transport.endpoint().as_str(),
            format!("http://127.0.0.1:{}/bridge", port)
        );

        let body = reqwest::get(format!("{}/health", server.base_url()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");
        server.shutdown().await;
    }
}
