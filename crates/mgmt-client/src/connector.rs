//! Connector: service URLs, connection lifecycle and its notifications

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use mgmt_core::{
    ManagementConnection, MgmtError, MgmtResult, Notification, NotificationFilter,
    NotificationListener,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::remote::{QueryMode, RemoteConnection};
use crate::transport::{HttpTransport, Transport};

/// Port used when a service URL names none
pub const DEFAULT_PORT: u16 = 8778;
/// Path used when a service URL names none
pub const DEFAULT_PATH: &str = "/bridge";

/// Notification type sent after a successful `connect`
pub const CONNECTION_OPENED: &str = "bridge.connection.opened";
/// Notification type sent after `close`
pub const CONNECTION_CLOSED: &str = "bridge.connection.closed";

/// Address of a bridge: `bridge://host[:port][/path]`, or
/// `bridge+https://...` for TLS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl {
    secure: bool,
    host: String,
    port: u16,
    path: String,
}

impl ServiceUrl {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// HTTP endpoint the wire requests are posted to
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

impl FromStr for ServiceUrl {
    type Err = MgmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s)
            .map_err(|e| MgmtError::InvalidRequest(format!("Invalid service URL {}: {}", s, e)))?;

        let secure = match url.scheme() {
            "bridge" => false,
            "bridge+https" => true,
            other => {
                return Err(MgmtError::InvalidRequest(format!(
                    "Unsupported protocol {} in service URL {}",
                    other, s
                )))
            }
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MgmtError::InvalidRequest(format!("No host in service URL {}", s)))?
            .to_string();
        let path = match url.path() {
            "" | "/" => DEFAULT_PATH.to_string(),
            path => path.to_string(),
        };

        Ok(Self {
            secure,
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            path,
        })
    }
}

impl fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "bridge+https" } else { "bridge" };
        write!(f, "{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

struct ListenerEntry {
    listener: Arc<dyn NotificationListener>,
    filter: Option<NotificationFilter>,
    handback: Option<Value>,
}

/// Opens and closes a [`RemoteConnection`] and tells listeners about it.
///
/// The connection is created by the first `connect` and then reused: every
/// later `connect` after a `close` hands out the same instance.
pub struct BridgeConnector {
    transport: Arc<dyn Transport>,
    query_mode: QueryMode,
    connection: RwLock<Option<Arc<RemoteConnection>>>,
    connected: AtomicBool,
    listeners: Mutex<Vec<ListenerEntry>>,
    sequence: AtomicU64,
}

impl BridgeConnector {
    /// Connector for a `bridge://` service URL over HTTP
    pub fn new(url: &ServiceUrl) -> MgmtResult<Self> {
        let transport = HttpTransport::new(&url.endpoint())?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Connector over an arbitrary transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            query_mode: QueryMode::default(),
            connection: RwLock::new(None),
            connected: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_query_mode(mut self, query_mode: QueryMode) -> Self {
        self.query_mode = query_mode;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect, performing the version handshake on first use.
    ///
    /// Listeners receive `Opened` before this returns. Connecting while
    /// connected changes nothing and notifies nobody.
    pub async fn connect(&self) -> MgmtResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let existing = self.connection.read().clone();
        let connection = match existing {
            Some(connection) => connection,
            None => {
                let connection = Arc::new(
                    RemoteConnection::connect(self.transport.clone())
                        .await?
                        .with_query_mode(self.query_mode),
                );
                self.connection
                    .write()
                    .get_or_insert_with(|| connection.clone())
                    .clone()
            }
        };

        // Concurrent connects may all finish the handshake; one announces it
        if self
            .connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        info!(connection = %connection.id(), "Bridge connection opened");
        self.notify(CONNECTION_OPENED, &connection.id());
        Ok(())
    }

    /// Disconnect. Listeners receive `Closed`; closing twice notifies once.
    pub fn close(&self) {
        if self
            .connected
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let id = self
            .connection
            .read()
            .as_ref()
            .map(|c| c.id())
            .unwrap_or_default();
        info!(connection = %id, "Bridge connection closed");
        self.notify(CONNECTION_CLOSED, &id);
    }

    /// The connection; fails with `Transport` while disconnected
    pub fn connection(&self) -> MgmtResult<Arc<RemoteConnection>> {
        if !self.is_connected() {
            return Err(MgmtError::Transport("Connector is not connected".to_string()));
        }
        self.connection
            .read()
            .clone()
            .ok_or_else(|| MgmtError::internal("Connected without a connection"))
    }

    /// Id of the connection; fails while disconnected
    pub fn connection_id(&self) -> MgmtResult<String> {
        Ok(self.connection()?.id())
    }

    pub fn add_connection_notification_listener(
        &self,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<Value>,
    ) {
        self.listeners.lock().push(ListenerEntry {
            listener,
            filter,
            handback,
        });
    }

    /// Remove every registration of `listener`
    pub fn remove_connection_notification_listener(
        &self,
        listener: &Arc<dyn NotificationListener>,
    ) -> MgmtResult<()> {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|entry| !Arc::ptr_eq(&entry.listener, listener));
        if listeners.len() == before {
            return Err(MgmtError::InvalidRequest(
                "Listener is not registered".to_string(),
            ));
        }
        Ok(())
    }

    fn notify(&self, notification_type: &str, source: &str) {
        let notification = Notification {
            notification_type: notification_type.to_string(),
            source: source.to_string(),
            sequence_number: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            message: None,
        };

        // Deliver outside the lock so listeners may call back in
        let targets: Vec<(Arc<dyn NotificationListener>, Option<Value>)> = self
            .listeners
            .lock()
            .iter()
            .filter(|entry| {
                entry
                    .filter
                    .as_ref()
                    .map_or(true, |f| f.is_enabled(&notification))
            })
            .map(|entry| (entry.listener.clone(), entry.handback.clone()))
            .collect();

        debug!(kind = notification_type, listeners = targets.len(), "Delivering notification");
        for (listener, handback) in targets {
            listener.handle_notification(&notification, handback.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mgmt_core::{Command, WireResponse, PROTOCOL_VERSION};
    use serde_json::json;

    use super::*;
    use crate::error::Result;

    struct VersionOnly;

    #[async_trait]
    impl Transport for VersionOnly {
        async fn execute(&self, _: &Command) -> Result<WireResponse> {
            Ok(WireResponse::success(json!({
                "agentVersion": "0.1.0",
                "protocolVersion": PROTOCOL_VERSION,
                "bridgeId": "0badf00d-unknown",
            })))
        }

        async fn execute_batch(&self, commands: &[Command]) -> Result<Vec<WireResponse>> {
            let mut responses = Vec::new();
            for command in commands {
                responses.push(self.execute(command).await?);
            }
            Ok(responses)
        }
    }

    /// Gives way once before answering, so concurrent handshakes overlap
    struct Yielding;

    #[async_trait]
    impl Transport for Yielding {
        async fn execute(&self, command: &Command) -> Result<WireResponse> {
            tokio::task::yield_now().await;
            VersionOnly.execute(command).await
        }

        async fn execute_batch(&self, commands: &[Command]) -> Result<Vec<WireResponse>> {
            tokio::task::yield_now().await;
            VersionOnly.execute_batch(commands).await
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl NotificationListener for Recorder {
        fn handle_notification(&self, notification: &Notification, handback: Option<&Value>) {
            self.seen
                .lock()
                .push((notification.notification_type.clone(), handback.cloned()));
        }
    }

    #[test]
    fn service_urls() {
        let url: ServiceUrl = "bridge://localhost:9090/mgmt".parse().unwrap();
        assert_eq!(url.endpoint(), "http://localhost:9090/mgmt");

        let url: ServiceUrl = "bridge+https://example.org".parse().unwrap();
        assert!(url.is_secure());
        assert_eq!(url.endpoint(), "https://example.org:8778/bridge");
        assert_eq!(url.to_string(), "bridge+https://example.org:8778/bridge");

        assert!("http://localhost:9090".parse::<ServiceUrl>().is_err());
        assert!("not a url".parse::<ServiceUrl>().is_err());
    }

    #[tokio::test]
    async fn lifecycle_notifications_carry_the_handback() {
        let connector = BridgeConnector::with_transport(Arc::new(VersionOnly));
        let recorder = Arc::new(Recorder::default());
        connector.add_connection_notification_listener(
            recorder.clone(),
            None,
            Some(json!({"tag": 7})),
        );

        assert!(matches!(
            connector.connection(),
            Err(MgmtError::Transport(_))
        ));

        connector.connect().await.unwrap();
        connector.connect().await.unwrap();
        let first = connector.connection().unwrap();
        connector.close();
        connector.close();
        assert!(connector.connection().is_err());
        connector.connect().await.unwrap();
        let second = connector.connection().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connection_id().unwrap(), "0badf00d-unknown-bridged");
        let seen = recorder.seen.lock();
        let handback = Some(json!({"tag": 7}));
        assert_eq!(
            *seen,
            vec![
                (CONNECTION_OPENED.to_string(), handback.clone()),
                (CONNECTION_CLOSED.to_string(), handback.clone()),
                (CONNECTION_OPENED.to_string(), handback),
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_connects_open_once() {
        let connector = BridgeConnector::with_transport(Arc::new(Yielding));
        let recorder = Arc::new(Recorder::default());
        connector.add_connection_notification_listener(recorder.clone(), None, None);

        let (first, second) = tokio::join!(connector.connect(), connector.connect());
        first.unwrap();
        second.unwrap();
        assert!(connector.is_connected());
        assert_eq!(
            *recorder.seen.lock(),
            vec![(CONNECTION_OPENED.to_string(), None)]
        );

        connector.close();
        connector.close();
        assert_eq!(recorder.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn filtered_and_removed_listeners() {
        let connector = BridgeConnector::with_transport(Arc::new(VersionOnly));
        let closed_only = Arc::new(Recorder::default());
        let removed = Arc::new(Recorder::default());
        connector.add_connection_notification_listener(
            closed_only.clone(),
            Some(NotificationFilter::default().enable_type(CONNECTION_CLOSED)),
            None,
        );
        let removed_dyn: Arc<dyn NotificationListener> = removed.clone();
        connector.add_connection_notification_listener(removed_dyn.clone(), None, None);
        connector
            .remove_connection_notification_listener(&removed_dyn)
            .unwrap();
        assert!(connector
            .remove_connection_notification_listener(&removed_dyn)
            .is_err());

        connector.connect().await.unwrap();
        connector.close();

        assert_eq!(closed_only.seen.lock().len(), 1);
        assert!(removed.seen.lock().is_empty());
    }
}
