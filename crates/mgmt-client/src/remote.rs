//! Bridged management connection
//!
//! [`RemoteConnection`] implements the full [`ManagementConnection`]
//! contract by turning every call into wire requests. Results are decoded
//! back into the native shapes and wire errors into [`MgmtError`] kinds, so
//! callers cannot tell it apart from an in-process connection.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use mgmt_core::{
    Attribute, Command, ErrorKind, ManagementConnection, MgmtError, MgmtResult,
    NotificationFilter, NotificationListener, ObjectInfo, ObjectInstance, ObjectName, ObjectView,
    QueryExp, ServerInfo, VersionInfo, WireResponse,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::transport::Transport;

/// Suffix of every bridged connection id
pub const BRIDGED_ID_SUFFIX: &str = "-bridged";

/// Wire classifications with a native counterpart
static ERROR_TYPES: &[(&str, ErrorKind)] = &[
    ("object_not_found", ErrorKind::ObjectNotFound),
    ("attribute_not_found", ErrorKind::AttributeNotFound),
    ("invalid_attribute_value", ErrorKind::InvalidAttributeValue),
    ("operation_failed", ErrorKind::OperationInvocationFailed),
    ("unsupported_operation", ErrorKind::UnsupportedOperation),
    ("already_exists", ErrorKind::AlreadyExists),
    ("malformed_object_name", ErrorKind::MalformedName),
    ("invalid_request", ErrorKind::InvalidRequest),
];

/// Where query predicates are evaluated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryMode {
    /// The query travels with the search and the bridge filters
    #[default]
    ServerSide,
    /// Search by pattern only and filter on this side
    Local,
}

/// Rebuild the native error for a failed wire response.
///
/// Unknown classifications become an operation failure that keeps the
/// original message and classification.
pub fn map_error(response: &WireResponse) -> MgmtError {
    let message = response
        .error
        .clone()
        .unwrap_or_else(|| format!("Request failed with status {}", response.status));

    if response.status == 304 {
        return MgmtError::NotChanged;
    }

    let Some(error_type) = response.error_type.as_deref() else {
        return MgmtError::operation_failed(message);
    };

    match ERROR_TYPES.iter().find(|(name, _)| *name == error_type) {
        Some((_, kind)) => MgmtError::from_kind(*kind, message),
        None => MgmtError::OperationFailed {
            message,
            error_type: Some(error_type.to_string()),
        },
    }
}

fn unsupported<T>(what: &str) -> MgmtResult<T> {
    Err(MgmtError::Unsupported(format!(
        "{} is not available on a bridged connection",
        what
    )))
}

/// Connection to a remote bridge
pub struct RemoteConnection {
    transport: Arc<dyn Transport>,
    version: VersionInfo,
    query_mode: QueryMode,
}

impl std::fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("version", &self.version)
            .field("query_mode", &self.query_mode)
            .finish_non_exhaustive()
    }
}

impl RemoteConnection {
    /// Perform the version handshake and keep its answer
    #[instrument(skip_all)]
    pub async fn connect(transport: Arc<dyn Transport>) -> MgmtResult<Self> {
        let response = transport.execute(&Command::Version).await?;
        let version: VersionInfo = decode(response)?;
        debug!(
            bridge_id = %version.bridge_id,
            agent_version = %version.agent_version,
            protocol_version = %version.protocol_version,
            "Connected to bridge"
        );
        Ok(Self {
            transport,
            version,
            query_mode: QueryMode::default(),
        })
    }

    pub fn with_query_mode(mut self, query_mode: QueryMode) -> Self {
        self.query_mode = query_mode;
        self
    }

    pub fn query_mode(&self) -> QueryMode {
        self.query_mode
    }

    /// Agent version reported by the handshake
    pub fn agent_version(&self) -> &str {
        &self.version.agent_version
    }

    /// Protocol version reported by the handshake
    pub fn protocol_version(&self) -> &str {
        &self.version.protocol_version
    }

    pub fn bridge_id(&self) -> &str {
        &self.version.bridge_id
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.version.server
    }

    async fn request<T: DeserializeOwned>(&self, command: Command) -> MgmtResult<T> {
        let response = self.transport.execute(&command).await?;
        decode(response)
    }

    /// Send one batch and return each element's outcome
    async fn request_batch(&self, commands: Vec<Command>) -> MgmtResult<Vec<MgmtResult<Value>>> {
        let responses = self.transport.execute_batch(&commands).await?;
        Ok(responses.into_iter().map(decode).collect())
    }

    /// Pattern search followed by filtering on this side
    async fn query_locally(
        &self,
        pattern: Option<&ObjectName>,
        query: &QueryExp,
    ) -> MgmtResult<BTreeSet<ObjectInstance>> {
        let candidates: BTreeSet<ObjectInstance> = self
            .request(Command::Instances {
                pattern: pattern.cloned(),
                query: None,
                if_modified_since: None,
            })
            .await?;

        let attributes: Vec<String> = query.attribute_names().into_iter().collect();
        let mut selected = BTreeSet::new();
        for instance in candidates {
            let values = if attributes.is_empty() {
                HashMap::new()
            } else {
                match self.get_attributes(&instance.object_name, &attributes).await {
                    Ok(found) => found.into_iter().map(|a| (a.name, a.value)).collect(),
                    // Unregistered since the search
                    Err(MgmtError::ObjectNotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            };
            let view = ObjectView::from_values(instance.class_name.clone(), values);
            if query.evaluate(&view) {
                selected.insert(instance);
            }
        }
        Ok(selected)
    }
}

fn decode<T: DeserializeOwned>(response: WireResponse) -> MgmtResult<T> {
    if !response.is_success() {
        return Err(map_error(&response));
    }
    let value = response.value.unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| MgmtError::Transport(format!("Undecodable result: {}", e)))
}

#[async_trait]
impl ManagementConnection for RemoteConnection {
    fn id(&self) -> String {
        format!("{}{}", self.version.bridge_id, BRIDGED_ID_SUFFIX)
    }

    #[instrument(skip_all)]
    async fn query_names(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectName>> {
        match (self.query_mode, query) {
            (QueryMode::Local, Some(query)) => Ok(self
                .query_locally(pattern, query)
                .await?
                .into_iter()
                .map(|i| i.object_name)
                .collect()),
            _ => {
                self.request(Command::Search {
                    pattern: pattern.cloned(),
                    query: query.cloned(),
                    if_modified_since: None,
                })
                .await
            }
        }
    }

    #[instrument(skip_all)]
    async fn query_instances(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectInstance>> {
        match (self.query_mode, query) {
            (QueryMode::Local, Some(query)) => self.query_locally(pattern, query).await,
            _ => {
                self.request(Command::Instances {
                    pattern: pattern.cloned(),
                    query: query.cloned(),
                    if_modified_since: None,
                })
                .await
            }
        }
    }

    #[instrument(skip(self), fields(object = %name))]
    async fn get_attribute(&self, name: &ObjectName, attribute: &str) -> MgmtResult<Value> {
        self.request(Command::Read {
            object_name: name.clone(),
            attribute: attribute.to_string(),
        })
        .await
    }

    #[instrument(skip(self), fields(object = %name))]
    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[String],
    ) -> MgmtResult<Vec<Attribute>> {
        if attributes.is_empty() {
            return Ok(Vec::new());
        }
        let commands = attributes
            .iter()
            .map(|attribute| Command::Read {
                object_name: name.clone(),
                attribute: attribute.clone(),
            })
            .collect();

        let mut found = Vec::with_capacity(attributes.len());
        for (attribute, outcome) in attributes.iter().zip(self.request_batch(commands).await?) {
            match outcome {
                Ok(value) => found.push(Attribute::new(attribute.clone(), value)),
                Err(e @ MgmtError::ObjectNotFound(_)) => return Err(e),
                Err(e) => debug!(attribute = %attribute, error = %e, "Attribute omitted"),
            }
        }
        Ok(found)
    }

    #[instrument(skip(self, attribute), fields(object = %name, attribute = %attribute.name))]
    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> MgmtResult<()> {
        let _: Value = self
            .request(Command::Write {
                object_name: name.clone(),
                attribute: attribute.name,
                value: attribute.value,
            })
            .await?;
        Ok(())
    }

    #[instrument(skip(self, attributes), fields(object = %name, count = attributes.len()))]
    async fn set_attributes(
        &self,
        name: &ObjectName,
        attributes: Vec<Attribute>,
    ) -> MgmtResult<Vec<Attribute>> {
        if attributes.is_empty() {
            return Ok(Vec::new());
        }
        let commands = attributes
            .iter()
            .map(|attribute| Command::Write {
                object_name: name.clone(),
                attribute: attribute.name.clone(),
                value: attribute.value.clone(),
            })
            .collect();

        let outcomes = self.request_batch(commands).await?;
        let mut written = Vec::with_capacity(attributes.len());
        for (attribute, outcome) in attributes.into_iter().zip(outcomes) {
            match outcome {
                Ok(_) => written.push(attribute),
                Err(e @ MgmtError::ObjectNotFound(_)) => return Err(e),
                Err(e) => debug!(attribute = %attribute.name, error = %e, "Attribute not written"),
            }
        }
        Ok(written)
    }

    #[instrument(skip(self, arguments), fields(object = %name))]
    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: Vec<Value>,
        signature: &[String],
    ) -> MgmtResult<Value> {
        self.request(Command::Exec {
            object_name: name.clone(),
            operation: operation.to_string(),
            arguments,
            signature: Some(signature.to_vec()),
        })
        .await
    }

    #[instrument(skip(self), fields(object = %name))]
    async fn object_instance(&self, name: &ObjectName) -> MgmtResult<ObjectInstance> {
        self.request(Command::Instance {
            object_name: name.clone(),
        })
        .await
    }

    #[instrument(skip(self), fields(object = %name))]
    async fn object_info(&self, name: &ObjectName) -> MgmtResult<ObjectInfo> {
        self.request(Command::Info {
            object_name: name.clone(),
        })
        .await
    }

    #[instrument(skip(self), fields(object = %name))]
    async fn is_instance_of(&self, name: &ObjectName, class_name: &str) -> MgmtResult<bool> {
        self.request(Command::InstanceOf {
            object_name: name.clone(),
            class_name: class_name.to_string(),
        })
        .await
    }

    #[instrument(skip(self), fields(object = %name))]
    async fn is_registered(&self, name: &ObjectName) -> MgmtResult<bool> {
        self.request(Command::Registered {
            object_name: name.clone(),
        })
        .await
    }

    #[instrument(skip(self))]
    async fn domains(&self) -> MgmtResult<Vec<String>> {
        self.request(Command::Domains).await
    }

    #[instrument(skip(self))]
    async fn default_domain(&self) -> MgmtResult<String> {
        self.request(Command::DefaultDomain).await
    }

    #[instrument(skip(self))]
    async fn object_count(&self) -> MgmtResult<usize> {
        self.request(Command::Count).await
    }

    async fn create_object(
        &self,
        _class_name: &str,
        _name: Option<&ObjectName>,
    ) -> MgmtResult<ObjectInstance> {
        unsupported("create_object")
    }

    async fn create_object_with_loader(
        &self,
        _class_name: &str,
        _name: Option<&ObjectName>,
        _loader: &ObjectName,
    ) -> MgmtResult<ObjectInstance> {
        unsupported("create_object")
    }

    async fn create_object_with_params(
        &self,
        _class_name: &str,
        _name: Option<&ObjectName>,
        _params: Vec<Value>,
        _signature: &[String],
    ) -> MgmtResult<ObjectInstance> {
        unsupported("create_object")
    }

    async fn create_object_with_loader_and_params(
        &self,
        _class_name: &str,
        _name: Option<&ObjectName>,
        _loader: &ObjectName,
        _params: Vec<Value>,
        _signature: &[String],
    ) -> MgmtResult<ObjectInstance> {
        unsupported("create_object")
    }

    async fn unregister(&self, _name: &ObjectName) -> MgmtResult<()> {
        unsupported("unregister")
    }

    async fn add_notification_listener(
        &self,
        _name: &ObjectName,
        _listener: Arc<dyn NotificationListener>,
        _filter: Option<NotificationFilter>,
        _handback: Option<Value>,
    ) -> MgmtResult<()> {
        unsupported("add_notification_listener")
    }

    async fn add_notification_listener_object(
        &self,
        _name: &ObjectName,
        _listener: &ObjectName,
        _filter: Option<NotificationFilter>,
        _handback: Option<Value>,
    ) -> MgmtResult<()> {
        unsupported("add_notification_listener")
    }

    async fn remove_notification_listener(
        &self,
        _name: &ObjectName,
        _listener: Arc<dyn NotificationListener>,
    ) -> MgmtResult<()> {
        unsupported("remove_notification_listener")
    }

    async fn remove_notification_listener_filtered(
        &self,
        _name: &ObjectName,
        _listener: Arc<dyn NotificationListener>,
        _filter: Option<NotificationFilter>,
        _handback: Option<Value>,
    ) -> MgmtResult<()> {
        unsupported("remove_notification_listener")
    }

    async fn remove_notification_listener_object(
        &self,
        _name: &ObjectName,
        _listener: &ObjectName,
    ) -> MgmtResult<()> {
        unsupported("remove_notification_listener")
    }

    async fn remove_notification_listener_object_filtered(
        &self,
        _name: &ObjectName,
        _listener: &ObjectName,
        _filter: Option<NotificationFilter>,
        _handback: Option<Value>,
    ) -> MgmtResult<()> {
        unsupported("remove_notification_listener")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mgmt_core::{LocalRegistry, Registry, SimpleObject, PROTOCOL_VERSION};
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::error::{Result, TransportError};

    /// Transport answering from an in-process registry and counting calls
    struct Scripted {
        registry: LocalRegistry,
        calls: AtomicUsize,
        batches: Mutex<Vec<usize>>,
        /// Error classification forced onto every read
        read_error: Option<(u16, &'static str)>,
    }

    impl Scripted {
        async fn new() -> Self {
            let registry = LocalRegistry::new("platform", "runtime");
            registry
                .register(
                    Arc::new(
                        SimpleObject::builder("runtime.Memory")
                            .attribute("Used", "i64", json!(512))
                            .attribute("Kind", "string", json!("heap"))
                            .build(),
                    ),
                    Some("runtime:type=Memory".parse().unwrap()),
                )
                .await
                .unwrap();
            registry
                .register(
                    Arc::new(
                        SimpleObject::builder("runtime.Threads")
                            .attribute("Kind", "string", json!("pool"))
                            .build(),
                    ),
                    Some("runtime:type=Threads".parse().unwrap()),
                )
                .await
                .unwrap();
            Self {
                registry,
                calls: AtomicUsize::new(0),
                batches: Mutex::new(Vec::new()),
                read_error: None,
            }
        }

        async fn answer(&self, command: &Command) -> WireResponse {
            if let (Command::Read { .. }, Some((status, error_type))) = (command, self.read_error) {
                return WireResponse {
                    status,
                    value: None,
                    error: Some("vendor specific".to_string()),
                    error_type: Some(error_type.to_string()),
                    timestamp: 0,
                };
            }
            let result = match command {
                Command::Version => Ok(json!({
                    "agentVersion": "0.1.0",
                    "protocolVersion": PROTOCOL_VERSION,
                    "bridgeId": "feedface-unknown",
                })),
                Command::Read {
                    object_name,
                    attribute,
                } => self.registry.get_attribute(object_name, attribute).await,
                Command::Instances { pattern, query, .. } => self
                    .registry
                    .query_instances(pattern.as_ref(), query.as_ref())
                    .await
                    .map(|i| serde_json::to_value(i).unwrap()),
                Command::Search { pattern, query, .. } => self
                    .registry
                    .query_names(pattern.as_ref(), query.as_ref())
                    .await
                    .map(|n| serde_json::to_value(n).unwrap()),
                other => Err(MgmtError::Unsupported(other.type_name().to_string())),
            };
            WireResponse::from_result(result)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn execute(&self, command: &Command) -> Result<WireResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer(command).await)
        }

        async fn execute_batch(&self, commands: &[Command]) -> Result<Vec<WireResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().push(commands.len());
            let mut responses = Vec::new();
            for command in commands {
                responses.push(self.answer(command).await);
            }
            Ok(responses)
        }
    }

    /// Transport that is never reachable
    struct Refused;

    #[async_trait]
    impl Transport for Refused {
        async fn execute(&self, _: &Command) -> Result<WireResponse> {
            Err(TransportError::Decode("connection refused".to_string()))
        }

        async fn execute_batch(&self, _: &[Command]) -> Result<Vec<WireResponse>> {
            Err(TransportError::Decode("connection refused".to_string()))
        }
    }

    fn response(error_type: Option<&str>) -> WireResponse {
        WireResponse {
            status: 500,
            value: None,
            error: Some("went wrong".to_string()),
            error_type: error_type.map(str::to_string),
            timestamp: 0,
        }
    }

    #[test]
    fn known_classifications_map_to_native_kinds() {
        assert!(matches!(
            map_error(&response(Some("attribute_not_found"))),
            MgmtError::AttributeNotFound(ref m) if m == "went wrong"
        ));
        assert!(matches!(
            map_error(&response(Some("unsupported_operation"))),
            MgmtError::Unsupported(_)
        ));
        assert!(matches!(
            map_error(&response(Some("malformed_object_name"))),
            MgmtError::MalformedName(_)
        ));
    }

    #[test]
    fn unknown_classifications_are_kept() {
        let err = map_error(&response(Some("vendor.QuotaExceeded")));
        assert_eq!(err.kind(), ErrorKind::OperationInvocationFailed);
        assert_eq!(err.error_type(), "vendor.QuotaExceeded");
        assert_eq!(err.message(), "went wrong");

        // Server-side transport trouble is not a transport failure here
        let err = map_error(&response(Some("transport_failure")));
        assert_eq!(err.error_type(), "transport_failure");
        assert!(matches!(err, MgmtError::OperationFailed { .. }));

        assert!(matches!(
            map_error(&response(None)),
            MgmtError::OperationFailed { error_type: None, .. }
        ));
    }

    #[tokio::test]
    async fn handshake_sets_identity() {
        let conn = RemoteConnection::connect(Arc::new(Scripted::new().await))
            .await
            .unwrap();
        assert_eq!(conn.id(), "feedface-unknown-bridged");
        assert_eq!(conn.agent_version(), "0.1.0");
        assert_eq!(conn.protocol_version(), "1.0");
    }

    #[tokio::test]
    async fn unreachable_bridge_is_a_transport_failure() {
        let result = RemoteConnection::connect(Arc::new(Refused)).await;
        assert!(matches!(result, Err(MgmtError::Transport(_))));
    }

    #[tokio::test]
    async fn rejected_operations_never_reach_the_transport() {
        struct Ignore;
        impl NotificationListener for Ignore {
            fn handle_notification(&self, _: &mgmt_core::Notification, _: Option<&Value>) {}
        }

        let transport = Arc::new(Scripted::new().await);
        let conn = RemoteConnection::connect(transport.clone()).await.unwrap();
        let before = transport.calls.load(Ordering::SeqCst);
        let name: ObjectName = "runtime:type=Memory".parse().unwrap();
        let loader: ObjectName = "runtime:type=Loader".parse().unwrap();
        let listener: Arc<dyn NotificationListener> = Arc::new(Ignore);
        let signature = vec!["int".to_string()];

        let created = [
            conn.create_object("x.Y", Some(&name)).await,
            conn.create_object_with_loader("x.Y", None, &loader).await,
            conn.create_object_with_params("x.Y", Some(&name), vec![json!(1)], &signature)
                .await,
            conn.create_object_with_loader_and_params(
                "x.Y",
                None,
                &loader,
                vec![json!(1)],
                &signature,
            )
            .await,
        ];
        for result in created {
            assert!(matches!(result, Err(MgmtError::Unsupported(_))));
        }

        let rest = [
            conn.unregister(&name).await,
            conn.add_notification_listener(&name, listener.clone(), None, None)
                .await,
            conn.add_notification_listener_object(
                &name,
                &loader,
                Some(NotificationFilter::default()),
                Some(json!("hb")),
            )
            .await,
            conn.remove_notification_listener(&name, listener.clone())
                .await,
            conn.remove_notification_listener_filtered(&name, listener, None, Some(json!(1)))
                .await,
            conn.remove_notification_listener_object(&name, &loader)
                .await,
            conn.remove_notification_listener_object_filtered(&name, &loader, None, None)
                .await,
        ];
        for result in rest {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn batch_read_omits_failed_attributes() {
        let transport = Arc::new(Scripted::new().await);
        let conn = RemoteConnection::connect(transport.clone()).await.unwrap();
        let name: ObjectName = "runtime:type=Memory".parse().unwrap();

        let attrs = conn
            .get_attributes(&name, &["Used".to_string(), "Missing".to_string()])
            .await
            .unwrap();
        assert_eq!(attrs, vec![Attribute::new("Used", json!(512))]);
        assert_eq!(*transport.batches.lock(), vec![2]);
    }

    #[tokio::test]
    async fn foreign_error_classification_reaches_the_caller() {
        let mut scripted = Scripted::new().await;
        scripted.read_error = Some((500, "vendor.Throttled"));
        let conn = RemoteConnection::connect(Arc::new(scripted)).await.unwrap();

        let err = conn
            .get_attribute(&"runtime:type=Memory".parse().unwrap(), "Used")
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "vendor.Throttled");
        assert_eq!(err.message(), "vendor specific");
    }

    #[tokio::test]
    async fn local_query_mode_filters_on_this_side() {
        let query = QueryExp::attribute_substring("Kind", "hea");
        let server = RemoteConnection::connect(Arc::new(Scripted::new().await))
            .await
            .unwrap();
        let local = RemoteConnection::connect(Arc::new(Scripted::new().await))
            .await
            .unwrap()
            .with_query_mode(QueryMode::Local);

        let expected: ObjectName = "runtime:type=Memory".parse().unwrap();
        let remote_names = server.query_names(None, Some(&query)).await.unwrap();
        let local_names = local.query_names(None, Some(&query)).await.unwrap();
        assert_eq!(remote_names, local_names);
        assert_eq!(local_names.into_iter().collect::<Vec<_>>(), vec![expected]);
    }
}
