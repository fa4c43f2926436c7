//! Server detection
//!
//! Detectors probe the aggregate registry once at startup, in order, and the
//! first one recognising its product supplies the [`ServerHandle`]. The chain
//! always ends with [`FallbackDetector`], so detection never comes up empty.

use std::sync::Arc;

use async_trait::async_trait;
use mgmt_core::{Command, LogHandler, MgmtError, MgmtResult, ObjectName, ServerInfo};
use serde_json::Value;
use tracing::debug;

use crate::aggregate::AggregateRegistry;

/// Product specific adjustments around dispatch
#[async_trait]
pub trait ServerHooks: Send + Sync {
    /// Runs before every command is routed; may rewrite or reject it
    async fn pre_dispatch(
        &self,
        _registries: &AggregateRegistry,
        command: Command,
    ) -> MgmtResult<Command> {
        Ok(command)
    }

    /// Runs once right after this handle was selected
    async fn post_detect(&self, _registries: &AggregateRegistry, _log: &dyn LogHandler) {}
}

/// Hooks that change nothing
pub struct NoHooks;

impl ServerHooks for NoHooks {}

/// Detected server identity plus its dispatch hooks
#[derive(Clone)]
pub struct ServerHandle {
    info: ServerInfo,
    hooks: Arc<dyn ServerHooks>,
    bridge_id: Option<String>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("info", &self.info)
            .field("bridge_id", &self.bridge_id)
            .finish_non_exhaustive()
    }
}

impl ServerHandle {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            hooks: Arc::new(NoHooks),
            bridge_id: None,
        }
    }

    /// Handle with every identity field empty
    pub fn empty() -> Self {
        Self::new(ServerInfo::default())
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ServerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Assign the bridge id; done once before the handle is published
    pub(crate) fn with_bridge_id(mut self, bridge_id: String) -> Self {
        self.bridge_id = Some(bridge_id);
        self
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn vendor(&self) -> Option<&str> {
        self.info.vendor.as_deref()
    }

    pub fn product(&self) -> Option<&str> {
        self.info.product.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.info.version.as_deref()
    }

    pub fn bridge_id(&self) -> Option<&str> {
        self.bridge_id.as_deref()
    }

    pub fn hooks(&self) -> &Arc<dyn ServerHooks> {
        &self.hooks
    }
}

/// Probe for one kind of server
#[async_trait]
pub trait ServerDetector: Send + Sync {
    /// Name used when reporting a failing detector
    fn name(&self) -> &str;

    /// A handle when the server is recognised, `None` otherwise
    async fn detect(&self, registries: &AggregateRegistry) -> MgmtResult<Option<ServerHandle>>;
}

/// Always matches, with an all-empty handle
pub struct FallbackDetector;

#[async_trait]
impl ServerDetector for FallbackDetector {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn detect(&self, _registries: &AggregateRegistry) -> MgmtResult<Option<ServerHandle>> {
        Ok(Some(ServerHandle::empty()))
    }
}

/// Run `detectors` in order followed by the fallback.
///
/// A failing detector is reported through `log` and skipped.
pub async fn detect_server(
    detectors: &[Arc<dyn ServerDetector>],
    registries: &AggregateRegistry,
    log: &dyn LogHandler,
) -> ServerHandle {
    for detector in detectors {
        match detector.detect(registries).await {
            Ok(Some(handle)) => {
                debug!(detector = %detector.name(), "Server detected");
                return handle;
            }
            Ok(None) => {}
            Err(e) => {
                let cause: &(dyn std::error::Error + 'static) = &e;
                log.error(
                    &format!("Error while using detector {}: {}", detector.name(), e),
                    Some(cause),
                );
            }
        }
    }
    ServerHandle::empty()
}

/// An attribute known to be unavailable on a product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnavailableAttribute {
    /// Objects the quirk applies to (may be a pattern)
    pub pattern: ObjectName,
    pub attribute: String,
}

/// Hooks rejecting reads of known-unavailable attributes
pub struct UnavailableAttributeHooks {
    product: String,
    unavailable: Vec<UnavailableAttribute>,
}

#[async_trait]
impl ServerHooks for UnavailableAttributeHooks {
    async fn pre_dispatch(
        &self,
        _registries: &AggregateRegistry,
        command: Command,
    ) -> MgmtResult<Command> {
        if let Command::Read {
            object_name,
            attribute,
        } = &command
        {
            let quirk = self
                .unavailable
                .iter()
                .any(|u| &u.attribute == attribute && u.pattern.matches(object_name));
            if quirk {
                return Err(MgmtError::Unsupported(format!(
                    "Attribute {} of {} is not available on {}",
                    attribute, object_name, self.product
                )));
            }
        }
        Ok(command)
    }

    async fn post_detect(&self, _registries: &AggregateRegistry, log: &dyn LogHandler) {
        if !self.unavailable.is_empty() {
            log.info(&format!(
                "{}: {} attribute(s) marked unavailable",
                self.product,
                self.unavailable.len()
            ));
        }
    }
}

/// Recognises a product by the presence of an object matching a pattern.
///
/// The product version is read from `version_attribute` of the first match.
pub struct PresenceDetector {
    vendor: String,
    product: String,
    pattern: ObjectName,
    version_attribute: Option<String>,
    unavailable: Vec<UnavailableAttribute>,
}

impl PresenceDetector {
    pub fn new(vendor: impl Into<String>, product: impl Into<String>, pattern: ObjectName) -> Self {
        Self {
            vendor: vendor.into(),
            product: product.into(),
            pattern,
            version_attribute: None,
            unavailable: Vec::new(),
        }
    }

    pub fn with_version_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.version_attribute = Some(attribute.into());
        self
    }

    /// Reads of `attribute` on objects matching `pattern` become `Unsupported`
    pub fn with_unavailable_attribute(
        mut self,
        pattern: ObjectName,
        attribute: impl Into<String>,
    ) -> Self {
        self.unavailable.push(UnavailableAttribute {
            pattern,
            attribute: attribute.into(),
        });
        self
    }
}

#[async_trait]
impl ServerDetector for PresenceDetector {
    fn name(&self) -> &str {
        &self.product
    }

    async fn detect(&self, registries: &AggregateRegistry) -> MgmtResult<Option<ServerHandle>> {
        let names = registries.query_names(Some(&self.pattern), None).await?;
        let Some(first) = names.into_iter().next() else {
            return Ok(None);
        };

        let version = match &self.version_attribute {
            Some(attribute) => {
                let read = Command::Read {
                    object_name: first.clone(),
                    attribute: attribute.clone(),
                };
                match registries.handle_single(&read).await? {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                }
            }
            None => None,
        };

        let info = ServerInfo {
            vendor: Some(self.vendor.clone()),
            product: Some(self.product.clone()),
            version,
            extra_info: Some(serde_json::json!({ "detectedBy": first.to_string() })),
        };
        let hooks = Arc::new(UnavailableAttributeHooks {
            product: self.product.clone(),
            unavailable: self.unavailable.clone(),
        });
        Ok(Some(ServerHandle::new(info).with_hooks(hooks)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mgmt_core::{LocalRegistry, Registry, SimpleObject};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingLog {
        errors: Mutex<Vec<String>>,
        infos: Mutex<Vec<String>>,
    }

    impl LogHandler for RecordingLog {
        fn info(&self, message: &str) {
            self.infos.lock().unwrap().push(message.to_string());
        }

        fn error(&self, message: &str, _cause: Option<&(dyn std::error::Error + 'static)>) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    struct Broken;

    #[async_trait]
    impl ServerDetector for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn detect(&self, _: &AggregateRegistry) -> MgmtResult<Option<ServerHandle>> {
            Err(MgmtError::operation_failed("probe exploded"))
        }
    }

    struct Never;

    #[async_trait]
    impl ServerDetector for Never {
        fn name(&self) -> &str {
            "never"
        }

        async fn detect(&self, _: &AggregateRegistry) -> MgmtResult<Option<ServerHandle>> {
            Ok(None)
        }
    }

    async fn registries() -> AggregateRegistry {
        let platform = Arc::new(LocalRegistry::new("platform", "runtime"));
        platform
            .register(
                Arc::new(
                    SimpleObject::builder("acme.Server")
                        .attribute("Version", "string", json!("7.1"))
                        .attribute("Peak", "i64", json!(5))
                        .build(),
                ),
                Some("acme:type=Server".parse().unwrap()),
            )
            .await
            .unwrap();
        AggregateRegistry::new(vec![platform as Arc<dyn Registry>])
    }

    #[tokio::test]
    async fn failing_detectors_are_logged_and_skipped() {
        let registries = registries().await;
        let log = RecordingLog::default();
        let detectors: Vec<Arc<dyn ServerDetector>> =
            vec![Arc::new(Broken), Arc::new(Never), Arc::new(Broken)];

        let handle = detect_server(&detectors, &registries, &log).await;

        assert_eq!(handle.info(), &ServerInfo::default());
        let errors = log.errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("broken"));
        assert!(errors[0].contains("probe exploded"));
    }

    #[tokio::test]
    async fn presence_detector_reads_version() {
        let registries = registries().await;
        let log = RecordingLog::default();
        let detectors: Vec<Arc<dyn ServerDetector>> = vec![
            Arc::new(PresenceDetector::new("Nobody", "Missing", "none:*".parse().unwrap())),
            Arc::new(
                PresenceDetector::new("Acme", "AcmeServer", "acme:type=*".parse().unwrap())
                    .with_version_attribute("Version"),
            ),
        ];

        let handle = detect_server(&detectors, &registries, &log).await;
        assert_eq!(handle.vendor(), Some("Acme"));
        assert_eq!(handle.product(), Some("AcmeServer"));
        assert_eq!(handle.version(), Some("7.1"));
        assert!(log.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_attribute_reads_are_unsupported() {
        let registries = registries().await;
        let detector = PresenceDetector::new("Acme", "AcmeServer", "acme:*".parse().unwrap())
            .with_unavailable_attribute("acme:type=*".parse().unwrap(), "Peak");
        let handle = detector.detect(&registries).await.unwrap().unwrap();

        let peak = Command::Read {
            object_name: "acme:type=Server".parse().unwrap(),
            attribute: "Peak".to_string(),
        };
        let result = handle.hooks().pre_dispatch(&registries, peak).await;
        assert!(matches!(result, Err(MgmtError::Unsupported(_))));

        let version = Command::Read {
            object_name: "acme:type=Server".parse().unwrap(),
            attribute: "Version".to_string(),
        };
        assert!(handle.hooks().pre_dispatch(&registries, version).await.is_ok());
    }
}
