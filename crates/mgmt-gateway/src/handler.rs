//! Bridge handler - detection, self-registration, dispatch and teardown
//!
//! Lifecycle: `Uninitialized -> Detecting -> Ready -> Destroying -> Destroyed`.
//! The handler is returned from [`BridgeHandler::new`] already `Ready`;
//! `Destroyed` is terminal.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use mgmt_core::{
    AttributeDescriptor, Command, LogHandler, ManagedObject, MgmtError, MgmtResult, ObjectInfo,
    ObjectName, OperationDescriptor, Registry, VersionInfo, PROTOCOL_VERSION,
};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aggregate::AggregateRegistry;
use crate::detector::{detect_server, FallbackDetector, ServerDetector, ServerHandle};
use crate::dispatch::RequestDispatcher;

/// Base name of the bridge's own diagnostic entry
pub const HANDLER_OBJECT_NAME: &str = "bridge:type=ServerHandler";

/// Class name of the diagnostic entry
const HANDLER_CLASS_NAME: &str = "bridge.ServerHandler";

/// Bridge settings looked up at construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Extra `key=value` properties appended to the diagnostic entry name
    pub qualifier: Option<String>,
    /// Bridge id; generated when absent
    pub bridge_id: Option<String>,
}

impl BridgeConfig {
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn with_bridge_id(mut self, bridge_id: impl Into<String>) -> Self {
        self.bridge_id = Some(bridge_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Detecting,
    Ready,
    Destroying,
    Destroyed,
}

/// An entry the bridge registered and must remove on teardown
struct TrackedEntry {
    registry: Arc<dyn Registry>,
    name: ObjectName,
}

/// Server side of the bridge
pub struct BridgeHandler {
    registries: Arc<AggregateRegistry>,
    dispatcher: RequestDispatcher,
    tracked: Mutex<Vec<TrackedEntry>>,
    state: RwLock<BridgeState>,
    object_name: String,
}

impl BridgeHandler {
    /// Detect the server, assign the bridge id and register the diagnostic
    /// entry in the platform (first) registry.
    ///
    /// `detectors` run in order; the fallback detector is appended.
    pub async fn new(
        config: BridgeConfig,
        registries: Vec<Arc<dyn Registry>>,
        detectors: Vec<Arc<dyn ServerDetector>>,
        log: Arc<dyn LogHandler>,
    ) -> MgmtResult<Arc<Self>> {
        let registries = Arc::new(AggregateRegistry::new(registries));
        let state = RwLock::new(BridgeState::Uninitialized);
        if registries.platform().is_none() {
            return Err(MgmtError::internal("No platform registry to register the bridge in"));
        }

        *state.write() = BridgeState::Detecting;
        let mut chain = detectors;
        chain.push(Arc::new(FallbackDetector));
        let handle = detect_server(&chain, &registries, log.as_ref()).await;
        handle.hooks().post_detect(&registries, log.as_ref()).await;

        let bridge_id = config.bridge_id.clone().unwrap_or_else(generate_bridge_id);
        let handle = handle.with_bridge_id(bridge_id.clone());
        info!(
            bridge_id = %bridge_id,
            vendor = handle.vendor().unwrap_or("-"),
            product = handle.product().unwrap_or("-"),
            "Server detection finished"
        );

        let version = VersionInfo {
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            bridge_id,
            server: handle.info().clone(),
            qualifier: config.qualifier.clone(),
        };
        let object_name = match &config.qualifier {
            Some(q) => format!("{},{}", HANDLER_OBJECT_NAME, q),
            None => HANDLER_OBJECT_NAME.to_string(),
        };

        let handler = Arc::new(Self {
            dispatcher: RequestDispatcher::new(registries.clone(), handle, version),
            registries,
            tracked: Mutex::new(Vec::new()),
            state,
            object_name,
        });
        handler.register_self().await?;

        *handler.state.write() = BridgeState::Ready;
        Ok(handler)
    }

    pub fn state(&self) -> BridgeState {
        *self.state.read()
    }

    pub fn server_handle(&self) -> &ServerHandle {
        self.dispatcher.handle()
    }

    pub fn version(&self) -> &VersionInfo {
        self.dispatcher.version()
    }

    pub fn bridge_id(&self) -> &str {
        &self.dispatcher.version().bridge_id
    }

    pub fn registries(&self) -> &Arc<AggregateRegistry> {
        &self.registries
    }

    /// Name of the diagnostic entry, qualifier included
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Description of every registry and its objects
    pub async fn registries_info(&self) -> MgmtResult<String> {
        self.registries.registries_info().await
    }

    /// Route one command; only allowed while `Ready`
    pub async fn dispatch(&self, command: Command) -> MgmtResult<Value> {
        self.ensure_ready()?;
        self.dispatcher.dispatch(command).await
    }

    /// Register a hosted object in the platform registry and track it for
    /// teardown
    pub async fn register_object(
        &self,
        object: Arc<dyn ManagedObject>,
        name: Option<ObjectName>,
    ) -> MgmtResult<ObjectName> {
        self.ensure_ready()?;
        self.register_tracked(object, name).await
    }

    /// Unregister every tracked entry.
    ///
    /// Each entry leaves the tracked list as soon as its removal is attempted,
    /// whatever the outcome. A single failure is returned as is; several are
    /// joined into one `Management` error. Calling this again once
    /// `Destroyed` does nothing.
    pub async fn destroy(&self) -> MgmtResult<()> {
        let mut tracked = self.tracked.lock().await;
        {
            let mut state = self.state.write();
            match *state {
                BridgeState::Destroyed => return Ok(()),
                _ => *state = BridgeState::Destroying,
            }
        }

        let mut failures = Vec::new();
        for entry in tracked.drain(..) {
            debug!(registry = %entry.registry.id(), object = %entry.name, "Unregistering");
            if let Err(e) = entry.registry.unregister(&entry.name).await {
                warn!(object = %entry.name, error = %e, "Failed to unregister");
                failures.push(e);
            }
        }
        drop(tracked);

        self.registries.release_listeners();
        *self.state.write() = BridgeState::Destroyed;
        info!(bridge_id = %self.bridge_id(), "Bridge destroyed");

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(MgmtError::Management(
                failures
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    fn ensure_ready(&self) -> MgmtResult<()> {
        match self.state() {
            BridgeState::Ready => Ok(()),
            other => Err(MgmtError::internal(format!(
                "Bridge is {:?}, not ready",
                other
            ))),
        }
    }

    async fn register_tracked(
        &self,
        object: Arc<dyn ManagedObject>,
        name: Option<ObjectName>,
    ) -> MgmtResult<ObjectName> {
        let mut tracked = self.tracked.lock().await;
        // A teardown that got the lock first has already emptied the list
        if let state @ (BridgeState::Destroying | BridgeState::Destroyed) = self.state() {
            return Err(MgmtError::internal(format!(
                "Bridge is {:?}, not accepting registrations",
                state
            )));
        }
        let platform = self
            .registries
            .platform()
            .cloned()
            .ok_or_else(|| MgmtError::internal("No platform registry"))?;

        match platform.register(object, name).await {
            Ok(instance) => {
                debug!(object = %instance.object_name, "Registered bridge object");
                tracked.push(TrackedEntry {
                    registry: platform,
                    name: instance.object_name.clone(),
                });
                Ok(instance.object_name)
            }
            Err(
                e @ (MgmtError::AlreadyExists(_)
                | MgmtError::MalformedName(_)
                | MgmtError::InvalidRequest(_)),
            ) => Err(e),
            Err(e) => Err(MgmtError::internal_with("Could not register object", e)),
        }
    }

    async fn register_self(self: &Arc<Self>) -> MgmtResult<()> {
        let name: ObjectName = self.object_name.parse().map_err(|e| {
            MgmtError::internal_with(
                format!("Own object name {} is malformed", self.object_name),
                e,
            )
        })?;
        let diagnostics = Arc::new(BridgeDiagnostics {
            handler: Arc::downgrade(self),
            bridge_id: self.bridge_id().to_string(),
            qualifier: self.version().qualifier.clone(),
        });

        match self.register_tracked(diagnostics, Some(name)).await {
            Ok(_) => Ok(()),
            // Another bridge in this process got there first; the entry only
            // carries process-wide information
            Err(MgmtError::AlreadyExists(existing)) => {
                debug!(object = %existing, "Diagnostic entry already registered");
                Ok(())
            }
            Err(e @ MgmtError::InvalidRequest(_)) => Err(MgmtError::internal_with(
                format!("{} is not a compliant managed object", HANDLER_CLASS_NAME),
                e,
            )),
            Err(e @ MgmtError::MalformedName(_)) => Err(MgmtError::internal_with(
                format!("Own object name {} is malformed", self.object_name),
                e,
            )),
            Err(e) => Err(e),
        }
    }
}

/// `<8 hex digits>-unknown`
fn generate_bridge_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-unknown", &id[..8])
}

/// The bridge's own diagnostic entry
struct BridgeDiagnostics {
    handler: Weak<BridgeHandler>,
    bridge_id: String,
    qualifier: Option<String>,
}

#[async_trait]
impl ManagedObject for BridgeDiagnostics {
    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            class_name: HANDLER_CLASS_NAME.to_string(),
            description: Some("Management bridge server handler".to_string()),
            attributes: vec![
                AttributeDescriptor::read_only("BridgeId", "string"),
                AttributeDescriptor::read_only("Qualifier", "string"),
            ],
            operations: vec![OperationDescriptor::new("registriesInfo", "string")
                .with_description("All registries with their objects")],
        }
    }

    async fn get_attribute(&self, attribute: &str) -> MgmtResult<Value> {
        match attribute {
            "BridgeId" => Ok(json!(self.bridge_id)),
            "Qualifier" => Ok(json!(self.qualifier)),
            other => Err(MgmtError::AttributeNotFound(other.to_string())),
        }
    }

    async fn set_attribute(&self, attribute: &str, _value: Value) -> MgmtResult<()> {
        Err(MgmtError::AttributeNotFound(attribute.to_string()))
    }

    async fn invoke(
        &self,
        operation: &OperationDescriptor,
        _arguments: &[Value],
    ) -> MgmtResult<Value> {
        match operation.name.as_str() {
            "registriesInfo" => {
                let handler = self
                    .handler
                    .upgrade()
                    .ok_or_else(|| MgmtError::operation_failed("Bridge handler is gone"))?;
                Ok(json!(handler.registries_info().await?))
            }
            other => Err(MgmtError::operation_failed(format!(
                "No operation {}",
                other
            ))),
        }
    }
}
