//! Request Dispatcher - routes a command to all registries or to the owning
//! one

use std::sync::Arc;

use mgmt_core::{Attribute, Command, MgmtError, MgmtResult, Registry, Routing, VersionInfo};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::aggregate::AggregateRegistry;
use crate::detector::ServerHandle;

/// Routes commands after the active handle's pre-dispatch hook ran
pub struct RequestDispatcher {
    registries: Arc<AggregateRegistry>,
    handle: ServerHandle,
    version: VersionInfo,
}

impl RequestDispatcher {
    pub fn new(
        registries: Arc<AggregateRegistry>,
        handle: ServerHandle,
        version: VersionInfo,
    ) -> Self {
        Self {
            registries,
            handle,
            version,
        }
    }

    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    #[instrument(skip_all, fields(command = command.type_name()))]
    pub async fn dispatch(&self, command: Command) -> MgmtResult<Value> {
        let command = self
            .handle
            .hooks()
            .pre_dispatch(&self.registries, command)
            .await?;

        match command.routing() {
            Routing::AllAtOnce => match self.handle_all_at_once(&command).await {
                Err(MgmtError::Transport(message)) => Err(MgmtError::internal_with(
                    format!(
                        "Transport failure while handling {} on local registries",
                        command.type_name()
                    ),
                    MgmtError::Transport(message),
                )),
                other => other,
            },
            Routing::SingleRegistry => self.registries.handle_single(&command).await,
        }
    }

    async fn handle_all_at_once(&self, command: &Command) -> MgmtResult<Value> {
        let registries = &self.registries;
        match command {
            Command::Search {
                pattern,
                query,
                if_modified_since,
            } => {
                registries.check_modified(*if_modified_since)?;
                let names = registries
                    .query_names(pattern.as_ref(), query.as_ref())
                    .await?;
                to_value(&names)
            }
            Command::Instances {
                pattern,
                query,
                if_modified_since,
            } => {
                registries.check_modified(*if_modified_since)?;
                let instances = registries
                    .query_instances(pattern.as_ref(), query.as_ref())
                    .await?;
                to_value(&instances)
            }
            Command::Domains => to_value(&registries.domains().await),
            Command::Count => to_value(&registries.object_count().await),
            Command::Registered { object_name } => {
                to_value(&registries.is_registered(object_name).await)
            }
            Command::DefaultDomain => to_value(&registries.default_domain()),
            Command::Version => to_value(&self.version),
            other => Err(MgmtError::internal(format!(
                "{} is not an all-at-once command",
                other.type_name()
            ))),
        }
    }
}

/// Run a single-registry command against one registry
pub(crate) async fn execute_on(registry: &dyn Registry, command: &Command) -> MgmtResult<Value> {
    debug!(registry = %registry.id(), command = command.type_name(), "Trying registry");
    match command {
        Command::Read {
            object_name,
            attribute,
        } => registry.get_attribute(object_name, attribute).await,
        Command::Write {
            object_name,
            attribute,
            value,
        } => {
            registry
                .set_attribute(object_name, Attribute::new(attribute.clone(), value.clone()))
                .await?;
            Ok(Value::Null)
        }
        Command::Exec {
            object_name,
            operation,
            arguments,
            signature,
        } => {
            registry
                .invoke(object_name, operation, arguments, signature.as_deref())
                .await
        }
        Command::Info { object_name } => to_value(&registry.object_info(object_name).await?),
        Command::Instance { object_name } => {
            to_value(&registry.object_instance(object_name).await?)
        }
        Command::InstanceOf {
            object_name,
            class_name,
        } => to_value(&registry.is_instance_of(object_name, class_name).await?),
        other => Err(MgmtError::internal(format!(
            "{} is not a single-registry command",
            other.type_name()
        ))),
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> MgmtResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| MgmtError::internal(format!("Failed to encode result: {}", e)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use mgmt_core::{
        ListenerId, LocalRegistry, ManagedObject, ObjectInfo, ObjectInstance, ObjectName,
        QueryExp, RegistrationListener, ServerInfo, SimpleObject, PROTOCOL_VERSION,
    };
    use serde_json::json;

    use super::*;
    use crate::detector::ServerHooks;

    fn version() -> VersionInfo {
        VersionInfo {
            agent_version: "0.1.0".to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            bridge_id: "cafebabe-unknown".to_string(),
            server: ServerInfo::default(),
            qualifier: None,
        }
    }

    async fn registries() -> Arc<AggregateRegistry> {
        let platform = Arc::new(LocalRegistry::new("platform", "runtime"));
        platform
            .register(
                Arc::new(
                    SimpleObject::builder("runtime.Memory")
                        .writable_attribute("Verbose", "bool", json!(false))
                        .build(),
                ),
                Some("runtime:type=Memory".parse().unwrap()),
            )
            .await
            .unwrap();
        Arc::new(AggregateRegistry::new(vec![platform as Arc<dyn Registry>]))
    }

    /// Registry whose store sits behind a dropped connection
    struct Unreachable;

    fn gone<T>() -> MgmtResult<T> {
        Err(MgmtError::Transport("connection reset".into()))
    }

    #[async_trait]
    impl Registry for Unreachable {
        fn id(&self) -> &str {
            "unreachable"
        }

        fn default_domain(&self) -> &str {
            "remote"
        }

        async fn query_names(
            &self,
            _: Option<&ObjectName>,
            _: Option<&QueryExp>,
        ) -> MgmtResult<BTreeSet<ObjectName>> {
            gone()
        }

        async fn query_instances(
            &self,
            _: Option<&ObjectName>,
            _: Option<&QueryExp>,
        ) -> MgmtResult<BTreeSet<ObjectInstance>> {
            gone()
        }

        async fn object_instance(&self, _: &ObjectName) -> MgmtResult<ObjectInstance> {
            gone()
        }

        async fn object_info(&self, _: &ObjectName) -> MgmtResult<ObjectInfo> {
            gone()
        }

        async fn get_attribute(&self, _: &ObjectName, _: &str) -> MgmtResult<Value> {
            gone()
        }

        async fn set_attribute(&self, _: &ObjectName, _: Attribute) -> MgmtResult<()> {
            gone()
        }

        async fn invoke(
            &self,
            _: &ObjectName,
            _: &str,
            _: &[Value],
            _: Option<&[String]>,
        ) -> MgmtResult<Value> {
            gone()
        }

        async fn is_instance_of(&self, _: &ObjectName, _: &str) -> MgmtResult<bool> {
            gone()
        }

        async fn is_registered(&self, _: &ObjectName) -> bool {
            false
        }

        async fn register(
            &self,
            _: Arc<dyn ManagedObject>,
            _: Option<ObjectName>,
        ) -> MgmtResult<ObjectInstance> {
            gone()
        }

        async fn unregister(&self, _: &ObjectName) -> MgmtResult<()> {
            gone()
        }

        async fn domains(&self) -> Vec<String> {
            Vec::new()
        }

        async fn object_count(&self) -> usize {
            0
        }

        fn add_listener(&self, _: Arc<dyn RegistrationListener>) -> ListenerId {
            ListenerId(0)
        }

        fn remove_listener(&self, _: ListenerId) -> MgmtResult<()> {
            Ok(())
        }
    }

    /// Rewrites every read of `Alias` into a read of `Verbose`
    struct Aliasing;

    #[async_trait]
    impl ServerHooks for Aliasing {
        async fn pre_dispatch(
            &self,
            _registries: &AggregateRegistry,
            command: Command,
        ) -> MgmtResult<Command> {
            match command {
                Command::Read {
                    object_name,
                    attribute,
                } if attribute == "Alias" => Ok(Command::Read {
                    object_name,
                    attribute: "Verbose".to_string(),
                }),
                other => Ok(other),
            }
        }
    }

    #[tokio::test]
    async fn routes_by_declared_mode() {
        let dispatcher = RequestDispatcher::new(registries().await, ServerHandle::empty(), version());

        assert_eq!(dispatcher.dispatch(Command::Count).await.unwrap(), json!(1));
        assert_eq!(
            dispatcher.dispatch(Command::DefaultDomain).await.unwrap(),
            json!("runtime")
        );
        assert_eq!(
            dispatcher
                .dispatch(Command::Search {
                    pattern: Some("runtime:*".parse().unwrap()),
                    query: None,
                    if_modified_since: None,
                })
                .await
                .unwrap(),
            json!(["runtime:type=Memory"])
        );

        let name: ObjectName = "runtime:type=Memory".parse().unwrap();
        dispatcher
            .dispatch(Command::Write {
                object_name: name.clone(),
                attribute: "Verbose".to_string(),
                value: json!(true),
            })
            .await
            .unwrap();
        assert_eq!(
            dispatcher
                .dispatch(Command::Read {
                    object_name: name,
                    attribute: "Verbose".to_string(),
                })
                .await
                .unwrap(),
            json!(true)
        );

        let v = dispatcher.dispatch(Command::Version).await.unwrap();
        assert_eq!(v["bridgeId"], json!("cafebabe-unknown"));
        assert_eq!(v["protocolVersion"], json!("1.0"));
    }

    #[tokio::test]
    async fn search_honours_if_modified_since() {
        let dispatcher = RequestDispatcher::new(registries().await, ServerHandle::empty(), version());
        let result = dispatcher
            .dispatch(Command::Search {
                pattern: None,
                query: None,
                if_modified_since: Some(chrono::Utc::now().timestamp() + 60),
            })
            .await;
        assert!(matches!(result, Err(MgmtError::NotChanged)));
    }

    #[tokio::test]
    async fn pre_dispatch_hook_may_rewrite() {
        let handle = ServerHandle::empty().with_hooks(Arc::new(Aliasing));
        let dispatcher = RequestDispatcher::new(registries().await, handle, version());
        let value = dispatcher
            .dispatch(Command::Read {
                object_name: "runtime:type=Memory".parse().unwrap(),
                attribute: "Alias".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(value, json!(false));
    }

    #[tokio::test]
    async fn transport_failure_in_all_at_once_is_internal() {
        let registries = Arc::new(AggregateRegistry::new(vec![
            Arc::new(Unreachable) as Arc<dyn Registry>
        ]));
        let dispatcher = RequestDispatcher::new(registries, ServerHandle::empty(), version());

        let search = Command::Search {
            pattern: None,
            query: None,
            if_modified_since: None,
        };
        match dispatcher.dispatch(search).await {
            Err(err @ MgmtError::Internal { .. }) => {
                let source = std::error::Error::source(&err).map(|s| s.to_string());
                assert_eq!(source.as_deref(), Some("Transport error: connection reset"));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Single-registry commands report the failure as it is
        let read = Command::Read {
            object_name: "remote:type=X".parse().unwrap(),
            attribute: "A".to_string(),
        };
        assert!(matches!(
            dispatcher.dispatch(read).await,
            Err(MgmtError::Transport(_))
        ));
    }
}
