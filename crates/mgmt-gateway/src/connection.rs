//! Native in-process connection to a bridge

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use mgmt_core::{
    Attribute, Command, ManagementConnection, MgmtError, MgmtResult, NotificationFilter,
    NotificationListener, ObjectInfo, ObjectInstance, ObjectName, QueryExp,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::handler::BridgeHandler;

/// Suffix of every native connection id
pub const LOCAL_ID_SUFFIX: &str = "-local";

/// Connection dispatching commands straight into a [`BridgeHandler`]
#[derive(Clone)]
pub struct LocalConnection {
    handler: Arc<BridgeHandler>,
}

impl LocalConnection {
    pub fn new(handler: Arc<BridgeHandler>) -> Self {
        Self { handler }
    }

    async fn run<T: DeserializeOwned>(&self, command: Command) -> MgmtResult<T> {
        let value = self.handler.dispatch(command).await?;
        serde_json::from_value(value)
            .map_err(|e| MgmtError::internal(format!("Unexpected result shape: {}", e)))
    }
}

fn unsupported<T>(what: &str) -> MgmtResult<T> {
    Err(MgmtError::Unsupported(format!(
        "{} is not available on a bridge connection",
        what
    )))
}

#[async_trait]
impl ManagementConnection for LocalConnection {
    fn id(&self) -> String {
        format!("{}{}", self.handler.bridge_id(), LOCAL_ID_SUFFIX)
    }

    async fn query_names(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectName>> {
        self.run(Command::Search {
            pattern: pattern.cloned(),
            query: query.cloned(),
            if_modified_since: None,
        })
        .await
    }

    async fn query_instances(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectInstance>> {
        self.run(Command::Instances {
            pattern: pattern.cloned(),
            query: query.cloned(),
            if_modified_since: None,
        })
        .await
    }

    async fn get_attribute(&self, name: &ObjectName, attribute: &str) -> MgmtResult<Value> {
        self.handler
            .dispatch(Command::Read {
                object_name: name.clone(),
                attribute: attribute.to_string(),
            })
            .await
    }

    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[String],
    ) -> MgmtResult<Vec<Attribute>> {
        let mut found = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            match self.get_attribute(name, attribute).await {
                Ok(value) => found.push(Attribute::new(attribute.clone(), value)),
                Err(e @ MgmtError::ObjectNotFound(_)) => return Err(e),
                Err(_) => {}
            }
        }
        Ok(found)
    }

    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> MgmtResult<()> {
        self.handler
            .dispatch(Command::Write {
                object_name: name.clone(),
                attribute: attribute.name,
                value: attribute.value,
            })
            .await?;
        Ok(())
    }

    async fn set_attributes(
        &self,
        name: &ObjectName,
        attributes: Vec<Attribute>,
    ) -> MgmtResult<Vec<Attribute>> {
        let mut written = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            match self.set_attribute(name, attribute.clone()).await {
                Ok(()) => written.push(attribute),
                Err(e @ MgmtError::ObjectNotFound(_)) => return Err(e),
                Err(_) => {}
            }
        }
        Ok(written)
    }

    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: Vec<Value>,
        signature: &[String],
    ) -> MgmtResult<Value> {
        self.handler
            .dispatch(Command::Exec {
                object_name: name.clone(),
                operation: operation.to_string(),
                arguments,
                signature: Some(signature.to_vec()),
            })
            .await
    }

    async fn object_instance(&self, name: &ObjectName) -> MgmtResult<ObjectInstance> {
        self.run(Command::Instance {
            object_name: name.clone(),
        })
        .await
    }

    async fn object_info(&self, name: &ObjectName) -> MgmtResult<ObjectInfo> {
        self.run(Command::Info {
            object_name: name.clone(),
        })
        .await
    }

    async fn is_instance_of(&self, name: &ObjectName, class_name: &str) -> MgmtResult<bool> {
        self.run(Command::InstanceOf {
            object_name: name.clone(),
            class_name: class_name.to_string(),
        })
        .await
    }

    async fn is_registered(&self, name: &ObjectName) -> MgmtResult<bool> {
        self.run(Command::Registered {
            object_name: name.clone(),
        })
        .await
    }

    async fn domains(&self) -> MgmtResult<Vec<String>> {
        self.run(Command::Domains).await
    }

    async fn default_domain(&self) -> MgmtResult<String> {
        self.run(Command::DefaultDomain).await
    }

    async fn object_count(&self) -> MgmtResult<usize> {
        self.run(Command::Count).await
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

    async fn unregister(&self, name: &ObjectName) -> MgmtResult<()> {
        self.handler.registries().unregister(name).await
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
    use mgmt_core::{
        LocalRegistry, OperationDescriptor, Registry, SimpleObject, TracingLogHandler,
    };
    use serde_json::json;

    use super::*;
    use crate::handler::BridgeConfig;

    async fn connection() -> (Arc<LocalRegistry>, LocalConnection) {
        let registry = Arc::new(LocalRegistry::new("platform", "runtime"));
        registry
            .register(
                Arc::new(
                    SimpleObject::builder("runtime.Memory")
                        .attribute("Valid", "string", json!("yes"))
                        .writable_attribute("Limit", "i64", json!(10))
                        .operation(
                            OperationDescriptor::new("twice", "i64").with_parameter("n", "i64"),
                            |args| Ok(json!(args[0].as_i64().unwrap_or(0) * 2)),
                        )
                        .build(),
                ),
                Some("runtime:type=Memory".parse().unwrap()),
            )
            .await
            .unwrap();
        let handler = BridgeHandler::new(
            BridgeConfig::default().with_bridge_id("abc"),
            vec![registry.clone() as Arc<dyn Registry>],
            Vec::new(),
            Arc::new(TracingLogHandler),
        )
        .await
        .unwrap();
        (registry, LocalConnection::new(handler))
    }

    #[tokio::test]
    async fn id_marks_native_connections() {
        let (_, conn) = connection().await;
        assert_eq!(conn.id(), "abc-local");
    }

    #[tokio::test]
    async fn get_attributes_omits_unknown_names() {
        let (_, conn) = connection().await;
        let name: ObjectName = "runtime:type=Memory".parse().unwrap();
        let attrs = conn
            .get_attributes(&name, &["Valid".to_string(), "Invalid".to_string()])
            .await
            .unwrap();
        assert_eq!(attrs, vec![Attribute::new("Valid", json!("yes"))]);

        let missing: ObjectName = "runtime:type=Missing".parse().unwrap();
        assert!(matches!(
            conn.get_attributes(&missing, &["Valid".to_string()]).await,
            Err(MgmtError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn set_attributes_reports_what_was_written() {
        let (_, conn) = connection().await;
        let name: ObjectName = "runtime:type=Memory".parse().unwrap();
        let written = conn
            .set_attributes(
                &name,
                vec![
                    Attribute::new("Limit", json!(20)),
                    Attribute::new("Valid", json!("no")),
                    Attribute::new("Limit", json!("not a number")),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, vec![Attribute::new("Limit", json!(20))]);
        assert_eq!(conn.get_attribute(&name, "Limit").await.unwrap(), json!(20));
    }

    #[tokio::test]
    async fn typed_results_and_unregister() {
        let (registry, conn) = connection().await;
        let name: ObjectName = "runtime:type=Memory".parse().unwrap();

        assert_eq!(
            conn.invoke(&name, "twice", vec![json!(21)], &["i64".to_string()])
                .await
                .unwrap(),
            json!(42)
        );
        assert_eq!(conn.object_info(&name).await.unwrap().class_name, "runtime.Memory");
        assert!(conn.is_instance_of(&name, "runtime.Memory").await.unwrap());
        // Memory plus the bridge's own entry
        assert_eq!(conn.object_count().await.unwrap(), 2);

        conn.unregister(&name).await.unwrap();
        assert!(!registry.is_registered(&name).await);
        assert!(!conn.is_registered(&name).await.unwrap());
    }

    #[tokio::test]
    async fn creation_is_unsupported() {
        let (_, conn) = connection().await;
        assert!(matches!(
            conn.create_object("x.Y", None).await,
            Err(MgmtError::Unsupported(_))
        ));
    }
}
