//! The management connection contract shared by native and bridged
//! connections

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MgmtResult;
use crate::models::{Attribute, ObjectInfo, ObjectInstance};
use crate::name::ObjectName;
use crate::query::QueryExp;

/// A notification delivered to a [`NotificationListener`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Dotted type, e.g. `bridge.connection.opened`
    pub notification_type: String,
    /// Emitter (object name or connection id)
    pub source: String,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Filter by notification type prefix; an empty filter lets everything
/// through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub enabled_types: Vec<String>,
}

impl NotificationFilter {
    pub fn enable_type(mut self, prefix: impl Into<String>) -> Self {
        self.enabled_types.push(prefix.into());
        self
    }

    pub fn is_enabled(&self, notification: &Notification) -> bool {
        self.enabled_types.is_empty()
            || self
                .enabled_types
                .iter()
                .any(|t| notification.notification_type.starts_with(t.as_str()))
    }
}

pub trait NotificationListener: Send + Sync {
    /// `handback` is the value given at registration, passed through untouched
    fn handle_notification(&self, notification: &Notification, handback: Option<&Value>);
}

/// Full contract of a management connection.
///
/// Native connections call registries in-process; bridged connections
/// translate every call into wire requests. Callers cannot tell them apart
/// except through [`ManagementConnection::id`].
#[async_trait]
pub trait ManagementConnection: Send + Sync {
    /// Connection identifier; the suffix tells native from bridged
    fn id(&self) -> String;

    async fn query_names(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectName>>;

    async fn query_instances(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectInstance>>;

    async fn get_attribute(&self, name: &ObjectName, attribute: &str) -> MgmtResult<Value>;

    /// Read several attributes; the ones that cannot be read are left out
    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[String],
    ) -> MgmtResult<Vec<Attribute>>;

    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> MgmtResult<()>;

    /// Write several attributes; returns the ones actually written
    async fn set_attributes(
        &self,
        name: &ObjectName,
        attributes: Vec<Attribute>,
    ) -> MgmtResult<Vec<Attribute>>;

    /// Invoke the overload of `operation` whose parameter types are `signature`
    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: Vec<Value>,
        signature: &[String],
    ) -> MgmtResult<Value>;

    async fn object_instance(&self, name: &ObjectName) -> MgmtResult<ObjectInstance>;

    async fn object_info(&self, name: &ObjectName) -> MgmtResult<ObjectInfo>;

    async fn is_instance_of(&self, name: &ObjectName, class_name: &str) -> MgmtResult<bool>;

    async fn is_registered(&self, name: &ObjectName) -> MgmtResult<bool>;

    async fn domains(&self) -> MgmtResult<Vec<String>>;

    async fn default_domain(&self) -> MgmtResult<String>;

    async fn object_count(&self) -> MgmtResult<usize>;

    async fn create_object(
        &self,
        class_name: &str,
        name: Option<&ObjectName>,
    ) -> MgmtResult<ObjectInstance>;

    async fn create_object_with_loader(
        &self,
        class_name: &str,
        name: Option<&ObjectName>,
        loader: &ObjectName,
    ) -> MgmtResult<ObjectInstance>;

    async fn create_object_with_params(
        &self,
        class_name: &str,
        name: Option<&ObjectName>,
        params: Vec<Value>,
        signature: &[String],
    ) -> MgmtResult<ObjectInstance>;

    async fn create_object_with_loader_and_params(
        &self,
        class_name: &str,
        name: Option<&ObjectName>,
        loader: &ObjectName,
        params: Vec<Value>,
        signature: &[String],
    ) -> MgmtResult<ObjectInstance>;

    async fn unregister(&self, name: &ObjectName) -> MgmtResult<()>;

    async fn add_notification_listener(
        &self,
        name: &ObjectName,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<Value>,
    ) -> MgmtResult<()>;

    /// Listener given as the name of a registered listener object
    async fn add_notification_listener_object(
        &self,
        name: &ObjectName,
        listener: &ObjectName,
        filter: Option<NotificationFilter>,
        handback: Option<Value>,
    ) -> MgmtResult<()>;

    async fn remove_notification_listener(
        &self,
        name: &ObjectName,
        listener: Arc<dyn NotificationListener>,
    ) -> MgmtResult<()>;

    async fn remove_notification_listener_filtered(
        &self,
        name: &ObjectName,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<Value>,
    ) -> MgmtResult<()>;

    async fn remove_notification_listener_object(
        &self,
        name: &ObjectName,
        listener: &ObjectName,
    ) -> MgmtResult<()>;

    async fn remove_notification_listener_object_filtered(
        &self,
        name: &ObjectName,
        listener: &ObjectName,
        filter: Option<NotificationFilter>,
        handback: Option<Value>,
    ) -> MgmtResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(kind: &str) -> Notification {
        Notification {
            notification_type: kind.to_string(),
            source: "test".to_string(),
            sequence_number: 1,
            timestamp: Utc::now(),
            message: None,
        }
    }

    #[test]
    fn filter_matches_type_prefixes() {
        let open = notification("bridge.connection.opened");
        assert!(NotificationFilter::default().is_enabled(&open));

        let filter = NotificationFilter::default().enable_type("bridge.connection.");
        assert!(filter.is_enabled(&open));
        assert!(!filter.is_enabled(&notification("registry.registered")));
    }
}
