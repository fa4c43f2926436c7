//! Registry trait - one store of named managed objects

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::MgmtResult;
use crate::models::{Attribute, ObjectInfo, ObjectInstance, OperationDescriptor};
use crate::name::ObjectName;
use crate::query::{QueryExp, QueryTarget};

/// An object hosted by a registry.
///
/// Implementations answer for their own state only. Type checking of written
/// values and overload resolution happen in the registry, against
/// [`ManagedObject::info`].
#[async_trait]
pub trait ManagedObject: Send + Sync {
    /// Current metadata; fetched live on every introspection
    fn info(&self) -> ObjectInfo;

    /// Name to register under when the caller supplies none
    fn default_name(&self) -> Option<ObjectName> {
        None
    }

    /// Whether this object is an instance of `class_name`
    fn is_instance_of(&self, class_name: &str) -> bool {
        self.info().class_name == class_name
    }

    async fn get_attribute(&self, attribute: &str) -> MgmtResult<Value>;

    async fn set_attribute(&self, attribute: &str, value: Value) -> MgmtResult<()>;

    /// Run an already resolved operation with type-checked arguments
    async fn invoke(
        &self,
        operation: &OperationDescriptor,
        arguments: &[Value],
    ) -> MgmtResult<Value>;
}

/// Registration change reported to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered(ObjectName),
    Unregistered(ObjectName),
}

impl RegistryEvent {
    pub fn object_name(&self) -> &ObjectName {
        match self {
            RegistryEvent::Registered(name) | RegistryEvent::Unregistered(name) => name,
        }
    }
}

/// Observer of registration changes
pub trait RegistrationListener: Send + Sync {
    fn on_event(&self, registry_id: &str, event: &RegistryEvent);
}

/// Handle returned by [`Registry::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// One independent object store.
///
/// All single-object operations fail with `ObjectNotFound` when the name is
/// not registered here; callers rely on that to probe several registries.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Identifier used in logs and diagnostics
    fn id(&self) -> &str;

    fn default_domain(&self) -> &str;

    /// Names matching `pattern` (all when `None`) for which `query` holds
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

    async fn object_instance(&self, name: &ObjectName) -> MgmtResult<ObjectInstance>;

    async fn object_info(&self, name: &ObjectName) -> MgmtResult<ObjectInfo>;

    async fn get_attribute(&self, name: &ObjectName, attribute: &str) -> MgmtResult<Value>;

    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> MgmtResult<()>;

    /// Invoke `operation`; without a signature the overload is chosen by arity
    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: &[Value],
        signature: Option<&[String]>,
    ) -> MgmtResult<Value>;

    async fn is_instance_of(&self, name: &ObjectName, class_name: &str) -> MgmtResult<bool>;

    async fn is_registered(&self, name: &ObjectName) -> bool;

    /// Register `object` under `name`, or its default name
    async fn register(
        &self,
        object: Arc<dyn ManagedObject>,
        name: Option<ObjectName>,
    ) -> MgmtResult<ObjectInstance>;

    async fn unregister(&self, name: &ObjectName) -> MgmtResult<()>;

    async fn domains(&self) -> Vec<String>;

    async fn object_count(&self) -> usize;

    fn add_listener(&self, listener: Arc<dyn RegistrationListener>) -> ListenerId;

    /// Remove a listener; `ObjectNotFound` when the id is unknown
    fn remove_listener(&self, id: ListenerId) -> MgmtResult<()>;
}

/// Query view over a managed object holding the attributes a query reads.
///
/// Attributes that cannot be read are absent from the view.
pub struct ObjectView {
    class_name: String,
    values: HashMap<String, Value>,
}

impl ObjectView {
    /// Snapshot the attributes `query` references
    pub async fn load(object: &dyn ManagedObject, query: &QueryExp) -> Self {
        let mut values = HashMap::new();
        for name in query.attribute_names() {
            if let Ok(value) = object.get_attribute(&name).await {
                values.insert(name, value);
            }
        }
        Self {
            class_name: object.info().class_name,
            values,
        }
    }

    /// View over already fetched values
    pub fn from_values(class_name: impl Into<String>, values: HashMap<String, Value>) -> Self {
        Self {
            class_name: class_name.into(),
            values,
        }
    }
}

impl QueryTarget for ObjectView {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}
