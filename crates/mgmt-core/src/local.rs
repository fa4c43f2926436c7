//! In-memory registry and a builder for simple managed objects

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{MgmtError, MgmtResult};
use crate::models::{
    Attribute, AttributeDescriptor, ObjectInfo, ObjectInstance, OperationDescriptor, TypeSignature,
};
use crate::name::ObjectName;
use crate::query::QueryExp;
use crate::registry::{
    ListenerId, ManagedObject, ObjectView, Registry, RegistrationListener, RegistryEvent,
};

/// Registry holding its objects in memory
pub struct LocalRegistry {
    id: String,
    default_domain: String,
    objects: RwLock<BTreeMap<ObjectName, Arc<dyn ManagedObject>>>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn RegistrationListener>)>>,
    next_listener: AtomicU64,
}

impl LocalRegistry {
    pub fn new(id: impl Into<String>, default_domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_domain: default_domain.into(),
            objects: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    fn lookup(&self, name: &ObjectName) -> MgmtResult<Arc<dyn ManagedObject>> {
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MgmtError::ObjectNotFound(name.to_string()))
    }

    /// Objects matching the pattern and query, evaluated outside the map lock
    async fn select(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> Vec<(ObjectName, Arc<dyn ManagedObject>)> {
        let candidates: Vec<_> = self
            .objects
            .read()
            .iter()
            .filter(|(name, _)| pattern.map_or(true, |p| p.matches(name)))
            .map(|(name, object)| (name.clone(), object.clone()))
            .collect();

        let Some(query) = query else {
            return candidates;
        };

        let mut selected = Vec::with_capacity(candidates.len());
        for (name, object) in candidates {
            let view = ObjectView::load(object.as_ref(), query).await;
            if query.evaluate(&view) {
                selected.push((name, object));
            }
        }
        selected
    }

    fn notify(&self, event: RegistryEvent) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_event(&self.id, &event);
        }
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    fn id(&self) -> &str {
        &self.id
    }

    fn default_domain(&self) -> &str {
        &self.default_domain
    }

    async fn query_names(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectName>> {
        Ok(self
            .select(pattern, query)
            .await
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn query_instances(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectInstance>> {
        Ok(self
            .select(pattern, query)
            .await
            .into_iter()
            .map(|(name, object)| ObjectInstance::new(name, object.info().class_name))
            .collect())
    }

    async fn object_instance(&self, name: &ObjectName) -> MgmtResult<ObjectInstance> {
        let object = self.lookup(name)?;
        Ok(ObjectInstance::new(name.clone(), object.info().class_name))
    }

    async fn object_info(&self, name: &ObjectName) -> MgmtResult<ObjectInfo> {
        Ok(self.lookup(name)?.info())
    }

    async fn get_attribute(&self, name: &ObjectName, attribute: &str) -> MgmtResult<Value> {
        let object = self.lookup(name)?;
        match object.info().attribute(attribute) {
            Some(desc) if desc.readable => object.get_attribute(attribute).await,
            _ => Err(MgmtError::AttributeNotFound(attribute.to_string())),
        }
    }

    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> MgmtResult<()> {
        let object = self.lookup(name)?;
        let info = object.info();
        let desc = match info.attribute(&attribute.name) {
            Some(desc) if desc.writable => desc,
            _ => return Err(MgmtError::AttributeNotFound(attribute.name)),
        };

        let signature: TypeSignature = desc.type_signature.parse()?;
        if !signature.accepts(&attribute.value) {
            return Err(MgmtError::InvalidAttributeValue(format!(
                "{} expects {}, got {}",
                attribute.name, signature, attribute.value
            )));
        }
        object.set_attribute(&attribute.name, attribute.value).await
    }

    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: &[Value],
        signature: Option<&[String]>,
    ) -> MgmtResult<Value> {
        let object = self.lookup(name)?;
        let info = object.info();
        let op = info.resolve_operation(operation, signature, arguments.len())?;

        if op.parameters.len() != arguments.len() {
            return Err(MgmtError::InvalidRequest(format!(
                "{} takes {} argument(s), {} given",
                op.name,
                op.parameters.len(),
                arguments.len()
            )));
        }
        for (param, arg) in op.parameters.iter().zip(arguments) {
            let expected: TypeSignature = param.type_signature.parse()?;
            if !expected.accepts(arg) {
                return Err(MgmtError::InvalidRequest(format!(
                    "Argument '{}' of {} expects {}, got {}",
                    param.name, op.name, expected, arg
                )));
            }
        }

        debug!(registry = %self.id, object = %name, operation = %op.name, "Invoking operation");
        object.invoke(op, arguments).await
    }

    async fn is_instance_of(&self, name: &ObjectName, class_name: &str) -> MgmtResult<bool> {
        Ok(self.lookup(name)?.is_instance_of(class_name))
    }

    async fn is_registered(&self, name: &ObjectName) -> bool {
        self.objects.read().contains_key(name)
    }

    async fn register(
        &self,
        object: Arc<dyn ManagedObject>,
        name: Option<ObjectName>,
    ) -> MgmtResult<ObjectInstance> {
        let name = name.or_else(|| object.default_name()).ok_or_else(|| {
            MgmtError::InvalidRequest("No object name given and none provided by the object".into())
        })?;
        if name.is_pattern() {
            return Err(MgmtError::MalformedName(format!(
                "Cannot register under a pattern: {}",
                name
            )));
        }

        let info = object.info();
        info.validate()?;

        {
            let mut objects = self.objects.write();
            if objects.contains_key(&name) {
                return Err(MgmtError::AlreadyExists(name.to_string()));
            }
            objects.insert(name.clone(), object);
        }

        debug!(registry = %self.id, object = %name, class = %info.class_name, "Registered object");
        self.notify(RegistryEvent::Registered(name.clone()));
        Ok(ObjectInstance::new(name, info.class_name))
    }

    async fn unregister(&self, name: &ObjectName) -> MgmtResult<()> {
        if self.objects.write().remove(name).is_none() {
            return Err(MgmtError::ObjectNotFound(name.to_string()));
        }
        debug!(registry = %self.id, object = %name, "Unregistered object");
        self.notify(RegistryEvent::Unregistered(name.clone()));
        Ok(())
    }

    async fn domains(&self) -> Vec<String> {
        let domains: BTreeSet<String> = self
            .objects
            .read()
            .keys()
            .map(|name| name.domain().to_string())
            .collect();
        domains.into_iter().collect()
    }

    async fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    fn add_listener(&self, listener: Arc<dyn RegistrationListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> MgmtResult<()> {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        if listeners.len() == before {
            return Err(MgmtError::ObjectNotFound(format!(
                "No listener {} on registry {}",
                id.0, self.id
            )));
        }
        Ok(())
    }
}

type Getter = Arc<dyn Fn() -> MgmtResult<Value> + Send + Sync>;
type Handler = Arc<dyn Fn(&[Value]) -> MgmtResult<Value> + Send + Sync>;

/// Managed object assembled from stored values, computed attributes and
/// operation closures
pub struct SimpleObject {
    info: ObjectInfo,
    default_name: Option<ObjectName>,
    supertypes: Vec<String>,
    values: RwLock<HashMap<String, Value>>,
    getters: HashMap<String, Getter>,
    handlers: HashMap<(String, Vec<String>), Handler>,
}

impl SimpleObject {
    pub fn builder(class_name: impl Into<String>) -> SimpleObjectBuilder {
        SimpleObjectBuilder {
            info: ObjectInfo {
                class_name: class_name.into(),
                description: None,
                attributes: Vec::new(),
                operations: Vec::new(),
            },
            default_name: None,
            supertypes: Vec::new(),
            values: HashMap::new(),
            getters: HashMap::new(),
            handlers: HashMap::new(),
        }
    }
}

#[async_trait]
impl ManagedObject for SimpleObject {
    fn info(&self) -> ObjectInfo {
        self.info.clone()
    }

    fn default_name(&self) -> Option<ObjectName> {
        self.default_name.clone()
    }

    fn is_instance_of(&self, class_name: &str) -> bool {
        self.info.class_name == class_name || self.supertypes.iter().any(|s| s == class_name)
    }

    async fn get_attribute(&self, attribute: &str) -> MgmtResult<Value> {
        if let Some(getter) = self.getters.get(attribute) {
            return getter();
        }
        self.values
            .read()
            .get(attribute)
            .cloned()
            .ok_or_else(|| MgmtError::AttributeNotFound(attribute.to_string()))
    }

    async fn set_attribute(&self, attribute: &str, value: Value) -> MgmtResult<()> {
        if self.getters.contains_key(attribute) {
            return Err(MgmtError::AttributeNotFound(attribute.to_string()));
        }
        self.values.write().insert(attribute.to_string(), value);
        Ok(())
    }

    async fn invoke(
        &self,
        operation: &OperationDescriptor,
        arguments: &[Value],
    ) -> MgmtResult<Value> {
        let key = (operation.name.clone(), operation.signature());
        match self.handlers.get(&key) {
            Some(handler) => handler(arguments),
            None => Err(MgmtError::operation_failed(format!(
                "No handler for {}({})",
                operation.name,
                key.1.join(",")
            ))),
        }
    }
}

/// Builder for [`SimpleObject`]
pub struct SimpleObjectBuilder {
    info: ObjectInfo,
    default_name: Option<ObjectName>,
    supertypes: Vec<String>,
    values: HashMap<String, Value>,
    getters: HashMap<String, Getter>,
    handlers: HashMap<(String, Vec<String>), Handler>,
}

impl SimpleObjectBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    /// Name used when registered without an explicit one
    pub fn named(mut self, name: ObjectName) -> Self {
        self.default_name = Some(name);
        self
    }

    /// Additional class name answered by `is_instance_of`
    pub fn implements(mut self, class_name: impl Into<String>) -> Self {
        self.supertypes.push(class_name.into());
        self
    }

    /// Read-only attribute with a fixed value
    pub fn attribute(mut self, name: &str, type_signature: &str, value: Value) -> Self {
        self.info
            .attributes
            .push(AttributeDescriptor::read_only(name, type_signature));
        self.values.insert(name.to_string(), value);
        self
    }

    /// Readable and writable stored attribute
    pub fn writable_attribute(mut self, name: &str, type_signature: &str, value: Value) -> Self {
        self.info
            .attributes
            .push(AttributeDescriptor::read_write(name, type_signature));
        self.values.insert(name.to_string(), value);
        self
    }

    /// Write-only attribute; reads report it as not found
    pub fn write_only_attribute(mut self, name: &str, type_signature: &str) -> Self {
        let mut desc = AttributeDescriptor::read_write(name, type_signature);
        desc.readable = false;
        self.info.attributes.push(desc);
        self
    }

    /// Read-only attribute evaluated on every read
    pub fn computed_attribute<F>(mut self, name: &str, type_signature: &str, getter: F) -> Self
    where
        F: Fn() -> MgmtResult<Value> + Send + Sync + 'static,
    {
        self.info
            .attributes
            .push(AttributeDescriptor::read_only(name, type_signature));
        self.getters.insert(name.to_string(), Arc::new(getter));
        self
    }

    /// Operation overload with its handler
    pub fn operation<F>(mut self, descriptor: OperationDescriptor, handler: F) -> Self
    where
        F: Fn(&[Value]) -> MgmtResult<Value> + Send + Sync + 'static,
    {
        let key = (descriptor.name.clone(), descriptor.signature());
        self.info.operations.push(descriptor);
        self.handlers.insert(key, Arc::new(handler));
        self
    }

    pub fn build(self) -> SimpleObject {
        SimpleObject {
            info: self.info,
            default_name: self.default_name,
            supertypes: self.supertypes,
            values: RwLock::new(self.values),
            getters: self.getters,
            handlers: self.handlers,
        }
    }
}
