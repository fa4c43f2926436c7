//! Aggregate Registry - one logical view over several registries
//!
//! The registry list is fixed at construction and never reordered. The first
//! registry is the platform registry, where the bridge registers its own
//! objects.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use mgmt_core::{
    Command, ListenerId, MgmtError, MgmtResult, ObjectInstance, ObjectName, QueryExp, Registry,
    RegistrationListener, RegistryEvent,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch;

/// Default domain reported when there is no registry at all
const FALLBACK_DEFAULT_DOMAIN: &str = "DefaultDomain";

/// Records the time of the last registration change
struct UpdateTracker {
    last_update: Arc<AtomicI64>,
}

impl RegistrationListener for UpdateTracker {
    fn on_event(&self, registry_id: &str, event: &RegistryEvent) {
        debug!(registry = %registry_id, object = %event.object_name(), "Registration change");
        self.last_update
            .store(Utc::now().timestamp(), Ordering::SeqCst);
    }
}

/// Logical union of the registries discovered at startup
pub struct AggregateRegistry {
    registries: Vec<Arc<dyn Registry>>,
    last_update: Arc<AtomicI64>,
    listeners: Mutex<Vec<(Arc<dyn Registry>, ListenerId)>>,
}

impl AggregateRegistry {
    /// Compose `registries` in the given order and start tracking changes
    pub fn new(registries: Vec<Arc<dyn Registry>>) -> Self {
        let last_update = Arc::new(AtomicI64::new(Utc::now().timestamp()));
        let listeners = registries
            .iter()
            .map(|registry| {
                let id = registry.add_listener(Arc::new(UpdateTracker {
                    last_update: last_update.clone(),
                }));
                (registry.clone(), id)
            })
            .collect();

        Self {
            registries,
            last_update,
            listeners: Mutex::new(listeners),
        }
    }

    /// Registries in discovery order
    pub fn registries(&self) -> &[Arc<dyn Registry>] {
        &self.registries
    }

    /// The registry hosting the bridge's own objects
    pub fn platform(&self) -> Option<&Arc<dyn Registry>> {
        self.registries.first()
    }

    /// Epoch seconds of the last registration change (or of construction)
    pub fn last_update(&self) -> i64 {
        self.last_update.load(Ordering::SeqCst)
    }

    /// `NotChanged` when nothing was registered or unregistered after `since`
    pub fn check_modified(&self, since: Option<i64>) -> MgmtResult<()> {
        match since {
            Some(since) if self.last_update() <= since => Err(MgmtError::NotChanged),
            _ => Ok(()),
        }
    }

    pub async fn query_names(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectName>> {
        let mut names = BTreeSet::new();
        for registry in &self.registries {
            names.extend(registry.query_names(pattern, query).await?);
        }
        Ok(names)
    }

    /// Union of instances; on duplicate names the first registry's entry wins
    pub async fn query_instances(
        &self,
        pattern: Option<&ObjectName>,
        query: Option<&QueryExp>,
    ) -> MgmtResult<BTreeSet<ObjectInstance>> {
        let mut instances = BTreeSet::new();
        for registry in &self.registries {
            for instance in registry.query_instances(pattern, query).await? {
                if !instances.contains(&instance) {
                    instances.insert(instance);
                }
            }
        }
        Ok(instances)
    }

    pub async fn domains(&self) -> Vec<String> {
        let mut domains = BTreeSet::new();
        for registry in &self.registries {
            domains.extend(registry.domains().await);
        }
        domains.into_iter().collect()
    }

    /// Sum over all registries; an object known twice counts twice
    pub async fn object_count(&self) -> usize {
        let mut count = 0;
        for registry in &self.registries {
            count += registry.object_count().await;
        }
        count
    }

    pub async fn is_registered(&self, name: &ObjectName) -> bool {
        for registry in &self.registries {
            if registry.is_registered(name).await {
                return true;
            }
        }
        false
    }

    pub fn default_domain(&self) -> &str {
        self.platform()
            .map(|r| r.default_domain())
            .unwrap_or(FALLBACK_DEFAULT_DOMAIN)
    }

    /// Run a single-registry command.
    ///
    /// Registries are tried in discovery order. `ObjectNotFound` moves on to
    /// the next one; any other outcome, success or failure, is final.
    pub async fn handle_single(&self, command: &Command) -> MgmtResult<Value> {
        for registry in &self.registries {
            match dispatch::execute_on(registry.as_ref(), command).await {
                Err(MgmtError::ObjectNotFound(_)) => continue,
                other => return other,
            }
        }
        Err(not_found(command))
    }

    /// Unregister `name` from the first registry that owns it
    pub async fn unregister(&self, name: &ObjectName) -> MgmtResult<()> {
        for registry in &self.registries {
            match registry.unregister(name).await {
                Err(MgmtError::ObjectNotFound(_)) => continue,
                other => return other,
            }
        }
        Err(MgmtError::ObjectNotFound(name.to_string()))
    }

    /// Description of every registry with its objects
    pub async fn registries_info(&self) -> MgmtResult<String> {
        let mut out = String::new();
        for registry in &self.registries {
            let names = registry.query_names(None, None).await?;
            let _ = writeln!(
                out,
                "Registry {} (default domain {}): {} objects",
                registry.id(),
                registry.default_domain(),
                names.len()
            );
            for name in names {
                let _ = writeln!(out, "    {}", name);
            }
        }
        Ok(out)
    }

    /// Remove the change-tracking listeners; later changes go unnoticed
    pub fn release_listeners(&self) {
        let listeners: Vec<_> = self.listeners.lock().drain(..).collect();
        for (registry, id) in listeners {
            if let Err(e) = registry.remove_listener(id) {
                warn!(registry = %registry.id(), error = %e, "Failed to remove registration listener");
            }
        }
    }
}

fn not_found(command: &Command) -> MgmtError {
    MgmtError::ObjectNotFound(
        command
            .object_name()
            .map(|n| n.to_string())
            .unwrap_or_else(|| command.type_name().to_string()),
    )
}
