//! Registries, objects and detectors built from the daemon configuration

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use mgmt_core::{LocalRegistry, ObjectName, OperationDescriptor, Registry, SimpleObject};
use mgmt_gateway::{PresenceDetector, ServerDetector};
use serde_json::{json, Value};

use crate::config::{DaemonConfig, ObjectConfig, RegistryConfig, PLATFORM_REGISTRY_ID};

/// Name of the process information object in the platform registry
pub const RUNTIME_OBJECT_NAME: &str = "runtime:type=Runtime";
/// Name of the configuration extension registered by the daemon
pub const CONFIG_OBJECT_NAME: &str = "bridge:type=Config";

/// Process information: name, pid, start time, uptime and version, plus an
/// overloaded `echo`
pub fn runtime_object(started: DateTime<Utc>) -> SimpleObject {
    SimpleObject::builder("runtime.Runtime")
        .description("Process running the bridge")
        .attribute("Name", "string", json!(env!("CARGO_PKG_NAME")))
        .attribute("Pid", "i64", json!(std::process::id()))
        .attribute("StartTime", "string", json!(started.to_rfc3339()))
        .attribute("Version", "string", json!(env!("CARGO_PKG_VERSION")))
        .computed_attribute("Uptime", "i64", move || {
            Ok(json!((Utc::now() - started).num_seconds()))
        })
        .operation(
            OperationDescriptor::new("echo", "string")
                .with_parameter("message", "string")
                .with_description("Return the message"),
            |args| Ok(args.first().cloned().unwrap_or(Value::Null)),
        )
        .operation(
            OperationDescriptor::new("echo", "string")
                .with_parameter("messages", "[string]")
                .with_description("Return the messages joined by spaces"),
            |args| {
                let joined = args
                    .first()
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                Ok(json!(joined))
            },
        )
        .build()
}

/// Read-only view of the running configuration
pub fn config_object(config: &DaemonConfig) -> SimpleObject {
    let registries: Vec<&str> = config.registries.iter().map(|r| r.id.as_str()).collect();
    let detectors: Vec<&str> = config.detectors.iter().map(|d| d.product.as_str()).collect();

    SimpleObject::builder("bridge.Config")
        .description("Daemon configuration")
        .attribute("Port", "i64", json!(config.server.port))
        .attribute("Qualifier", "string", json!(config.bridge.qualifier))
        .attribute("Registries", "[string]", json!(registries))
        .attribute("Detectors", "[string]", json!(detectors))
        .build()
}

fn configured_object(object: &ObjectConfig) -> SimpleObject {
    let mut builder = SimpleObject::builder(object.class.clone());
    if let Some(description) = &object.description {
        builder = builder.description(description.clone());
    }
    for attribute in &object.attributes {
        builder = if attribute.writable {
            builder.writable_attribute(
                &attribute.name,
                &attribute.type_signature,
                attribute.value.clone(),
            )
        } else {
            builder.attribute(
                &attribute.name,
                &attribute.type_signature,
                attribute.value.clone(),
            )
        };
    }
    builder.build()
}

async fn populate(registry: &LocalRegistry, config: &RegistryConfig) -> anyhow::Result<()> {
    for object in &config.objects {
        let name: ObjectName = object
            .name
            .parse()
            .with_context(|| format!("Invalid object name {}", object.name))?;
        registry
            .register(Arc::new(configured_object(object)), Some(name))
            .await
            .with_context(|| format!("Failed to register {} in {}", object.name, config.id))?;
    }
    Ok(())
}

/// Build the registries in discovery order; the platform registry comes
/// first and always holds the runtime object
pub async fn build_registries(
    config: &DaemonConfig,
    started: DateTime<Utc>,
) -> anyhow::Result<Vec<Arc<dyn Registry>>> {
    let platform_domain = config
        .platform()
        .map(|p| p.default_domain.clone())
        .unwrap_or_else(|| "runtime".to_string());
    let platform = Arc::new(LocalRegistry::new(PLATFORM_REGISTRY_ID, platform_domain));
    platform
        .register(
            Arc::new(runtime_object(started)),
            Some(RUNTIME_OBJECT_NAME.parse()?),
        )
        .await
        .context("Failed to register the runtime object")?;
    if let Some(platform_config) = config.platform() {
        populate(&platform, platform_config).await?;
    }

    let mut registries: Vec<Arc<dyn Registry>> = vec![platform];
    for registry_config in config.extra_registries() {
        let registry = LocalRegistry::new(
            registry_config.id.clone(),
            registry_config.default_domain.clone(),
        );
        populate(&registry, registry_config).await?;
        tracing::info!(
            registry = %registry_config.id,
            objects = registry_config.objects.len(),
            "Registry ready"
        );
        registries.push(Arc::new(registry));
    }
    Ok(registries)
}

/// Detectors in configured order
pub fn build_detectors(config: &DaemonConfig) -> anyhow::Result<Vec<Arc<dyn ServerDetector>>> {
    let mut detectors: Vec<Arc<dyn ServerDetector>> = Vec::new();
    for detector in &config.detectors {
        let pattern: ObjectName = detector
            .pattern
            .parse()
            .with_context(|| format!("Invalid detector pattern {}", detector.pattern))?;
        let mut presence =
            PresenceDetector::new(detector.vendor.clone(), detector.product.clone(), pattern);
        if let Some(attribute) = &detector.version_attribute {
            presence = presence.with_version_attribute(attribute.clone());
        }
        for unavailable in &detector.unavailable_attributes {
            let pattern: ObjectName = unavailable
                .pattern
                .parse()
                .with_context(|| format!("Invalid pattern {}", unavailable.pattern))?;
            presence = presence.with_unavailable_attribute(pattern, unavailable.attribute.clone());
        }
        detectors.push(Arc::new(presence));
    }
    Ok(detectors)
}
