//! Daemon configuration
//!
//! ```toml
//! [server]
//! port = 8778
//!
//! [bridge]
//! qualifier = "name=main"
//!
//! [[registry]]
//! id = "app"
//! default_domain = "app"
//!
//! [[registry.object]]
//! name = "app:type=Cache,name=sessions"
//! class = "app.Cache"
//! attributes = [{ name = "Hits", type = "i64", value = 0, writable = true }]
//!
//! [[detector]]
//! vendor = "Acme"
//! product = "AcmeServer"
//! pattern = "acme:type=Server,*"
//! version_attribute = "Version"
//! unavailable_attributes = [{ pattern = "acme:type=Pool,*", attribute = "Peak" }]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Id of the registry that hosts the bridge's own objects
pub const PLATFORM_REGISTRY_ID: &str = "platform";

const DEFAULT_PORT: u16 = 8778;

/// Demo setup used when no config file is given
pub const DEMO_CONFIG: &str = r#"
[bridge]
qualifier = "name=demo"

[[registry]]
id = "app"
default_domain = "app"

[[registry.object]]
name = "app:type=Cache,name=sessions"
class = "app.Cache"
description = "Session cache"
attributes = [
    { name = "Size", type = "i64", value = 128, writable = true },
    { name = "Region", type = "string", value = "eu-west" },
]

[[detector]]
vendor = "mgmt-bridge"
product = "mgmtd"
pattern = "runtime:type=Runtime"
version_attribute = "Version"
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeSection,
    /// Registries after the platform one; an entry with the platform id
    /// configures the platform registry itself
    #[serde(default, rename = "registry")]
    pub registries: Vec<RegistryConfig>,
    /// Detectors in probing order
    #[serde(default, rename = "detector")]
    pub detectors: Vec<DetectorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeSection {
    /// Extra `key=value` properties of the diagnostic entry name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    /// Fixed bridge id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub id: String,
    #[serde(default = "default_domain")]
    pub default_domain: String,
    #[serde(default, rename = "object")]
    pub objects: Vec<ObjectConfig>,
}

fn default_domain() -> String {
    "DefaultDomain".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    /// Type signature (`i64`, `string`, `[string]`, ...)
    #[serde(rename = "type")]
    pub type_signature: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub writable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub vendor: String,
    pub product: String,
    /// Object name pattern whose presence identifies the product
    pub pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_attribute: Option<String>,
    #[serde(default)]
    pub unavailable_attributes: Vec<UnavailableAttributeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableAttributeConfig {
    pub pattern: String,
    pub attribute: String,
}

impl DaemonConfig {
    /// Load a config file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Built-in demo configuration
    pub fn demo() -> anyhow::Result<Self> {
        Self::parse(DEMO_CONFIG).context("Invalid demo configuration")
    }

    /// The entry configuring the platform registry, if any
    pub fn platform(&self) -> Option<&RegistryConfig> {
        self.registries
            .iter()
            .find(|r| r.id == PLATFORM_REGISTRY_ID)
    }

    /// Registry entries other than the platform one, in order
    pub fn extra_registries(&self) -> impl Iterator<Item = &RegistryConfig> {
        self.registries
            .iter()
            .filter(|r| r.id != PLATFORM_REGISTRY_ID)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config.server.port, 8778);
        assert!(config.bridge.qualifier.is_none());
        assert!(config.registries.is_empty());
        assert!(config.platform().is_none());
    }

    #[test]
    fn test_demo_config() {
        let config = DaemonConfig::demo().unwrap();
        assert_eq!(config.bridge.qualifier.as_deref(), Some("name=demo"));
        assert_eq!(config.extra_registries().count(), 1);
        let app = &config.registries[0];
        assert_eq!(app.objects[0].attributes[0].value, json!(128));
        assert!(app.objects[0].attributes[0].writable);
        assert!(!app.objects[0].attributes[1].writable);
        assert_eq!(config.detectors[0].product, "mgmtd");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9191

[bridge]
id = "fixed-id"

[[registry]]
id = "platform"
default_domain = "host"

[[registry.object]]
name = "host:type=Disk"
class = "host.Disk"
attributes = [{{ name = "Mounts", type = "[string]", value = ["/", "/home"] }}]
"#
        )
        .unwrap();

        let config = DaemonConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.bridge.id.as_deref(), Some("fixed-id"));
        let platform = config.platform().unwrap();
        assert_eq!(platform.default_domain, "host");
        assert_eq!(
            platform.objects[0].attributes[0].value,
            json!(["/", "/home"])
        );
        assert_eq!(config.extra_registries().count(), 0);
    }

    #[test]
    fn test_errors_name_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = DaemonConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));

        let missing = DaemonConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }
}
