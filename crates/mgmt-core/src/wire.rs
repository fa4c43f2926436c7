//! Wire protocol: commands, responses and the version handshake

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MgmtError;
use crate::name::ObjectName;
use crate::query::QueryExp;

/// Protocol version spoken by this crate
pub const PROTOCOL_VERSION: &str = "1.0";

/// How the dispatcher resolves a command's target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// One logical call that fans out over every registry and merges
    AllAtOnce,
    /// Tried registry by registry until one owns the object
    SingleRegistry,
}

/// One wire request, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    Search {
        #[serde(rename = "objectName", default, skip_serializing_if = "Option::is_none")]
        pattern: Option<ObjectName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<QueryExp>,
        /// Epoch seconds; answered with `NotChanged` when nothing changed since
        #[serde(default, skip_serializing_if = "Option::is_none")]
        if_modified_since: Option<i64>,
    },
    Instances {
        #[serde(rename = "objectName", default, skip_serializing_if = "Option::is_none")]
        pattern: Option<ObjectName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<QueryExp>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        if_modified_since: Option<i64>,
    },
    Domains,
    Count,
    Registered {
        object_name: ObjectName,
    },
    DefaultDomain,
    Version,
    Read {
        object_name: ObjectName,
        attribute: String,
    },
    Write {
        object_name: ObjectName,
        attribute: String,
        value: Value,
    },
    Exec {
        object_name: ObjectName,
        operation: String,
        #[serde(default)]
        arguments: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<Vec<String>>,
    },
    Info {
        object_name: ObjectName,
    },
    Instance {
        object_name: ObjectName,
    },
    InstanceOf {
        object_name: ObjectName,
        class_name: String,
    },
}

impl Command {
    /// Routing mode declared by this command type
    pub fn routing(&self) -> Routing {
        match self {
            Command::Search { .. }
            | Command::Instances { .. }
            | Command::Domains
            | Command::Count
            | Command::Registered { .. }
            | Command::DefaultDomain
            | Command::Version => Routing::AllAtOnce,
            Command::Read { .. }
            | Command::Write { .. }
            | Command::Exec { .. }
            | Command::Info { .. }
            | Command::Instance { .. }
            | Command::InstanceOf { .. } => Routing::SingleRegistry,
        }
    }

    /// Wire name of the command type
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::Search { .. } => "search",
            Command::Instances { .. } => "instances",
            Command::Domains => "domains",
            Command::Count => "count",
            Command::Registered { .. } => "registered",
            Command::DefaultDomain => "defaultDomain",
            Command::Version => "version",
            Command::Read { .. } => "read",
            Command::Write { .. } => "write",
            Command::Exec { .. } => "exec",
            Command::Info { .. } => "info",
            Command::Instance { .. } => "instance",
            Command::InstanceOf { .. } => "instanceOf",
        }
    }

    /// Target object of a single-object command
    pub fn object_name(&self) -> Option<&ObjectName> {
        match self {
            Command::Registered { object_name }
            | Command::Read { object_name, .. }
            | Command::Write { object_name, .. }
            | Command::Exec { object_name, .. }
            | Command::Info { object_name }
            | Command::Instance { object_name }
            | Command::InstanceOf { object_name, .. } => Some(object_name),
            Command::Search { pattern, .. } | Command::Instances { pattern, .. } => {
                pattern.as_ref()
            }
            _ => None,
        }
    }
}

/// One wire response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Epoch seconds
    pub timestamp: i64,
}

impl WireResponse {
    pub fn success(value: Value) -> Self {
        Self {
            status: 200,
            value: Some(value),
            error: None,
            error_type: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn from_error(err: &MgmtError) -> Self {
        Self {
            status: err.status_code(),
            value: None,
            error: Some(err.message()),
            error_type: Some(err.error_type().to_string()),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn from_result(result: Result<Value, MgmtError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Identity of the detected server product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<Value>,
}

/// Answer to the `version` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub agent_version: String,
    pub protocol_version: String,
    pub bridge_id: String,
    #[serde(default)]
    pub server: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn commands_use_camel_case_tags_and_fields() {
        let cmd = Command::InstanceOf {
            object_name: "runtime:type=Memory".parse().unwrap(),
            class_name: "runtime.Memory".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "type": "instanceOf",
                "objectName": "runtime:type=Memory",
                "className": "runtime.Memory"
            })
        );
        assert_eq!(cmd.routing(), Routing::SingleRegistry);
    }

    #[test]
    fn search_pattern_travels_as_object_name() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "search",
            "objectName": "runtime:*",
            "ifModifiedSince": 10
        }))
        .unwrap();
        match &cmd {
            Command::Search {
                pattern: Some(p),
                query: None,
                if_modified_since: Some(10),
            } => assert!(p.is_pattern()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cmd.routing(), Routing::AllAtOnce);
    }

    #[test]
    fn malformed_names_fail_decoding() {
        let result: Result<Command, _> =
            serde_json::from_value(json!({"type": "read", "objectName": "nodomain", "attribute": "A"}));
        assert!(result.is_err());
    }

    #[test]
    fn error_responses_carry_classification() {
        let resp = WireResponse::from_error(&MgmtError::AttributeNotFound("Uptime".into()));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.error_type.as_deref(), Some("attribute_not_found"));
        assert_eq!(resp.error.as_deref(), Some("Uptime"));
        assert!(!resp.is_success());
    }
}
