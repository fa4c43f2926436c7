//! Attribute, operation and object metadata

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MgmtError, MgmtResult};
use crate::name::ObjectName;

use super::TypeSignature;

/// Metadata for one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDescriptor {
    pub name: String,
    /// Declared type signature (see [`TypeSignature`](super::TypeSignature))
    #[serde(rename = "type")]
    pub type_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub readable: bool,
    pub writable: bool,
}

impl AttributeDescriptor {
    /// Readable, read-only attribute
    pub fn read_only(name: impl Into<String>, type_signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_signature: type_signature.into(),
            description: None,
            readable: true,
            writable: false,
        }
    }

    /// Readable and writable attribute
    pub fn read_write(name: impl Into<String>, type_signature: impl Into<String>) -> Self {
        Self {
            writable: true,
            ..Self::read_only(name, type_signature)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One operation parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_signature: String,
}

/// Metadata for one operation; several may share a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    pub return_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: return_type.into(),
            description: None,
        }
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        type_signature: impl Into<String>,
    ) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            type_signature: type_signature.into(),
        });
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parameter type signatures in order
    pub fn signature(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| p.type_signature.clone())
            .collect()
    }

    fn has_signature(&self, signature: &[String]) -> bool {
        self.parameters.len() == signature.len()
            && self
                .parameters
                .iter()
                .zip(signature)
                .all(|(p, s)| &p.type_signature == s)
    }
}

/// Introspection data of one managed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

impl ObjectInfo {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check that this metadata describes a registrable object
    pub fn validate(&self) -> MgmtResult<()> {
        if self.class_name.trim().is_empty() {
            return Err(MgmtError::InvalidRequest("Empty class name".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for attr in &self.attributes {
            if attr.name.is_empty() || !seen.insert(attr.name.as_str()) {
                return Err(MgmtError::InvalidRequest(format!(
                    "Invalid or duplicate attribute '{}' on {}",
                    attr.name, self.class_name
                )));
            }
            attr.type_signature.parse::<TypeSignature>()?;
        }

        let mut overloads = std::collections::HashSet::new();
        for op in &self.operations {
            for param in &op.parameters {
                param.type_signature.parse::<TypeSignature>()?;
            }
            op.return_type.parse::<TypeSignature>()?;
            if !overloads.insert((op.name.as_str(), op.signature())) {
                return Err(MgmtError::InvalidRequest(format!(
                    "Operation {}({}) declared twice on {}",
                    op.name,
                    op.signature().join(","),
                    self.class_name
                )));
            }
        }
        Ok(())
    }

    /// Pick the overload of `name` to invoke.
    ///
    /// With a signature, the overload whose parameter types equal it.
    /// Without one, the only overload taking `arity` arguments.
    pub fn resolve_operation(
        &self,
        name: &str,
        signature: Option<&[String]>,
        arity: usize,
    ) -> MgmtResult<&OperationDescriptor> {
        let mut candidates = self.operations.iter().filter(|op| op.name == name);

        match signature {
            Some(signature) => candidates.find(|op| op.has_signature(signature)).ok_or_else(|| {
                MgmtError::OperationFailed {
                    message: format!(
                        "No operation {}({}) on {}",
                        name,
                        signature.join(","),
                        self.class_name
                    ),
                    error_type: Some("operation_not_found".to_string()),
                }
            }),
            None => {
                let matching: Vec<_> = candidates.filter(|op| op.parameters.len() == arity).collect();
                match matching.as_slice() {
                    [op] => Ok(op),
                    [] => Err(MgmtError::OperationFailed {
                        message: format!(
                            "No operation {} with {} argument(s) on {}",
                            name, arity, self.class_name
                        ),
                        error_type: Some("operation_not_found".to_string()),
                    }),
                    _ => Err(MgmtError::InvalidRequest(format!(
                        "Operation {} is overloaded for {} argument(s); a signature is required",
                        name, arity
                    ))),
                }
            }
        }
    }
}

/// Name and class of a registered object; identity is the name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInstance {
    pub object_name: ObjectName,
    pub class_name: String,
}

impl ObjectInstance {
    pub fn new(object_name: ObjectName, class_name: impl Into<String>) -> Self {
        Self {
            object_name,
            class_name: class_name.into(),
        }
    }
}

impl PartialEq for ObjectInstance {
    fn eq(&self, other: &Self) -> bool {
        self.object_name == other.object_name
    }
}

impl Eq for ObjectInstance {}

impl std::hash::Hash for ObjectInstance {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.object_name.hash(state);
    }
}

impl PartialOrd for ObjectInstance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectInstance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.object_name.cmp(&other.object_name)
    }
}

/// An attribute name with a value, as read or to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Value,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
