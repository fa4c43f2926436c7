//! Declared value types of attributes, parameters and return values

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::MgmtError;

/// Parsed type signature.
///
/// Written as `bool`, `i32`, `i64`, `f64`, `string`, `object`, `void` or
/// `[T]` for arrays of `T`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    Bool,
    I32,
    I64,
    F64,
    String,
    Object,
    Void,
    Array(Box<TypeSignature>),
}

impl TypeSignature {
    /// Whether `value` fits this type.
    ///
    /// Primitives never accept `null`; strings, objects and arrays do.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeSignature::Void, Value::Null) => true,
            (TypeSignature::Void, _) => false,
            (TypeSignature::String | TypeSignature::Object | TypeSignature::Array(_), Value::Null) => {
                true
            }
            (TypeSignature::Bool, Value::Bool(_)) => true,
            (TypeSignature::I32, Value::Number(n)) => n
                .as_i64()
                .is_some_and(|v| i32::try_from(v).is_ok()),
            (TypeSignature::I64, Value::Number(n)) => n.as_i64().is_some(),
            (TypeSignature::F64, Value::Number(_)) => true,
            (TypeSignature::String, Value::String(_)) => true,
            (TypeSignature::Object, _) => true,
            (TypeSignature::Array(inner), Value::Array(items)) => {
                items.iter().all(|item| inner.accepts(item))
            }
            _ => false,
        }
    }
}

impl FromStr for TypeSignature {
    type Err = MgmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            return Ok(TypeSignature::Array(Box::new(inner.parse()?)));
        }
        match s {
            "bool" => Ok(TypeSignature::Bool),
            "i32" => Ok(TypeSignature::I32),
            "i64" => Ok(TypeSignature::I64),
            "f64" => Ok(TypeSignature::F64),
            "string" => Ok(TypeSignature::String),
            "object" => Ok(TypeSignature::Object),
            "void" => Ok(TypeSignature::Void),
            other => Err(MgmtError::InvalidRequest(format!(
                "Unknown type signature: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Bool => f.write_str("bool"),
            TypeSignature::I32 => f.write_str("i32"),
            TypeSignature::I64 => f.write_str("i64"),
            TypeSignature::F64 => f.write_str("f64"),
            TypeSignature::String => f.write_str("string"),
            TypeSignature::Object => f.write_str("object"),
            TypeSignature::Void => f.write_str("void"),
            TypeSignature::Array(inner) => write!(f, "[{}]", inner),
        }
    }
}
