//! Structured object names and pattern matching.
//!
//! An [`ObjectName`] is a domain plus an unordered set of `key=value`
//! properties, written `domain:key=value,key2=value2`. Property order never
//! affects equality or the canonical form, which lists keys sorted.
//!
//! Names can be patterns:
//!
//! - `*` and `?` in the domain match any run of characters / one character
//! - `*` and `?` in a property value do the same for that value
//! - a `*` entry in the property list (`d:type=A,*`) allows any additional
//!   properties
//!
//! Patterns are only used for matching; a pattern never identifies an object.
//!
//! ```
//! # use mgmt_core::ObjectName;
//! let a: ObjectName = "d:b=2,a=1".parse().unwrap();
//! let b: ObjectName = "d:a=1,b=2".parse().unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.to_string(), "d:a=1,b=2");
//!
//! let pattern: ObjectName = "d:a=1,*".parse().unwrap();
//! assert!(pattern.matches(&a));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MgmtError, MgmtResult};

/// Structured, order-independent identifier of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName {
    domain: String,
    /// Values are kept as written, including quotes and escapes
    properties: BTreeMap<String, String>,
    property_list_pattern: bool,
}

impl ObjectName {
    /// Build a name from a domain and its properties.
    ///
    /// Values are validated exactly as if the name had been parsed.
    pub fn new<I, K, V>(domain: &str, properties: I) -> MgmtResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut list = Vec::new();
        for (key, value) in properties {
            list.push(format!("{}={}", key.into(), value.into()));
        }
        format!("{}:{}", domain, list.join(",")).parse()
    }

    /// Pattern that matches every name (`*:*`)
    pub fn wildcard() -> Self {
        Self {
            domain: "*".to_string(),
            properties: BTreeMap::new(),
            property_list_pattern: true,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Value of one key property, as written
    pub fn key_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Key properties in canonical (sorted) order, without any list wildcard
    pub fn canonical_key_properties(&self) -> String {
        self.properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Canonical string form; identical for any property order
    pub fn canonical_name(&self) -> String {
        let props = self.canonical_key_properties();
        match (self.property_list_pattern, props.is_empty()) {
            (false, _) => format!("{}:{}", self.domain, props),
            (true, true) => format!("{}:*", self.domain),
            (true, false) => format!("{}:{},*", self.domain, props),
        }
    }

    pub fn is_domain_pattern(&self) -> bool {
        has_wildcard(&self.domain)
    }

    pub fn is_property_list_pattern(&self) -> bool {
        self.property_list_pattern
    }

    pub fn is_property_value_pattern(&self) -> bool {
        self.properties.values().any(|v| is_value_pattern(v))
    }

    pub fn is_pattern(&self) -> bool {
        self.is_domain_pattern() || self.property_list_pattern || self.is_property_value_pattern()
    }

    /// Whether `name` matches this name used as a pattern.
    ///
    /// A non-pattern only matches an equal name. A pattern never matches
    /// another pattern.
    pub fn matches(&self, name: &ObjectName) -> bool {
        if name.is_pattern() {
            return false;
        }

        let domain_ok = if self.is_domain_pattern() {
            wildmatch(&self.domain, &name.domain)
        } else {
            self.domain == name.domain
        };
        if !domain_ok {
            return false;
        }

        let values_ok = self.properties.iter().all(|(key, expected)| {
            match name.properties.get(key) {
                Some(actual) if is_value_pattern(expected) => wildmatch(expected, actual),
                Some(actual) => actual == expected,
                None => false,
            }
        });
        if !values_ok {
            return false;
        }

        self.property_list_pattern || self.properties.len() == name.properties.len()
    }

    /// Quote a value so it may contain any character
    pub fn quote(value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for c in value.chars() {
            match c {
                '"' | '\\' | '*' | '?' => {
                    out.push('\\');
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                _ => out.push(c),
            }
        }
        out.push('"');
        out
    }

    /// Reverse of [`ObjectName::quote`]
    pub fn unquote(value: &str) -> MgmtResult<String> {
        let inner = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .ok_or_else(|| MgmtError::MalformedName(format!("value is not quoted: {}", value)))?;

        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(e @ ('"' | '\\' | '*' | '?')) => out.push(e),
                    _ => {
                        return Err(MgmtError::MalformedName(format!(
                            "invalid escape in {}",
                            value
                        )))
                    }
                }
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }
}

impl FromStr for ObjectName {
    type Err = MgmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| MgmtError::MalformedName(format!("{}: {}", reason, s));

        let (domain, rest) = s
            .split_once(':')
            .ok_or_else(|| malformed("missing domain separator"))?;
        if domain.contains('\n') {
            return Err(malformed("invalid character in domain"));
        }
        if rest.is_empty() {
            return Err(malformed("empty key property list"));
        }

        let mut properties = BTreeMap::new();
        let mut property_list_pattern = false;

        for item in split_properties(rest).map_err(|reason| malformed(reason))? {
            if item == "*" {
                if property_list_pattern {
                    return Err(malformed("repeated property list wildcard"));
                }
                property_list_pattern = true;
                continue;
            }

            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| malformed("property without '='"))?;
            if key.is_empty() || key.contains(|c: char| ":=*?\"\n,".contains(c)) {
                return Err(malformed("invalid property key"));
            }
            if value.starts_with('"') {
                ObjectName::unquote(value)?;
            } else if value.is_empty() || value.contains(|c: char| ",=:\"\n".contains(c)) {
                return Err(malformed("invalid property value"));
            }
            if properties
                .insert(key.to_string(), value.to_string())
                .is_some()
            {
                return Err(malformed("duplicate property key"));
            }
        }

        Ok(Self {
            domain: domain.to_string(),
            properties,
            property_list_pattern,
        })
    }
}

impl TryFrom<String> for ObjectName {
    type Error = MgmtError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> Self {
        name.canonical_name()
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

/// Split a key property list on commas outside quoted values
fn split_properties(list: &str) -> Result<Vec<&str>, &'static str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, c) in list.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                items.push(&list[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if in_quotes {
        return Err("unterminated quoted value");
    }
    items.push(&list[start..]);

    if items.iter().any(|i| i.is_empty()) {
        return Err("empty property");
    }
    Ok(items)
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// Wildcards inside quoted values only count when not escaped
fn is_value_pattern(value: &str) -> bool {
    if !value.starts_with('"') {
        return has_wildcard(value);
    }
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '*' | '?' => return true,
            _ => {}
        }
    }
    false
}

/// Glob match with `*` and `?`. An escape pair (`\x`) in the pattern only
/// matches the same pair in the text, since values are compared as written.
fn wildmatch(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '\\' if p + 1 < pattern.len() => {
                    if t + 1 < text.len() && text[t] == '\\' && text[t + 1] == pattern[p + 1] {
                        p += 2;
                        t += 2;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }
        match star {
            Some((sp, st)) => {
                p = sp + 1;
                t = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
