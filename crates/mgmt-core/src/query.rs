//! Boolean predicates over object metadata and attribute values.
//!
//! Queries are plain data so they can travel on the wire next to a name
//! pattern. Evaluation is a pure function of a [`QueryTarget`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a query leaf looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Selector {
    /// The object's class name
    Class,
    /// The value of one attribute
    Attribute(String),
}

/// Predicate tree evaluated against one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryExp {
    And { left: Box<QueryExp>, right: Box<QueryExp> },
    Or { left: Box<QueryExp>, right: Box<QueryExp> },
    Not { exp: Box<QueryExp> },
    /// Selected value contains `value` anywhere
    Substring { selector: Selector, value: String },
    /// Selected value starts with `value`
    Initial { selector: Selector, value: String },
    /// Selected value ends with `value`
    Final { selector: Selector, value: String },
    /// Selected value equals `value`
    Eq { selector: Selector, value: Value },
}

/// Read-only view of one object for query evaluation
pub trait QueryTarget {
    fn class_name(&self) -> &str;

    /// Attribute value, `None` when the attribute is absent or unreadable
    fn attribute(&self, name: &str) -> Option<Value>;
}

impl QueryExp {
    pub fn and(left: QueryExp, right: QueryExp) -> Self {
        QueryExp::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: QueryExp, right: QueryExp) -> Self {
        QueryExp::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(exp: QueryExp) -> Self {
        QueryExp::Not { exp: Box::new(exp) }
    }

    pub fn class_substring(value: impl Into<String>) -> Self {
        QueryExp::Substring {
            selector: Selector::Class,
            value: value.into(),
        }
    }

    pub fn attribute_substring(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        QueryExp::Substring {
            selector: Selector::Attribute(attribute.into()),
            value: value.into(),
        }
    }

    pub fn attribute_eq(attribute: impl Into<String>, value: Value) -> Self {
        QueryExp::Eq {
            selector: Selector::Attribute(attribute.into()),
            value,
        }
    }

    /// Evaluate against `target`
    pub fn evaluate(&self, target: &dyn QueryTarget) -> bool {
        match self {
            QueryExp::And { left, right } => left.evaluate(target) && right.evaluate(target),
            QueryExp::Or { left, right } => left.evaluate(target) || right.evaluate(target),
            QueryExp::Not { exp } => !exp.evaluate(target),
            QueryExp::Substring { selector, value } => {
                select_text(selector, target).is_some_and(|s| s.contains(value.as_str()))
            }
            QueryExp::Initial { selector, value } => {
                select_text(selector, target).is_some_and(|s| s.starts_with(value.as_str()))
            }
            QueryExp::Final { selector, value } => {
                select_text(selector, target).is_some_and(|s| s.ends_with(value.as_str()))
            }
            QueryExp::Eq { selector, value } => match selector {
                Selector::Class => value.as_str() == Some(target.class_name()),
                Selector::Attribute(name) => target.attribute(name).as_ref() == Some(value),
            },
        }
    }

    /// Names of all attributes this query reads
    pub fn attribute_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        match self {
            QueryExp::And { left, right } | QueryExp::Or { left, right } => {
                left.collect_attributes(names);
                right.collect_attributes(names);
            }
            QueryExp::Not { exp } => exp.collect_attributes(names),
            QueryExp::Substring { selector, .. }
            | QueryExp::Initial { selector, .. }
            | QueryExp::Final { selector, .. }
            | QueryExp::Eq { selector, .. } => {
                if let Selector::Attribute(name) = selector {
                    names.insert(name.clone());
                }
            }
        }
    }
}

/// String form of the selected value; non-string attributes never match
/// substring tests
fn select_text(selector: &Selector, target: &dyn QueryTarget) -> Option<String> {
    match selector {
        Selector::Class => Some(target.class_name().to_string()),
        Selector::Attribute(name) => match target.attribute(name)? {
            Value::String(s) => Some(s),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    struct View {
        class_name: &'static str,
        attributes: HashMap<&'static str, Value>,
    }

    impl QueryTarget for View {
        fn class_name(&self) -> &str {
            self.class_name
        }

        fn attribute(&self, name: &str) -> Option<Value> {
            self.attributes.get(name).cloned()
        }
    }

    fn view(class_name: &'static str) -> View {
        View {
            class_name,
            attributes: HashMap::from([("Name", json!("primary")), ("Size", json!(42))]),
        }
    }

    fn object_or_string() -> QueryExp {
        QueryExp::or(
            QueryExp::class_substring("Object"),
            QueryExp::class_substring("String"),
        )
    }

    #[test]
    fn or_of_class_substrings() {
        let q = object_or_string();
        assert!(q.evaluate(&view("runtime.ManagedObject")));
        assert!(q.evaluate(&view("StringPool")));
        assert!(!q.evaluate(&view("runtime.Memory")));
    }

    #[test]
    fn and_not_combinations() {
        let q = QueryExp::and(
            QueryExp::class_substring("Pool"),
            QueryExp::not(QueryExp::attribute_substring("Name", "second")),
        );
        assert!(q.evaluate(&view("MemoryPool")));
        assert!(!q.evaluate(&view("Memory")));
    }

    #[test]
    fn prefix_suffix_and_equality() {
        let v = view("runtime.Memory");
        assert!(QueryExp::Initial {
            selector: Selector::Class,
            value: "runtime.".into()
        }
        .evaluate(&v));
        assert!(QueryExp::Final {
            selector: Selector::Attribute("Name".into()),
            value: "mary".into()
        }
        .evaluate(&v));
        assert!(QueryExp::attribute_eq("Size", json!(42)).evaluate(&v));
        assert!(!QueryExp::attribute_eq("Size", json!("42")).evaluate(&v));
    }

    #[test]
    fn missing_attribute_is_false() {
        let v = view("X");
        assert!(!QueryExp::attribute_substring("Absent", "").evaluate(&v));
        assert!(QueryExp::not(QueryExp::attribute_substring("Absent", "")).evaluate(&v));
        // Numbers are not text
        assert!(!QueryExp::attribute_substring("Size", "4").evaluate(&v));
    }

    #[test]
    fn referenced_attributes_are_collected() {
        let q = QueryExp::and(
            QueryExp::attribute_substring("Name", "a"),
            QueryExp::or(
                QueryExp::class_substring("X"),
                QueryExp::attribute_eq("Size", json!(1)),
            ),
        );
        let names: Vec<_> = q.attribute_names().into_iter().collect();
        assert_eq!(names, vec!["Name".to_string(), "Size".to_string()]);
        assert!(object_or_string().attribute_names().is_empty());
    }

    #[test]
    fn wire_form_is_tagged() {
        let json = serde_json::to_value(object_or_string()).unwrap();
        assert_eq!(
            json,
            json!({
                "op": "or",
                "left": {"op": "substring", "selector": {"kind": "class"}, "value": "Object"},
                "right": {"op": "substring", "selector": {"kind": "class"}, "value": "String"}
            })
        );
        let back: QueryExp = serde_json::from_value(json).unwrap();
        assert_eq!(back, object_or_string());
    }
}
