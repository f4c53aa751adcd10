//! Read-only schema trees and the walker used by the expression synthesizer.
//!
//! Schemas arrive from the metadata repository in a JSON-Schema-like shape and
//! are never mutated here. Lookups that run past the known structure return
//! `None` instead of failing.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Scalar,
    Object(BTreeMap<String, SchemaNode>),
    /// Item schema is anonymous.
    Array(Box<SchemaNode>),
}

impl SchemaNode {
    pub fn object<I, K>(props: I) -> Self
    where
        I: IntoIterator<Item = (K, SchemaNode)>,
        K: Into<String>,
    {
        SchemaNode::Object(props.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array(item: SchemaNode) -> Self {
        SchemaNode::Array(Box::new(item))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, SchemaNode::Array(_))
    }
}

/// Schema of `segment` below `schema`.
///
/// Arrays delegate to their item schema, so `Students.Name` resolves through
/// an array-of-objects without a separate index step.
pub fn child_schema<'a>(schema: &'a SchemaNode, segment: &str) -> Option<&'a SchemaNode> {
    match schema {
        SchemaNode::Object(props) => props.get(segment),
        SchemaNode::Array(item) => match item.as_ref() {
            SchemaNode::Object(props) => props.get(segment),
            _ => None,
        },
        SchemaNode::Scalar => None,
    }
}

/// True iff `schema` is an object whose `segment` property is an array.
pub fn is_array_segment(schema: &SchemaNode, segment: &str) -> bool {
    match schema {
        SchemaNode::Object(props) => props.get(segment).is_some_and(SchemaNode::is_array),
        _ => false,
    }
}

/// Schema reached by following every segment of `path` from `root`.
pub fn resolve<'a>(root: &'a SchemaNode, path: &AttributePath) -> Option<&'a SchemaNode> {
    path.segments()
        .iter()
        .try_fold(root, |node, seg| child_schema(node, seg))
}

/// Dotted attribute path such as `Entity.SubEntity.Field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AttributePath {
    segments: Vec<String>,
}

impl AttributePath {
    /// Empty segments from stray dots are dropped.
    pub fn parse(dotted: &str) -> Self {
        Self {
            segments: dotted
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn root(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// The path without its root segment.
    pub fn relative(&self) -> AttributePath {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<&str> for AttributePath {
    fn from(s: &str) -> Self {
        AttributePath::parse(s)
    }
}

/// Wire form: `{"type": "object", "properties": {...}}`, `{"type": "array", "items": {...}}`,
/// anything else is a scalar.
#[derive(Deserialize)]
struct RawSchema {
    #[serde(rename = "type", default)]
    kind: Option<RawType>,
    #[serde(default)]
    properties: Option<BTreeMap<String, RawSchema>>,
    #[serde(default)]
    items: Option<Box<RawSchema>>,
}

/// JSON Schema allows `"type": ["object", "null"]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawType {
    One(String),
    Many(Vec<String>),
}

impl RawType {
    fn has(&self, name: &str) -> bool {
        match self {
            RawType::One(t) => t == name,
            RawType::Many(ts) => ts.iter().any(|t| t == name),
        }
    }
}

impl From<RawSchema> for SchemaNode {
    fn from(raw: RawSchema) -> Self {
        let is = |name: &str| raw.kind.as_ref().is_some_and(|k| k.has(name));
        if is("array") || (raw.kind.is_none() && raw.items.is_some()) {
            let item = raw.items.map(|i| SchemaNode::from(*i)).unwrap_or(SchemaNode::Scalar);
            return SchemaNode::array(item);
        }
        if is("object") || (raw.kind.is_none() && raw.properties.is_some()) {
            let props = raw
                .properties
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, SchemaNode::from(v)))
                .collect();
            return SchemaNode::Object(props);
        }
        SchemaNode::Scalar
    }
}

impl<'de> Deserialize<'de> for SchemaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawSchema::deserialize(deserializer).map(SchemaNode::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn students() -> SchemaNode {
        SchemaNode::object([(
            "Students",
            SchemaNode::array(SchemaNode::object([
                ("Name", SchemaNode::Scalar),
                ("Phones", SchemaNode::array(SchemaNode::Scalar)),
            ])),
        )])
    }

    #[test]
    fn child_lookup_through_array_items() {
        let root = students();
        let arr = child_schema(&root, "Students").unwrap();
        assert!(arr.is_array());
        assert_eq!(child_schema(arr, "Name"), Some(&SchemaNode::Scalar));
        assert_eq!(child_schema(arr, "Missing"), None);
        assert_eq!(child_schema(&SchemaNode::Scalar, "Name"), None);
    }

    #[test]
    fn array_segment_detection() {
        let root = students();
        assert!(is_array_segment(&root, "Students"));
        assert!(!is_array_segment(&root, "Nope"));
        let arr = child_schema(&root, "Students").unwrap();
        // the walker only answers for object parents
        assert!(!is_array_segment(arr, "Phones"));
    }

    #[test]
    fn resolve_stops_past_depth() {
        let root = students();
        assert_eq!(resolve(&root, &"Students.Name".into()), Some(&SchemaNode::Scalar));
        assert_eq!(resolve(&root, &"Students.Name.Deeper".into()), None);
    }

    #[test]
    fn attribute_path_parsing() {
        let p = AttributePath::parse(".Entity..Sub.Field ");
        assert_eq!(p.segments(), ["Entity", "Sub", "Field"]);
        assert_eq!(p.root(), Some("Entity"));
        assert_eq!(p.relative().to_string(), "Sub.Field");
        assert!(AttributePath::parse("").is_empty());
    }

    #[test]
    fn deserializes_json_schema_shape() {
        let schema: SchemaNode = serde_json::from_str(
            r#"{
                "type": "object",
                "properties": {
                    "Persons": {"type": "array", "items": {"properties": {"Name": {"type": "string"}}}},
                    "Note": {"type": ["string", "null"]}
                }
            }"#,
        )
        .unwrap();
        let expected = SchemaNode::object([
            ("Persons", SchemaNode::array(SchemaNode::object([("Name", SchemaNode::Scalar)]))),
            ("Note", SchemaNode::Scalar),
        ]);
        assert_eq!(schema, expected);
    }
}
