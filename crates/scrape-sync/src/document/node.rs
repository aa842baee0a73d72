//! Generic YAML tree with ordered mappings.

use std::borrow::Cow;

use serde_yaml::Value;

/// A node of a parsed YAML document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl Node {
    /// Creates a plain string scalar.
    pub fn string(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar(Value::String(value.into())))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    /// Text of a scalar node; `None` for collections and tagged values.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        self.as_scalar().and_then(Scalar::text)
    }

    /// Converts the node back into a `serde_yaml` value for emitting.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Scalar(scalar) => scalar.0.clone(),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Node::to_value).collect()),
            Node::Mapping(mapping) => {
                let mut out = serde_yaml::Mapping::with_capacity(mapping.entries.len());
                for (key, value) in &mapping.entries {
                    out.insert(key.to_value(), value.to_value());
                }
                Value::Mapping(out)
            }
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Sequence(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Mapping(map) => Node::Mapping(Mapping {
                entries: map
                    .into_iter()
                    .map(|(k, v)| (Node::from(k), Node::from(v)))
                    .collect(),
            }),
            // Tagged values are carried through untouched
            other => Node::Scalar(Scalar(other)),
        }
    }
}

/// A leaf value. Holds the value exactly as parsed so that numbers, booleans
/// and nulls are emitted the way they were read.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar(Value);

impl Scalar {
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match &self.0 {
            Value::String(s) => Some(Cow::Borrowed(s)),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            Value::Null => Some(Cow::Borrowed("")),
            _ => None,
        }
    }
}

/// Ordered key/value pairs; keys are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(Node, Node)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(k, _)| key_matches(k, key))
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|(k, _)| key_matches(k, key))
            .map(|(_, v)| v)
    }

    /// Replaces the value of an existing key in place, or appends a new pair.
    pub fn insert(&mut self, key: &str, value: Node) {
        match self.get_mut(key) {
            Some(slot) => *slot = value,
            None => self.entries.push((Node::string(key), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Node, &Node)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl<K: Into<String>> FromIterator<(K, Node)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, Node)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            let key = key.into();
            mapping.insert(&key, value);
        }
        mapping
    }
}

fn key_matches(node: &Node, key: &str) -> bool {
    node.text().is_some_and(|text| text == key)
}
