//! Fleet member identity used for reconciliation.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::error::{Result, SyncError};

/// A fleet member at a point in time: its name plus the labels it carries.
///
/// Two entities are equal only when both the name and the full label set
/// match. Label order never affects equality or hashing; it is kept only so
/// that rendered scrape entries list labels in the order they were given.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    name: String,
    labels: Vec<(String, String)>,
}

impl Entity {
    /// Creates an entity, rejecting blank names.
    ///
    /// When the same label key is given more than once the last value wins,
    /// at the position where the key first appeared.
    pub fn new<I, K, V>(name: impl Into<String>, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SyncError::InvalidEntity {
                reason: "name can not be null or empty".to_string(),
            });
        }

        let mut ordered: Vec<(String, String)> = Vec::new();
        for (key, value) in labels {
            let (key, value) = (key.into(), value.into());
            match ordered.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => ordered.push((key, value)),
            }
        }

        Ok(Self {
            name,
            labels: ordered,
        })
    }

    /// Name of the node, e.g. `aksd1000000`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels in the order they were supplied.
    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn sorted_labels(&self) -> BTreeMap<&str, &str> {
        self.labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.sorted_labels() == other.sorted_labels()
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.sorted_labels().hash(state);
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;

    fn hash_of(entity: &Entity) -> u64 {
        let mut hasher = DefaultHasher::new();
        entity.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_blank_name_rejected() {
        for name in ["", "   ", "\t\n"] {
            let result = Entity::new(name, Vec::<(String, String)>::new());
            assert!(matches!(result, Err(SyncError::InvalidEntity { .. })));
        }
    }

    #[test]
    fn test_label_order_does_not_affect_identity() {
        let a = Entity::new("node1", [("az", "1"), ("pool", "win1")]).unwrap();
        let b = Entity::new("node1", [("pool", "win1"), ("az", "1")]).unwrap();

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        // Insertion order is still what gets rendered
        assert_eq!(a.labels()[0].0, "az");
        assert_eq!(b.labels()[0].0, "pool");
    }

    #[test]
    fn test_label_values_are_part_of_identity() {
        let a = Entity::new("node1", [("az", "1")]).unwrap();
        let b = Entity::new("node1", [("az", "2")]).unwrap();
        let c = Entity::new("node2", [("az", "1")]).unwrap();
        let d = Entity::new("node1", [("az", "1"), ("extra", "")]).unwrap();

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<Entity> = [a.clone(), b, c, d, a].into_iter().collect();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_duplicate_label_key_keeps_last_value() {
        let entity = Entity::new("node1", [("az", "1"), ("pool", "p"), ("az", "3")]).unwrap();

        assert_eq!(entity.labels().len(), 2);
        assert_eq!(entity.labels()[0], ("az".to_string(), "3".to_string()));
        assert_eq!(entity.label("az"), Some("3"));
        assert_eq!(entity.label("missing"), None);
    }

    #[test]
    fn test_display_is_name() {
        let entity = Entity::new("aksd1000000", [("az", "1")]).unwrap();
        assert_eq!(entity.to_string(), "aksd1000000");
    }
}
