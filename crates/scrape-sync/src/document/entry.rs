//! Conversion between `static_configs` entries and entities.

use super::keys;
use super::node::{Mapping, Node};
use super::TARGET_PORT;
use crate::entity::Entity;

/// Reads an entry back into an [`Entity`].
///
/// Returns `None` for anything that does not look like an entry written by
/// this service: no mapping, not exactly one target, a blank node name, or
/// labels that are not plain scalars. A `labels` field that is missing or
/// not a mapping reads as no labels.
pub fn parse_entry(node: &Node) -> Option<Entity> {
    let entry = node.as_mapping()?;

    let target = match entry.get(keys::TARGETS)?.as_sequence()?.as_slice() {
        [single] => single.text()?,
        _ => return None,
    };
    let name = target.split_once(':').map_or(&*target, |(name, _)| name);

    let labels = match entry.get(keys::LABELS).and_then(Node::as_mapping) {
        Some(labels) => labels
            .iter()
            .map(|(k, v)| Some((k.text()?.into_owned(), v.text()?.into_owned())))
            .collect::<Option<Vec<_>>>()?,
        None => Vec::new(),
    };

    Entity::new(name, labels).ok()
}

/// Builds the entry for `entity`, listing labels in the entity's order.
pub fn render_entry(entity: &Entity) -> Node {
    let target = format!("{}:{}", entity.name(), TARGET_PORT);
    let labels: Mapping = entity
        .labels()
        .iter()
        .map(|(k, v)| (k.as_str(), Node::string(v.as_str())))
        .collect();

    Node::Mapping(
        [
            (keys::TARGETS, Node::Sequence(vec![Node::string(target)])),
            (keys::LABELS, Node::Mapping(labels)),
        ]
        .into_iter()
        .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> Node {
        Node::from(serde_yaml::from_str::<serde_yaml::Value>(text).unwrap())
    }

    #[test]
    fn test_parse_well_formed_entry() {
        let node = entry(
            "targets:\n- aksd1000000:9100\nlabels:\n  agentpool: win1\n  node_role_kubernetes_io_agent: ''\n",
        );
        let entity = parse_entry(&node).unwrap();

        assert_eq!(entity.name(), "aksd1000000");
        assert_eq!(entity.label("agentpool"), Some("win1"));
        assert_eq!(entity.label("node_role_kubernetes_io_agent"), Some(""));
    }

    #[test]
    fn test_name_is_text_before_first_colon() {
        let entity = parse_entry(&entry("targets:\n- node:9100:extra\n")).unwrap();
        assert_eq!(entity.name(), "node");

        let entity = parse_entry(&entry("targets:\n- bare\n")).unwrap();
        assert_eq!(entity.name(), "bare");
    }

    #[test]
    fn test_missing_labels_read_as_empty() {
        let entity = parse_entry(&entry("targets:\n- node:9100\n")).unwrap();
        assert!(entity.labels().is_empty());
    }

    #[test]
    fn test_numeric_label_values_read_as_text() {
        let entity = parse_entry(&entry("targets:\n- node:9100\nlabels:\n  az: 1\n")).unwrap();
        assert_eq!(entity.label("az"), Some("1"));
    }

    #[test]
    fn test_malformed_entries_are_rejected() {
        let malformed = [
            "targets: []\n",
            "targets:\n- a:9100\n- b:9100\n",
            "targets: a:9100\n",
            "targets:\n- ':9100'\n",
            "targets:\n- '   :9100'\n",
            "labels:\n  az: '1'\n",
            "targets:\n- a:9100\nlabels:\n  az: [1]\n",
            "- not a mapping\n",
        ];

        for text in malformed {
            assert!(parse_entry(&entry(text)).is_none(), "expected rejection of {:?}", text);
        }
    }

    #[test]
    fn test_render_then_parse() {
        let entity = Entity::new("node1", [("zone", "b"), ("az", "1")]).unwrap();
        let node = render_entry(&entity);

        assert_eq!(
            serde_yaml::to_string(&node.to_value()).unwrap(),
            "targets:\n- node1:9100\nlabels:\n  zone: b\n  az: '1'\n"
        );
        assert_eq!(parse_entry(&node), Some(entity));
    }
}
