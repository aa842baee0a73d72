//! The slices of the Kubernetes API objects this service reads.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<NodeStatus>,
}

impl Node {
    /// True when the node reports a non-blank `InternalIP` address.
    pub fn has_internal_ip(&self) -> bool {
        self.status.as_ref().is_some_and(|status| {
            status
                .addresses
                .iter()
                .any(|a| a.kind == "InternalIP" && !a.address.trim().is_empty())
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub address: String,
}
