//! Prometheus scrape config document model.
//!
//! The document is a YAML sequence of scrape jobs. One of them, identified by
//! its `job_name`, is owned by this service: its `static_configs` sequence
//! holds one entry per node. Everything else in the document is carried
//! through untouched.
//!
//! ```yaml
//! - job_name: prometheus-windows-node
//!   static_configs:
//!   - targets:
//!     - aksd1000000:9100
//!     labels:
//!       agentpool: win1
//!       kubernetes_io_os: windows
//! ```

pub mod entry;
pub mod node;

use serde::Deserialize;
use serde_yaml::Value;

pub use entry::{parse_entry, render_entry};
pub use node::{Mapping, Node, Scalar};

use crate::error::{Result, SyncError};

/// `job_name` of the scrape job managed by this service.
pub const JOB_NAME: &str = "prometheus-windows-node";
/// Port the windows node exporter listens on.
pub const TARGET_PORT: u16 = 9100;

/// Key names used in the scrape config.
pub mod keys {
    pub const JOB_NAME: &str = "job_name";
    pub const STATIC_CONFIGS: &str = "static_configs";
    pub const TARGETS: &str = "targets";
    pub const LABELS: &str = "labels";
}

/// A parsed scrape config with the managed job located (or synthesized).
///
/// The entry sequence of the managed job is held separately from the rest of
/// the tree and spliced back in when the document is serialized.
#[derive(Debug, Clone)]
pub struct Document {
    jobs: Vec<Node>,
    managed: usize,
    entries: Vec<Node>,
    repaired: bool,
}

impl Document {
    /// Parses `text` and normalizes it into the shape this service manages.
    ///
    /// Valid YAML of the wrong shape is repaired and flagged via
    /// [`Document::is_repaired`]. Text that is not YAML at all is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut documents = Vec::new();
        for deserializer in serde_yaml::Deserializer::from_str(text) {
            documents.push(Value::deserialize(deserializer)?);
        }

        let mut repaired = false;

        let root = if documents.len() == 1 {
            documents.pop()
        } else {
            log::debug!(
                "Scrape config holds {} documents, starting from an empty one",
                documents.len()
            );
            repaired = true;
            None
        };

        let mut jobs = match root.map(Node::from) {
            Some(Node::Sequence(jobs)) => jobs,
            Some(_) => {
                log::warn!("Scrape config root is not a sequence, replacing it");
                repaired = true;
                Vec::new()
            }
            None => {
                repaired = true;
                Vec::new()
            }
        };

        let managed = match jobs.iter().position(is_managed_job) {
            Some(index) => index,
            None => {
                log::debug!("Scrape job '{}' not found, adding it", JOB_NAME);
                repaired = true;
                jobs.push(Node::Mapping(new_managed_job()));
                jobs.len() - 1
            }
        };

        let entries = match jobs.get_mut(managed).and_then(Node::as_mapping_mut) {
            Some(job) => take_entries(job, &mut repaired),
            None => Vec::new(),
        };

        Ok(Self {
            jobs,
            managed,
            entries,
            repaired,
        })
    }

    /// True when parsing had to change the structure of the input.
    pub fn is_repaired(&self) -> bool {
        self.repaired
    }

    /// Members of the managed job's `static_configs` sequence.
    pub fn entries(&self) -> &[Node] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<Node> {
        &mut self.entries
    }

    /// All jobs in the document, with the managed job's entries left out.
    pub fn jobs(&self) -> &[Node] {
        &self.jobs
    }

    /// Serializes the whole document, including untouched sibling jobs.
    pub fn to_yaml(&self) -> Result<String> {
        let root = Value::Sequence(
            self.jobs
                .iter()
                .enumerate()
                .map(|(index, job)| {
                    let mut value = job.to_value();
                    if index == self.managed {
                        if let Value::Mapping(job) = &mut value {
                            job.insert(
                                Value::String(keys::STATIC_CONFIGS.to_string()),
                                Value::Sequence(self.entries.iter().map(Node::to_value).collect()),
                            );
                        }
                    }
                    value
                })
                .collect(),
        );

        serde_yaml::to_string(&root).map_err(|e| SyncError::Serialize(e.to_string()))
    }
}

fn is_managed_job(node: &Node) -> bool {
    node.as_mapping()
        .and_then(|job| job.get(keys::JOB_NAME))
        .and_then(Node::text)
        .is_some_and(|name| name == JOB_NAME)
}

fn new_managed_job() -> Mapping {
    [
        (keys::JOB_NAME, Node::string(JOB_NAME)),
        (keys::STATIC_CONFIGS, Node::Sequence(Vec::new())),
    ]
    .into_iter()
    .collect()
}

/// Moves the entries out of the job, leaving an empty sequence in place.
fn take_entries(job: &mut Mapping, repaired: &mut bool) -> Vec<Node> {
    match job.get_mut(keys::STATIC_CONFIGS) {
        Some(Node::Sequence(entries)) => std::mem::take(entries),
        Some(other) => {
            log::warn!("'{}' is not a sequence, replacing it", keys::STATIC_CONFIGS);
            *other = Node::Sequence(Vec::new());
            *repaired = true;
            Vec::new()
        }
        None => {
            job.insert(keys::STATIC_CONFIGS, Node::Sequence(Vec::new()));
            *repaired = true;
            Vec::new()
        }
    }
}
