//! Tracks edits to the managed scrape job for one reconciliation cycle.

use std::collections::{BTreeMap, HashMap};

use crate::document::{parse_entry, render_entry, Document};
use crate::entity::Entity;
use crate::error::{Result, SyncError};

/// Reads a scrape config, ensures the managed job is in place, and applies
/// add/remove edits to its `static_configs`.
///
/// The name index is derived from the entry sequence when the tracker is
/// built and kept in step with every edit; the document stays the source of
/// truth. Entries that do not parse are left exactly where they are.
#[derive(Debug)]
pub struct ChangeTracker {
    document: Document,
    /// Recognised entries by their position in the entry sequence.
    entries: BTreeMap<usize, Entity>,
    /// Entry position by entity name.
    positions: HashMap<String, usize>,
    dirty: bool,
}

impl ChangeTracker {
    pub fn parse(text: &str) -> Result<Self> {
        let document = Document::parse(text)?;

        let mut entries = BTreeMap::new();
        let mut positions = HashMap::new();
        for (position, node) in document.entries().iter().enumerate() {
            let Some(entity) = parse_entry(node) else {
                log::debug!("Ignoring unrecognised static config at position {}", position);
                continue;
            };
            if positions.contains_key(entity.name()) {
                log::warn!(
                    "Duplicate static config for '{}' at position {}, leaving it untouched",
                    entity.name(),
                    position
                );
                continue;
            }
            positions.insert(entity.name().to_string(), position);
            entries.insert(position, entity);
        }

        Ok(Self {
            dirty: document.is_repaired(),
            document,
            entries,
            positions,
        })
    }

    /// Entities of all recognised entries, in document order.
    pub fn list(&self) -> Vec<Entity> {
        self.entries.values().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Appends an entry for `entity`.
    ///
    /// Fails with [`SyncError::DuplicateEntity`] if an entry with the same name
    /// is already present; nothing is changed in that case.
    pub fn add(&mut self, entity: &Entity) -> Result<()> {
        if self.contains(entity.name()) {
            return Err(SyncError::DuplicateEntity {
                name: entity.name().to_string(),
            });
        }

        let entries = self.document.entries_mut();
        entries.push(render_entry(entity));
        let position = entries.len() - 1;
        self.positions.insert(entity.name().to_string(), position);
        self.entries.insert(position, entity.clone());
        self.dirty = true;
        Ok(())
    }

    /// Removes the entry named like `entity`, whatever its labels. Returns
    /// whether anything was removed.
    pub fn remove(&mut self, entity: &Entity) -> bool {
        let Some(position) = self.positions.remove(entity.name()) else {
            return false;
        };

        self.entries.remove(&position);
        self.document.entries_mut().remove(position);

        // Everything after the removed entry moves up by one
        let later = self.entries.split_off(&position);
        for (old, moved) in later {
            self.positions.insert(moved.name().to_string(), old - 1);
            self.entries.insert(old - 1, moved);
        }
        self.dirty = true;
        true
    }

    /// True when the document differs from what was parsed.
    pub fn needs_update(&self) -> bool {
        self.dirty
    }

    /// Renders the current state of the document.
    pub fn to_yaml(&self) -> Result<String> {
        self.document.to_yaml()
    }
}
