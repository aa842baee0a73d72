//! Scrape config reconciler: fetch → diff → commit.
//!
//! One call to [`Reconciler::reconcile`] is one cycle. The stored document is
//! parsed into a fresh [`ChangeTracker`], entries that no longer match an
//! observed node are removed, missing nodes are added, and the document is
//! written back only when something changed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;

use super::source::{ConfigStore, EntitySource, StoreKey, StoredDocument};
use crate::entity::Entity;
use crate::error::{Result, SyncError};
use crate::tracker::ChangeTracker;

/// Where the reconciler currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Fetching = 1,
    Diffing = 2,
    Committing = 3,
    Cancelled = 4,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Fetching,
            2 => Phase::Diffing,
            3 => Phase::Committing,
            4 => Phase::Cancelled,
            _ => Phase::Idle,
        }
    }
}

/// A single edit applied during a cycle, in the order it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "entity", rename_all = "lowercase")]
pub enum Change {
    Removed(Entity),
    Added(Entity),
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleOutcome {
    /// The document was written back to the store.
    Committed,
    /// Nothing changed; no write was issued.
    Unchanged,
    /// The cycle could not run; the loop carries on.
    Skipped { reason: String },
}

/// Result of a reconciliation cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle: u64,
    /// Number of entities reported by the source.
    pub observed: usize,
    pub changes: Vec<Change>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn committed(&self) -> bool {
        self.outcome == CycleOutcome::Committed
    }
}

/// Reconciles the stored scrape config with the observed fleet.
pub struct Reconciler {
    source: Arc<dyn EntitySource>,
    store: Arc<dyn ConfigStore>,
    key: StoreKey,
    fallback_namespace: String,
    cycles: AtomicU64,
    phase: AtomicU8,
    /// Prevents two cycles from interleaving their read-modify-write.
    reconcile_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn EntitySource>,
        store: Arc<dyn ConfigStore>,
        key: StoreKey,
        fallback_namespace: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            key,
            fallback_namespace: fallback_namespace.into(),
            cycles: AtomicU64::new(0),
            phase: AtomicU8::new(Phase::Idle as u8),
            reconcile_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Runs one reconciliation cycle.
    pub async fn reconcile(&self) -> Result<CycleReport> {
        let _guard = self.reconcile_lock.lock().await;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let result = self
            .run_cycle(cycle)
            .instrument(tracing::info_span!("reconcile", cycle))
            .await;
        self.set_phase(Phase::Idle);
        result
    }

    async fn run_cycle(&self, cycle: u64) -> Result<CycleReport> {
        self.set_phase(Phase::Fetching);

        let observed = self.source.list_entities().await?;
        log::debug!(
            "Discovered windows nodes: \n\t{}",
            observed
                .iter()
                .map(Entity::to_string)
                .collect::<Vec<_>>()
                .join("\n\t")
        );

        let Some(stored) = self.read_config().await? else {
            return Ok(CycleReport {
                cycle,
                observed: observed.len(),
                changes: Vec::new(),
                outcome: CycleOutcome::Skipped {
                    reason: format!("scrape config {} not found", self.key.name),
                },
            });
        };

        self.set_phase(Phase::Diffing);

        let text = std::str::from_utf8(&stored.content).map_err(|e| {
            SyncError::Parse(format!("scrape config {} is not UTF-8: {}", stored.key, e))
        })?;
        let mut tracker = ChangeTracker::parse(text)?;
        let changes = apply_changes(&mut tracker, &observed)?;

        if !tracker.needs_update() {
            log::debug!("Scrape config {} is up to date", stored.key);
            return Ok(CycleReport {
                cycle,
                observed: observed.len(),
                changes,
                outcome: CycleOutcome::Unchanged,
            });
        }

        self.set_phase(Phase::Committing);

        let updated = StoredDocument {
            key: stored.key,
            content: tracker.to_yaml()?.into_bytes(),
        };
        self.store.replace(&updated).await?;
        log::info!(
            "Updated scrape config {} ({} change(s))",
            updated.key,
            changes.len()
        );

        Ok(CycleReport {
            cycle,
            observed: observed.len(),
            changes,
            outcome: CycleOutcome::Committed,
        })
    }

    /// Reads the scrape config, falling back once to the fallback namespace.
    ///
    /// `Ok(None)` means neither location has it.
    async fn read_config(&self) -> Result<Option<StoredDocument>> {
        let primary_error = match self.store.read(&self.key).await {
            Ok(document) => return Ok(Some(document)),
            Err(e) if e.is_not_found() => e,
            Err(e) => return Err(self.read_failed(&self.key, e)),
        };

        if self.fallback_namespace == self.key.namespace {
            log::warn!("Unable to access scrape config secret: {}", primary_error);
            return Ok(None);
        }

        let fallback = self.key.in_namespace(&self.fallback_namespace);
        log::info!(
            "Scrape config {} not found, trying {}",
            self.key,
            fallback
        );

        match self.store.read(&fallback).await {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.is_not_found() => {
                log::warn!("Unable to access scrape config secret: {}", e);
                Ok(None)
            }
            Err(e) => Err(self.read_failed(&fallback, e)),
        }
    }

    fn read_failed(&self, key: &StoreKey, err: crate::error::ApiError) -> SyncError {
        if err.is_access_denied() {
            log::error!("Access denied reading scrape config {}: {}", key, err);
        }
        err.into()
    }
}

/// Removes stale entries, then adds missing ones. Returns the applied edits.
fn apply_changes(tracker: &mut ChangeTracker, observed: &[Entity]) -> Result<Vec<Change>> {
    let observed_set: HashSet<&Entity> = observed.iter().collect();
    let mut changes = Vec::new();

    // Label changes show up here too: the old entry no longer matches
    for existing in tracker.list() {
        if observed_set.contains(&existing) {
            continue;
        }
        if tracker.remove(&existing) {
            log::info!("Removing scrape config for {}", existing);
            changes.push(Change::Removed(existing));
        }
    }

    for entity in observed {
        if tracker.contains(entity.name()) {
            continue;
        }
        tracker.add(entity)?;
        log::info!("Adding scrape config for {}", entity);
        changes.push(Change::Added(entity.clone()));
    }

    Ok(changes)
}
