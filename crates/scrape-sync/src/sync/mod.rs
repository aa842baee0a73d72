//! Reconciliation of the scrape config against the observed fleet.
//!
//! - [`source`]: contracts for the entity source and the config store
//! - [`reconciler`]: a single fetch → diff → commit cycle
//! - [`service`]: the periodic, cancellable loop around the reconciler

pub mod reconciler;
pub mod service;
pub mod source;

pub use reconciler::{Change, CycleOutcome, CycleReport, Phase, Reconciler};
pub use service::SyncService;
pub use source::{ConfigStore, EntitySource, StoreKey, StoredDocument};
