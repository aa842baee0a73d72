pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod health;
pub mod kube;
pub mod shutdown;
pub mod sync;
pub mod telemetry;
pub mod tracker;

pub use config::{LogFormat, Settings};
pub use document::{Document, JOB_NAME, TARGET_PORT};
pub use entity::Entity;
pub use error::{format_error_chain, ApiError, ConfigError, Result, SyncError, TelemetryError};
pub use health::{HealthReport, HealthState, HealthStatus};
pub use kube::{KubeClient, KubeConfig};
pub use sync::{
    Change, ConfigStore, CycleOutcome, CycleReport, EntitySource, Phase, Reconciler, StoreKey,
    StoredDocument, SyncService,
};
pub use tracker::ChangeTracker;
