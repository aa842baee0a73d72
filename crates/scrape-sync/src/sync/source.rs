//! Contracts for the external systems a reconciliation cycle talks to.

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::ApiError;

/// Location of the stored scrape config.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub name: String,
    pub namespace: String,
}

impl StoreKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Same name in another namespace.
    pub fn in_namespace(&self, namespace: impl Into<String>) -> Self {
        Self::new(self.name.clone(), namespace)
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Raw scrape config bytes together with where they were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub key: StoreKey,
    pub content: Vec<u8>,
}

/// Provides the current set of fleet members.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn list_entities(&self) -> Result<Vec<Entity>, ApiError>;
}

/// Reads and replaces the stored scrape config.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads the document at `key`; a missing document is
    /// [`ApiError::NotFound`].
    async fn read(&self, key: &StoreKey) -> Result<StoredDocument, ApiError>;

    /// Replaces the whole document at `document.key`.
    async fn replace(&self, document: &StoredDocument) -> Result<(), ApiError>;
}
