//! Shared test utilities for scrape-sync integration tests.
//!
//! - In-memory `EntitySource` and `ConfigStore` fakes with failure injection
//! - Fixture loading from `tests/fixtures`
//! - Small helpers for building entities and waiting on async state

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scrape_sync::error::Diagnostics;
use scrape_sync::{ApiError, ConfigStore, Entity, EntitySource, Reconciler, StoreKey, StoredDocument};

pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {}", path.display(), e))
}

pub fn entity(name: &str, labels: &[(&str, &str)]) -> Entity {
    Entity::new(name, labels.iter().copied()).unwrap()
}

/// Labels carried by the nodes in `two_nodes.yaml`.
pub const WIN1: &[(&str, &str)] = &[("agentpool", "win1"), ("kubernetes_io_os", "windows")];

pub fn primary_key() -> StoreKey {
    StoreKey::new("prometheus-additional-scrape-configs", "monitoring")
}

/// Node source returning whatever was last set.
#[derive(Default)]
pub struct FakeSource {
    entities: Mutex<Vec<Entity>>,
    failing: AtomicBool,
    calls: Mutex<usize>,
    delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeSource {
    pub fn new(entities: Vec<Entity>) -> Arc<Self> {
        Arc::new(Self {
            entities: Mutex::new(entities),
            ..Default::default()
        })
    }

    pub fn set(&self, entities: Vec<Entity>) {
        *self.entities.lock().unwrap() = entities;
    }

    /// Makes every following call fail with a transport error.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Makes every listing take `delay`, keeping a cycle in flight.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Listings currently in progress.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of listings that ever overlapped.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitySource for FakeSource {
    async fn list_entities(&self) -> Result<Vec<Entity>, ApiError> {
        *self.calls.lock().unwrap() += 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection refused".to_string()));
        }
        Ok(self.entities.lock().unwrap().clone())
    }
}

/// Secret store keyed by namespace/name.
#[derive(Default)]
pub struct FakeStore {
    docs: Mutex<HashMap<StoreKey, Vec<u8>>>,
    reads: Mutex<Vec<StoreKey>>,
    writes: Mutex<Vec<StoredDocument>>,
    denied: AtomicBool,
}

impl FakeStore {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(key: StoreKey, text: &str) -> Arc<Self> {
        let store = Self::default();
        store.docs.lock().unwrap().insert(key, text.as_bytes().to_vec());
        Arc::new(store)
    }

    /// Rejects every following request with HTTP 403.
    pub fn deny(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    pub fn content(&self, key: &StoreKey) -> Option<String> {
        self.docs
            .lock()
            .unwrap()
            .get(key)
            .map(|bytes| String::from_utf8(bytes.clone()).unwrap())
    }

    pub fn reads(&self) -> Vec<StoreKey> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<StoredDocument> {
        self.writes.lock().unwrap().clone()
    }

    fn forbidden(key: &StoreKey) -> ApiError {
        ApiError::Forbidden {
            resource: format!("secret {}", key),
            status: 403,
            diagnostics: Diagnostics {
                reason: Some("Forbidden".to_string()),
                headers: Vec::new(),
                content: "secrets is forbidden".to_string(),
            },
        }
    }
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn read(&self, key: &StoreKey) -> Result<StoredDocument, ApiError> {
        self.reads.lock().unwrap().push(key.clone());
        if self.denied.load(Ordering::SeqCst) {
            return Err(Self::forbidden(key));
        }
        match self.docs.lock().unwrap().get(key) {
            Some(content) => Ok(StoredDocument {
                key: key.clone(),
                content: content.clone(),
            }),
            None => Err(ApiError::NotFound {
                resource: format!("secret {}", key),
            }),
        }
    }

    async fn replace(&self, document: &StoredDocument) -> Result<(), ApiError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(Self::forbidden(&document.key));
        }
        self.writes.lock().unwrap().push(document.clone());
        self.docs
            .lock()
            .unwrap()
            .insert(document.key.clone(), document.content.clone());
        Ok(())
    }
}

pub fn reconciler(source: Arc<FakeSource>, store: Arc<FakeStore>) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(source, store, primary_key(), "default"))
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
