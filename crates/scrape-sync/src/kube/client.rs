//! Kubernetes REST client backing the node source and the secret store.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use regex::Regex;
use reqwest::{Certificate, Client, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use super::config::KubeConfig;
use super::model::NodeList;
use crate::entity::Entity;
use crate::error::{ApiError, ConfigError, Diagnostics};
use crate::sync::{ConfigStore, EntitySource, StoreKey, StoredDocument};

/// Default connect timeout for API requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for API requests (30 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static INVALID_LABEL_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w_]").unwrap());

/// Turns a Kubernetes label key into a valid Prometheus label name.
pub fn sanitize_label_key(key: &str) -> String {
    INVALID_LABEL_CHARACTERS.replace_all(key, "_").into_owned()
}

/// Sanitizes every label key of `node`. When two keys map to the same name,
/// the later one (in key order) wins and a warning is logged.
fn sanitize_labels(node: &str, labels: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut sanitized: Vec<(String, String)> = Vec::with_capacity(labels.len());
    let mut origins: HashMap<String, &str> = HashMap::with_capacity(labels.len());

    for (key, value) in labels {
        let name = sanitize_label_key(key);
        match origins.insert(name.clone(), key.as_str()) {
            Some(previous) => {
                warn!(
                    "Node {}: labels '{}' and '{}' both map to '{}', keeping the value of '{}'",
                    node, previous, key, name, key
                );
                if let Some(slot) = sanitized.iter_mut().find(|(k, _)| *k == name) {
                    slot.1 = value.clone();
                }
            }
            None => sanitized.push((name, value.clone())),
        }
    }

    sanitized
}

/// Reads nodes and reads/replaces a single data key of a secret.
#[derive(Debug, Clone)]
pub struct KubeClient {
    client: Client,
    config: KubeConfig,
    node_selector: String,
    secret_key: String,
}

impl KubeClient {
    pub fn new(
        config: KubeConfig,
        node_selector: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT);

        if let Some(pem) = &config.ca_pem {
            let certificate = Certificate::from_pem(pem)
                .map_err(|e| ConfigError::HttpClient(format!("Invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            config,
            node_selector: node_selector.into(),
            secret_key: secret_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn secret_url(&self, key: &StoreKey) -> String {
        format!(
            "{}/api/v1/namespaces/{}/secrets/{}",
            self.config.base_url, key.namespace, key.name
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn fetch_secret(&self, key: &StoreKey) -> Result<Value, ApiError> {
        let resource = format!("secret {}", key);
        let response = self
            .authorize(self.client.get(self.secret_url(key)))
            .send()
            .await?;
        let response = check(&resource, response).await?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl EntitySource for KubeClient {
    async fn list_entities(&self) -> Result<Vec<Entity>, ApiError> {
        let url = format!("{}/api/v1/nodes", self.config.base_url);
        let response = self
            .authorize(self.client.get(url))
            .query(&[("labelSelector", self.node_selector.as_str())])
            .send()
            .await?;
        let nodes: NodeList = check("nodes", response).await?.json().await?;

        let mut entities = Vec::with_capacity(nodes.items.len());
        for node in nodes.items {
            if !node.has_internal_ip() {
                debug!("Node {} has no InternalIP, skipping", node.metadata.name);
                continue;
            }

            let labels = sanitize_labels(&node.metadata.name, &node.metadata.labels);

            match Entity::new(node.metadata.name.as_str(), labels) {
                Ok(entity) => entities.push(entity),
                Err(e) => warn!("Ignoring node: {}", e),
            }
        }

        debug!(
            "Listed {} node(s) matching '{}'",
            entities.len(),
            self.node_selector
        );
        Ok(entities)
    }
}

#[async_trait]
impl ConfigStore for KubeClient {
    async fn read(&self, key: &StoreKey) -> Result<StoredDocument, ApiError> {
        let secret = self.fetch_secret(key).await?;

        let content = match secret.get("data").and_then(|data| data.get(&self.secret_key)) {
            Some(Value::String(encoded)) => STANDARD.decode(encoded).map_err(|e| {
                ApiError::Decode(format!(
                    "data['{}'] of secret {} is not valid base64: {}",
                    self.secret_key, key, e
                ))
            })?,
            Some(Value::Null) | None => {
                debug!("Secret {} has no '{}' key yet", key, self.secret_key);
                Vec::new()
            }
            Some(other) => {
                return Err(ApiError::Decode(format!(
                    "data['{}'] of secret {} is not a string: {}",
                    self.secret_key, key, other
                )))
            }
        };

        Ok(StoredDocument {
            key: key.clone(),
            content,
        })
    }

    async fn replace(&self, document: &StoredDocument) -> Result<(), ApiError> {
        let key = &document.key;
        let mut secret = self.fetch_secret(key).await?;

        let object = secret
            .as_object_mut()
            .ok_or_else(|| ApiError::Decode(format!("secret {} is not a JSON object", key)))?;
        let data = object
            .entry("data")
            .or_insert_with(|| Value::Object(Map::new()));
        if !data.is_object() {
            *data = Value::Object(Map::new());
        }
        if let Some(data) = data.as_object_mut() {
            data.insert(
                self.secret_key.clone(),
                Value::String(STANDARD.encode(&document.content)),
            );
        }

        let resource = format!("secret {}", key);
        let response = self
            .authorize(self.client.put(self.secret_url(key)))
            .json(&secret)
            .send()
            .await?;
        check(&resource, response).await?;

        debug!("Replaced '{}' in secret {}", self.secret_key, key);
        Ok(())
    }
}

/// Maps a non-success response onto the matching [`ApiError`].
async fn check(resource: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let resource = resource.to_string();
    match status {
        StatusCode::NOT_FOUND => Err(ApiError::NotFound { resource }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let diagnostics = diagnostics(response).await;
            if status == StatusCode::FORBIDDEN {
                Err(ApiError::Forbidden {
                    resource,
                    status: status.as_u16(),
                    diagnostics,
                })
            } else {
                Err(ApiError::Unauthorized {
                    resource,
                    status: status.as_u16(),
                    diagnostics,
                })
            }
        }
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(ApiError::Status {
                resource,
                status: status.as_u16(),
                message,
            })
        }
    }
}

async fn diagnostics(response: Response) -> Diagnostics {
    let reason = response.status().canonical_reason().map(str::to_string);
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect();
    let content = response.text().await.unwrap_or_default();

    Diagnostics {
        reason,
        headers,
        content,
    }
}
