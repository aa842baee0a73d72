//! Connection settings for the Kubernetes API server.

use std::path::Path;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Overrides the in-cluster API server URL, e.g. for local runs behind `kubectl proxy`.
pub const API_SERVER_VAR: &str = "KUBE_API_SERVER";
/// Overrides the service account token path.
pub const TOKEN_FILE_VAR: &str = "KUBE_TOKEN_FILE";

/// Where the API server is and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_pem: Option<Vec<u8>>,
}

impl KubeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            ca_pem: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_ca_pem(mut self, pem: Vec<u8>) -> Self {
        self.ca_pem = Some(pem);
        self
    }

    /// Configuration for a pod running with a service account.
    ///
    /// `KUBE_API_SERVER` replaces the service host/port lookup; when it is
    /// set, a missing token file means unauthenticated access.
    pub fn in_cluster() -> Result<Self, ConfigError> {
        let explicit_server = std::env::var(API_SERVER_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty());

        let base_url = match &explicit_server {
            Some(url) => url.clone(),
            None => {
                let host = env_required("KUBERNETES_SERVICE_HOST")?;
                let port = env_required("KUBERNETES_SERVICE_PORT")?;
                if host.contains(':') {
                    format!("https://[{}]:{}", host, port)
                } else {
                    format!("https://{}:{}", host, port)
                }
            }
        };

        let token_path = std::env::var(TOKEN_FILE_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| SERVICE_ACCOUNT_TOKEN.to_string());

        let mut config = KubeConfig::new(base_url);

        match std::fs::read_to_string(&token_path) {
            Ok(token) => config = config.with_token(token.trim()),
            Err(e) if explicit_server.is_some() => {
                log::debug!("No service account token at {}: {}", token_path, e);
            }
            Err(e) => {
                return Err(ConfigError::ReadFile {
                    path: token_path,
                    source: e,
                })
            }
        }

        if Path::new(SERVICE_ACCOUNT_CA).exists() {
            let pem = std::fs::read(SERVICE_ACCOUNT_CA).map_err(|e| ConfigError::ReadFile {
                path: SERVICE_ACCOUNT_CA.to_string(),
                source: e,
            })?;
            config = config.with_ca_pem(pem);
        }

        Ok(config)
    }
}

fn env_required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing {
            name: name.to_string(),
        })
}
