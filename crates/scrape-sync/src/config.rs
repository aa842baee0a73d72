//! Service settings read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::sync::StoreKey;

pub const SECRET_NAME_VAR: &str = "SCRAPE_CONFIG_SECRET_NAME";
pub const NAMESPACE_VAR: &str = "MONITORING_NAMESPACE";
pub const SECRET_KEY_VAR: &str = "SCRAPE_CONFIG_SECRET_KEY";
pub const FALLBACK_NAMESPACE_VAR: &str = "FALLBACK_NAMESPACE";
pub const NODE_SELECTOR_VAR: &str = "NODE_LABEL_SELECTOR";
pub const INTERVAL_VAR: &str = "SYNC_INTERVAL_SECS";
pub const HEALTH_ADDR_VAR: &str = "HEALTH_ADDR";
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";

pub const DEFAULT_SECRET_KEY: &str = "additional-scrape-configs.yaml";
pub const DEFAULT_FALLBACK_NAMESPACE: &str = "default";
pub const DEFAULT_NODE_SELECTOR: &str = "kubernetes.io/os=windows";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8080";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected 'text' or 'json'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Name of the secret holding the additional scrape configs.
    pub secret_name: String,
    /// Namespace the secret normally lives in.
    pub namespace: String,
    /// Data key inside the secret.
    pub secret_key: String,
    /// Namespace tried when the secret is not in `namespace`.
    pub fallback_namespace: String,
    /// Label selector picking the nodes to scrape.
    pub node_selector: String,
    pub sync_interval: Duration,
    pub health_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &str| {
            get(name).ok_or_else(|| ConfigError::Missing {
                name: name.to_string(),
            })
        };

        let sync_interval = match get(INTERVAL_VAR) {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| invalid(INTERVAL_VAR, &raw, e))?;
                if secs == 0 {
                    return Err(invalid(INTERVAL_VAR, &raw, "must be greater than zero"));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_INTERVAL_SECS),
        };

        let health_addr = {
            let raw = get(HEALTH_ADDR_VAR).unwrap_or_else(|| DEFAULT_HEALTH_ADDR.to_string());
            raw.trim()
                .parse::<SocketAddr>()
                .map_err(|e| invalid(HEALTH_ADDR_VAR, &raw, e))?
        };

        let log_format = match get(LOG_FORMAT_VAR) {
            Some(raw) => raw.parse().map_err(|e: String| invalid(LOG_FORMAT_VAR, &raw, e))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            secret_name: required(SECRET_NAME_VAR)?,
            namespace: required(NAMESPACE_VAR)?,
            secret_key: get(SECRET_KEY_VAR).unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string()),
            fallback_namespace: get(FALLBACK_NAMESPACE_VAR)
                .unwrap_or_else(|| DEFAULT_FALLBACK_NAMESPACE.to_string()),
            node_selector: get(NODE_SELECTOR_VAR)
                .unwrap_or_else(|| DEFAULT_NODE_SELECTOR.to_string()),
            sync_interval,
            health_addr,
            log_format,
        })
    }

    pub fn store_key(&self) -> StoreKey {
        StoreKey::new(&self.secret_name, &self.namespace)
    }
}

fn invalid(name: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
