use std::error::Error as StdError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid entity: {reason}")]
    InvalidEntity { reason: String },

    #[error("Failed to parse scrape config YAML: {0}")]
    Parse(String),

    #[error("Failed to serialize scrape config YAML: {0}")]
    Serialize(String),

    #[error("A scrape config already exists for '{name}'; only one per node is allowed")]
    DuplicateEntity { name: String },

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Sync task failed: {0}")]
    Task(String),
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

/// Errors surfaced by the external collaborators (entity source and config store).
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Access to {resource} is forbidden (HTTP {status}){diagnostics}")]
    Forbidden {
        resource: String,
        status: u16,
        diagnostics: Diagnostics,
    },

    #[error("Unauthorized to access {resource} (HTTP {status}){diagnostics}")]
    Unauthorized {
        resource: String,
        status: u16,
        diagnostics: Diagnostics,
    },

    #[error("Request for {resource} failed with HTTP {status}: {message}")]
    Status {
        resource: String,
        status: u16,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Returns true when the credentials in use were rejected.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            ApiError::Forbidden { .. } | ApiError::Unauthorized { .. }
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Response details captured when the API server denies access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    pub content: String,
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "------")?;
        writeln!(f, "Additional Info")?;
        writeln!(f, "------")?;
        writeln!(f, "Headers:")?;
        for (name, value) in &self.headers {
            writeln!(f, "  {}: {}", name, value)?;
        }
        writeln!(f, "ReasonPhrase: {}", self.reason.as_deref().unwrap_or("-"))?;
        write!(f, "Content: {}", self.content)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required environment variable '{name}' is not set")]
    Missing { name: String },

    #[error("Invalid value '{value}' for '{name}': {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to install log bridge: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Renders an error followed by every error in its `source()` chain.
pub fn format_error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = format!("{} ({})", err, short_type_name(err));
    let mut source = err.source();
    while let Some(inner) = source {
        rendered.push_str("\n--Inner Error--\n");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}

fn short_type_name(err: &(dyn StdError + 'static)) -> &'static str {
    if err.is::<SyncError>() {
        "SyncError"
    } else if err.is::<ApiError>() {
        "ApiError"
    } else if err.is::<ConfigError>() {
        "ConfigError"
    } else {
        "error"
    }
}
