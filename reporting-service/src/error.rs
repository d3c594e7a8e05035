use std::path::PathBuf;

use reporting_client::ClientError;

/// Startup failures: environment, service config file, microgrid configs.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing or empty required environment variable `{0}`")]
    MissingEnv(&'static str),
    #[error("microgrid config directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{}: unknown timezone '{timezone}'", .path.display())]
    UnknownTimezone { path: PathBuf, timezone: String },
    #[error("{}: component {component_id} declared twice", .path.display())]
    DuplicateComponent { path: PathBuf, component_id: u64 },
    #[error("microgrid {id} declared in both {} and {}", .first.display(), .second.display())]
    DuplicateMicrogrid {
        id: u64,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Failures of a report request. Cloneable so one failed fetch can be
/// handed to every caller waiting on it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("reporting API rejected the credentials: {0}")]
    Auth(String),
    #[error("reporting API failed after {attempts} attempt(s): {detail}")]
    Upstream { attempts: u32, detail: String },
    #[error("microgrid {0} is not configured")]
    UnknownMicrogrid(u64),
    #[error("unknown page '{0}'")]
    UnknownPage(String),
}

impl ReportError {
    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::InvalidRange(_) => "invalid_range",
            ReportError::InvalidFilter(_) => "invalid_filter",
            ReportError::Auth(_) => "auth",
            ReportError::Upstream { .. } => "upstream",
            ReportError::UnknownMicrogrid(_) => "unknown_microgrid",
            ReportError::UnknownPage(_) => "unknown_page",
        }
    }
}

impl From<ClientError> for ReportError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::InvalidRange(msg) => ReportError::InvalidRange(msg),
            ClientError::Auth(msg) => ReportError::Auth(msg),
            ClientError::Upstream { attempts, detail } => ReportError::Upstream { attempts, detail },
            ClientError::Setup(detail) => ReportError::Upstream {
                attempts: 0,
                detail,
            },
        }
    }
}
