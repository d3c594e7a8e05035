use serde::Deserialize;
use std::{env, fs, io, path::PathBuf, time::Duration};

use chrono::TimeDelta;
use reporting_client::{ClientSettings, Credentials};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "reporting-config.toml";
pub const DEFAULT_MICROGRID_CONFIG_DIR: &str = "toml_directory/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_span_hours: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_span_hours: 24 * 7,
        }
    }
}

impl ClientConfig {
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_span: TimeDelta::hours(i64::from(self.max_span_hours.max(1))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    /// Sessions idle for longer than this are discarded.
    pub session_idle_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            session_idle_timeout_secs: 30 * 60,
        }
    }
}

impl HttpConfig {
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from `REPORTING_CONFIG`, or `reporting-config.toml` when unset.
    ///
    /// The default file is optional; an explicitly configured path must exist.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var("REPORTING_CONFIG") {
            Ok(path) => Self::from_path(PathBuf::from(path)),
            Err(_) => match Self::from_path(PathBuf::from(DEFAULT_CONFIG_PATH)) {
                Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                    tracing::info!("no {DEFAULT_CONFIG_PATH} found, using default settings");
                    Ok(Self::default())
                }
                other => other,
            },
        }
    }

    pub fn from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }
}

/// Connection settings and secrets taken from the environment.
#[derive(Debug, Clone)]
pub struct ApiEnv {
    pub api_url: String,
    pub credentials: Credentials,
    pub microgrid_config_dir: PathBuf,
}

impl ApiEnv {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |var: &'static str| -> Result<String, ConfigError> {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(var))
        };

        Ok(Self {
            api_url: require("REPORTING_API_URL")?,
            credentials: Credentials {
                api_key: require("API_KEY")?,
                api_secret: require("API_SECRET")?,
            },
            microgrid_config_dir: lookup("MICROGRID_CONFIG_DIR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MICROGRID_CONFIG_DIR.to_string())
                .into(),
        })
    }
}
