use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use snafu::ResultExt as _;
use url::Url;

use crate::error::{ApplicationError, ConfigLoadSnafu};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "host_address", default = "default_host")]
    pub host: SocketAddr,
    #[serde(flatten)]
    pub surreal: SurrealConfig,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Allowed browser origin, any origin when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Config, ApplicationError> {
        envy::from_env::<Config>().context(ConfigLoadSnafu)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SurrealConfig {
    #[serde(rename = "surreal_endpoint", default = "default_endpoint")]
    pub endpoint: Url,
    #[serde(rename = "surreal_namespace", default = "default_namespace")]
    pub namespace: String,
    #[serde(rename = "surreal_database", default = "default_namespace")]
    pub database: String,
    #[serde(flatten)]
    pub credentials: Option<SurrealCredentials>,
}

impl Default for SurrealConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            namespace: default_namespace(),
            database: default_namespace(),
            credentials: None,
        }
    }
}

/// Root credentials, only needed for remote endpoints.
#[derive(Debug, Deserialize, Clone)]
pub struct SurrealCredentials {
    #[serde(rename = "surreal_username")]
    pub username: String,
    #[serde(rename = "surreal_password")]
    pub password: String,
}

/// Timing of a client playback session.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Period of the background flush while playing.
    #[serde(
        rename = "flush_interval",
        default = "default_flush_interval",
        deserialize_with = "humantime_duration"
    )]
    pub flush_interval: Duration,
    /// Quiet period after pause, seek or end before the trailing flush.
    #[serde(
        rename = "flush_debounce",
        default = "default_debounce",
        deserialize_with = "humantime_duration"
    )]
    pub debounce: Duration,
    /// Saved positions at or below this many seconds are not restored.
    #[serde(default = "default_seek_epsilon")]
    pub seek_epsilon: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            debounce: default_debounce(),
            seek_epsilon: default_seek_epsilon(),
        }
    }
}

fn humantime_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

fn default_host() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5001))
}

fn default_endpoint() -> Url {
    Url::parse("mem://").unwrap_or_else(|_| unreachable!("static url is valid"))
}

fn default_namespace() -> String {
    "watchmark".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_debounce() -> Duration {
    Duration::from_millis(1500)
}

fn default_seek_epsilon() -> f64 {
    0.1
}
