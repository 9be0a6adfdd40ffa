//! Configuration types for rollup-sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Top-level configuration
///
/// Every section has working defaults, so `Config::default()` synchronizes against a
/// node on `localhost:5000` into `./rollup-sync.db`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream GraphQL endpoint settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Polling and decoding behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Progress-record retention
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Config {
    /// Check the configuration for values the synchronizer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.upstream.graphql_url).is_err() {
            return Err(config_error(
                format!("invalid GraphQL URL: {}", self.upstream.graphql_url),
                "upstream.graphql_url",
            ));
        }
        if self.upstream.request_timeout.is_zero() {
            return Err(config_error(
                "request_timeout must be greater than zero",
                "upstream.request_timeout",
            ));
        }
        if self.sync.batch_size == 0 {
            return Err(config_error(
                "batch_size must be greater than zero",
                "sync.batch_size",
            ));
        }
        if self.sync.poll_interval.is_zero() {
            return Err(config_error(
                "poll_interval must be greater than zero",
                "sync.poll_interval",
            ));
        }
        if !self.sync.streams.any() {
            return Err(config_error(
                "at least one stream must be enabled",
                "sync.streams",
            ));
        }
        if self.retention.enabled && self.retention.interval.is_zero() {
            return Err(config_error(
                "retention interval must be greater than zero",
                "retention.interval",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// Upstream GraphQL endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// GraphQL endpoint of the rollup node (default: "http://localhost:5000/graphql")
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    /// Timeout for one page request (default: 10 seconds)
    ///
    /// Bounds how long shutdown can wait on an in-flight fetch.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with each request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Synchronizer behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum entries requested per stream per poll (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Fixed delay between polls, also used after a failed fetch (default: 3 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Which streams are requested from the upstream
    #[serde(default)]
    pub streams: StreamSelection,

    /// How output payload encoding generation is determined (default: auto)
    #[serde(default)]
    pub payload_encoding: EncodingMode,

    /// What to do with an entry that cannot be decoded (default: halt)
    #[serde(default)]
    pub decode_failure: DecodeFailurePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval: default_poll_interval(),
            streams: StreamSelection::default(),
            payload_encoding: EncodingMode::default(),
            decode_failure: DecodeFailurePolicy::default(),
        }
    }
}

/// Enabled streams
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelection {
    /// Request outputs (vouchers and notices)
    #[serde(default = "default_true")]
    pub outputs: bool,
    /// Request inputs
    #[serde(default = "default_true")]
    pub inputs: bool,
    /// Request reports
    #[serde(default = "default_true")]
    pub reports: bool,
}

impl StreamSelection {
    /// All three streams
    pub const ALL: Self = Self {
        outputs: true,
        inputs: true,
        reports: true,
    };

    /// Only the output stream
    pub const OUTPUTS_ONLY: Self = Self {
        outputs: true,
        inputs: false,
        reports: false,
    };

    /// True if at least one stream is enabled
    pub fn any(&self) -> bool {
        self.outputs || self.inputs || self.reports
    }
}

impl Default for StreamSelection {
    fn default() -> Self {
        Self::ALL
    }
}

/// How the decoder decides between legacy (V1) and current (V2) output payloads
///
/// An encoding carried on the raw entry itself always wins over this setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    /// Inspect the payload's leading bytes; every decision is logged
    #[default]
    Auto,
    /// Upstream emits legacy payloads only
    V1,
    /// Upstream emits selector-prefixed payloads only
    V2,
}

/// Reaction to an entry that cannot be decoded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Stop the synchronizer; nothing from the page is committed
    #[default]
    Halt,
    /// Log the entry at error level and commit the rest of the page
    Skip,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./rollup-sync.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Retention of sync progress records
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run the purge task (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often to purge (default: 10 minutes)
    #[serde(default = "default_retention_period", with = "duration_serde")]
    pub interval: Duration,

    /// Records older than this are deleted; the latest record is always kept
    /// (default: 10 minutes)
    #[serde(default = "default_retention_period", with = "duration_serde")]
    pub max_age: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_retention_period(),
            max_age: default_retention_period(),
        }
    }
}

fn default_graphql_url() -> String {
    "http://localhost:5000/graphql".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    concat!("rollup-sync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_batch_size() -> u32 {
    10
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./rollup-sync.db")
}

fn default_retention_period() -> Duration {
    Duration::from_secs(600)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
