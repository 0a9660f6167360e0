//! Client configuration.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3003/";
const DEFAULT_IDENTITY_PATH: &str = "./tenkb-data/voter_id.json";

/// Log verbosity used when `RUST_LOG` is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Debug,
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(Error::Config(format!("unknown log level '{other}'"))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Configuration for a [`VoteClient`](crate::VoteClient).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Root the `id/`, `vote/` and `votes/` endpoints live under.
    #[serde(default = "base_url_default")]
    pub base_url: Url,

    /// File holding the persisted voter id.
    #[serde(default = "identity_path_default")]
    pub identity_path: PathBuf,

    /// Per-request timeout. `None` leaves timeouts to the environment.
    #[serde(default, with = "timeout_secs")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: base_url_default(),
            identity_path: identity_path_default(),
            timeout: None,
            log_level: LogLevel::default(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let base_url = match std::env::var("TENKB_BASE_URL") {
            Ok(raw) => parse_base_url(&raw)?,
            Err(_) => base_url_default(),
        };

        let identity_path = std::env::var("TENKB_IDENTITY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| identity_path_default());

        let timeout = match std::env::var("TENKB_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|e| Error::Config(format!("invalid TENKB_TIMEOUT_SECS: {e}")))?;
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        let log_level = match std::env::var("TENKB_LOG_LEVEL") {
            Ok(raw) => raw.parse()?,
            Err(_) => LogLevel::default(),
        };

        Ok(Self {
            base_url,
            identity_path,
            timeout,
            log_level,
        })
    }

    /// Load config from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.base_url = normalize(config.base_url);
        Ok(config)
    }

    /// Same config pointed at another server.
    pub fn with_base_url(mut self, raw: &str) -> Result<Self> {
        self.base_url = parse_base_url(raw)?;
        Ok(self)
    }
}

/// Parse a base URL, making sure relative endpoint paths join beneath it.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::Config(format!("invalid base url '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("'{raw}' cannot be used as a base url")));
    }
    Ok(normalize(url))
}

fn normalize(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn base_url_default() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base url is valid")
}

fn identity_path_default() -> PathBuf {
    PathBuf::from(DEFAULT_IDENTITY_PATH)
}

mod timeout_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
