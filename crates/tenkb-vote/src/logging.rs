//! Tracing setup for hosts embedding the client.

use crate::config::LogLevel;
use crate::error::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level: tracing::Level = level.into();
        format!("tenkb_vote={}", level.as_str().to_ascii_lowercase()).into()
    })
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn try_init(level: LogLevel) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Config(format!("tracing already initialized: {e}")))
}

/// Like [`try_init`], but a subscriber that is already installed is left alone.
pub fn init(level: LogLevel) {
    if try_init(level).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
