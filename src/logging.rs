//! Tracing subscriber setup shared by the server and the tools

use crate::config::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
