//! Log output for a node process.
//!
//! Block execution logs per-transaction outcomes at `debug`, expirations at
//! `info` and failed resolve functions at `warn`. `RUST_LOG` takes precedence
//! over the configured `log_level`, so one crate can be turned up without
//! editing the config (`RUST_LOG=info,tally_txapp=debug`).

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::NodeError;

/// `log_format` values accepted in the node config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text lines for a terminal.
    Human,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(NodeError::Config(format!("unknown log format: {other}"))),
        }
    }
}

fn filter(level: &str) -> Result<EnvFilter, NodeError> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }
    EnvFilter::try_new(level)
        .map_err(|e| NodeError::Config(format!("invalid log level {level:?}: {e}")))
}

/// Install the process-wide subscriber. Errors on a malformed `level` or
/// when a subscriber is already installed.
pub fn init_logging(format: LogFormat, level: &str) -> Result<(), NodeError> {
    let filter = filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Human => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    installed.map_err(|e| NodeError::Config(format!("logging already initialised: {e}")))
}
