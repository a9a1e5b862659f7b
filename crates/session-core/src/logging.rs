//! Logging setup
//!
//! Thin wrapper over `tracing-subscriber` so embedding applications get
//! the same formatting everywhere; `RUST_LOG` directives still apply on
//! top of the configured level.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, SessionError};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,

    /// Whether to emit JSON-formatted lines
    pub json: bool,

    /// Whether to include file and line information
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            file_info: false,
        }
    }
}

/// Install the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| SessionError::config(format!("logging init failed: {e}")))
}
