use serde::Deserialize;
use std::fmt::Debug;
use thiserror::Error;
use tracing::metadata::LevelFilter;
use tracing::Level;
use tracing_subscriber::fmt::format::PrettyFields;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the default log level, e.g.
/// `LOG_LEVEL=debug`.
const LOG_LEVEL_ENV_VAR: &str = "LOG_LEVEL";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("init logging error: `{0}`")]
    TryInitError(String),
}

/// Logging configuration, deserialized from the `log` section of the service
/// configuration.
#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub(crate) format: LoggingFormat,
}

/// Chrono strftime pattern used for log line timestamps.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub(crate) struct TimestampFormat(pub(crate) String);

impl Default for TimestampFormat {
    fn default() -> Self {
        Self("%Y-%m-%dT%H:%M:%S".to_string())
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
pub struct LoggingFormat {
    /// Whether the target of the trace event is included in the output.
    #[serde(default)]
    pub(crate) target: bool,
    #[serde(default)]
    pub(crate) timestamp: TimestampFormat,
}

impl LoggingConfig {
    /// Attempts to initialize the global logging subscriber with the inner
    /// configuration.
    pub fn try_init(self) -> Result<(), LoggingError> {
        tracing_subscriber::fmt()
            .with_target(self.format.target)
            .with_max_level(Level::INFO)
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .with_env_var(LOG_LEVEL_ENV_VAR)
                    .from_env_lossy(),
            )
            .with_timer(ChronoLocal::new(self.format.timestamp.0))
            .fmt_fields(PrettyFields::new())
            .try_init()
            .map_err(|_| {
                LoggingError::TryInitError(
                    "unable to set the global logging subscriber".to_string(),
                )
            })
    }
}
