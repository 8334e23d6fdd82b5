use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::ConfigError;

/// Installs the global subscriber. `RUST_LOG` overrides `filter`.
///
/// `log` records from the loader and worker threads are bridged into the same
/// subscriber. Calling this twice returns an error instead of panicking.
pub fn init_logging(filter: &str) -> Result<(), ConfigError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(filter)
            .map_err(|e| ConfigError::Logging(format!("invalid filter '{}': {}", filter, e)))?,
    };

    tracing_log::LogTracer::init().map_err(|e| ConfigError::Logging(e.to_string()))?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logging(e.to_string()))
}
