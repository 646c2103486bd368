//! # Observability
//!
//! Structured logging for the compiler. Every compilation runs inside a `compile` span
//! carrying a unique `compilation_id`, so the events of one run can be grouped.

use crate::config::LogConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Create the span that wraps one compilation.
///
/// ```rust,ignore
/// let span = compile_span!(listeners = model.listeners.len());
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! compile_span {
    () => {
        tracing::info_span!("compile", compilation_id = %uuid::Uuid::new_v4())
    };
    ($($field:tt)*) => {
        tracing::info_span!(
            "compile",
            compilation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice is harmless;
/// the first subscriber stays installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.level, e)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.with_target(false).try_init()
    };

    if installed.is_ok() {
        tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    }
    Ok(())
}
