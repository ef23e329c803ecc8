use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

use crate::config::LoggingConfig;

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,appointment_chat=debug";

/// Initialize structured logging.
///
/// Configures:
/// - `tracing-subscriber::fmt`, compact text or JSON per [`LoggingConfig`].
/// - `EnvFilter` for dynamic log levels (`RUST_LOG`).
pub fn init(logging: &LoggingConfig) -> Result<(), TryInitError> {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter_layer);

    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .compact(),
            )
            .try_init()
    }
}
