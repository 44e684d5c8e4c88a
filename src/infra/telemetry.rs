use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

// Dependency targets that drown out gateway logs at info level.
const QUIETED_TARGETS: [&str; 3] = ["hyper=warn", "sqlx=warn", "h2=warn"];

/// Install the global tracing subscriber for the gateway process.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    for target in QUIETED_TARGETS {
        if let Ok(directive) = target.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}
