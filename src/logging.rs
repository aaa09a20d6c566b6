// src/logging.rs

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured
/// level; a second call is a no-op.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "traffic_incident_detection={level},notifications={level}",
            level = config.level
        ))
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
