//! Subscriber installation for binaries that run or enqueue jobs.

use std::sync::Arc;

use jobkit_config::LoggingConfig;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

/// Type alias for the reload handle returned by tracing initialization.
pub type ReloadHandle = Arc<dyn Fn(EnvFilter) -> Result<(), String> + Send + Sync>;

/// Initialize tracing from configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Returns a handle
/// to change the filter at runtime, or `None` when a global subscriber was
/// already installed.
pub fn install_tracing_from_config(cfg: &LoggingConfig) -> Option<ReloadHandle> {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.level.clone());
    let (filter_layer, reload_handle) = reload::Layer::new(EnvFilter::new(&directives));

    let installed = if cfg.json {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().with_timer(ChronoUtc::rfc_3339()))
            .try_init()
    };

    if let Err(e) = installed {
        tracing::debug!(error = %e, "tracing subscriber already installed");
        return None;
    }

    Some(Arc::new(move |filter| {
        reload_handle
            .reload(filter)
            .map_err(|e| format!("reload failed: {e}"))
    }))
}
