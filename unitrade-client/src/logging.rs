//! Logging setup.
//!
//! `RUST_LOG` wins over the configured filter. Timestamps use the local
//! timezone.

use chrono::Local;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::config::DEFAULT_LOG_FILTER;
use crate::error::{Error, Result};

/// Timer that formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Build the filter: `RUST_LOG` if set and valid, else `directive`.
pub fn build_filter(directive: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("Invalid filter directive '{directive}': {e}")))
}

/// Install the global subscriber. Returns `false` if one was already installed.
pub fn init_logging(directive: &str) -> Result<bool> {
    let filter = build_filter(directive)?;

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(LocalTimer).with_target(true))
        .try_init()
        .is_ok();

    Ok(installed)
}
