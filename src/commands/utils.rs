use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::{self, Config};
use crate::policy::SystemClock;
use crate::service::PolicyManager;
use crate::state::SharedState;
use crate::store::JsonFileStore;

/// Initialize logging
///
/// `RUST_LOG` wins over both the configured level and `--verbose`.
pub fn init_logging(level: &str, verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose { "debug" } else { level };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Load the daemon configuration, falling back to defaults when absent
pub fn load_config(path: &Path) -> Result<Config> {
    config::load_or_default(path).context("Failed to load configuration file")
}

/// Open the settings store named by the configuration
pub fn open_store(config: &Config) -> Result<JsonFileStore> {
    let store = JsonFileStore::open(config.store.path.as_deref())?;
    tracing::debug!("Using settings file: {}", store.path().display());
    Ok(store)
}

/// Management handle over the configured settings store
pub fn policy_manager(config: &Config) -> Result<PolicyManager> {
    let store = Arc::new(open_store(config)?);
    let state = SharedState::load(store, Arc::new(SystemClock));
    Ok(PolicyManager::new(Arc::new(state)))
}

/// Format a millisecond budget for display
pub fn format_duration_ms(ms: u64) -> String {
    let minutes = ms / (60 * 1000);
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

pub fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60 * 1000)
}

pub fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Print sudo message based on OS
pub fn print_sudo_message() {
    let program = std::env::args().next().unwrap_or_else(|| "netfence".to_string());
    eprintln!("Please run with sudo: sudo {}", program);
}
