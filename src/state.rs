use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::blocklist::BlockedSite;
use crate::error::CoreError;
use crate::policy::{self, Clock, TimeLimitPolicy};
use crate::registry::DeviceRegistry;
use crate::store::SettingsStore;

/// Current settings schema version
pub const SETTINGS_VERSION: &str = "1.0";

/// Full persisted snapshot shared by the filter and the discovery loop
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub blocked_sites: Vec<BlockedSite>,
    #[serde(default)]
    pub devices: DeviceRegistry,
    #[serde(default)]
    pub time_limit: TimeLimitPolicy,
    #[serde(default)]
    pub protection_active: bool,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub block_unknown_devices: bool,
    #[serde(default)]
    pub blocked_count_today: u32,
    /// Day of the year the daily counters were last reset
    #[serde(default)]
    pub last_reset_date: Option<u32>,
}

fn default_version() -> String {
    SETTINGS_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            blocked_sites: Vec::new(),
            devices: DeviceRegistry::default(),
            time_limit: TimeLimitPolicy::default(),
            protection_active: false,
            notifications_enabled: true,
            block_unknown_devices: false,
            blocked_count_today: 0,
            last_reset_date: None,
        }
    }
}

impl Settings {
    /// Reset daily counters when `now` falls on a different day than the last
    /// reset. Returns whether a reset happened.
    pub fn roll_over_if_new_day(&mut self, now: &DateTime<Local>) -> bool {
        let today = policy::day_of_year(now);
        if self.last_reset_date == Some(today) {
            return false;
        }

        self.blocked_count_today = 0;
        self.devices.reset_daily_usage();
        self.last_reset_date = Some(today);
        true
    }

    /// Snapshot of the derived counters
    pub fn status(&self, now: DateTime<Utc>) -> ProtectionStatus {
        ProtectionStatus {
            state: if self.protection_active {
                ProtectionState::Active
            } else {
                ProtectionState::Inactive
            },
            connected_devices: self.devices.active_count(now),
            blocked_today: self.blocked_count_today,
        }
    }
}

/// Whether the traffic filter is enforcing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    Inactive,
    Active,
}

impl fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectionState::Inactive => f.write_str("inactive"),
            ProtectionState::Active => f.write_str("active"),
        }
    }
}

/// Protection state with its derived counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionStatus {
    pub state: ProtectionState,
    pub connected_devices: usize,
    pub blocked_today: u32,
}

/// Single owner of the settings snapshot
///
/// Every read-modify-write goes through [`SharedState::update`] or
/// [`SharedState::try_update`]. Both hold the cache lock and the store lock
/// while they reload from the store, apply the daily rollover, run the
/// mutation and save the result, so a writer in another process cannot
/// interleave. Nothing hands out references that outlive a call.
pub struct SharedState {
    cache: Mutex<Settings>,
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl SharedState {
    /// Load the initial snapshot, falling back to defaults if the store fails
    pub fn load(store: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        let settings = match store.load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("{}; starting from default settings", CoreError::PersistenceFailure(e));
                Settings::default()
            }
        };

        Self {
            cache: Mutex::new(settings),
            store,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Read from the cached snapshot
    pub async fn read<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        let cache = self.cache.lock().await;
        f(&cache)
    }

    /// Refresh the cached snapshot from the store
    pub async fn reload(&self) {
        let mut cache = self.cache.lock().await;
        match self.store.load() {
            Ok(fresh) => *cache = fresh,
            Err(e) => tracing::debug!("{}; keeping cached settings", CoreError::PersistenceFailure(e)),
        }
    }

    /// Reload from the store and return a copy, failing if it cannot be read
    pub async fn refresh(&self) -> Result<Settings, CoreError> {
        let mut cache = self.cache.lock().await;
        let fresh = self.store.load().map_err(CoreError::PersistenceFailure)?;
        *cache = fresh.clone();
        Ok(fresh)
    }

    /// Apply one atomic load-mutate-store sequence
    ///
    /// Store failures are logged and the change is kept in memory. Used by
    /// the loops, which must keep running when the disk is unavailable.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Settings, DateTime<Local>) -> R) -> R {
        let mut cache = self.cache.lock().await;

        let _lock = match self.store.lock() {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::warn!("{}; updating without the store lock", CoreError::PersistenceFailure(e));
                None
            }
        };

        match self.store.load() {
            Ok(fresh) => *cache = fresh,
            Err(e) => tracing::warn!("{}; using in-memory settings", CoreError::PersistenceFailure(e)),
        }

        let now = self.clock.now();
        if cache.roll_over_if_new_day(&now) {
            tracing::info!("Daily counters reset for day {}", policy::day_of_year(&now));
        }

        let result = f(&mut cache, now);

        if let Err(e) = self.store.save(&cache) {
            tracing::warn!("{}; change kept in memory only", CoreError::PersistenceFailure(e));
        }

        result
    }

    /// Like [`SharedState::update`], but any store failure aborts the change
    ///
    /// The cache only takes the new settings once they are saved.
    pub async fn try_update<R>(
        &self,
        f: impl FnOnce(&mut Settings, DateTime<Local>) -> R,
    ) -> Result<R, CoreError> {
        let mut cache = self.cache.lock().await;
        let _lock = self.store.lock().map_err(CoreError::PersistenceFailure)?;

        let mut fresh = self.store.load().map_err(CoreError::PersistenceFailure)?;
        let now = self.clock.now();
        if fresh.roll_over_if_new_day(&now) {
            tracing::info!("Daily counters reset for day {}", policy::day_of_year(&now));
        }

        let result = f(&mut fresh, now);

        self.store.save(&fresh).map_err(CoreError::PersistenceFailure)?;
        *cache = fresh;
        Ok(result)
    }

    /// Current protection state and counters
    pub async fn status(&self) -> ProtectionStatus {
        self.update(|settings, now| settings.status(now.with_timezone(&Utc)))
            .await
    }
}
