use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::blocklist::{self, BlockedSite, SiteCategory};
use crate::discovery::DiscoveryLoop;
use crate::error::CoreError;
use crate::filter::FilterEngine;
use crate::policy::TimeLimitPolicy;
use crate::registry::{Device, normalize_mac};
use crate::state::{ProtectionStatus, Settings, SharedState};
use crate::worker::LoopStatus;

/// Protection status together with the run state of both loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub protection: ProtectionStatus,
    pub filtering: LoopStatus,
    pub discovery: LoopStatus,
}

/// Control surface over the filter and the discovery loop
pub struct ProtectionService {
    state: Arc<SharedState>,
    filter: FilterEngine,
    discovery: DiscoveryLoop,
}

impl ProtectionService {
    pub fn new(state: Arc<SharedState>, filter: FilterEngine, discovery: DiscoveryLoop) -> Self {
        Self {
            state,
            filter,
            discovery,
        }
    }

    pub async fn start_filtering(&self) -> Result<(), CoreError> {
        self.filter.start().await
    }

    pub async fn stop_filtering(&self) {
        self.filter.stop().await
    }

    pub async fn start_discovery_loop(&self) -> Result<(), CoreError> {
        self.discovery.start().await
    }

    pub async fn stop_discovery_loop(&self) {
        self.discovery.stop().await
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            protection: self.state.status().await,
            filtering: self.filter.status().await,
            discovery: self.discovery.status().await,
        }
    }

    /// Stop both loops
    pub async fn shutdown(&self) {
        self.stop_discovery_loop().await;
        self.stop_filtering().await;
        info!("Protection service shut down");
    }
}

/// Management actions over the persisted settings
///
/// Each action is one atomic update, so it is safe to run while the daemon
/// is filtering. An action only succeeds once its change is saved.
#[derive(Clone)]
pub struct PolicyManager {
    state: Arc<SharedState>,
}

impl PolicyManager {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    /// Fresh copy of the persisted settings
    pub async fn snapshot(&self) -> Result<Settings> {
        Ok(self.state.refresh().await?)
    }

    async fn with_device<R>(&self, mac: &str, f: impl FnOnce(&mut Device) -> R) -> Result<R> {
        let mac = normalize_mac(mac);
        self.state
            .try_update(|settings, _| settings.devices.get_mut(&mac).map(f))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Unknown device: {}", mac))
    }

    pub async fn block_device(&self, mac: &str) -> Result<()> {
        self.with_device(mac, |d| d.is_blocked = true).await
    }

    pub async fn unblock_device(&self, mac: &str) -> Result<()> {
        self.with_device(mac, |d| d.is_blocked = false).await
    }

    pub async fn rename_device(&self, mac: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Device name cannot be empty");
        }
        self.with_device(mac, |d| d.device_name = name.to_string()).await
    }

    /// Set a device's daily budget (0 = unlimited)
    pub async fn set_device_limit(&self, mac: &str, limit_ms: u64) -> Result<()> {
        self.with_device(mac, |d| d.time_limit = limit_ms).await
    }

    pub async fn reset_device_usage(&self, mac: &str) -> Result<()> {
        self.with_device(mac, |d| d.time_used_today = 0).await
    }

    pub async fn remove_device(&self, mac: &str) -> Result<Device> {
        let mac = normalize_mac(mac);
        self.state
            .try_update(|settings, _| settings.devices.remove(&mac))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Unknown device: {}", mac))
    }

    /// Add a deny-list entry; `false` when it already exists
    pub async fn add_site(&self, url: &str, category: SiteCategory) -> Result<bool> {
        let site = BlockedSite::new(url.trim(), category, Utc::now());
        self.state
            .try_update(|settings, _| blocklist::add_site(&mut settings.blocked_sites, site))
            .await?
    }

    /// Remove a deny-list entry; `false` when there was none
    pub async fn remove_site(&self, url: &str) -> Result<bool> {
        Ok(self
            .state
            .try_update(|settings, _| blocklist::remove_site(&mut settings.blocked_sites, url))
            .await?)
    }

    /// Add every preset site of a category, returning how many were new
    pub async fn add_preset(&self, category: SiteCategory) -> Result<usize> {
        Ok(self
            .state
            .try_update(|settings, now| {
                blocklist::add_preset(&mut settings.blocked_sites, category, now.to_utc())
            })
            .await?)
    }

    pub async fn set_policy(&self, policy: TimeLimitPolicy) -> Result<()> {
        policy.validate()?;
        self.update_policy(|current| *current = policy).await
    }

    pub async fn set_quiet_hours(&self, window: Option<(u32, u32)>) -> Result<()> {
        self.update_policy(|policy| match window {
            Some((start, end)) => {
                policy.quiet_hours_enabled = true;
                policy.quiet_hours_start = start;
                policy.quiet_hours_end = end;
            }
            None => policy.quiet_hours_enabled = false,
        })
        .await
    }

    /// Default budget given to newly discovered devices
    pub async fn set_daily_limit(&self, limit_ms: u64) -> Result<()> {
        self.update_policy(|policy| policy.daily_limit_ms = limit_ms)
            .await
    }

    /// Edit the policy in place; an invalid result leaves it unchanged
    async fn update_policy(&self, f: impl FnOnce(&mut TimeLimitPolicy)) -> Result<()> {
        self.state
            .try_update(|settings, _| {
                let mut policy = settings.time_limit;
                f(&mut policy);
                policy.validate()?;
                settings.time_limit = policy;
                Ok(())
            })
            .await?
    }

    pub async fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        Ok(self
            .state
            .try_update(|settings, _| settings.notifications_enabled = enabled)
            .await?)
    }

    pub async fn set_block_unknown_devices(&self, block: bool) -> Result<()> {
        Ok(self
            .state
            .try_update(|settings, _| settings.block_unknown_devices = block)
            .await?)
    }
}
