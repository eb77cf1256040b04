pub mod neighbors;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::notify::Notifier;
use crate::registry::{Device, Observation, fallback_device_name, normalize_mac};
use crate::state::{Settings, SharedState};
use crate::worker::{self, LoopState, LoopStatus};

pub use neighbors::{DeviceNamer, HostnameNamer, Neighbor, NeighborTableReader, NoLookupNamer, ProcArpReader};

/// Time between scan cycles
pub const SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Usage credited to each active device per cycle
pub const ACCRUAL_PER_CYCLE_MS: u64 = 10_000;

/// Outcome of one scan cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub seen: usize,
    pub created: usize,
    pub active: usize,
    /// Names of devices blocked for reaching their limit this cycle
    pub newly_blocked: Vec<String>,
    pub notify: bool,
}

/// Merge one neighbor-table read into the settings and enforce budgets
///
/// `names` maps normalized MACs to resolved names for devices not yet in the
/// registry.
pub fn apply_scan(
    settings: &mut Settings,
    neighbors: &[Neighbor],
    names: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> CycleReport {
    let mut report = CycleReport {
        seen: neighbors.len(),
        notify: settings.notifications_enabled,
        ..Default::default()
    };

    let block_unknown = settings.block_unknown_devices;
    let default_limit = settings.time_limit.daily_limit_ms;

    for neighbor in neighbors {
        let observation = settings.devices.observe(&neighbor.mac, &neighbor.ip, now, || {
            let name = names
                .get(&normalize_mac(&neighbor.mac))
                .cloned()
                .unwrap_or_else(|| fallback_device_name(&neighbor.mac));
            let mut device = Device::new(&neighbor.mac, &neighbor.ip, name, now);
            device.is_blocked = block_unknown;
            device.time_limit = default_limit;
            device
        });

        if observation == Observation::Created {
            report.created += 1;
            info!("New device {} at {}", neighbor.mac, neighbor.ip);
        }
    }

    for device in settings.devices.active_mut(now) {
        if device.is_blocked {
            continue;
        }

        if device.time_limit > 0 {
            device.time_used_today = device.time_used_today.saturating_add(ACCRUAL_PER_CYCLE_MS);
        }

        if device.is_time_limit_reached() {
            device.is_blocked = true;
            info!(
                "{} ({}) reached its daily limit and was blocked",
                device.device_name, device.mac_address
            );
            report.newly_blocked.push(device.device_name.clone());
        }
    }

    report.active = settings.devices.active_count(now);
    report
}

/// One discovery and accounting pass over the neighbor table
pub struct Scanner {
    state: Arc<SharedState>,
    neighbors: Arc<dyn NeighborTableReader>,
    namer: Arc<dyn DeviceNamer>,
    notifier: Arc<dyn Notifier>,
}

impl Scanner {
    pub fn new(
        state: Arc<SharedState>,
        neighbors: Arc<dyn NeighborTableReader>,
        namer: Arc<dyn DeviceNamer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state,
            neighbors,
            namer,
            notifier,
        }
    }

    /// Read, reconcile, accrue and enforce once
    pub async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        let neighbors = self.read_neighbors().await.map_err(CoreError::ScanCycleFailed)?;

        let unknown: Vec<Neighbor> = self
            .state
            .read(|settings| {
                neighbors
                    .iter()
                    .filter(|n| settings.devices.get(&n.mac).is_none())
                    .cloned()
                    .collect()
            })
            .await;
        let names = self.resolve_names(unknown).await;

        let report = self
            .state
            .update(|settings, now| apply_scan(settings, &neighbors, &names, now.to_utc()))
            .await;

        if report.notify {
            for name in &report.newly_blocked {
                self.notifier.notify_time_limit_reached(name);
            }
        }

        Ok(report)
    }

    async fn read_neighbors(&self) -> Result<Vec<Neighbor>> {
        let reader = Arc::clone(&self.neighbors);
        tokio::task::spawn_blocking(move || reader.read_neighbors())
            .await
            .context("Neighbor table read was aborted")?
    }

    async fn resolve_names(&self, unknown: Vec<Neighbor>) -> HashMap<String, String> {
        if unknown.is_empty() {
            return HashMap::new();
        }

        let namer = Arc::clone(&self.namer);
        let lookup = tokio::task::spawn_blocking(move || {
            unknown
                .into_iter()
                .filter_map(|n| {
                    let name = namer.device_name(&n.ip, &n.mac)?;
                    Some((normalize_mac(&n.mac), name))
                })
                .collect::<HashMap<_, _>>()
        });

        match lookup.await {
            Ok(names) => names,
            Err(e) => {
                warn!("Device name lookup failed: {}", e);
                HashMap::new()
            }
        }
    }

    async fn run(self: Arc<Self>, interval: Duration, mut stop: watch::Receiver<bool>) {
        info!("Discovery loop started (every {}s)", interval.as_secs());

        loop {
            tokio::select! {
                _ = worker::stopped(&mut stop) => break,
                result = self.run_cycle() => match result {
                    Ok(report) => debug!(
                        seen = report.seen,
                        created = report.created,
                        active = report.active,
                        "Scan cycle complete"
                    ),
                    Err(e) => warn!("{}; skipping cycle", e),
                },
            }

            tokio::select! {
                _ = worker::stopped(&mut stop) => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!("Discovery loop stopping");
    }
}

/// Periodic device discovery and time accounting
pub struct DiscoveryLoop {
    scanner: Arc<Scanner>,
    interval: Duration,
    task: Mutex<LoopState>,
}

impl DiscoveryLoop {
    pub fn new(scanner: Scanner) -> Self {
        Self::with_interval(scanner, SCAN_INTERVAL)
    }

    pub fn with_interval(scanner: Scanner, interval: Duration) -> Self {
        Self {
            scanner: Arc::new(scanner),
            interval,
            task: Mutex::new(LoopState::Stopped),
        }
    }

    /// Start scanning; a no-op when already running
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut task = self.task.lock().await;
        if task.is_running() {
            debug!("Discovery already running");
            return Ok(());
        }
        task.stop().await;

        let scanner = Arc::clone(&self.scanner);
        let interval = self.interval;
        task.spawn(move |stop| scanner.run(interval, stop));
        Ok(())
    }

    /// Stop scanning and wait for the loop to exit
    pub async fn stop(&self) {
        if self.task.lock().await.stop().await {
            info!("Discovery stopped");
        }
    }

    pub async fn status(&self) -> LoopStatus {
        self.task.lock().await.status()
    }
}
