pub mod packet;
pub mod tunnel;

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::blocklist::Blocklist;
use crate::error::CoreError;
use crate::notify::Notifier;
use crate::state::{Settings, SharedState};
use crate::worker::{self, LoopState, LoopStatus};

pub use tunnel::{MAX_PACKET_SIZE, PacketForwarder, Tunnel, TunnelConfig, TunnelProvider};

/// How often the packet loop saves block counts and refreshes its view of the
/// settings
const RELOAD_INTERVAL: Duration = Duration::from_secs(5);

/// What happens to a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Drop,
}

/// Why a destination is blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// A deny-list entry matched; holds the entry's url
    Site(String),
    QuietHours,
}

/// Decide whether traffic to `destination` must be dropped
pub fn block_reason(settings: &Settings, destination: &str, now: &DateTime<Local>) -> Option<BlockReason> {
    if let Some(site) = Blocklist::new(&settings.blocked_sites).find_match(destination) {
        return Some(BlockReason::Site(site.url.clone()));
    }

    settings
        .time_limit
        .is_quiet_hours_active(now)
        .then_some(BlockReason::QuietHours)
}

/// Blocks counted since the last save
#[derive(Debug, Default)]
struct PendingBlocks {
    total: u32,
    by_site: HashMap<String, u32>,
}

impl PendingBlocks {
    /// Count one block, returning the identifier to report it under
    fn record(&mut self, reason: BlockReason, destination: &str) -> String {
        self.total = self.total.saturating_add(1);
        match reason {
            BlockReason::Site(url) => {
                let count = self.by_site.entry(url.clone()).or_default();
                *count = count.saturating_add(1);
                url
            }
            BlockReason::QuietHours => destination.to_string(),
        }
    }

    fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Add the counts to a snapshot; sites removed in the meantime are skipped
    fn apply(self, settings: &mut Settings) {
        settings.blocked_count_today = settings.blocked_count_today.saturating_add(self.total);
        for (url, count) in self.by_site {
            if let Some(site) = settings.blocked_sites.iter_mut().find(|s| s.url == url) {
                site.times_blocked = site.times_blocked.saturating_add(count);
            }
        }
    }
}

/// Per-packet classification and forwarding
///
/// Blocks are counted in memory and written to the store by
/// [`PacketFilter::flush`], which the packet loop calls on every reload tick
/// and when it ends.
pub struct PacketFilter {
    state: Arc<SharedState>,
    notifier: Arc<dyn Notifier>,
    forwarder: Arc<dyn PacketForwarder>,
    pending: Mutex<PendingBlocks>,
}

impl PacketFilter {
    pub fn new(
        state: Arc<SharedState>,
        notifier: Arc<dyn Notifier>,
        forwarder: Arc<dyn PacketForwarder>,
    ) -> Self {
        Self {
            state,
            notifier,
            forwarder,
            pending: Mutex::new(PendingBlocks::default()),
        }
    }

    /// Classify one packet and count a block if there is one
    pub async fn decide(&self, packet: &[u8]) -> Verdict {
        let header = match packet::inspect(packet) {
            Ok(header) => header,
            Err(e) => {
                trace!("{}; forwarding {} bytes", e, packet.len());
                return Verdict::Forward;
            }
        };

        let destination = header.destination.to_string();
        let now = self.state.clock().now();
        let blocked = self
            .state
            .read(|settings| {
                block_reason(settings, &destination, &now)
                    .map(|reason| (reason, settings.notifications_enabled))
            })
            .await;
        let Some((reason, notify)) = blocked else {
            return Verdict::Forward;
        };

        let identifier = self.pending.lock().await.record(reason, &destination);
        debug!(
            protocol = header.protocol,
            "Dropped packet to {} ({})", destination, identifier
        );
        if notify {
            self.notifier.notify_blocked_site(&identifier);
        }
        Verdict::Drop
    }

    /// Save pending block counts in one update, then refresh the cache
    ///
    /// With nothing pending this only reloads.
    pub async fn flush(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().await);
        if pending.is_empty() {
            self.state.reload().await;
            return;
        }

        trace!("Saving {} blocked packet(s)", pending.total);
        self.state.update(|settings, _| pending.apply(settings)).await;
    }

    /// Classify one packet and forward it unless it is blocked
    pub async fn process_packet(&self, packet: &[u8]) -> Verdict {
        let verdict = self.decide(packet).await;

        if verdict == Verdict::Forward {
            if let Err(e) = self.forwarder.forward(packet) {
                debug!("Failed to forward {} byte packet: {}", packet.len(), e);
            }
        }

        verdict
    }

    async fn run(self: Arc<Self>, mut tunnel: Box<dyn Tunnel>, mut stop: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut reload = tokio::time::interval(RELOAD_INTERVAL);
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Packet loop started on {}", tunnel.name());

        loop {
            tokio::select! {
                _ = worker::stopped(&mut stop) => {
                    debug!("Packet loop on {} stopping", tunnel.name());
                    self.flush().await;
                    return;
                }
                _ = reload.tick() => self.flush().await,
                result = tunnel.read_packet(&mut buf) => match result {
                    Ok(0) => {
                        warn!("Tunnel {} closed", tunnel.name());
                        break;
                    }
                    Ok(len) => {
                        self.process_packet(&buf[..len]).await;
                    }
                    Err(e) => {
                        error!("Failed to read from tunnel {}: {}", tunnel.name(), e);
                        break;
                    }
                },
            }
        }

        let pending = std::mem::take(&mut *self.pending.lock().await);
        self.state
            .update(|settings, _| {
                pending.apply(settings);
                settings.protection_active = false;
            })
            .await;
    }
}

/// Owns the tunnel and the packet loop
pub struct FilterEngine {
    filter: Arc<PacketFilter>,
    provider: Arc<dyn TunnelProvider>,
    config: TunnelConfig,
    task: Mutex<LoopState>,
}

impl FilterEngine {
    pub fn new(filter: PacketFilter, provider: Arc<dyn TunnelProvider>, config: TunnelConfig) -> Self {
        Self {
            filter: Arc::new(filter),
            provider,
            config,
            task: Mutex::new(LoopState::Stopped),
        }
    }

    /// Establish the tunnel and start filtering
    ///
    /// A no-op when the packet loop is already running.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut task = self.task.lock().await;
        if task.is_running() {
            debug!("Filtering already running on {}", self.config.interface);
            return Ok(());
        }

        // Reap a loop that ended on its own
        task.stop().await;

        let tunnel = self
            .provider
            .establish(&self.config)
            .map_err(CoreError::TunnelUnavailable)?;

        self.filter
            .state
            .update(|settings, _| settings.protection_active = true)
            .await;

        info!(
            "Protection started on {} ({}/{})",
            self.config.interface, self.config.address, self.config.prefix_len
        );

        let filter = Arc::clone(&self.filter);
        task.spawn(move |stop| filter.run(tunnel, stop));
        Ok(())
    }

    /// Stop filtering and close the tunnel
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        let was_running = task.stop().await;

        self.filter
            .state
            .update(|settings, _| settings.protection_active = false)
            .await;

        if was_running {
            info!("Protection stopped");
        }
    }

    pub async fn status(&self) -> LoopStatus {
        self.task.lock().await.status()
    }
}
