use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::discovery::{DeviceNamer, DiscoveryLoop, HostnameNamer, NoLookupNamer, ProcArpReader, Scanner};
use crate::filter::{FilterEngine, PacketFilter, TunnelConfig};
use crate::notify;
use crate::platform;
use crate::policy::SystemClock;
use crate::service::ProtectionService;
use crate::state::SharedState;

use super::utils::{open_store, print_sudo_message};

/// Run the filter and the discovery loop in the foreground
pub fn run(config: Config) -> Result<()> {
    if let Err(e) = platform::ensure_admin_privileges() {
        eprintln!("Insufficient privileges: {:#}", e);
        eprintln!();
        eprintln!("Creating the tunnel interface requires root privileges.");
        print_sudo_message();
        std::process::exit(1);
    }

    println!("netfence v{}", env!("CARGO_PKG_VERSION"));
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run_daemon(config))
}

async fn run_daemon(config: Config) -> Result<()> {
    let service = build_service(&config)?;

    service
        .start_filtering()
        .await
        .context("Failed to start traffic filtering")?;
    service
        .start_discovery_loop()
        .await
        .context("Failed to start device discovery")?;

    let status = service.status().await;
    info!(
        "Protection {} on {} ({} device(s) connected)",
        status.protection.state, config.tunnel.interface, status.protection.connected_devices
    );

    wait_for_shutdown().await?;
    info!("Shutdown requested");

    service.shutdown().await;
    Ok(())
}

/// Wire the configured backends into a protection service
fn build_service(config: &Config) -> Result<ProtectionService> {
    // CLI commands only resolve the system settings file once this exists
    #[cfg(target_os = "linux")]
    {
        use crate::store::{SYSTEM_STATE_DIR, prepare_state_dir};

        if config.store.path.is_none() {
            prepare_state_dir(std::path::Path::new(SYSTEM_STATE_DIR))?;
        }
    }

    let store = Arc::new(open_store(config)?);
    let state = Arc::new(SharedState::load(store, Arc::new(SystemClock)));
    let notifier = notify::from_config(config.notifications.desktop);

    let (provider, forwarder) = platform::traffic_backend(config.tunnel.uplink.clone())
        .context("Failed to set up traffic forwarding")?;
    let filter = FilterEngine::new(
        PacketFilter::new(Arc::clone(&state), Arc::clone(&notifier), forwarder),
        provider,
        TunnelConfig::new(config.tunnel.interface.clone()),
    );

    let namer: Arc<dyn DeviceNamer> = if config.discovery.resolve_hostnames {
        Arc::new(HostnameNamer)
    } else {
        Arc::new(NoLookupNamer)
    };
    let scanner = Scanner::new(
        Arc::clone(&state),
        Arc::new(ProcArpReader::new(config.discovery.neighbor_table.clone())),
        namer,
        notifier,
    );

    Ok(ProtectionService::new(state, filter, DiscoveryLoop::new(scanner)))
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    Ok(())
}
