use anyhow::Result;
use chrono::Utc;

use crate::cli::DevicesCommands;
use crate::config::Config;

use super::utils::{format_duration_ms, minutes_to_ms, policy_manager};

/// Run a `devices` subcommand
pub fn run_devices_command(command: DevicesCommands, config: &Config) -> Result<()> {
    let manager = policy_manager(config)?;
    let runtime = tokio::runtime::Runtime::new()?;

    match command {
        DevicesCommands::List => {
            let settings = runtime.block_on(manager.snapshot())?;
            if settings.devices.is_empty() {
                println!("No devices discovered yet");
                return Ok(());
            }

            let now = Utc::now();
            println!(
                "{:<18} {:<16} {:<20} {:<8} {:<8} {:>8}  Remaining",
                "MAC", "IP", "Name", "Online", "Blocked", "Used"
            );
            for device in settings.devices.iter() {
                println!(
                    "{:<18} {:<16} {:<20} {:<8} {:<8} {:>8}  {}",
                    device.mac_address,
                    device.ip_address,
                    device.device_name,
                    if device.is_online(now) { "yes" } else { "no" },
                    if device.is_blocked { "yes" } else { "no" },
                    format_duration_ms(device.time_used_today),
                    device.formatted_time_remaining()
                );
            }
        }
        DevicesCommands::Block { mac } => {
            runtime.block_on(manager.block_device(&mac))?;
            println!("✓ Blocked {}", mac);
        }
        DevicesCommands::Unblock { mac } => {
            runtime.block_on(manager.unblock_device(&mac))?;
            println!("✓ Unblocked {}", mac);
        }
        DevicesCommands::Rename { mac, name } => {
            runtime.block_on(manager.rename_device(&mac, &name))?;
            println!("✓ Renamed {} to {}", mac, name.trim());
        }
        DevicesCommands::Limit { mac, minutes } => {
            runtime.block_on(manager.set_device_limit(&mac, minutes_to_ms(minutes)))?;
            if minutes == 0 {
                println!("✓ Removed the daily limit for {}", mac);
            } else {
                println!("✓ Daily limit for {} set to {} minute(s)", mac, minutes);
            }
        }
        DevicesCommands::ResetUsage { mac } => {
            runtime.block_on(manager.reset_device_usage(&mac))?;
            println!("✓ Reset today's usage for {}", mac);
        }
        DevicesCommands::Remove { mac } => {
            let device = runtime.block_on(manager.remove_device(&mac))?;
            println!("✓ Removed {} ({})", device.device_name, device.mac_address);
        }
    }

    Ok(())
}
