use anyhow::Result;

use crate::cli::{QuietHoursCommands, SettingsCommands};
use crate::config::Config;
use crate::policy::{format_minute_of_day, parse_minute_of_day};

use super::utils::{minutes_to_ms, on_off, policy_manager};

/// Run a `quiet-hours` subcommand
pub fn run_quiet_hours_command(command: QuietHoursCommands, config: &Config) -> Result<()> {
    let window = match command {
        QuietHoursCommands::Set { start, end } => {
            Some((parse_minute_of_day(&start)?, parse_minute_of_day(&end)?))
        }
        QuietHoursCommands::Disable => None,
    };

    let manager = policy_manager(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(manager.set_quiet_hours(window))?;

    match window {
        Some((start, end)) => println!(
            "✓ Quiet hours enabled from {} to {}",
            format_minute_of_day(start),
            format_minute_of_day(end)
        ),
        None => println!("✓ Quiet hours disabled"),
    }

    Ok(())
}

/// Set the default daily budget for newly discovered devices
pub fn set_daily_limit(minutes: u64, config: &Config) -> Result<()> {
    let manager = policy_manager(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(manager.set_daily_limit(minutes_to_ms(minutes)))?;

    if minutes == 0 {
        println!("✓ New devices get unlimited time");
    } else {
        println!("✓ New devices get {} minute(s) per day", minutes);
    }
    println!("  Existing devices keep their limits; use 'netfence devices limit' to change them.");

    Ok(())
}

/// Run a `settings` subcommand
pub fn run_settings_command(command: SettingsCommands, config: &Config) -> Result<()> {
    let manager = policy_manager(config)?;
    let runtime = tokio::runtime::Runtime::new()?;

    match command {
        SettingsCommands::Notifications { state } => {
            runtime.block_on(manager.set_notifications_enabled(state))?;
            println!("✓ Notifications {}", on_off(state));
        }
        SettingsCommands::BlockUnknown { state } => {
            runtime.block_on(manager.set_block_unknown_devices(state))?;
            println!("✓ Blocking of new devices {}", on_off(state));
        }
    }

    Ok(())
}
