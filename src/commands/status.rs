use anyhow::Result;
use chrono::{Local, Utc};

use crate::config::Config;
use crate::policy::format_minute_of_day;

use super::utils::{format_duration_ms, on_off, policy_manager};

/// Show protection status and the current policy
pub fn status(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let manager = policy_manager(config)?;
    let mut settings = runtime.block_on(manager.snapshot())?;

    // Counters from a previous day read as zero until the daemon rolls them over
    settings.roll_over_if_new_day(&Local::now());
    let status = settings.status(Utc::now());

    println!("netfence Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Protection:        {}", status.state);
    println!("Connected devices: {}", status.connected_devices);
    println!("Blocked today:     {}", status.blocked_today);
    println!();

    let policy = &settings.time_limit;
    println!("Policy:");
    if policy.quiet_hours_enabled {
        println!(
            "  Quiet hours:       {} - {}",
            format_minute_of_day(policy.quiet_hours_start),
            format_minute_of_day(policy.quiet_hours_end)
        );
    } else {
        println!("  Quiet hours:       off");
    }
    if policy.daily_limit_ms > 0 {
        println!("  New device limit:  {}", format_duration_ms(policy.daily_limit_ms));
    } else {
        println!("  New device limit:  unlimited");
    }
    println!("  Blocked sites:     {}", settings.blocked_sites.len());
    println!("  Known devices:     {}", settings.devices.len());
    println!("  Notifications:     {}", on_off(settings.notifications_enabled));
    println!("  Block new devices: {}", on_off(settings.block_unknown_devices));

    Ok(())
}
