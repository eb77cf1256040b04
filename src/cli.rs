use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::blocklist::SiteCategory;
use crate::config::get_config_path;

/// Parental network filter
///
/// Routes the host's outbound traffic through a local tunnel, drops
/// connections to blocked sites and during quiet hours, and tracks per-device
/// screen time from the local neighbor table.
#[derive(Parser, Debug)]
#[command(name = "netfence")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the daemon configuration file
    #[arg(short, long, default_value_os_t = get_config_path(), global = true)]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the traffic filter and device discovery until interrupted
    Run,
    /// Show protection status and the current policy
    Status,
    /// Write an example configuration file
    Init {
        /// Output path (default: the --config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Manage blocked sites
    Sites {
        #[command(subcommand)]
        command: SitesCommands,
    },
    /// Manage discovered devices
    Devices {
        #[command(subcommand)]
        command: DevicesCommands,
    },
    /// Configure the nightly quiet-hours window
    QuietHours {
        #[command(subcommand)]
        command: QuietHoursCommands,
    },
    /// Set the daily budget given to newly discovered devices (0 = unlimited)
    DailyLimit {
        /// Minutes per day
        minutes: u64,
    },
    /// Toggle notification and new-device behavior
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SitesCommands {
    /// List blocked sites
    List,
    /// Block a site
    Add {
        /// Hostname or URL, e.g. example.com
        url: String,

        /// Category (custom, social-media, adult-content, gambling, gaming, violence, drugs)
        #[arg(long, default_value = "custom")]
        category: SiteCategory,
    },
    /// Unblock a site
    Remove {
        url: String,
    },
    /// Block every preset site of a category
    Preset {
        category: SiteCategory,
    },
}

#[derive(Subcommand, Debug)]
pub enum DevicesCommands {
    /// List known devices
    List,
    /// Block a device
    Block {
        mac: String,
    },
    /// Unblock a device
    Unblock {
        mac: String,
    },
    /// Give a device a friendly name
    Rename {
        mac: String,
        name: String,
    },
    /// Set a device's daily budget in minutes (0 = unlimited)
    Limit {
        mac: String,
        minutes: u64,
    },
    /// Clear a device's usage for today
    ResetUsage {
        mac: String,
    },
    /// Forget a device
    Remove {
        mac: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum QuietHoursCommands {
    /// Enable quiet hours for the given window
    Set {
        /// Start time (HH:MM, 24-hour)
        #[arg(long)]
        start: String,

        /// End time (HH:MM, 24-hour); may be earlier than start
        #[arg(long)]
        end: String,
    },
    /// Disable quiet hours
    Disable,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Notify on blocked sites and reached limits
    Notifications {
        #[arg(action = ArgAction::Set, value_parser = parse_switch)]
        state: bool,
    },
    /// Block devices the first time they are seen
    BlockUnknown {
        #[arg(action = ArgAction::Set, value_parser = parse_switch)]
        state: bool,
    },
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(format!("expected 'on' or 'off', got '{}'", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_sites_add_with_category() {
        let args = Args::parse_from(["netfence", "sites", "add", "example.com", "--category", "gambling"]);
        match args.command {
            Commands::Sites {
                command: SitesCommands::Add { url, category },
            } => {
                assert_eq!(url, "example.com");
                assert_eq!(category, SiteCategory::Gambling);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let args = Args::parse_from(["netfence", "status", "--config", "/tmp/nf.yaml", "-v"]);
        assert_eq!(args.config, PathBuf::from("/tmp/nf.yaml"));
        assert!(args.verbose);
    }

    #[test]
    fn test_parse_switch_values() {
        let args = Args::parse_from(["netfence", "settings", "block-unknown", "on"]);
        assert!(matches!(
            args.command,
            Commands::Settings {
                command: SettingsCommands::BlockUnknown { state: true }
            }
        ));
        assert!(Args::try_parse_from(["netfence", "settings", "notifications", "maybe"]).is_err());
    }

    #[test]
    fn test_settings_switches_take_a_value() {
        let args = Args::parse_from(["netfence", "settings", "notifications", "off"]);
        assert!(matches!(
            args.command,
            Commands::Settings {
                command: SettingsCommands::Notifications { state: false }
            }
        ));

        let args = Args::parse_from(["netfence", "settings", "block-unknown", "OFF"]);
        assert!(matches!(
            args.command,
            Commands::Settings {
                command: SettingsCommands::BlockUnknown { state: false }
            }
        ));

        assert!(Args::try_parse_from(["netfence", "settings", "notifications"]).is_err());
    }

    #[test]
    fn test_parse_unknown_category_fails() {
        assert!(Args::try_parse_from(["netfence", "sites", "preset", "cooking"]).is_err());
    }
}
