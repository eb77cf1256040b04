pub mod devices;
pub mod init;
pub mod run;
pub mod settings;
pub mod sites;
pub mod status;
pub mod utils;

use anyhow::Result;
use std::path::Path;

use crate::cli::{Args, Commands};
use crate::config::Config;

/// Dispatch a parsed command line
pub fn run_command(args: Args) -> Result<()> {
    let Args {
        command,
        config: config_path,
        verbose,
    } = args;

    match command {
        Commands::Run => run::run(prepare(&config_path, verbose)?),
        Commands::Status => status::status(&prepare(&config_path, verbose)?),
        Commands::Init { output, force } => init::init(output.as_deref().unwrap_or(&config_path), force),
        Commands::Sites { command } => {
            let config = prepare(&config_path, verbose)?;
            sites::run_sites_command(command, &config)
        }
        Commands::Devices { command } => {
            let config = prepare(&config_path, verbose)?;
            devices::run_devices_command(command, &config)
        }
        Commands::QuietHours { command } => {
            let config = prepare(&config_path, verbose)?;
            settings::run_quiet_hours_command(command, &config)
        }
        Commands::DailyLimit { minutes } => {
            let config = prepare(&config_path, verbose)?;
            settings::set_daily_limit(minutes, &config)
        }
        Commands::Settings { command } => {
            let config = prepare(&config_path, verbose)?;
            settings::run_settings_command(command, &config)
        }
    }
}

/// Load the configuration and initialize logging for a management command
fn prepare(config_path: &Path, verbose: bool) -> Result<Config> {
    let config = utils::load_config(config_path)?;
    utils::init_logging(&config.logging.level, verbose);
    Ok(config)
}
