use anyhow::Result;

use crate::cli::SitesCommands;
use crate::config::Config;

use super::utils::policy_manager;

/// Run a `sites` subcommand
pub fn run_sites_command(command: SitesCommands, config: &Config) -> Result<()> {
    let manager = policy_manager(config)?;
    let runtime = tokio::runtime::Runtime::new()?;

    match command {
        SitesCommands::List => {
            let settings = runtime.block_on(manager.snapshot())?;
            if settings.blocked_sites.is_empty() {
                println!("No blocked sites");
                return Ok(());
            }

            println!("{:<32} {:<14} {:>8}  Added", "Site", "Category", "Blocked");
            for site in &settings.blocked_sites {
                println!(
                    "{:<32} {:<14} {:>8}  {}",
                    site.url,
                    site.category.as_str(),
                    site.times_blocked,
                    site.added_time.format("%Y-%m-%d")
                );
            }
        }
        SitesCommands::Add { url, category } => {
            if runtime.block_on(manager.add_site(&url, category))? {
                println!("✓ Blocked {} ({})", url.trim(), category);
            } else {
                println!("{} is already blocked", url.trim());
            }
        }
        SitesCommands::Remove { url } => {
            if runtime.block_on(manager.remove_site(&url))? {
                println!("✓ Unblocked {}", url);
            } else {
                anyhow::bail!("{} is not in the blocklist", url);
            }
        }
        SitesCommands::Preset { category } => {
            let added = runtime.block_on(manager.add_preset(category))?;
            println!("✓ Added {} {} site(s)", added, category);
        }
    }

    Ok(())
}
