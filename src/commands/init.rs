use anyhow::{Context, Result};
use std::path::Path;

use crate::config::EXAMPLE_CONFIG;
use crate::platform::common::atomic_write;

/// Write the commented example configuration
pub fn init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            output.display()
        );
    }

    atomic_write(output, EXAMPLE_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", output.display()))?;

    println!("✓ Created configuration file: {}", output.display());
    println!("\nEdit this file to change the tunnel interface, uplink or log level.");
    println!("Then start protection: sudo netfence run");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    #[test]
    fn test_init_writes_example_config() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("netfence/config.yaml");

        init(file.path(), false).unwrap();

        file.assert(predicate::str::contains("interface: nf0"));
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("config.yaml");
        file.write_str("tunnel:\n  interface: custom0\n").unwrap();

        let err = init(file.path(), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        file.assert(predicate::str::contains("custom0"));

        init(file.path(), true).unwrap();
        file.assert(predicate::str::contains("interface: nf0"));
    }
}
