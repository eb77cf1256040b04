use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;

/// Longest network interface name the kernel accepts (`IFNAMSIZ` minus the NUL)
pub const MAX_INTERFACE_NAME: usize = 15;

/// Atomically write content to a file
///
/// Writes to a temporary file in the same directory, syncs it to disk, then
/// renames it over the target path.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory_exists(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&temp_path).with_context(|| {
            format!("Failed to create temporary file: {}", temp_path.display())
        })?;

        file.write_all(content)
            .context("Failed to write to temporary file")?;

        file.sync_all().context("Failed to sync file to disk")?;
    }

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    // The CLI reads the settings without root
    set_permissions_readable_all(path)?;

    Ok(())
}

/// Ensure a directory exists, creating it and all parents if needed
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        set_permissions_readable_all(path)?;
    }

    Ok(())
}

/// Make a file or directory readable by all users
pub fn set_permissions_readable_all(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to get metadata for: {}", path.display()))?;

        let mut permissions = metadata.permissions();
        permissions.set_mode(if path.is_dir() { 0o755 } else { 0o644 });

        std::fs::set_permissions(path, permissions)
            .with_context(|| format!("Failed to set permissions for: {}", path.display()))?;
    }

    Ok(())
}

/// Check if running with root privileges
pub fn ensure_admin_privileges() -> Result<()> {
    #[cfg(unix)]
    {
        let euid = unsafe { libc::geteuid() };
        if euid != 0 {
            anyhow::bail!(
                "This program must be run as root or with sudo. Current EUID: {}",
                euid
            );
        }
    }

    Ok(())
}

/// Run a command, failing with its stderr if it exits unsuccessfully
pub fn run_command(cmd: &str, args: &[&str]) -> Result<()> {
    command_output(cmd, args).map(|_| ())
}

/// Run a command and return its stdout
pub fn command_output(cmd: &str, args: &[&str]) -> Result<String> {
    tracing::debug!("Running {} {}", cmd, args.join(" "));

    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {}", cmd))?;

    if !output.status.success() {
        anyhow::bail!(
            "Command failed: {} {} ({})",
            cmd,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
