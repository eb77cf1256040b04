use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::platform::common::{atomic_write, ensure_directory_exists};
use crate::state::{SETTINGS_VERSION, Settings};

/// Directory the daemon keeps its settings in on Linux
pub const SYSTEM_STATE_DIR: &str = "/var/lib/netfence";

const STATE_FILE: &str = "settings.json";

/// Synchronous persistence for the settings snapshot
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;

    /// Hold the store exclusively until the guard is dropped
    ///
    /// Blocks the calling thread while another holder, possibly in another
    /// process, has it.
    fn lock(&self) -> Result<StoreLock<'_>>;
}

trait Held {}

impl<T> Held for T {}

/// Exclusive hold on a settings store, released on drop
pub struct StoreLock<'a> {
    _held: Box<dyn Held + 'a>,
}

impl<'a> StoreLock<'a> {
    pub fn new<T: 'a>(held: T) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

/// Settings kept as a pretty-printed JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the configured path, or the platform default
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(Self::new(path)),
            None => Ok(Self::new(get_state_path()?)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file the lock is taken on; the settings file itself is
    /// replaced on every save
    fn lock_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }
}

impl SettingsStore for JsonFileStore {
    /// A missing file yields default settings
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file: {}", self.path.display()))?;

        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", self.path.display()))?;

        if settings.version != SETTINGS_VERSION {
            tracing::warn!(
                "Settings file version mismatch (expected {}, got {})",
                SETTINGS_VERSION,
                settings.version
            );
        }

        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        atomic_write(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write settings file: {}", self.path.display()))?;

        Ok(())
    }

    fn lock(&self) -> Result<StoreLock<'_>> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            ensure_directory_exists(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            loop {
                if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::Interrupted {
                    return Err(err)
                        .with_context(|| format!("Failed to lock settings file: {}", path.display()));
                }
            }
        }

        // Closing the descriptor releases the lock
        Ok(StoreLock::new(file))
    }
}

/// Get the platform-specific settings file path
pub fn get_state_path() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        // Try system location first, fall back to user location
        if let Some(path) = state_path_in(Path::new(SYSTEM_STATE_DIR)) {
            return Ok(path);
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "netfence") {
        return Ok(dirs.data_local_dir().join(STATE_FILE));
    }

    anyhow::bail!("Could not determine settings file location");
}

/// Settings file inside `dir`, if that directory exists
fn state_path_in(dir: &Path) -> Option<PathBuf> {
    dir.is_dir().then(|| dir.join(STATE_FILE))
}

/// Create the state directory so the daemon and later CLI calls resolve the
/// same settings file
pub fn prepare_state_dir(dir: &Path) -> Result<()> {
    ensure_directory_exists(dir)
        .with_context(|| format!("Failed to prepare state directory: {}", dir.display()))
}
