//! Configuration loading and saving.
//!
//! The service reads `~/.hallmonitor/config.toml`. A missing file yields
//! defaults; preference changes made at runtime (enabling or disabling the
//! service) are written back atomically.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::error::{HallError, Result};

pub const DEFAULT_DELAY_MS: u64 = 10_000;
pub const DEFAULT_HALL_FILE: &str = "/sys/class/sec/sec_key/hall_detect";
pub const DEFAULT_SU_PROGRAM: &str = "su";
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5_000;
/// How long to wait before raising the cover display over an incoming call,
/// giving the dialer time to come up first.
pub const DEFAULT_CALL_DISPLAY_DELAY_MS: u64 = 1_000;

const CONFIG_DIR: &str = ".hallmonitor";
const CONFIG_FILE: &str = "config.toml";

/// Shell commands backing the platform primitives. Unset entries are no-ops.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformCommands {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_screen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_screen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_cover_display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismiss_displays: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relinquish_admin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HallConfig {
    /// Gates whether proximity readings are reconciled at all.
    pub pref_enabled: bool,
    /// Milliseconds between a confirmed close and the screen lock.
    pub pref_delay: u64,
    /// Issue touchscreen sensitivity commands through the root shell.
    pub root_enabled: bool,
    /// Whether the lock primitive is permitted. Kept in step with grants,
    /// revocations and `stop_service`.
    pub admin_active: bool,
    pub hall_file: PathBuf,
    pub su_program: String,
    pub command_timeout_ms: u64,
    pub call_display_delay_ms: u64,
    pub platform: PlatformCommands,
}

impl Default for HallConfig {
    fn default() -> Self {
        Self {
            pref_enabled: false,
            pref_delay: DEFAULT_DELAY_MS,
            root_enabled: false,
            admin_active: true,
            hall_file: PathBuf::from(DEFAULT_HALL_FILE),
            su_program: DEFAULT_SU_PROGRAM.to_string(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            call_display_delay_ms: DEFAULT_CALL_DISPLAY_DELAY_MS,
            platform: PlatformCommands::default(),
        }
    }
}

impl HallConfig {
    pub fn lock_delay(&self) -> Duration {
        Duration::from_millis(self.pref_delay)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn call_display_delay(&self) -> Duration {
        Duration::from_millis(self.call_display_delay_ms)
    }
}

/// Returns `~/.hallmonitor`.
pub fn hallmonitor_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(HallError::HomeDirNotFound)?;
    Ok(home.join(CONFIG_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(hallmonitor_dir()?.join(CONFIG_FILE))
}

/// Loads the configuration, returning defaults if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<HallConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(HallConfig::default())
        }
        Err(err) => {
            return Err(HallError::ConfigMalformed {
                path: path.to_path_buf(),
                details: err.to_string(),
            })
        }
    };

    toml::from_str::<HallConfig>(&content).map_err(|err| HallError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Writes the configuration through a temp file so readers never observe a
/// partial document.
pub fn save_config(path: &Path, config: &HallConfig) -> Result<()> {
    let write_failed = |source: std::io::Error| HallError::ConfigWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_failed)?;

    let payload = toml::to_string_pretty(config).map_err(|err| HallError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })?;

    // Same directory as the target so the final rename stays on one filesystem.
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_failed)?;
    tmp.write_all(payload.as_bytes()).map_err(write_failed)?;
    tmp.flush().map_err(write_failed)?;
    tmp.persist(path).map_err(|err| write_failed(err.error))?;
    Ok(())
}
