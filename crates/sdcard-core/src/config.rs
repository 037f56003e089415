//! Medium configuration loaded from `sdcard.toml`.
//!
//! ```toml
//! root = "card"        # host directory backing the simulated medium
//! time_zone = 130      # +01:30, written as signed hhmm
//! dst_rule = "europe"  # off | europe | usa | australia
//! ```
//!
//! Relative roots are resolved against the directory holding the file.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::HostDriver;
use crate::medium::Medium;
use crate::timestamp::{SystemClock, TimestampBridge, ZoneConfig};

pub const CONFIG_FILE_NAME: &str = "sdcard.toml";

/// Environment variable naming the configuration home directory.
pub const HOME_ENV: &str = "SDCARD_HOME";

/// Central source of truth for configuration defaults.
pub struct ConfigDefaults;

impl ConfigDefaults {
    pub const ROOT: &'static str = "card";
    pub const HOME_DIR_NAME: &'static str = ".sdcard";
}

fn default_root() -> PathBuf {
    PathBuf::from(ConfigDefaults::ROOT)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(flatten)]
    pub zone: ZoneConfig,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            zone: ZoneConfig::default(),
        }
    }
}

impl MediumConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> io::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<MediumConfig>(&content).map_err(|e| {
                io::Error::new(
                    ErrorKind::InvalidData,
                    format!("{}: {}", path.display(), e),
                )
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("{} not found, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e),
        };
        if config.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            config.root = base.join(&config.root);
        }
        Ok(config)
    }

    /// Load `sdcard.toml` from a home directory.
    pub fn from_home(home: &Path) -> io::Result<Self> {
        Self::load(&home.join(CONFIG_FILE_NAME))
    }

    /// Load from the home named by `SDCARD_HOME`, or `~/.sdcard`.
    pub fn load_default() -> io::Result<Self> {
        let home = home_from(std::env::var_os(HOME_ENV).map(PathBuf::from))?;
        Self::from_home(&home)
    }

    /// Build an uninitialized medium over the configured host directory.
    pub fn open_host(&self) -> Medium<HostDriver> {
        let bridge = TimestampBridge::new(Arc::new(SystemClock), self.zone);
        Medium::new(HostDriver::new(self.root.clone()), bridge)
    }
}

/// Resolve the configuration home: explicit override > `~/.sdcard`.
fn home_from(overridden: Option<PathBuf>) -> io::Result<PathBuf> {
    if let Some(home) = overridden {
        return Ok(home);
    }
    dirs_next::home_dir()
        .map(|h| h.join(ConfigDefaults::HOME_DIR_NAME))
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "home directory not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MediumStatus;
    use crate::timestamp::DstRule;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MediumConfig::from_home(dir.path()).unwrap();
        assert_eq!(config.root, dir.path().join("card"));
        assert_eq!(config.zone, ZoneConfig::default());
    }

    #[test]
    fn test_parse_zone_and_relative_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "root = \"media/sd\"\ntime_zone = -500\ndst_rule = \"usa\"\n",
        )
        .unwrap();
        let config = MediumConfig::from_home(dir.path()).unwrap();
        assert_eq!(config.root, dir.path().join("media/sd"));
        assert_eq!(config.zone.time_zone, -500);
        assert_eq!(config.zone.dst_rule, DstRule::Usa);
    }

    #[test]
    fn test_absolute_root_kept() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("elsewhere");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            format!("root = {:?}\n", root.to_string_lossy()),
        )
        .unwrap();
        let config = MediumConfig::from_home(dir.path()).unwrap();
        assert_eq!(config.root, root);
    }

    #[test]
    fn test_invalid_toml_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "dst_rule = \"mars\"\n").unwrap();
        let err = MediumConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_home_override() {
        let home = home_from(Some(PathBuf::from("/tmp/x"))).unwrap();
        assert_eq!(home, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_open_host_mounts_and_creates_root() {
        let dir = TempDir::new().unwrap();
        let config = MediumConfig::from_home(dir.path()).unwrap();
        let mut medium = config.open_host();
        assert_eq!(medium.initialize(), MediumStatus::Ok);
        assert!(dir.path().join("card").is_dir());
    }
}
