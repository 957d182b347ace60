// Configuration for WireGuard Tunnel Manager
// Tunnel config file lookup and manager tunables

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Directory name used under the user config directory
pub const APP_DIR_NAME: &str = "wg-tunnel";

/// Environment variable pointing at a directory of tunnel configs
pub const CONFIG_DIR_ENV: &str = "WG_TUNNEL_CONFIG_DIR";

/// Directory of bundled configs next to the executable
pub const BUNDLED_DIR_NAME: &str = "configs";

/// Extension of WireGuard tunnel config files
pub const CONFIG_EXTENSION: &str = "conf";

/// Name of the settings file inside the user config directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Locates `<tunnel_id>.conf` files.
///
/// Search order: the `WG_TUNNEL_CONFIG_DIR` directory, the user config
/// directory, `configs/` beside the executable, the executable's directory.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    env_dir: Option<PathBuf>,
    user_dir: Option<PathBuf>,
    exe_dir: PathBuf,
}

impl ConfigLocator {
    pub fn new(env_dir: Option<PathBuf>, user_dir: Option<PathBuf>, exe_dir: PathBuf) -> Self {
        Self {
            env_dir,
            user_dir,
            exe_dir,
        }
    }

    /// Build a locator from the process environment
    pub fn from_env() -> Self {
        let env_dir = std::env::var_os(CONFIG_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let user_dir = dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME));

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(env_dir, user_dir, exe_dir)
    }

    /// Directories searched for tunnel configs, in order
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(4);
        if let Some(env_dir) = &self.env_dir {
            dirs.push(env_dir.clone());
        }
        if let Some(user_dir) = &self.user_dir {
            dirs.push(user_dir.clone());
        }
        dirs.push(self.exe_dir.join(BUNDLED_DIR_NAME));
        dirs.push(self.exe_dir.clone());
        dirs
    }

    /// Directory users should place their tunnel configs in.
    ///
    /// The user config directory is created when missing.
    pub fn config_directory(&self) -> PathBuf {
        if let Some(env_dir) = &self.env_dir {
            if env_dir.is_dir() {
                return env_dir.clone();
            }
            debug!(
                "{} points at missing directory {}",
                CONFIG_DIR_ENV,
                env_dir.display()
            );
        }

        if let Some(user_dir) = &self.user_dir {
            if user_dir.is_dir() {
                return user_dir.clone();
            }
            match fs::create_dir_all(user_dir) {
                Ok(()) => {
                    info!("Created config directory {}", user_dir.display());
                    return user_dir.clone();
                }
                Err(e) => warn!(
                    "Failed to create config directory {}: {}",
                    user_dir.display(),
                    e
                ),
            }
        }

        let bundled = self.exe_dir.join(BUNDLED_DIR_NAME);
        if bundled.is_dir() {
            return bundled;
        }

        self.exe_dir.clone()
    }

    /// Find the config file for a tunnel, first match wins.
    ///
    /// Returns `None` when no search directory holds `<tunnel_id>.conf`, or
    /// when the id is not a plain file stem.
    pub fn resolve(&self, tunnel_id: &str) -> Option<PathBuf> {
        if !is_plain_tunnel_id(tunnel_id) {
            warn!("Rejecting tunnel id {:?}", tunnel_id);
            return None;
        }

        let file_name = format!("{}.{}", tunnel_id, CONFIG_EXTENSION);
        let found = self
            .search_dirs()
            .into_iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file());

        match &found {
            Some(path) => debug!("Resolved {} to {}", tunnel_id, path.display()),
            None => debug!("No {} in any config directory", file_name),
        }
        found
    }
}

fn is_plain_tunnel_id(tunnel_id: &str) -> bool {
    !tunnel_id.is_empty()
        && tunnel_id != "."
        && tunnel_id != ".."
        && !tunnel_id.contains(&['/', '\\'][..])
}

/// Manager tunables, loaded from `settings.toml`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Stats poll cadence while connected
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long to wait for a killed child before abandoning it
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// How long to wait for buffered output after a child exits
    #[serde(default = "default_output_drain_ms")]
    pub output_drain_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_kill_grace_ms() -> u64 {
    1000
}

fn default_output_drain_ms() -> u64 {
    500
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            output_drain_ms: default_output_drain_ms(),
        }
    }
}

impl ManagerSettings {
    /// Load settings from the user config directory, defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path()?)
    }

    /// Load settings from a specific file, defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&contents)?;
        settings.validate()?;

        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Get the path to the settings file
    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn output_drain(&self) -> Duration {
        Duration::from_millis(self.output_drain_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Layout {
        _root: TempDir,
        env_dir: PathBuf,
        user_dir: PathBuf,
        exe_dir: PathBuf,
    }

    fn layout() -> Layout {
        let root = TempDir::new().unwrap();
        let env_dir = root.path().join("env");
        let user_dir = root.path().join("user");
        let exe_dir = root.path().join("bin");
        fs::create_dir_all(&env_dir).unwrap();
        fs::create_dir_all(exe_dir.join(BUNDLED_DIR_NAME)).unwrap();
        Layout {
            _root: root,
            env_dir,
            user_dir,
            exe_dir,
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "[Interface]\n").unwrap();
    }

    #[test]
    fn test_search_order() {
        let l = layout();
        let locator = ConfigLocator::new(
            Some(l.env_dir.clone()),
            Some(l.user_dir.clone()),
            l.exe_dir.clone(),
        );

        assert_eq!(
            locator.search_dirs(),
            vec![
                l.env_dir.clone(),
                l.user_dir.clone(),
                l.exe_dir.join(BUNDLED_DIR_NAME),
                l.exe_dir.clone(),
            ]
        );
    }

    #[test]
    fn test_resolve_prefers_earlier_directories() {
        let l = layout();
        let locator = ConfigLocator::new(
            Some(l.env_dir.clone()),
            Some(l.user_dir.clone()),
            l.exe_dir.clone(),
        );

        let bundled = l.exe_dir.join(BUNDLED_DIR_NAME).join("dkt-us.conf");
        touch(&bundled);
        assert_eq!(locator.resolve("dkt-us"), Some(bundled));

        let user = l.user_dir.join("dkt-us.conf");
        touch(&user);
        assert_eq!(locator.resolve("dkt-us"), Some(user));

        let env = l.env_dir.join("dkt-us.conf");
        touch(&env);
        assert_eq!(locator.resolve("dkt-us"), Some(env));
    }

    #[test]
    fn test_resolve_falls_back_to_exe_dir() {
        let l = layout();
        let locator = ConfigLocator::new(None, None, l.exe_dir.clone());

        let beside_exe = l.exe_dir.join("dkt-jp.conf");
        touch(&beside_exe);
        assert_eq!(locator.resolve("dkt-jp"), Some(beside_exe));
    }

    #[test]
    fn test_resolve_missing_config() {
        let l = layout();
        let locator = ConfigLocator::new(
            Some(l.env_dir.clone()),
            Some(l.user_dir.clone()),
            l.exe_dir.clone(),
        );

        touch(&l.env_dir.join("dkt-de.conf.template"));
        assert_eq!(locator.resolve("dkt-de"), None);
    }

    #[test]
    fn test_resolve_rejects_path_like_ids() {
        let l = layout();
        touch(&l.exe_dir.join("secret.conf"));
        let locator = ConfigLocator::new(Some(l.env_dir.clone()), None, l.exe_dir.clone());

        assert_eq!(locator.resolve("../bin/secret"), None);
        assert_eq!(locator.resolve(""), None);
        assert!(locator.resolve("secret").is_some());
    }

    #[test]
    fn test_config_directory_order() {
        let l = layout();

        let locator = ConfigLocator::new(
            Some(l.env_dir.clone()),
            Some(l.user_dir.clone()),
            l.exe_dir.clone(),
        );
        assert_eq!(locator.config_directory(), l.env_dir);

        // Missing env directory is skipped, user directory gets created
        let locator = ConfigLocator::new(
            Some(l.env_dir.join("missing")),
            Some(l.user_dir.clone()),
            l.exe_dir.clone(),
        );
        assert_eq!(locator.config_directory(), l.user_dir);
        assert!(l.user_dir.is_dir());

        let locator = ConfigLocator::new(None, None, l.exe_dir.clone());
        assert_eq!(
            locator.config_directory(),
            l.exe_dir.join(BUNDLED_DIR_NAME)
        );

        fs::remove_dir(l.exe_dir.join(BUNDLED_DIR_NAME)).unwrap();
        assert_eq!(locator.config_directory(), l.exe_dir);
    }

    #[test]
    fn test_settings_defaults() {
        let settings: ManagerSettings = toml::from_str("").unwrap();
        assert_eq!(settings, ManagerSettings::default());
        assert_eq!(settings.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.kill_grace(), Duration::from_secs(1));
    }

    #[test]
    fn test_settings_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);

        // Missing file means defaults
        assert_eq!(
            ManagerSettings::load_from(&path).unwrap(),
            ManagerSettings::default()
        );

        fs::write(&path, "poll_interval_ms = 5000\n").unwrap();
        let settings = ManagerSettings::load_from(&path).unwrap();
        assert_eq!(settings.poll_interval_ms, 5000);
        assert_eq!(settings.kill_grace_ms, 1000);
    }

    #[test]
    fn test_settings_reject_zero_poll_interval() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "poll_interval_ms = 0\n").unwrap();

        let result = ManagerSettings::load_from(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_settings_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "poll_interval_ms = \"fast\"\n").unwrap();

        assert!(matches!(
            ManagerSettings::load_from(&path),
            Err(Error::Toml(_))
        ));
    }
}
