//! Configuration Vault – reads/writes `~/.cinch/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cinch_auth::ResolverConfig;
use cinch_kernel::KernelConfig;
use cinch_runtime::{DeviceConfig, SimPluginSpec, SupervisorConfig};
use cinch_settings::AuthorityConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading or writing the config vault.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Persisted device configuration.  Every field has a default, so a partial
/// file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity of the wearer, when known before attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wearer: Option<String>,
    pub bus_capacity: usize,
    pub bootstrap: BootstrapSection,
    pub kernel: KernelSection,
    pub settings: SettingsSection,
    pub auth: AuthSection,
    pub plugins: Vec<PluginEntry>,
}

/// `[bootstrap]` – entry component and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSection {
    pub entry_context: String,
    pub retry_interval_ms: u64,
    pub max_attempts: u32,
    pub watchdog_timeout_ms: u64,
}

/// `[kernel]` – heartbeat and sweep timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSection {
    pub tick_ms: u64,
    pub ping_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub liveness_timeout_ms: u64,
}

/// `[settings]` – the configuration authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSection {
    pub max_list_len: usize,
    pub sync_throttle_ms: u64,
}

/// `[auth]` – the authorization resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub retry_interval_ms: u64,
}

/// A simulated plugin started with the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub context: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_min_acl")]
    pub min_acl: i32,
    #[serde(default)]
    pub auto_return: bool,
}

fn default_min_acl() -> i32 {
    1
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

impl Default for BootstrapSection {
    fn default() -> Self {
        let d = SupervisorConfig::default();
        Self {
            entry_context: d.entry_context,
            retry_interval_ms: millis(d.retry_interval),
            max_attempts: d.max_attempts,
            watchdog_timeout_ms: millis(d.watchdog_timeout),
        }
    }
}

impl Default for KernelSection {
    fn default() -> Self {
        let d = KernelConfig::default();
        Self {
            tick_ms: millis(d.tick_interval),
            ping_interval_ms: millis(d.ping_interval),
            sweep_interval_ms: millis(d.sweep_interval),
            liveness_timeout_ms: millis(d.liveness_timeout),
        }
    }
}

impl Default for SettingsSection {
    fn default() -> Self {
        let d = AuthorityConfig::default();
        Self {
            max_list_len: d.max_list_len,
            sync_throttle_ms: millis(d.sync_throttle),
        }
    }
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            retry_interval_ms: millis(ResolverConfig::default().retry_interval),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let bootstrap = BootstrapSection::default();
        Self {
            wearer: None,
            bus_capacity: DeviceConfig::default().bus_capacity,
            plugins: vec![PluginEntry {
                context: bootstrap.entry_context.clone(),
                label: Some("Main menu".to_string()),
                min_acl: default_min_acl(),
                auto_return: false,
            }],
            bootstrap,
            kernel: KernelSection::default(),
            settings: SettingsSection::default(),
            auth: AuthSection::default(),
        }
    }
}

impl Config {
    /// Translate into the runtime's [`DeviceConfig`].
    pub fn device_config(&self) -> DeviceConfig {
        let ms = Duration::from_millis;
        DeviceConfig {
            bus_capacity: self.bus_capacity.max(1),
            wearer: self.wearer.clone().filter(|w| !w.trim().is_empty()),
            kernel: KernelConfig {
                tick_interval: ms(self.kernel.tick_ms.max(1)),
                ping_interval: ms(self.kernel.ping_interval_ms),
                sweep_interval: ms(self.kernel.sweep_interval_ms),
                liveness_timeout: ms(self.kernel.liveness_timeout_ms),
            },
            authority: AuthorityConfig {
                max_list_len: self.settings.max_list_len,
                sync_throttle: ms(self.settings.sync_throttle_ms),
            },
            resolver: ResolverConfig {
                retry_interval: ms(self.auth.retry_interval_ms),
                ..ResolverConfig::default()
            },
            supervisor: SupervisorConfig {
                entry_context: self.bootstrap.entry_context.clone(),
                retry_interval: ms(self.bootstrap.retry_interval_ms),
                max_attempts: self.bootstrap.max_attempts,
                watchdog_timeout: ms(self.bootstrap.watchdog_timeout_ms),
                ..SupervisorConfig::default()
            },
            plugins: self.plugins.iter().map(PluginEntry::spec).collect(),
        }
    }
}

impl PluginEntry {
    fn spec(&self) -> SimPluginSpec {
        let mut spec = SimPluginSpec::new(self.context.clone());
        if let Some(label) = &self.label {
            spec.label = label.clone();
        }
        spec.min_acl = self.min_acl;
        spec.auto_return = self.auto_return;
        spec
    }
}

/// Return the path to `~/.cinch/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".cinch").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `CINCH_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `CINCH_WEARER` | `wearer` |
/// | `CINCH_ENTRY_CONTEXT` | `bootstrap.entry_context` |
/// | `CINCH_MAX_ATTEMPTS` | `bootstrap.max_attempts` |
/// | `CINCH_RETRY_INTERVAL_MS` | `bootstrap.retry_interval_ms` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("CINCH_WEARER") {
        cfg.wearer = Some(v);
    }
    if let Ok(v) = std::env::var("CINCH_ENTRY_CONTEXT") {
        cfg.bootstrap.entry_context = v;
    }
    if let Ok(v) = std::env::var("CINCH_MAX_ATTEMPTS")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.bootstrap.max_attempts = n;
    }
    if let Ok(v) = std::env::var("CINCH_RETRY_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.bootstrap.retry_interval_ms = ms;
    }
}

/// Save the config, creating `~/.cinch/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    // Owner-only: the file names the wearer.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_component_defaults() {
        let device = Config::default().device_config();
        assert_eq!(device.kernel, KernelConfig::default());
        assert_eq!(device.authority, AuthorityConfig::default());
        assert_eq!(device.supervisor, SupervisorConfig::default());
        assert_eq!(device.plugins.len(), 1);
        assert_eq!(device.plugins[0].context, "main_menu");
        assert!(device.wearer.is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            wearer = "avatar-1"

            [bootstrap]
            max_attempts = 5

            [[plugins]]
            context = "bell"
            auto_return = true
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.wearer.as_deref(), Some("avatar-1"));
        assert_eq!(cfg.bootstrap.max_attempts, 5);
        assert_eq!(cfg.bootstrap.entry_context, "main_menu");
        assert_eq!(cfg.kernel, KernelSection::default());
        assert_eq!(cfg.plugins.len(), 1);
        assert_eq!(cfg.plugins[0].min_acl, 1);

        let spec = &cfg.device_config().plugins[0];
        assert_eq!(spec.label, "bell");
        assert!(spec.auto_return);
    }

    #[test]
    fn blank_wearer_is_treated_as_unknown() {
        let cfg = Config {
            wearer: Some("  ".into()),
            ..Config::default()
        };
        assert!(cfg.device_config().wearer.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let mode = std::fs::metadata(&path).expect("file").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let parent = path.parent().expect("parent");
        let mode = std::fs::metadata(parent).expect("dir").permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = Config {
            wearer: Some("avatar-1".into()),
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");
        let loaded = load_from(&path).expect("load").expect("present");
        // Only compare what environment overrides cannot touch.
        assert_eq!(loaded.kernel, cfg.kernel);
        assert_eq!(loaded.plugins, cfg.plugins);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn garbage_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "wearer = [").expect("write");
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn path_points_to_cinch_dir() {
        let p = config_path_for_home("/home/someone");
        assert!(p.ends_with(".cinch/config.toml"));
    }

    // Env overrides are exercised in one test so no two tests race on the
    // same variables.
    #[test]
    fn env_overrides() {
        // SAFETY: the only test in this crate touching CINCH_* variables.
        unsafe {
            std::env::set_var("CINCH_WEARER", "avatar-9");
            std::env::set_var("CINCH_ENTRY_CONTEXT", "hud");
            std::env::set_var("CINCH_MAX_ATTEMPTS", "7");
            std::env::set_var("CINCH_RETRY_INTERVAL_MS", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.wearer.as_deref(), Some("avatar-9"));
        assert_eq!(cfg.bootstrap.entry_context, "hud");
        assert_eq!(cfg.bootstrap.max_attempts, 7);
        assert_eq!(cfg.bootstrap.retry_interval_ms, BootstrapSection::default().retry_interval_ms);
        unsafe {
            for var in ["CINCH_WEARER", "CINCH_ENTRY_CONTEXT", "CINCH_MAX_ATTEMPTS", "CINCH_RETRY_INTERVAL_MS"] {
                std::env::remove_var(var);
            }
        }
    }
}
