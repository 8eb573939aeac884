//! TOML-based engine configuration.
//!
//! Read from the platform-appropriate config file:
//! - macOS:    `~/Library/Application Support/KeyRelay/config.toml`
//! - Linux:    `~/.config/keyrelay/config.toml`
//! - Windows:  `%APPDATA%\KeyRelay\config.toml`
//!
//! Every field has a serde default so a missing file, or a file written by
//! an older version, loads cleanly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level engine configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub timing: TimingSection,
}

/// General engine behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Hypervisor controller settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerSection {
    /// Path or name of the controller executable (resolved via PATH when
    /// not absolute).
    #[serde(default = "default_controller_path")]
    pub path: String,
}

/// Correlation timing knobs.
///
/// `initial_window_ms` is the only value expected to need tuning: it must
/// cover the scheduling jitter between the HID callback and the host tap
/// callback on a loaded machine.  The default is deliberately conservative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingSection {
    /// Window in which a host Down is attributed to a fresh HID Down.
    #[serde(default = "default_initial_window_ms")]
    pub initial_window_ms: u64,
    /// A held key with no HID activity for this long is considered stale.
    #[serde(default = "default_hold_ttl_secs")]
    pub hold_ttl_secs: u64,
    /// Cadence of the correlation-map janitor sweep.
    #[serde(default = "default_janitor_period_secs")]
    pub janitor_period_secs: u64,
    /// Age past which the janitor prunes a correlation-map entry.
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
    /// Hard cap on each correlation map's size.
    #[serde(default = "default_map_cap")]
    pub correlation_map_cap: usize,
}

impl TimingSection {
    pub fn initial_window(&self) -> Duration {
        Duration::from_millis(self.initial_window_ms)
    }

    pub fn hold_ttl(&self) -> Duration {
        Duration::from_secs(self.hold_ttl_secs)
    }

    pub fn janitor_period(&self) -> Duration {
        Duration::from_secs(self.janitor_period_secs)
    }

    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_controller_path() -> String {
    "vmctl".to_string()
}
fn default_initial_window_ms() -> u64 {
    80
}
fn default_hold_ttl_secs() -> u64 {
    10
}
fn default_janitor_period_secs() -> u64 {
    5
}
fn default_entry_ttl_secs() -> u64 {
    30
}
fn default_map_cap() -> usize {
    50
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            path: default_controller_path(),
        }
    }
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            initial_window_ms: default_initial_window_ms(),
            hold_ttl_secs: default_hold_ttl_secs(),
            janitor_period_secs: default_janitor_period_secs(),
            entry_ttl_secs: default_entry_ttl_secs(),
            correlation_map_cap: default_map_cap(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the platform config directory for the engine.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`EngineConfig`] from disk, returning defaults if the file does
/// not yet exist.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`EngineConfig`] from an explicit path.
pub fn load_config_from(path: &std::path::Path) -> Result<EngineConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: EngineConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config`, creating the config directory if needed.
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeyRelay"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KeyRelay")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keyrelay"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_matches_operating_values() {
        // Arrange / Act
        let cfg = EngineConfig::default();

        // Assert
        assert_eq!(cfg.timing.initial_window_ms, 80);
        assert_eq!(cfg.timing.hold_ttl_secs, 10);
        assert_eq!(cfg.timing.janitor_period_secs, 5);
        assert_eq!(cfg.timing.entry_ttl_secs, 30);
        assert_eq!(cfg.timing.correlation_map_cap, 50);
    }

    #[test]
    fn test_default_log_level_is_info() {
        assert_eq!(EngineConfig::default().engine.log_level, "info");
    }

    #[test]
    fn test_duration_accessors() {
        let timing = TimingSection::default();
        assert_eq!(timing.initial_window(), Duration::from_millis(80));
        assert_eq!(timing.hold_ttl(), Duration::from_secs(10));
        assert_eq!(timing.entry_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_round_trip_preserves_overrides() {
        // Arrange
        let mut cfg = EngineConfig::default();
        cfg.controller.path = "/usr/local/bin/vmctl".to_string();
        cfg.timing.initial_window_ms = 120;

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: EngineConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: EngineConfig = toml::from_str("").expect("empty config is valid");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_partial_timing_section_keeps_other_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
[timing]
initial_window_ms = 120
"#,
        )
        .expect("partial config is valid");

        assert_eq!(cfg.timing.initial_window_ms, 120);
        assert_eq!(cfg.timing.hold_ttl_secs, 10);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result: Result<EngineConfig, toml::de::Error> = toml::from_str("[[[ nope");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_missing_file_returns_defaults() {
        let path = PathBuf::from("/nonexistent/keyrelay/config.toml");
        let cfg = load_config_from(&path).expect("missing file means defaults");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_load_config_from_written_file_round_trips() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("keyrelay_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("config.toml");

        let mut cfg = EngineConfig::default();
        cfg.engine.log_level = "debug".to_string();
        cfg.timing.correlation_map_cap = 80;

        // Act
        std::fs::write(&path, toml::to_string_pretty(&cfg).expect("serialize"))
            .expect("write config");
        let loaded = load_config_from(&path).expect("load config");

        // Assert
        assert_eq!(loaded.engine.log_level, "debug");
        assert_eq!(loaded.timing.correlation_map_cap, 80);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped CI environment is acceptable.
    }
}
