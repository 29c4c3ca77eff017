//! Configuration loading and types for switchbridge
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/switchbridge/config.toml)
//! 3. Environment variables (SWITCHBRIDGE_*)
//! 4. CLI arguments (highest priority)

use crate::action::Action;
use crate::bridge::event::{EV_SW, SW_ONEKEY_LOW_POWER};
use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# switchbridge configuration
#
# Location: ~/.config/switchbridge/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (status bars, scripts)
# Use "auto" for default location ($XDG_RUNTIME_DIR/switchbridge/state),
# a custom path, or "disabled" to turn off. The daemon writes the switch
# state ("ready", "on", "off") to this file whenever it changes.
state_file = "auto"

[device]
# Character device of the switch's input node
path = "/dev/input/event4"

# Event type and code of the switch (EV_SW / SW_ONEKEY_LOW_POWER)
event_type = 5
event_code = 19

[shell]
# Program that starts the persistent privileged shell
program = "su"

# Probe with `<program> -c :` before starting the persistent shell
probe = true

# Give up on a synchronous command after this many milliseconds
# (omit to wait indefinitely)
# sync_timeout_ms = 10000

[policy]
# Patch the SELinux policy so the caller's domain may read the device
enabled = true
command = "supolicy --live"
domain = "appdomain"
device_type = "input_device"

[relay]
# "auto": relay only when the device cannot be opened directly
# "always": always read through the relay mirror
# "never": fail instead of relaying
mode = "auto"

# Watch daemon that runs the relay script on each device change
watcher = "inotifyd"

# Directory for the mirror and script files (default: user cache dir)
# cache_dir = "/data/data/switchbridge/cache"

[action]
# What the switch toggles. One of: nothing, power_saver, aeroplane,
# mobile_data, wifi, bluetooth, nfc, do_not_disturb, command
type = "nothing"

# For type = "command":
# on = "settings put global low_power 1"
# off = "settings put global low_power 0"

[daemon]
# Seconds between attempts to open the bridge after a failure
retry_secs = 10

# Seconds between opportunistic device access re-checks
recheck_secs = 60
"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Optional path to state file for external integrations
    /// Example: "/run/user/1000/switchbridge/state" or use "auto" for default location
    #[serde(default)]
    pub state_file: Option<String>,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub shell: ShellConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    /// Action applied on each switch transition
    #[serde(default)]
    pub action: Action,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Input device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Path to the switch's character device
    #[serde(default = "default_device_path")]
    pub path: PathBuf,

    /// Event type carrying the switch state (EV_SW)
    #[serde(default = "default_event_type")]
    pub event_type: u16,

    /// Event code of the switch (SW_ONEKEY_LOW_POWER)
    #[serde(default = "default_event_code")]
    pub event_code: u16,
}

/// Privileged shell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShellConfig {
    /// Program started as the persistent privileged shell
    #[serde(default = "default_shell_program")]
    pub program: String,

    /// Extra arguments for the persistent shell
    #[serde(default)]
    pub args: Vec<String>,

    /// Run `<program> -c :` before spawning the persistent shell
    #[serde(default = "default_true")]
    pub probe: bool,

    /// Timeout for synchronous commands (None = wait indefinitely)
    #[serde(default)]
    pub sync_timeout_ms: Option<u64>,
}

/// Access-control policy patch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Live policy patch tool, statements are appended as arguments
    #[serde(default = "default_policy_command")]
    pub command: String,

    /// Source domain granted access (the caller's domain)
    #[serde(default = "default_policy_domain")]
    pub domain: String,

    /// Target type of the input device node
    #[serde(default = "default_policy_device_type")]
    pub device_type: String,
}

/// When to read through the relay mirror
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Relay only if the device cannot be opened directly (default)
    #[default]
    Auto,
    /// Always relay
    Always,
    /// Never relay
    Never,
}

impl FromStr for RelayMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(RelayMode::Auto),
            "always" => Ok(RelayMode::Always),
            "never" => Ok(RelayMode::Never),
            other => Err(BridgeError::Config(format!(
                "Unknown relay mode '{}' (expected auto, always or never)",
                other
            ))),
        }
    }
}

/// Relay shim configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub mode: RelayMode,

    /// Watch daemon invoked as `<watcher> <script> <device>`
    #[serde(default = "default_relay_watcher")]
    pub watcher: String,

    /// Directory holding the mirror and script (None = user cache dir)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// Daemon timing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,

    #[serde(default = "default_recheck_secs")]
    pub recheck_secs: u64,
}

fn default_device_path() -> PathBuf {
    PathBuf::from("/dev/input/event4")
}

fn default_event_type() -> u16 {
    EV_SW
}

fn default_event_code() -> u16 {
    SW_ONEKEY_LOW_POWER
}

fn default_shell_program() -> String {
    "su".to_string()
}

fn default_policy_command() -> String {
    "supolicy --live".to_string()
}

fn default_policy_domain() -> String {
    "appdomain".to_string()
}

fn default_policy_device_type() -> String {
    "input_device".to_string()
}

fn default_relay_watcher() -> String {
    "inotifyd".to_string()
}

fn default_retry_secs() -> u64 {
    10
}

fn default_recheck_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: default_device_path(),
            event_type: default_event_type(),
            event_code: default_event_code(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell_program(),
            args: vec![],
            probe: true,
            sync_timeout_ms: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_policy_command(),
            domain: default_policy_domain(),
            device_type: default_policy_device_type(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            watcher: default_relay_watcher(),
            cache_dir: None,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            retry_secs: default_retry_secs(),
            recheck_secs: default_recheck_secs(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "switchbridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (state)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("switchbridge")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Directory for relay mirror and script files
    pub fn relay_dir(&self) -> PathBuf {
        self.relay.cache_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "switchbridge")
                .map(|dirs| dirs.cache_dir().to_path_buf())
                .unwrap_or_else(|| Self::runtime_dir().join("relay"))
        })
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, BridgeError> {
    let mut config = Config {
        state_file: Some("auto".to_string()),
        ..Config::default()
    };

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| BridgeError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| BridgeError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(device) = std::env::var("SWITCHBRIDGE_DEVICE") {
        config.device.path = PathBuf::from(device);
    }
    if let Ok(program) = std::env::var("SWITCHBRIDGE_SHELL") {
        config.shell.program = program;
    }
    if let Ok(mode) = std::env::var("SWITCHBRIDGE_RELAY") {
        config.relay.mode = mode.parse()?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.path, PathBuf::from("/dev/input/event4"));
        assert_eq!(config.device.event_type, 0x05);
        assert_eq!(config.device.event_code, 0x13);
        assert_eq!(config.shell.program, "su");
        assert!(config.policy.enabled);
        assert_eq!(config.relay.mode, RelayMode::Auto);
        assert_eq!(config.action, Action::Nothing);
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = Config::default();
        assert_eq!(config.device.path, defaults.device.path);
        assert_eq!(config.device.event_code, defaults.device.event_code);
        assert_eq!(config.policy.command, defaults.policy.command);
        assert_eq!(config.relay.watcher, "inotifyd");
        assert_eq!(config.daemon.recheck_secs, 60);
        assert_eq!(config.state_file.as_deref(), Some("auto"));
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            [device]
            path = "/dev/input/event2"

            [shell]
            program = "/system/xbin/su"
            sync_timeout_ms = 5000

            [policy]
            enabled = false

            [relay]
            mode = "always"
            cache_dir = "/data/local/tmp/sb"

            [action]
            type = "command"
            on = "svc wifi enable"
            off = "svc wifi disable"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.path, PathBuf::from("/dev/input/event2"));
        assert_eq!(config.device.event_type, EV_SW); // default
        assert_eq!(config.shell.program, "/system/xbin/su");
        assert_eq!(config.shell.sync_timeout_ms, Some(5000));
        assert!(!config.policy.enabled);
        assert_eq!(config.relay.mode, RelayMode::Always);
        assert_eq!(config.relay_dir(), PathBuf::from("/data/local/tmp/sb"));
        assert_eq!(
            config.action,
            Action::Command {
                on: "svc wifi enable".to_string(),
                off: "svc wifi disable".to_string(),
            }
        );
    }

    #[test]
    fn test_relay_mode_from_str() {
        assert_eq!("AUTO".parse::<RelayMode>().unwrap(), RelayMode::Auto);
        assert_eq!("always".parse::<RelayMode>().unwrap(), RelayMode::Always);
        assert_eq!("never".parse::<RelayMode>().unwrap(), RelayMode::Never);
        assert!("sometimes".parse::<RelayMode>().is_err());
    }

    #[test]
    fn test_resolve_state_file() {
        let mut config = Config::default();
        assert!(config.resolve_state_file().is_none());

        config.state_file = Some("disabled".to_string());
        assert!(config.resolve_state_file().is_none());

        config.state_file = Some("/tmp/sb-state".to_string());
        assert_eq!(
            config.resolve_state_file(),
            Some(PathBuf::from("/tmp/sb-state"))
        );

        config.state_file = Some("auto".to_string());
        assert!(config.resolve_state_file().unwrap().ends_with("state"));
    }
}
