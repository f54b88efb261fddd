//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "USB_STREAM";

/// Config file name
const CONFIG_FILE_NAME: &str = "usb-stream.toml";

/// Directory name under the platform config directory
const APP_DIR_NAME: &str = "usb-stream";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "USB_STREAM_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `USB_STREAM_CONFIG` environment variable (explicit path)
    /// 2. `./usb-stream.toml` (current directory)
    /// 3. `$XDG_CONFIG_HOME/usb-stream/usb-stream.toml` or `~/.config/...` (Linux/macOS)
    /// 4. `%APPDATA%\usb-stream\usb-stream.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override any file value.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides still apply; a malformed one is logged and
    /// stops the remaining overrides from being read.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        if let Err(e) = apply_env_overrides(&mut config) {
            warn!(error = %e, "ignoring malformed environment override");
        }

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::NoSavePath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            validate(&config)?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io("read", path, e))?;

    toml::from_str(&content).map_err(ConfigError::Syntax)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::io("create directory for", path, e))?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::io("write", path, e))
}

/// Parse `USB_STREAM_<KEY>` if it is set.
fn env_value<T: FromStr>(key: &str) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{key}");
    match std::env::var(&var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(format!("{ENV_PREFIX}_{key}"))
        .ok()
        .map(|val| matches!(val.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern `USB_STREAM_<SECTION>_<KEY>`,
/// for example `USB_STREAM_PORT_DEVICE=3` or `USB_STREAM_PORT_BAUD_RATE=9600`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Port overrides
    if let Some(val) = env_value::<String>("PORT_DEVICE")? {
        config.port.device = Some(val);
    }
    if let Some(val) = env_flag("PORT_EVENT_DRIVEN") {
        config.port.event_driven = val;
    }
    if let Some(val) = env_value("PORT_BAUD_RATE")? {
        config.port.baud_rate = val;
    }
    if let Some(val) = env_value("PORT_CHAR_SIZE")? {
        config.port.char_size = val;
    }
    if let Some(val) = env_value("PORT_PARITY")? {
        config.port.parity = val;
    }
    if let Some(val) = env_value("PORT_STOP_BITS")? {
        config.port.stop_bits = val;
    }
    if let Some(val) = env_value("PORT_FLOW_CONTROL")? {
        config.port.flow_control = val;
    }

    // Timeout overrides
    if let Some(val) = env_value("TIMEOUTS_READ_INTERVAL")? {
        config.timeouts.read_interval = val;
    }
    if let Some(val) = env_value("TIMEOUTS_READ_TOTAL_CONSTANT")? {
        config.timeouts.read_total_constant = val;
    }
    if let Some(val) = env_value("TIMEOUTS_WRITE_TOTAL_CONSTANT")? {
        config.timeouts.write_total_constant = val;
    }

    // Retry overrides
    if let Some(val) = env_value("RETRY_MAX_ATTEMPTS")? {
        config.retry.max_attempts = val;
    }

    // Logging overrides
    if let Some(val) = env_value::<String>("LOGGING_LEVEL")? {
        config.logging.level = val;
    }
    if let Some(val) = env_value("LOGGING_FORMAT")? {
        config.logging.format = val;
    }

    Ok(())
}

/// Reject values that parse but cannot drive a port.
fn validate(config: &Config) -> ConfigResult<()> {
    let t = &config.timeouts;
    let fields = [
        ("timeouts.read_interval", t.read_interval),
        ("timeouts.read_total_constant", t.read_total_constant),
        ("timeouts.read_total_multiplier", t.read_total_multiplier),
        ("timeouts.write_total_constant", t.write_total_constant),
        ("timeouts.write_total_multiplier", t.write_total_multiplier),
    ];
    for (key, value) in fields {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::validation(
                key,
                format!("{value} is not a non-negative number of milliseconds"),
            ));
        }
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::validation(
            "retry.max_attempts",
            "at least one attempt is required",
        ));
    }
    if config.retry.initial_backoff_us > config.retry.max_backoff_us {
        return Err(ConfigError::validation(
            "retry.initial_backoff_us",
            "must not exceed retry.max_backoff_us",
        ));
    }

    if let Some(device) = &config.port.device {
        if device.trim().is_empty() {
            return Err(ConfigError::validation("port.device", "must not be empty"));
        }
    }

    Ok(())
}
