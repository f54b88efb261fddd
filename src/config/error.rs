//! Errors raised while loading, validating or saving `usb-stream.toml`.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// `--config` or `load_from` named a file that is not there
    #[error("no configuration file at {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem failure; `action` is what was being attempted
    #[error("cannot {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed TOML: {0}")]
    Syntax(#[from] toml::de::Error),

    #[error("cannot encode configuration as TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A value that parses but cannot drive a port, such as a negative timeout
    #[error("{key}: {message}")]
    Invalid { key: String, message: String },

    /// `USB_STREAM_*` variable whose value does not parse
    #[error("{var}: {message}")]
    BadOverride { var: String, message: String },

    /// `save` on a loader built from defaults; use `save_to` instead
    #[error("configuration was not loaded from a file; give save_to a path")]
    NoSavePath,
}

impl ConfigError {
    pub fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn validation<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse<V: Into<String>, M: Into<String>>(var: V, message: M) -> Self {
        Self::BadOverride {
            var: var.into(),
            message: message.into(),
        }
    }

    /// The config key or environment variable at fault, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Invalid { key, .. } => Some(key.as_str()),
            Self::BadOverride { var, .. } => Some(var.as_str()),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
