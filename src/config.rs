//! Kjarni Configuration
//!
//! Handles parsing of `kjarni.toml` and `KJARNI_*` environment overrides.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ffi::ENV_LIBRARY_PATH;
use crate::models::Device;

/// Name of the config file searched for by [`KjarniConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "kjarni.toml";

static GLOBAL: OnceCell<KjarniConfig> = OnceCell::new();

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching kjarni.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KjarniConfig {
    /// Where to find the engine binary
    #[serde(default)]
    pub engine: EngineConfig,

    /// Defaults applied to every model created from this config
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl KjarniConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: KjarniConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    /// The process-wide config, resolved on first use.
    ///
    /// `kjarni.toml` is searched upward from the current directory and the
    /// `KJARNI_*` environment variables are applied on top. An unreadable
    /// file is logged and treated as absent. Both the global engine loader
    /// and the default model options read from this value.
    pub fn global() -> &'static KjarniConfig {
        GLOBAL.get_or_init(|| {
            Self::load_from_cwd()
                .unwrap_or_else(|e| {
                    warn!(error = %e, "ignoring unreadable kjarni.toml");
                    Self::default()
                })
                .with_env_overrides()
        })
    }

    /// Make this the process-wide config unless one was already resolved.
    ///
    /// Returns whether it was installed.
    pub fn install_global(self) -> bool {
        let installed = GLOBAL.set(self).is_ok();
        if !installed {
            debug!("process-wide config already resolved, keeping it");
        }
        installed
    }

    /// Apply `KJARNI_*` environment variables on top of this config.
    ///
    /// This is the only place `KJARNI_LIB_PATH` is read: a file path replaces
    /// `engine.library_path`, a directory is searched before the config's own
    /// search paths.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_LIBRARY_PATH) {
            let path = PathBuf::from(path);
            if path.is_dir() {
                self.engine.search_paths.insert(0, path);
            } else {
                self.engine.library_path = Some(path);
            }
        }
        if let Some(device) = lookup("KJARNI_DEVICE").and_then(|d| d.parse().ok()) {
            self.defaults.device = device;
        }
        if let Some(quiet) = lookup("KJARNI_QUIET") {
            self.defaults.quiet = matches!(quiet.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(dir) = lookup("KJARNI_CACHE_DIR") {
            self.defaults.cache_dir = Some(PathBuf::from(dir));
        }
        self
    }
}

/// Engine library location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit path to the engine binary
    #[serde(default)]
    pub library_path: Option<PathBuf>,

    /// Extra directories searched for the platform binary
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

/// Per-model defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Compute device: "cpu" or "gpu"
    #[serde(default)]
    pub device: Device,

    /// Suppress engine-side logging
    #[serde(default)]
    pub quiet: bool,

    /// Model cache directory; the engine default when absent
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}
