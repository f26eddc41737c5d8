//! Configuration management for fsinterpose

use crate::error::{Error, Result};
use crate::request::OpenMode;
use crate::transform::CallMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default extension denoting executable source
pub const DEFAULT_SOURCE_EXTENSION: &str = "php";

/// Default open mode denoting a raw-binary read
pub const DEFAULT_RAW_READ_MODE: &str = "rb";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extensions (without the dot) of executable source files
    pub source_extensions: Vec<String>,

    /// Open mode that marks a raw-binary read
    pub raw_read_mode: String,

    /// Strip `final` modifiers from raw reads of executable source
    pub strip_modifiers: bool,

    /// Directories searched for relative paths opened with `use_path`
    pub include_path: Vec<PathBuf>,

    /// Call rewrites per file
    pub call_maps: BTreeMap<PathBuf, CallMap>,

    /// Substitution rule registered at start-up
    pub intercept: Option<InterceptConfig>,
}

/// Substitution rule as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptConfig {
    /// File whose includes are redirected
    pub target: PathBuf,

    /// File served instead
    pub replacement: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_extensions: vec![DEFAULT_SOURCE_EXTENSION.to_string()],
            raw_read_mode: DEFAULT_RAW_READ_MODE.to_string(),
            strip_modifiers: true,
            include_path: Vec::new(),
            call_maps: BTreeMap::new(),
            intercept: None,
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

impl Config {
    /// Load configuration from a JSON or YAML file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = if is_yaml(path) {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file: {}", e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file: {}", e))
            })?
        };

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(extensions) = std::env::var("FSINTERPOSE_SOURCE_EXTENSIONS") {
            let extensions: Vec<String> = extensions
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
            if !extensions.is_empty() {
                self.source_extensions = extensions;
            }
        }

        if let Ok(mode) = std::env::var("FSINTERPOSE_RAW_READ_MODE") {
            let mode = mode.trim().to_string();
            if !mode.is_empty() {
                self.raw_read_mode = mode;
            }
        }

        if let Ok(strip) = std::env::var("FSINTERPOSE_STRIP_MODIFIERS") {
            match strip.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.strip_modifiers = true,
                "0" | "false" | "no" | "off" => self.strip_modifiers = false,
                _ => {}
            }
        }

        if let Some(include_path) = std::env::var_os("FSINTERPOSE_INCLUDE_PATH") {
            self.include_path = std::env::split_paths(&include_path)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.source_extensions.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one source extension is required".to_string(),
            ));
        }

        for ext in &self.source_extensions {
            if ext.is_empty() || ext.contains('.') || ext.contains(std::path::MAIN_SEPARATOR) {
                return Err(Error::InvalidConfig(format!(
                    "Invalid source extension: {:?}",
                    ext
                )));
            }
        }

        match self.raw_read_mode.parse::<OpenMode>() {
            Ok(mode) if mode.is_read_only() => {}
            Ok(_) => {
                return Err(Error::InvalidConfig(format!(
                    "Raw read mode must be read-only: {:?}",
                    self.raw_read_mode
                )));
            }
            Err(_) => {
                return Err(Error::InvalidConfig(format!(
                    "Raw read mode is not a valid open mode: {:?}",
                    self.raw_read_mode
                )));
            }
        }

        Ok(())
    }

    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fsinterpose")
            .join("config.json")
    }
}
