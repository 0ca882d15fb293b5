//! Configuration management for the shape loader
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (raml.toml)
//! - Environment variables (RAML_*)
//!
//! ## Example config file (raml.toml):
//! ```toml
//! [loader]
//! root = "./api"
//! json_shorthand = true
//! eager_resolution = true
//! library_extensions = ["raml"]
//!
//! [logging]
//! filter = "raml_shapes=debug"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the loader binary and library
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Load settings
    #[serde(default)]
    pub loader: LoadSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings a [`Registry`](crate::registry::Registry) consults during a load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSettings {
    /// Base directory for relative fragment paths (defaults to the working directory)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Read `.json` files as JSON-schema data types
    #[serde(default = "default_true")]
    pub json_shorthand: bool,

    /// Resolve every queued shape at the end of each load
    #[serde(default = "default_true")]
    pub eager_resolution: bool,

    /// File extensions picked up when scanning a directory
    #[serde(default = "default_library_extensions")]
    pub library_extensions: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_true() -> bool {
    true
}

fn default_library_extensions() -> Vec<String> {
    vec!["raml".to_string()]
}

fn default_filter() -> String {
    "warn".to_string()
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            root: None,
            json_shorthand: true,
            eager_resolution: true,
            library_extensions: default_library_extensions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl LoadSettings {
    /// Absolute root directory for relative paths
    pub fn root_dir(&self) -> PathBuf {
        match &self.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => std::env::current_dir().unwrap_or_default().join(root),
            None => std::env::current_dir().unwrap_or_default(),
        }
    }

    /// Whether a scanned file should be loaded
    pub fn is_fragment_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.library_extensions.iter().any(|known| known == ext))
            .unwrap_or(false)
    }
}

impl LoaderConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["raml.toml", ".raml.toml", "config/raml.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "raml-shapes") {
            let xdg_config = config_dir.config_dir().join("raml.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // RAML_LOADER__ROOT=/specs and the like
        builder = builder.add_source(
            Environment::with_prefix("RAML")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("loader.library_extensions"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_toml()?)
    }

    pub fn to_toml(&self) -> std::io::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
