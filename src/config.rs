//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. The TOML config file (platform config dir, or `--config PATH`)
//! 3. A named `[profile.<name>]` table from that file, if selected
//! 4. Environment variables prefixed `MEDIADUPE_` (`__` separates nested keys)
//! 5. Command-line flags, applied with [`Config::merge_cli`]
//!
//! ```toml
//! page_size = 100
//! io_threads = 8
//!
//! [profile.nas]
//! io_threads = 2
//! validate_metadata = true
//!
//! [profile.viewer]
//! capabilities = []
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{Capabilities, Capability};
use crate::cli::{Cli, Commands};
use crate::session::ScanSettings;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "MEDIADUPE_";

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A count that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Progress would outlive the result it produces.
    #[error("progress_ttl_secs ({progress}) must be shorter than result_ttl_secs ({result})")]
    TtlOrder { progress: u64, result: u64 },
}

/// Overrides applied by a named profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_metadata: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library database. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    /// Items read per batch.
    pub page_size: usize,
    /// Lifetime of in-flight scan progress, in seconds.
    pub progress_ttl_secs: u64,
    /// Lifetime of the cached result, in seconds.
    pub result_ttl_secs: u64,
    /// Concurrent hashing threads within a batch.
    pub io_threads: usize,
    /// Re-hash files whose size or mtime changed since fingerprinting.
    pub validate_metadata: bool,
    /// Groups per report page.
    pub per_page: usize,
    /// Delete files permanently instead of moving them to trash.
    pub permanent_delete: bool,
    /// What the operator may do: `manage_scans`, `delete_items`.
    pub capabilities: Vec<Capability>,
    /// Key for delete tokens. Generated and stored in the library if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Named profiles.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profile: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: None,
            page_size: 50,
            progress_ttl_secs: 15 * 60,
            result_ttl_secs: 24 * 60 * 60,
            io_threads: 4,
            validate_metadata: false,
            per_page: 20,
            permanent_delete: false,
            capabilities: vec![Capability::ManageScans, Capability::DeleteItems],
            secret: None,
            profile: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load from `path` (or the default path), falling back to defaults on error.
    pub fn load(path: Option<&Path>, profile: Option<&str>) -> Self {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load_from_path(path, profile),
            None => {
                log::debug!("No config directory available, using defaults");
                Self::from_figment(Self::base_figment(), profile)
            }
        }
    }

    /// Load from a specific TOML file. A missing file contributes nothing.
    ///
    /// Parse errors are logged and the defaults are used instead.
    pub fn load_from_path(path: impl AsRef<Path>, profile: Option<&str>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            log::debug!("Loading config from {}", path.display());
        }
        Self::from_figment(Self::base_figment().merge(Toml::file(path)), profile)
    }

    fn base_figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    fn from_figment(mut figment: Figment, profile: Option<&str>) -> Self {
        if let Some(name) = profile {
            let key = format!("profile.{name}");
            if figment.contains(&key) {
                let overrides = figment.focus(&key);
                figment = figment.merge(overrides);
            } else {
                log::warn!("Profile '{}' not found in config, using base settings", name);
            }
        }

        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        match figment.extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Invalid configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Default platform-specific config file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mediadupe", "mediadupe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write the configuration as TOML.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(library) = &cli.library {
            self.library = Some(library.clone());
        }

        match &cli.command {
            Commands::Scan(args) => {
                if let Some(n) = args.page_size {
                    self.page_size = n;
                }
                if let Some(n) = args.io_threads {
                    self.io_threads = n;
                }
                if args.validate_metadata {
                    self.validate_metadata = true;
                }
            }
            Commands::Report(args) => {
                if let Some(n) = args.per_page {
                    self.per_page = n;
                }
            }
            Commands::DeleteOrphans(args) => {
                if args.permanent {
                    self.permanent_delete = true;
                }
            }
            _ => {}
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Zero("page_size"));
        }
        if self.io_threads == 0 {
            return Err(ConfigError::Zero("io_threads"));
        }
        if self.per_page == 0 {
            return Err(ConfigError::Zero("per_page"));
        }
        if self.progress_ttl_secs == 0 {
            return Err(ConfigError::Zero("progress_ttl_secs"));
        }
        if self.progress_ttl_secs >= self.result_ttl_secs {
            return Err(ConfigError::TtlOrder {
                progress: self.progress_ttl_secs,
                result: self.result_ttl_secs,
            });
        }
        Ok(())
    }

    /// Library path, falling back to the platform data dir.
    pub fn library_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.library {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("com", "mediadupe", "mediadupe")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(dirs.data_dir().join("library.db"))
    }

    /// Capabilities granted to commands run with this configuration.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities.iter().copied().collect()
    }

    /// Coordinator settings derived from this configuration.
    #[must_use]
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            page_size: self.page_size,
            progress_ttl: Duration::from_secs(self.progress_ttl_secs),
            result_ttl: Duration::from_secs(self.result_ttl_secs),
            io_threads: self.io_threads,
            validate_metadata: self.validate_metadata,
        }
    }
}
