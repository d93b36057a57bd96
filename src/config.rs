//! Configuration management for the scanner.
//!
//! This module handles loading and saving configuration from disk,
//! including extra model names and scanning parameters.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{
   airpods::{parser::ResolutionHeuristic, registry::DeviceRegistry},
   bluetooth::scan::ScanConfig,
   error::{Result, ScanError},
};

/// Main configuration structure for the scanner.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   #[serde(default)]
   pub known_models: Vec<KnownModel>,

   #[serde(default)]
   pub adapter: Option<String>,

   #[serde(default = "default_duplicate_data")]
   pub duplicate_data: bool,

   #[serde(default)]
   pub resolution: ResolutionHeuristic,

   #[serde(default = "default_retry_count")]
   pub retry_count: u32,

   #[serde(default = "default_retry_delay")]
   pub retry_delay_sec: u64,

   #[serde(default = "default_max_retry_delay")]
   pub max_retry_delay_sec: u64,
}

/// Model name added to, or replacing one in, the built-in table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct KnownModel {
   pub id: u16,
   pub name: String,
}

const fn default_duplicate_data() -> bool {
   true
}

const fn default_retry_count() -> u32 {
   10
}

const fn default_retry_delay() -> u64 {
   2
}

const fn default_max_retry_delay() -> u64 {
   120
}

impl Default for Config {
   fn default() -> Self {
      Self {
         known_models: vec![],
         adapter: None,
         duplicate_data: default_duplicate_data(),
         resolution: ResolutionHeuristic::default(),
         retry_count: default_retry_count(),
         retry_delay_sec: default_retry_delay(),
         max_retry_delay_sec: default_max_retry_delay(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         Self::load_from(&config_path)
      } else {
         let config = Self::default();
         config.save_to(&config_path)?;
         Ok(config)
      }
   }

   pub fn load_from(path: &Path) -> Result<Self> {
      let contents = fs::read_to_string(path)?;
      Ok(toml::from_str(&contents)?)
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("PODSCAN_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Some(config_dir) = dirs::config_dir() {
         config_dir
      } else {
         return Err(ScanError::ConfigDirNotFound);
      };

      Ok(config_dir.join("podscan").join("config.toml"))
   }

   /// Builds the model registry, applying `known_models` over the built-ins.
   pub fn registry(&self) -> DeviceRegistry {
      DeviceRegistry::with_overrides(
         self
            .known_models
            .iter()
            .map(|m| (m.id, SmolStr::new(&m.name))),
      )
   }

   pub fn scan_config(&self) -> ScanConfig {
      ScanConfig {
         adapter: self.adapter.as_deref().map(SmolStr::new),
         duplicate_data: self.duplicate_data,
      }
   }

   pub const fn retry_delay(&self) -> Duration {
      Duration::from_secs(self.retry_delay_sec)
   }

   pub const fn max_retry_delay(&self) -> Duration {
      Duration::from_secs(self.max_retry_delay_sec)
   }
}
