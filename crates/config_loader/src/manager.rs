//! ConfigManager - load-once configuration holder
//!
//! The first successful load wins; later loads are logged and return the
//! configuration that is already in place.

use std::path::{Path, PathBuf};

use contracts::{ContractError, RtlsConfig};
use tracing::{info, warn};

use crate::{ConfigFormat, ConfigLoader};

/// Holds the process configuration after the first successful load
#[derive(Debug, Default)]
pub struct ConfigManager {
    loaded: bool,
    config: RtlsConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Manager holding defaults, not yet loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file unless a configuration is already loaded.
    ///
    /// # Errors
    /// Parse or validation failure of the first load. A failed load leaves
    /// the manager unloaded so a corrected file can be loaded later.
    pub fn load(&mut self, path: &Path) -> Result<&RtlsConfig, ContractError> {
        if self.loaded {
            warn!(
                requested = %path.display(),
                loaded_from = ?self.source,
                "configuration already loaded, ignoring"
            );
            return Ok(&self.config);
        }
        let config = ConfigLoader::load_from_path(path)?;
        info!(path = %path.display(), systems = ?config.systems, "configuration loaded");
        self.source = Some(path.to_path_buf());
        Ok(self.install(config))
    }

    /// Load from a string unless a configuration is already loaded.
    pub fn load_str(
        &mut self,
        content: &str,
        format: ConfigFormat,
    ) -> Result<&RtlsConfig, ContractError> {
        if self.loaded {
            warn!("configuration already loaded, ignoring");
            return Ok(&self.config);
        }
        let config = ConfigLoader::load_from_str(content, format)?;
        Ok(self.install(config))
    }

    fn install(&mut self, config: RtlsConfig) -> &RtlsConfig {
        self.config = config;
        self.loaded = true;
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Current configuration (defaults until loaded)
    pub fn config(&self) -> &RtlsConfig {
        &self.config
    }

    /// File the configuration was loaded from
    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn into_config(self) -> RtlsConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_first_load_wins() {
        let mut manager = ConfigManager::new();
        assert!(!manager.is_loaded());

        manager
            .load_str("[engine]\nstop_gap_ms = 250\n", ConfigFormat::Toml)
            .unwrap();
        assert!(manager.is_loaded());

        let second = manager
            .load_str("[engine]\nstop_gap_ms = 50\n", ConfigFormat::Toml)
            .unwrap();
        assert_eq!(second.engine.stop_gap_ms, 250);
    }

    #[test]
    fn test_failed_load_stays_unloaded() {
        let mut manager = ConfigManager::new();
        assert!(manager.load_str("[[[", ConfigFormat::Toml).is_err());
        assert!(!manager.is_loaded());
        assert!(manager.load_str("", ConfigFormat::Toml).is_ok());
        assert!(manager.is_loaded());
    }

    #[test]
    fn test_load_from_file_records_source() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"systems":["null"],"postprocess":false}}"#).unwrap();

        let mut manager = ConfigManager::new();
        let config = manager.load(file.path()).unwrap();
        assert!(!config.postprocess);
        assert_eq!(manager.source_path(), Some(file.path()));
    }
}
