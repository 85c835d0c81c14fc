//! Engine configuration stored beside the metadata file.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Default number of saves between backups.
pub const DEFAULT_BACKUP_INTERVAL: u64 = 5;

/// Tunables read from `.ftag/config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Copy the metadata file to a versioned backup every N saves. 0 disables backups.
    pub backup_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backup_interval: DEFAULT_BACKUP_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Read the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|reason| Error::invalid_config(path, reason))
    }

    /// Write the config file.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_file_content())?;
        Ok(())
    }

    fn to_file_content(self) -> String {
        format!("version=1\nbackup_interval={}\n", self.backup_interval)
    }

    /// Parse `key=value` lines. Blank lines and `#` comments are skipped.
    fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut version = None;
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("Expected key=value, got {:?}", line));
            };
            match key.trim() {
                "version" => version = Some(value.trim()),
                "backup_interval" => {
                    config.backup_interval = value
                        .trim()
                        .parse()
                        .map_err(|_| format!("Invalid backup_interval: {:?}", value.trim()))?;
                }
                _ => {}
            }
        }

        if version != Some("1") {
            return Err(format!("Unsupported config version: {:?}", version));
        }

        Ok(config)
    }
}
