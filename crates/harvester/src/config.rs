//! Harvester configuration.

use crate::namespace::NamespaceMap;
use crate::sources::HarvestSource;
use crate::writer::DEFAULT_MAX_RECORDS;
use oaiharvest_common::{Error, Result, TextEncoding};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings supplied by the host application.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Output root. Falls back to the system temp directory.
    pub workdir: Option<PathBuf>,
    /// Prefix → URI table used when no namespace URI is given.
    pub default_namespace_map: Option<NamespaceMap>,
    /// PEM certificate of the trusted self-hosted endpoint.
    pub self_certificate_file: Option<PathBuf>,
    /// Bound on the host name lookup, the TCP connect and each socket read
    /// or write during the TLS handshake.
    pub connect_timeout_secs: u64,
    pub max_records: usize,
    pub encoding: TextEncoding,
    pub sources: Vec<HarvestSource>,
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            workdir: None,
            default_namespace_map: None,
            self_certificate_file: None,
            connect_timeout_secs: default_connect_timeout(),
            max_records: DEFAULT_MAX_RECORDS,
            encoding: TextEncoding::Utf8,
            sources: Vec::new(),
        }
    }
}

impl HarvesterConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: HarvesterConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(Error::Config("max_records must be at least 1".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn workdir(&self) -> PathBuf {
        self.workdir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
