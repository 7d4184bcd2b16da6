//! Client configuration.
//!
//! Immutable configuration loaded once from a YAML file and passed by value;
//! there is no global mutable state. The file carries what archive operators
//! hand out to users: the archive's domain name and a personal access token.

use crate::client::ArchiveClient;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Connection settings for one archive instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Domain name of the archive, e.g. `archive.example.org`.
    pub domain_name: String,
    /// Personal access token for the archive's REST API.
    pub token: String,
}

impl ArchiveConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ArchiveConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Create a REST client for the configured archive.
    pub fn create_client(&self) -> ArchiveClient {
        ArchiveClient::new(&self.domain_name, &self.token)
    }
}
