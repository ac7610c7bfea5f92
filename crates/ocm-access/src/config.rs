//! TOML configuration of an access context.
//!
//! ```toml
//! [cache]
//! dir = "/var/cache/ocm"
//! blob-cache = true
//!
//! [retry]
//! max-attempts = 5
//! initial-backoff-ms = 100
//! max-backoff-ms = 5000
//!
//! [[upload]]
//! name = "ocm/mavenPackage"
//! config = "file:///srv/maven"
//! priority = 10
//!
//! [[download]]
//! name = "ocm/dirtree"
//! artifact-type = "directoryTree"
//! ```

use std::path::{Path, PathBuf};

use ocm_registrations::HandlerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};
use crate::retry::RetryPolicy;
use crate::handlers::{HandlerOptions, DEFAULT_PRIORITY};

/// Configuration for [`Context::from_config`](crate::Context::from_config).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccessConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Blob handlers to register by name.
    #[serde(default)]
    pub upload: Vec<HandlerRegistration>,
    /// Download handlers to register by name.
    #[serde(default)]
    pub download: Vec<HandlerRegistration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Cache root. Defaults to the OS temp dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Keep remote content in a digest-indexed cache below the root.
    #[serde(default = "default_true")]
    pub blob_cache: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            dir: None,
            blob_cache: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One `[[upload]]` or `[[download]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HandlerRegistration {
    /// Registration name such as `ocm/mavenPackage`.
    pub name: String,
    #[serde(default)]
    pub config: HandlerConfig,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl HandlerRegistration {
    pub fn options(&self) -> HandlerOptions {
        HandlerOptions {
            artifact_type: self.artifact_type.clone(),
            mime_type: self.mime_type.clone(),
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
        }
    }
}

impl AccessConfig {
    /// Parse a configuration from a TOML string.
    pub fn parse(input: &str) -> Result<Self> {
        let config: AccessConfig = toml::from_str(input)?;
        let entries = config.upload.iter().map(|r| ("upload", r));
        let entries = entries.chain(config.download.iter().map(|r| ("download", r)));
        for (section, entry) in entries {
            if entry.name.is_empty() {
                return Err(AccessError::invalid(
                    "access config",
                    format!("{section} entry without name (config {:?})", entry.config),
                ));
            }
        }
        if config.retry.max_attempts == 0 {
            return Err(AccessError::invalid("access config", "retry.max-attempts must be at least 1"));
        }
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AccessError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&content)
    }
}
