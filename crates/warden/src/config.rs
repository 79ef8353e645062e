use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_policy::validation::is_valid_action_identifier;
use warden_policy::WILDCARD;

use crate::error::{WardenError, WardenResult};

/// Policy snapshot cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum snapshot age in seconds. `0` keeps snapshots until the next
    /// write to the organization's policies.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Report `"*"` instead of enumerating the catalog when a top-tier
    /// wildcard allow applies.
    #[serde(default = "default_true")]
    pub wildcard_short_circuit: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            wildcard_short_circuit: true,
        }
    }
}

/// The known actions, enumerated when computing effective permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,
}

fn default_actions() -> Vec<String> {
    [
        "account:read",
        "account:create",
        "account:update",
        "account:delete",
        "journal_entry:read",
        "journal_entry:create",
        "journal_entry:post",
        "journal_entry:reverse",
        "invoice:read",
        "invoice:create",
        "invoice:approve",
        "report:read",
        "report:export",
        "policy:read",
        "policy:manage",
    ]
    .iter()
    .map(|a| a.to_string())
    .collect()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            actions: default_actions(),
        }
    }
}

/// Top-level configuration for the Warden binary.
///
/// Loaded from a TOML file (typically `~/.warden/config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl WardenConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> WardenResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: WardenConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> WardenResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| WardenError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> WardenResult<()> {
        let mut seen = BTreeSet::new();
        for action in &self.catalog.actions {
            if action == WILDCARD {
                return Err(WardenError::Config(
                    "catalog must list concrete actions, not \"*\"".into(),
                ));
            }
            if !is_valid_action_identifier(action) {
                return Err(WardenError::Config(format!(
                    "catalog action '{}' is not of the form \"<entity>:<verb>\"",
                    action
                )));
            }
            if !seen.insert(action.as_str()) {
                return Err(WardenError::Config(format!(
                    "catalog action '{}' is listed twice",
                    action
                )));
            }
        }
        Ok(())
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".warden/config.toml")
    }
}
