//! Connector configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acl_builder::{AccountPolicy, DEFAULT_BUILTIN_PREFIX, DEFAULT_SUPPORTED_ACCOUNTS};
use crate::error::{ConnectorError, Result};

/// Longest accepted status sweep period: one year.
pub const MAX_STATUS_UPDATE_INTERVAL_MINS: u64 = 365 * 24 * 60;

/// What to do about a node's last access time after reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreserveLastAccess {
    /// Leave whatever the read did.
    Never,
    /// Restore, log and move on if that fails.
    IfAllowed,
    /// Restore; a failure blocks the whole root.
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Crawl roots, separated by `src_separator`.
    pub src: String,
    pub src_separator: String,
    pub crawl_hidden_files: bool,
    pub index_folders: bool,
    pub max_html_links: usize,
    pub preserve_last_access_time: PreserveLastAccess,
    pub directory_cache_size: u64,
    pub directory_cache_ttl_secs: u64,
    /// Absolute cutoff, `YYYY-MM-DD`.
    pub last_accessed_date: Option<String>,
    pub last_accessed_days: Option<i64>,
    pub last_modified_date: Option<String>,
    pub last_modified_days: Option<i64>,
    pub skip_share_access_control: bool,
    pub builtin_group_prefix: String,
    pub supported_accounts: Vec<String>,
    pub namespace: String,
    pub status_update_interval_mins: u64,
    pub allow_files_in_dfs_namespaces: bool,
    pub search_results_link_to_repository: bool,
    pub monitor_for_updates: bool,
    pub async_push_workers: usize,
    pub async_push_batch_size: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            src: String::new(),
            src_separator: ";".to_string(),
            crawl_hidden_files: false,
            index_folders: true,
            max_html_links: 1000,
            preserve_last_access_time: PreserveLastAccess::Always,
            directory_cache_size: 50_000,
            directory_cache_ttl_secs: 4 * 60 * 60,
            last_accessed_date: None,
            last_accessed_days: None,
            last_modified_date: None,
            last_modified_days: None,
            skip_share_access_control: false,
            builtin_group_prefix: DEFAULT_BUILTIN_PREFIX.to_string(),
            supported_accounts: DEFAULT_SUPPORTED_ACCOUNTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            namespace: "Default".to_string(),
            status_update_interval_mins: 15,
            allow_files_in_dfs_namespaces: false,
            search_results_link_to_repository: true,
            monitor_for_updates: true,
            async_push_workers: 4,
            async_push_batch_size: 1000,
        }
    }
}

impl ConnectorConfig {
    /// Config with defaults and the given crawl roots.
    pub fn with_roots(roots: &[&str]) -> Self {
        let cfg = Self::default();
        Self {
            src: roots.join(&cfg.src_separator),
            ..cfg
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ConnectorConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| ConnectorError::Config {
                reason: e.to_string(),
            })?,
            "json" => serde_json::from_str(&contents).map_err(|e| ConnectorError::Config {
                reason: e.to_string(),
            })?,
            _ => {
                return Err(ConnectorError::Config {
                    reason: format!("Unsupported config file extension: {}", ext),
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Crawl roots in configuration order, duplicates removed.
    pub fn roots(&self) -> Result<Vec<PathBuf>> {
        let parts: Vec<&str> = if self.src_separator.is_empty() {
            vec![self.src.as_str()]
        } else {
            self.src.split(self.src_separator.as_str()).collect()
        };
        let mut roots: Vec<PathBuf> = Vec::new();
        for part in parts {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let root = PathBuf::from(trimmed);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        if roots.is_empty() {
            return Err(ConnectorError::Config {
                reason: "src: no crawl roots configured".to_string(),
            });
        }
        Ok(roots)
    }

    pub fn account_policy(&self) -> AccountPolicy {
        AccountPolicy::new(
            &self.supported_accounts,
            &self.builtin_group_prefix,
            &self.namespace,
        )
    }

    pub fn status_update_interval(&self) -> Duration {
        Duration::from_secs(self.status_update_interval_mins.saturating_mul(60))
    }

    /// Checks settings that deserialization alone cannot.
    pub fn validate(&self) -> Result<()> {
        self.roots()?;
        if self.max_html_links == 0 {
            return Err(ConnectorError::Config {
                reason: "max_html_links must be positive".to_string(),
            });
        }
        if self.async_push_workers == 0 || self.async_push_batch_size == 0 {
            return Err(ConnectorError::Config {
                reason: "async_push_workers and async_push_batch_size must be positive"
                    .to_string(),
            });
        }
        if self.status_update_interval_mins == 0 {
            return Err(ConnectorError::Config {
                reason: "status_update_interval_mins must be positive".to_string(),
            });
        }
        if self.status_update_interval_mins > MAX_STATUS_UPDATE_INTERVAL_MINS {
            return Err(ConnectorError::Config {
                reason: format!(
                    "status_update_interval_mins must be at most {}",
                    MAX_STATUS_UPDATE_INTERVAL_MINS
                ),
            });
        }
        if self.last_accessed_date.is_some() && self.last_accessed_days.is_some() {
            return Err(ConnectorError::InvalidTimeFilter {
                reason: "last_accessed_date and last_accessed_days are mutually exclusive"
                    .to_string(),
            });
        }
        if self.last_modified_date.is_some() && self.last_modified_days.is_some() {
            return Err(ConnectorError::InvalidTimeFilter {
                reason: "last_modified_date and last_modified_days are mutually exclusive"
                    .to_string(),
            });
        }
        Ok(())
    }
}
