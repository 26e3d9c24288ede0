use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration, loaded from a TOML file. Every section is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub sync: SyncSettings,
    pub sessions: SessionSettings,
    pub dedup: DedupSettings,
    pub rules: RuleSettings,
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Falls back to the platform data directory when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Upper bound on synchronize round-trips while the bank reports no accounts.
    pub max_sync_attempts: u32,
    pub product_id: String,
    pub product_version: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_sync_attempts: 4,
            product_id: "BANKFEED".to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub capacity: usize,
    pub idle_ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capacity: 16,
            idle_ttl_secs: 30 * 60,
        }
    }
}

/// Tolerance band around a candidate's value date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupWindow {
    pub days_before: u32,
    pub days_after: u32,
}

/// How an ingestion call site recognizes already-stored transactions.
///
/// The predicate is fixed (same account, same trimmed text, same amount);
/// `window` bounds the value-date distance and `cap` limits how many new
/// rows one call may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupPolicy {
    pub window: Option<DedupWindow>,
    pub cap: Option<usize>,
}

impl DedupPolicy {
    /// Policy for statements downloaded from the bank.
    pub fn bank() -> Self {
        Self {
            window: Some(DedupWindow {
                days_before: 5,
                days_after: 2,
            }),
            cap: Some(50),
        }
    }

    /// Policy for bulk uploads: same value date, no cap.
    pub fn bulk() -> Self {
        Self {
            window: Some(DedupWindow {
                days_before: 0,
                days_after: 0,
            }),
            cap: None,
        }
    }

    fn merged(self, table: PolicyTable) -> Self {
        Self {
            window: if table.any_date { None } else { table.window.or(self.window) },
            cap: if table.uncapped { None } else { table.cap.or(self.cap) },
        }
    }
}

/// A `[dedup.*]` table. Keys left out keep the call site's default;
/// `any_date` and `uncapped` switch the window or the cap off.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PolicyTable {
    window: Option<DedupWindow>,
    cap: Option<usize>,
    any_date: bool,
    uncapped: bool,
}

fn bank_policy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DedupPolicy, D::Error> {
    PolicyTable::deserialize(deserializer).map(|table| DedupPolicy::bank().merged(table))
}

fn bulk_policy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DedupPolicy, D::Error> {
    PolicyTable::deserialize(deserializer).map(|table| DedupPolicy::bulk().merged(table))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    #[serde(deserialize_with = "bank_policy")]
    pub bank: DedupPolicy,
    #[serde(deserialize_with = "bulk_policy")]
    pub bulk: DedupPolicy,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            bank: DedupPolicy::bank(),
            bulk: DedupPolicy::bulk(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub min_match_rate: u32,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self { min_match_rate: 100 }
    }
}
