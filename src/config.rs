//! Engine configuration: data directory, segment/compaction thresholds,
//! broker retry policy, and the health/metrics bind address.
//!
//! Grounded in the teacher's `Config`/`DatabaseConfig` pattern: a struct
//! with `Default`, optionally overridden by a TOML file on disk.

use crate::broker::RetryPolicy;
use crate::compaction::CompactionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub max_segment_size: u64,
    pub row_block_capacity: usize,
    pub compaction_policy: CompactionPolicyConfig,
    pub broker_retry_attempts: u32,
    pub broker_retry_base_backoff_ms: u64,
    pub health_bind_address: String,
    pub unhealthy_disk_threshold: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompactionPolicyConfig {
    pub min_cumulative_bytes: u64,
    pub min_cumulative_deltas: usize,
    pub min_seconds_since_last_base: u64,
}

impl From<CompactionPolicyConfig> for CompactionPolicy {
    fn from(c: CompactionPolicyConfig) -> Self {
        CompactionPolicy {
            min_cumulative_bytes: c.min_cumulative_bytes,
            min_cumulative_deltas: c.min_cumulative_deltas,
            min_seconds_since_last_base: c.min_seconds_since_last_base,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_segment_size: crate::common::DEFAULT_MAX_SEGMENT_SIZE,
            row_block_capacity: crate::common::DEFAULT_ROW_BLOCK_CAPACITY,
            compaction_policy: CompactionPolicyConfig {
                min_cumulative_bytes: 512 * 1024 * 1024,
                min_cumulative_deltas: 5,
                min_seconds_since_last_base: 3600,
            },
            broker_retry_attempts: 3,
            broker_retry_base_backoff_ms: 100,
            health_bind_address: "0.0.0.0:8040".to_string(),
            unhealthy_disk_threshold: 1,
        }
    }
}

impl EngineConfig {
    /// Load from `path` if it exists, else fall back to defaults, mirroring
    /// the teacher's `rustydb.toml`-or-defaults lookup in `main.rs`.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| crate::error::StorageError::InvalidArgument(e.to_string()))
    }

    pub fn broker_retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.broker_retry_attempts, base_backoff_ms: self.broker_retry_base_backoff_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load_or_default(Path::new("/nonexistent/colonnade.toml")).unwrap();
        assert_eq!(config.broker_retry_attempts, 3);
    }

    #[test]
    fn broker_retry_policy_matches_configured_fields() {
        let config = EngineConfig { broker_retry_attempts: 5, broker_retry_base_backoff_ms: 50, ..EngineConfig::default() };
        let policy = config.broker_retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_backoff_ms, 50);
    }

    #[test]
    fn loads_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colonnade.toml");
        let config = EngineConfig { broker_retry_attempts: 9, ..EngineConfig::default() };
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();
        let loaded = EngineConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.broker_retry_attempts, 9);
    }
}
