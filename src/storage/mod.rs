//! Persistence layer.
//!
//! Two document sinks: the investment configuration (one pretty-printed
//! JSON document, rewritten after every pass) and raw trade records (one
//! JSON line appended per submitted order, audit-only). The store is a
//! plain-file implementation behind the `PersistenceSink` trait so the
//! engine and tests never depend on the storage technology.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::Configuration;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("configuration id is missing")]
    MissingId,
    #[error("no configuration document at {0}")]
    NotFound(String),
}

/// Destination for updated configurations and raw trade records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store the updated configuration. Fails if the document has no id.
    async fn persist_config(&self, config: &Configuration) -> Result<()>;

    /// Append one raw order document to the trade record.
    async fn persist_trade(&self, raw_order: &serde_json::Value) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

pub struct JsonStore {
    config_path: PathBuf,
    trades_path: PathBuf,
}

impl JsonStore {
    pub fn new(config_path: impl Into<PathBuf>, trades_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            trades_path: trades_path.into(),
        }
    }

    /// Load the investment configuration. A missing or corrupt document is
    /// an error; the caller aborts the pass rather than trade on guesses.
    pub fn load_config(&self) -> Result<Configuration> {
        let path = &self.config_path;
        if !path.exists() {
            return Err(StorageError::NotFound(path.display().to_string()).into());
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: Configuration = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse configuration from {}", path.display()))?;

        info!(
            path = %path.display(),
            currencies = config.currencies_targeted.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

#[async_trait]
impl PersistenceSink for JsonStore {
    async fn persist_config(&self, config: &Configuration) -> Result<()> {
        if config.id.is_empty() {
            return Err(StorageError::MissingId.into());
        }

        let json = serde_json::to_string_pretty(config)
            .context("Failed to serialise configuration")?;
        std::fs::write(&self.config_path, &json).with_context(|| {
            format!("Failed to write configuration to {}", self.config_path.display())
        })?;

        debug!(path = %self.config_path.display(), "Configuration saved");
        Ok(())
    }

    async fn persist_trade(&self, raw_order: &serde_json::Value) -> Result<()> {
        let line = serde_json::to_string(raw_order).context("Failed to serialise trade record")?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.trades_path)
            .with_context(|| {
                format!("Failed to open trade record {}", self.trades_path.display())
            })?;
        writeln!(file, "{line}").with_context(|| {
            format!("Failed to append trade record to {}", self.trades_path.display())
        })?;

        debug!(path = %self.trades_path.display(), "Trade record appended");
        Ok(())
    }
}

/// Delete a store's files (for testing or reset).
pub fn delete_files(store: &JsonStore) -> Result<()> {
    for path in [&store.config_path, &store.trades_path] {
        if Path::new(path).exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CurrencyRecord, Options};
    use serde_json::json;
    use std::collections::HashMap;

    fn temp_store() -> JsonStore {
        let dir = std::env::temp_dir();
        let tag = uuid::Uuid::new_v4();
        JsonStore::new(
            dir.join(format!("ratchet_test_config_{tag}.json")),
            dir.join(format!("ratchet_test_trades_{tag}.jsonl")),
        )
    }

    fn sample_config() -> Configuration {
        let mut records = HashMap::new();
        records.insert(
            "DOGE".to_string(),
            CurrencyRecord {
                last_sell_price: Some(12.4),
                limit_usdt: Some(384.0),
                ..CurrencyRecord::default()
            },
        );
        Configuration {
            id: "configuration".to_string(),
            is_paused: false,
            currencies_targeted: vec!["DOGE".to_string()],
            records,
            options: Options { simple_logs: true },
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = temp_store();
        let config = sample_config();
        store.persist_config(&config).await.unwrap();

        let loaded = store.load_config().unwrap();
        assert_eq!(loaded.id, "configuration");
        assert_eq!(loaded.records["DOGE"].last_sell_price, Some(12.4));
        assert_eq!(loaded.records["DOGE"].limit_usdt, Some(384.0));
        assert!(loaded.options.simple_logs);

        delete_files(&store).unwrap();
    }

    #[tokio::test]
    async fn test_persist_config_requires_id() {
        let store = temp_store();
        let mut config = sample_config();
        config.id = String::new();

        let err = store.persist_config(&config).await.unwrap_err();
        assert!(err.downcast_ref::<StorageError>().is_some());
    }

    #[test]
    fn test_load_missing_config_is_an_error() {
        let store = JsonStore::new("/tmp/ratchet_nonexistent_xyz.json", "/tmp/unused.jsonl");
        assert!(store.load_config().is_err());
    }

    #[test]
    fn test_load_corrupt_config_is_an_error() {
        let store = temp_store();
        std::fs::write(&store.config_path, "{not valid json").unwrap();
        assert!(store.load_config().is_err());
        delete_files(&store).unwrap();
    }

    #[tokio::test]
    async fn test_trades_append_as_json_lines() {
        let store = temp_store();
        store
            .persist_trade(&json!({ "order_id": "078340", "status": "FILLED" }))
            .await
            .unwrap();
        store
            .persist_trade(&json!({ "order_id": "078341", "status": "ACTIVE" }))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&store.trades_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["order_id"], "078340");

        delete_files(&store).unwrap();
    }
}
