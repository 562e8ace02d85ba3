use crate::core::store::{validate_key, Domain, KeyedLocks, StateStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// JSON-file state store. One pretty-printed file per record:
///
/// ```text
/// <root>/config/<guild_id>.json
/// <root>/warnings/<guild_id>-<user_id>.json
/// <root>/timeouts/<guild_id>-<user_id>.json
/// <root>/xp/<guild_id>-<user_id>.json
/// <root>/panels/<message_id>.json
/// ```
///
/// Writes go to a temp file that is renamed over the record, so a failed
/// write never leaves a half-written document behind.
pub struct JsonStateStore {
    root: PathBuf,
    locks: KeyedLocks,
}

impl JsonStateStore {
    /// Open (and create if needed) a store rooted at `root`. Every domain
    /// directory is created up front so the on-disk layout is complete even
    /// before the first record is written.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self {
            root: root.as_ref().to_path_buf(),
            locks: KeyedLocks::new(),
        };

        for domain in Domain::ALL {
            store.ensure_domain(domain).await?;
        }

        tracing::info!(root = %store.root.display(), "Opened JSON state store");
        Ok(store)
    }

    fn domain_dir(&self, domain: Domain) -> PathBuf {
        self.root.join(domain.as_str())
    }

    fn record_path(&self, domain: Domain, key: &str) -> PathBuf {
        self.domain_dir(domain).join(format!("{}.json", key))
    }

    async fn ensure_domain(&self, domain: Domain) -> Result<PathBuf, StoreError> {
        let dir = self.domain_dir(domain);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn get(&self, domain: Domain, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;

        match fs::read_to_string(self.record_path(domain, key)).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, domain: Domain, key: &str, document: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        let text = serde_json::to_string_pretty(&document)?;

        let _guard = self.locks.acquire(domain, key).await;
        let dir = self.ensure_domain(domain).await?;
        let tmp_path = dir.join(format!("{}.json.tmp", key));
        let final_path = self.record_path(domain, key);

        if let Err(e) = fs::write(&tmp_path, text).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn keys(&self, domain: Domain) -> Result<Vec<String>, StoreError> {
        let dir = self.ensure_domain(domain).await?;
        let mut entries = fs::read_dir(&dir).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }
}
