// Guild configuration service.
//
// Config is read on every message (filter toggles) but written only by
// explicit setup commands, so reads are served from the last successfully
// persisted snapshot. The snapshot is replaced only after a write lands.

use super::config_models::{ConfigField, GuildConfig};
use crate::core::store::{find_record, save_record, Domain, KeyedLocks, StateStore, StoreError};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

pub struct ConfigService<S: StateStore> {
    store: Arc<S>,
    locks: KeyedLocks,
    snapshots: DashMap<u64, GuildConfig>,
}

impl<S: StateStore> ConfigService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            snapshots: DashMap::new(),
        }
    }

    /// Get a guild's config, creating and persisting the default on first access.
    pub async fn get(&self, guild_id: u64) -> Result<GuildConfig, ConfigError> {
        if let Some(snapshot) = self.snapshots.get(&guild_id) {
            return Ok(snapshot.clone());
        }

        let key = guild_id.to_string();
        let _guard = self.locks.acquire(Domain::Config, &key).await;
        let config = self.load_or_create(guild_id, &key).await?;
        Ok(config)
    }

    /// Apply one setup change and persist it. Returns the new config.
    pub async fn set_field(&self, guild_id: u64, field: ConfigField) -> Result<GuildConfig, ConfigError> {
        let key = guild_id.to_string();
        let _guard = self.locks.acquire(Domain::Config, &key).await;

        let mut config = self.load_or_create(guild_id, &key).await?;
        field.apply(&mut config);
        save_record(self.store.as_ref(), Domain::Config, &key, &config).await?;
        self.snapshots.insert(guild_id, config.clone());

        tracing::info!(guild_id, "Guild config updated");
        Ok(config)
    }

    // Caller must hold the config lock for `key`.
    async fn load_or_create(&self, guild_id: u64, key: &str) -> Result<GuildConfig, ConfigError> {
        let config = match find_record::<GuildConfig, _>(self.store.as_ref(), Domain::Config, key).await? {
            Some(config) => config,
            None => {
                let config = GuildConfig::default();
                save_record(self.store.as_ref(), Domain::Config, key, &config).await?;
                tracing::debug!(guild_id, "Created default guild config");
                config
            }
        };
        self.snapshots.insert(guild_id, config.clone());
        Ok(config)
    }
}
