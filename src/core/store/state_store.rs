// The state store is the single source of truth for every durable record.
// Engines never hold documents across a suspension point; they load, modify a
// copy, and write it back while holding the matching key lock.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record key: {0}")]
    InvalidKey(String),
}

// ============================================================================
// DOMAINS
// ============================================================================

/// Logical collections of records. Each one is stored separately so that an
/// inspection or migration tool can walk them independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Config,
    Warnings,
    Timeouts,
    Xp,
    Panels,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Config,
        Domain::Warnings,
        Domain::Timeouts,
        Domain::Xp,
        Domain::Panels,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Config => "config",
            Domain::Warnings => "warnings",
            Domain::Timeouts => "timeouts",
            Domain::Xp => "xp",
            Domain::Panels => "panels",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Durable key-value document persistence, one collection per [`Domain`].
///
/// `get` and `put` are atomic with respect to other operations on the same
/// `(domain, key)` pair. Operations on different keys never block each other.
/// Documents are opaque; the store does not interpret them.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a document. `Ok(None)` means the record has never been written.
    async fn get(&self, domain: Domain, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace a document. On failure the previous document stays in place.
    async fn put(&self, domain: Domain, key: &str, document: Value) -> Result<(), StoreError>;

    /// List every key currently stored in a domain.
    async fn keys(&self, domain: Domain) -> Result<Vec<String>, StoreError>;
}

/// Key for records that belong to a (guild, user) pair.
pub fn member_key(guild_id: u64, user_id: u64) -> String {
    format!("{}-{}", guild_id, user_id)
}

/// Split a [`member_key`] back into its parts.
pub fn parse_member_key(key: &str) -> Option<(u64, u64)> {
    let (guild, user) = key.split_once('-')?;
    Some((guild.parse().ok()?, user.parse().ok()?))
}

/// Keys become file names in the JSON store, so only a safe alphabet is allowed.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Load a typed record, falling back to its default when it does not exist yet.
pub async fn load_record<T, S>(store: &S, domain: Domain, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
    S: StateStore + ?Sized,
{
    match store.get(domain, key).await? {
        Some(document) => Ok(serde_json::from_value(document)?),
        None => Ok(T::default()),
    }
}

/// Load a typed record that must already exist.
pub async fn find_record<T, S>(store: &S, domain: Domain, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    S: StateStore + ?Sized,
{
    match store.get(domain, key).await? {
        Some(document) => Ok(Some(serde_json::from_value(document)?)),
        None => Ok(None),
    }
}

/// Serialize and write a typed record.
pub async fn save_record<T, S>(
    store: &S,
    domain: Domain,
    key: &str,
    record: &T,
) -> Result<(), StoreError>
where
    T: Serialize + Sync,
    S: StateStore + ?Sized,
{
    let document = serde_json::to_value(record)?;
    store.put(domain, key, document).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_keys_round_trip() {
        let key = member_key(42, 7);
        assert_eq!(key, "42-7");
        assert_eq!(parse_member_key(&key), Some((42, 7)));
        assert_eq!(parse_member_key("nonsense"), None);
    }

    #[test]
    fn keys_outside_the_safe_alphabet_are_rejected() {
        assert!(validate_key("123-456").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("").is_err());
    }
}
