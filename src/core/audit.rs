// Audit trail: human-readable entries posted to a guild's log channel.
//
// Posting is best-effort. A guild without a log channel simply drops entries;
// a failed post is logged and never affects the operation that produced it.

use crate::core::config::ConfigService;
use crate::core::platform::{best_effort, Platform};
use crate::core::store::StateStore;
use std::sync::Arc;

/// Severity of an audit entry; the Discord layer maps it onto an embed colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Info,
    Warning,
    Punishment,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub guild_id: u64,
    pub kind: AuditKind,
    pub title: String,
    pub text: String,
}

impl AuditEntry {
    pub fn new(guild_id: u64, kind: AuditKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            guild_id,
            kind,
            title: title.into(),
            text: text.into(),
        }
    }
}

pub struct Auditor<S: StateStore, P: Platform> {
    config: Arc<ConfigService<S>>,
    platform: Arc<P>,
}

impl<S: StateStore, P: Platform> Auditor<S, P> {
    pub fn new(config: Arc<ConfigService<S>>, platform: Arc<P>) -> Self {
        Self { config, platform }
    }

    /// Post an entry to the guild's configured log channel.
    pub async fn record(&self, entry: AuditEntry) {
        let guild_id = entry.guild_id;
        let log_channel = match self.config.get(guild_id).await {
            Ok(config) => config.log_channel,
            Err(err) => {
                tracing::warn!(guild_id, error = %err, "Could not read config for audit entry");
                None
            }
        };

        let Some(channel_id) = log_channel else {
            tracing::debug!(guild_id, title = %entry.title, "No log channel; audit entry dropped");
            return;
        };

        best_effort(
            "post_audit_entry",
            guild_id,
            self.platform.post_audit_entry(channel_id, &entry).await,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigField;
    use crate::core::testing::{Call, MockPlatform};
    use crate::infra::store::InMemoryStateStore;

    #[tokio::test]
    async fn entries_go_to_the_log_channel() {
        let store = Arc::new(InMemoryStateStore::new());
        let config = Arc::new(ConfigService::new(store));
        let platform = Arc::new(MockPlatform::new());
        let auditor = Auditor::new(Arc::clone(&config), Arc::clone(&platform));

        auditor
            .record(AuditEntry::new(1, AuditKind::Info, "Dropped", "no channel yet"))
            .await;
        assert!(platform.calls().is_empty());

        config.set_field(1, ConfigField::LogChannel(Some(500))).await.unwrap();
        auditor
            .record(AuditEntry::new(1, AuditKind::Info, "Posted", "text"))
            .await;

        assert_eq!(platform.audit_titles(), vec!["Posted".to_string()]);
        assert!(matches!(platform.calls()[0], Call::Audit { channel_id: 500, .. }));
    }
}
