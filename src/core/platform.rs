// Outbound port to the hosting chat platform.
//
// The core never talks to Discord directly. Every side effect it needs (role
// changes, deletions, notices, bans, panel rendering) goes through this trait
// so the engines can be exercised against a recording mock in tests.

use crate::core::audit::AuditEntry;
use crate::core::leveling::LevelUpEvent;
use crate::core::panels::{PanelDefinition, TriggerKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The platform refused the action (missing permission, role hierarchy).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Platform error: {0}")]
    Other(String),
}

// ============================================================================
// PLATFORM TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait Platform: Send + Sync {
    /// Cached guild name for notice texts. `None` if the guild is unknown.
    fn guild_name(&self, guild_id: u64) -> Option<String>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError>;

    async fn send_direct_notice(&self, user_id: u64, text: &str) -> Result<(), PlatformError>;

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), PlatformError>;

    async fn post_audit_entry(&self, channel_id: u64, entry: &AuditEntry) -> Result<(), PlatformError>;

    /// Announce a level-up, in `channel_id` if given, otherwise wherever the
    /// platform considers the guild's default announcement channel.
    async fn announce_level_up(
        &self,
        channel_id: Option<u64>,
        event: &LevelUpEvent,
    ) -> Result<(), PlatformError>;

    async fn member_has_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<bool, PlatformError>;

    async fn grant_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<(), PlatformError>;

    async fn revoke_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<(), PlatformError>;

    async fn ban_user(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError>;

    async fn unban_user(&self, guild_id: u64, user_id: u64) -> Result<(), PlatformError>;

    /// Find a banned user by `name` or `name#discriminator`.
    async fn find_banned_user(&self, guild_id: u64, name: &str) -> Result<Option<u64>, PlatformError>;

    async fn kick_user(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError>;

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn clear_timeout(&self, guild_id: u64, user_id: u64) -> Result<(), PlatformError>;

    /// Locate a message in a guild, trying `channel_hint` first.
    /// Returns the channel it lives in, or `None` when it no longer exists.
    async fn locate_message(
        &self,
        guild_id: u64,
        channel_hint: Option<u64>,
        message_id: u64,
    ) -> Result<Option<u64>, PlatformError>;

    /// Replace the interactive controls of a panel message with ones built
    /// from the full mapping in `panel`.
    async fn render_panel_controls(
        &self,
        channel_id: u64,
        message_id: u64,
        panel: &PanelDefinition,
    ) -> Result<(), PlatformError>;

    async fn add_reaction(&self, channel_id: u64, message_id: u64, trigger: &TriggerKey) -> Result<(), PlatformError>;
}

// ============================================================================
// BEST-EFFORT HELPERS
// ============================================================================

/// Swallow the failure of a fire-and-forget side effect, leaving a trace.
///
/// Returns whether the effect went through so callers can report it.
pub fn best_effort(action: &'static str, guild_id: u64, result: Result<(), PlatformError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(action, guild_id, error = %err, "Best-effort platform call failed");
            false
        }
    }
}

/// Guild name for user-facing notices.
pub fn display_guild<P: Platform + ?Sized>(platform: &P, guild_id: u64) -> String {
    platform
        .guild_name(guild_id)
        .unwrap_or_else(|| "the server".to_string())
}
