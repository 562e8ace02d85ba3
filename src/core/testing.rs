// Recording Platform double shared by the engine tests.

use crate::core::audit::AuditEntry;
use crate::core::leveling::LevelUpEvent;
use crate::core::panels::{PanelDefinition, TriggerKey};
use crate::core::platform::{Platform, PlatformError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One successful outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DeleteMessage { channel_id: u64, message_id: u64 },
    DirectNotice { user_id: u64, text: String },
    ChannelMessage { channel_id: u64, text: String },
    Audit { channel_id: u64, entry: AuditEntry },
    LevelUp { channel_id: Option<u64>, event: LevelUpEvent },
    GrantRole { guild_id: u64, user_id: u64, role_id: u64 },
    RevokeRole { guild_id: u64, user_id: u64, role_id: u64 },
    Ban { guild_id: u64, user_id: u64, reason: String },
    Unban { guild_id: u64, user_id: u64 },
    Kick { guild_id: u64, user_id: u64, reason: String },
    Timeout { guild_id: u64, user_id: u64, until: DateTime<Utc>, reason: String },
    ClearTimeout { guild_id: u64, user_id: u64 },
    Render { channel_id: u64, message_id: u64, panel: PanelDefinition },
    AddReaction { channel_id: u64, message_id: u64, trigger: TriggerKey },
}

#[derive(Default)]
pub struct MockPlatform {
    calls: Mutex<Vec<Call>>,
    /// (guild, user, role)
    roles: Mutex<HashSet<(u64, u64, u64)>>,
    /// message -> (guild, channel)
    messages: Mutex<HashMap<u64, (u64, u64)>>,
    banned_names: Mutex<HashMap<String, u64>>,
    reject_bans: AtomicBool,
    reject_roles: AtomicBool,
    reject_notices: AtomicBool,
    reject_moderation: AtomicBool,
}

fn forbidden(what: &str) -> PlatformError {
    PlatformError::Forbidden(format!("mock refused {}", what))
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn audit_titles(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Audit { entry, .. } => Some(entry.title),
                _ => None,
            })
            .collect()
    }

    pub fn notices_to(&self, user_id: u64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DirectNotice { user_id: to, text } if to == user_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn ban_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Ban { .. })).count()
    }

    pub fn level_up_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::LevelUp { .. })).count()
    }

    pub fn render_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Render { .. })).count()
    }

    pub fn last_render(&self, message_id: u64) -> Option<PanelDefinition> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Call::Render { message_id: id, panel, .. } if id == message_id => Some(panel),
            _ => None,
        })
    }

    pub fn holds_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> bool {
        self.roles.lock().unwrap().contains(&(guild_id, user_id, role_id))
    }

    pub fn add_message(&self, guild_id: u64, channel_id: u64, message_id: u64) {
        self.messages.lock().unwrap().insert(message_id, (guild_id, channel_id));
    }

    pub fn remove_message(&self, message_id: u64) {
        self.messages.lock().unwrap().remove(&message_id);
    }

    pub fn add_banned_user(&self, name: &str, user_id: u64) {
        self.banned_names.lock().unwrap().insert(name.to_string(), user_id);
    }

    pub fn reject_bans(&self, reject: bool) {
        self.reject_bans.store(reject, Ordering::SeqCst);
    }

    pub fn reject_roles(&self, reject: bool) {
        self.reject_roles.store(reject, Ordering::SeqCst);
    }

    pub fn reject_notices(&self, reject: bool) {
        self.reject_notices.store(reject, Ordering::SeqCst);
    }

    /// Refuse timeouts, kicks and unbans.
    pub fn reject_moderation(&self, reject: bool) {
        self.reject_moderation.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn guild_name(&self, _guild_id: u64) -> Option<String> {
        Some("Test Guild".to_string())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        self.push(Call::DeleteMessage { channel_id, message_id });
        Ok(())
    }

    async fn send_direct_notice(&self, user_id: u64, text: &str) -> Result<(), PlatformError> {
        if self.reject_notices.load(Ordering::SeqCst) {
            return Err(forbidden("direct message"));
        }
        self.push(Call::DirectNotice {
            user_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), PlatformError> {
        self.push(Call::ChannelMessage {
            channel_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn post_audit_entry(&self, channel_id: u64, entry: &AuditEntry) -> Result<(), PlatformError> {
        self.push(Call::Audit {
            channel_id,
            entry: entry.clone(),
        });
        Ok(())
    }

    async fn announce_level_up(&self, channel_id: Option<u64>, event: &LevelUpEvent) -> Result<(), PlatformError> {
        self.push(Call::LevelUp {
            channel_id,
            event: event.clone(),
        });
        Ok(())
    }

    async fn member_has_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<bool, PlatformError> {
        Ok(self.holds_role(guild_id, user_id, role_id))
    }

    async fn grant_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<(), PlatformError> {
        if self.reject_roles.load(Ordering::SeqCst) {
            return Err(forbidden("role grant"));
        }
        self.roles.lock().unwrap().insert((guild_id, user_id, role_id));
        self.push(Call::GrantRole {
            guild_id,
            user_id,
            role_id,
        });
        Ok(())
    }

    async fn revoke_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<(), PlatformError> {
        if self.reject_roles.load(Ordering::SeqCst) {
            return Err(forbidden("role revoke"));
        }
        self.roles.lock().unwrap().remove(&(guild_id, user_id, role_id));
        self.push(Call::RevokeRole {
            guild_id,
            user_id,
            role_id,
        });
        Ok(())
    }

    async fn ban_user(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        if self.reject_bans.load(Ordering::SeqCst) {
            return Err(forbidden("ban"));
        }
        self.push(Call::Ban {
            guild_id,
            user_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn unban_user(&self, guild_id: u64, user_id: u64) -> Result<(), PlatformError> {
        if self.reject_moderation.load(Ordering::SeqCst) {
            return Err(forbidden("unban"));
        }
        self.push(Call::Unban { guild_id, user_id });
        Ok(())
    }

    async fn find_banned_user(&self, _guild_id: u64, name: &str) -> Result<Option<u64>, PlatformError> {
        Ok(self.banned_names.lock().unwrap().get(name).copied())
    }

    async fn kick_user(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError> {
        if self.reject_moderation.load(Ordering::SeqCst) {
            return Err(forbidden("kick"));
        }
        self.push(Call::Kick {
            guild_id,
            user_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError> {
        if self.reject_moderation.load(Ordering::SeqCst) {
            return Err(forbidden("timeout"));
        }
        self.push(Call::Timeout {
            guild_id,
            user_id,
            until,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn clear_timeout(&self, guild_id: u64, user_id: u64) -> Result<(), PlatformError> {
        if self.reject_moderation.load(Ordering::SeqCst) {
            return Err(forbidden("timeout removal"));
        }
        self.push(Call::ClearTimeout { guild_id, user_id });
        Ok(())
    }

    async fn locate_message(
        &self,
        guild_id: u64,
        _channel_hint: Option<u64>,
        message_id: u64,
    ) -> Result<Option<u64>, PlatformError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&message_id)
            .filter(|(guild, _)| *guild == guild_id)
            .map(|(_, channel)| *channel))
    }

    async fn render_panel_controls(
        &self,
        channel_id: u64,
        message_id: u64,
        panel: &PanelDefinition,
    ) -> Result<(), PlatformError> {
        self.push(Call::Render {
            channel_id,
            message_id,
            panel: panel.clone(),
        });
        Ok(())
    }

    async fn add_reaction(&self, channel_id: u64, message_id: u64, trigger: &TriggerKey) -> Result<(), PlatformError> {
        self.push(Call::AddReaction {
            channel_id,
            message_id,
            trigger: trigger.clone(),
        });
        Ok(())
    }
}
