// Serenity implementation of the core Platform port.
//
// Every call is a thin translation: primitive IDs in, serenity builders out,
// serenity errors mapped onto PlatformError so the core can tell a refused
// action (403) from a missing target (404).

use crate::core::audit::AuditEntry;
use crate::core::leveling::LevelUpEvent;
use crate::core::panels::{control_id, PanelDefinition, TriggerKey, MAX_BUTTONS};
use crate::core::platform::{Platform, PlatformError};
use crate::discord::formatter::audit_embed;
use crate::discord::leveling_announcements::level_up_embed;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{self as serenity, CreateMessage};
use std::sync::Arc;

/// Buttons per row are fixed by Discord.
const BUTTONS_PER_ROW: usize = 5;

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        Self { http, cache }
    }
}

fn map_err(err: serenity::Error) -> PlatformError {
    match &err {
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response)) => {
            match response.status_code.as_u16() {
                403 => PlatformError::Forbidden(response.error.message.clone()),
                404 => PlatformError::NotFound(response.error.message.clone()),
                _ => PlatformError::Other(err.to_string()),
            }
        }
        // Cache-side checks (hierarchy, missing permissions) fail before any request.
        serenity::Error::Model(_) => PlatformError::Forbidden(err.to_string()),
        _ => PlatformError::Other(err.to_string()),
    }
}

/// Platform reaction -> trigger key, matching how keys are stored.
pub fn trigger_from_reaction(reaction: &serenity::ReactionType) -> Option<TriggerKey> {
    match reaction {
        serenity::ReactionType::Unicode(value) => TriggerKey::parse(value),
        serenity::ReactionType::Custom { animated, id, name } => TriggerKey::parse(&format!(
            "<{}:{}:{}>",
            if *animated { "a" } else { "" },
            name.as_deref().unwrap_or("_"),
            id.get()
        )),
        _ => None,
    }
}

/// Trigger key -> platform reaction. Labels have no reaction form.
pub fn reaction_from_trigger(trigger: &TriggerKey) -> Option<serenity::ReactionType> {
    let TriggerKey::Emoji(value) = trigger else {
        return None;
    };

    let Some(inner) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) else {
        return Some(serenity::ReactionType::Unicode(value.clone()));
    };
    let (animated, rest) = match inner.strip_prefix('a') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let mut parts = rest.trim_start_matches(':').splitn(2, ':');
    let name = parts.next()?.to_string();
    let id: u64 = parts.next()?.parse().ok()?;
    if id == 0 {
        return None;
    }
    Some(serenity::ReactionType::Custom {
        animated,
        id: serenity::EmojiId::new(id),
        name: Some(name),
    })
}

fn panel_components(message_id: u64, panel: &PanelDefinition) -> Vec<serenity::CreateActionRow> {
    let buttons: Vec<serenity::CreateButton> = panel
        .triggers()
        .take(MAX_BUTTONS)
        .map(|(trigger, _)| {
            let button = serenity::CreateButton::new(control_id(message_id, &trigger))
                .style(serenity::ButtonStyle::Secondary);
            match reaction_from_trigger(&trigger) {
                Some(emoji) => button.emoji(emoji),
                None => button.label(trigger.canonical()),
            }
        })
        .collect();

    buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| serenity::CreateActionRow::Buttons(row.to_vec()))
        .collect()
}

#[async_trait]
impl Platform for SerenityPlatform {
    fn guild_name(&self, guild_id: u64) -> Option<String> {
        self.cache
            .guild(serenity::GuildId::new(guild_id))
            .map(|guild| guild.name.clone())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(map_err)
    }

    async fn send_direct_notice(&self, user_id: u64, text: &str) -> Result<(), PlatformError> {
        serenity::UserId::new(user_id)
            .direct_message(&self.http, CreateMessage::new().content(text))
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn post_audit_entry(&self, channel_id: u64, entry: &AuditEntry) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().embed(audit_embed(entry)))
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn announce_level_up(&self, channel_id: Option<u64>, event: &LevelUpEvent) -> Result<(), PlatformError> {
        let target = channel_id.map(serenity::ChannelId::new).or_else(|| {
            self.cache
                .guild(serenity::GuildId::new(event.guild_id))
                .and_then(|guild| guild.system_channel_id)
        });

        let Some(channel) = target else {
            tracing::debug!(guild_id = event.guild_id, "No channel for level-up announcement");
            return Ok(());
        };

        channel
            .send_message(&self.http, CreateMessage::new().embed(level_up_embed(event)))
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn member_has_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<bool, PlatformError> {
        // Always ask the API; the member cache can lag behind our own grants.
        let member = self
            .http
            .get_member(serenity::GuildId::new(guild_id), serenity::UserId::new(user_id))
            .await
            .map_err(map_err)?;
        Ok(member.roles.contains(&serenity::RoleId::new(role_id)))
    }

    async fn grant_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<(), PlatformError> {
        self.http
            .add_member_role(
                serenity::GuildId::new(guild_id),
                serenity::UserId::new(user_id),
                serenity::RoleId::new(role_id),
                None,
            )
            .await
            .map_err(map_err)
    }

    async fn revoke_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<(), PlatformError> {
        self.http
            .remove_member_role(
                serenity::GuildId::new(guild_id),
                serenity::UserId::new(user_id),
                serenity::RoleId::new(role_id),
                None,
            )
            .await
            .map_err(map_err)
    }

    async fn ban_user(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError> {
        serenity::GuildId::new(guild_id)
            .ban_with_reason(&self.http, serenity::UserId::new(user_id), 0, reason)
            .await
            .map_err(map_err)
    }

    async fn unban_user(&self, guild_id: u64, user_id: u64) -> Result<(), PlatformError> {
        serenity::GuildId::new(guild_id)
            .unban(&self.http, serenity::UserId::new(user_id))
            .await
            .map_err(map_err)
    }

    async fn find_banned_user(&self, guild_id: u64, name: &str) -> Result<Option<u64>, PlatformError> {
        let bans = serenity::GuildId::new(guild_id)
            .bans(&self.http, None, None)
            .await
            .map_err(map_err)?;

        Ok(bans
            .iter()
            .find(|ban| ban.user.name == name || ban.user.tag() == name)
            .map(|ban| ban.user.id.get()))
    }

    async fn kick_user(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError> {
        serenity::GuildId::new(guild_id)
            .kick_with_reason(&self.http, serenity::UserId::new(user_id), reason)
            .await
            .map_err(map_err)
    }

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let timeout_until = serenity::Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|e| PlatformError::Other(format!("invalid timeout timestamp: {}", e)))?;

        serenity::GuildId::new(guild_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(user_id),
                serenity::EditMember::new()
                    .disable_communication_until_datetime(timeout_until)
                    .audit_log_reason(reason),
            )
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn clear_timeout(&self, guild_id: u64, user_id: u64) -> Result<(), PlatformError> {
        serenity::GuildId::new(guild_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(user_id),
                serenity::EditMember::new().enable_communication(),
            )
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn locate_message(
        &self,
        guild_id: u64,
        channel_hint: Option<u64>,
        message_id: u64,
    ) -> Result<Option<u64>, PlatformError> {
        let message = serenity::MessageId::new(message_id);

        if let Some(hint) = channel_hint {
            if serenity::ChannelId::new(hint).message(&self.http, message).await.is_ok() {
                return Ok(Some(hint));
            }
        }

        let channels = serenity::GuildId::new(guild_id)
            .channels(&self.http)
            .await
            .map_err(map_err)?;

        for (channel_id, channel) in channels {
            if Some(channel_id.get()) == channel_hint {
                continue;
            }
            if !matches!(channel.kind, serenity::ChannelType::Text | serenity::ChannelType::News) {
                continue;
            }
            // Channels we cannot read just fail here; keep scanning.
            if channel_id.message(&self.http, message).await.is_ok() {
                return Ok(Some(channel_id.get()));
            }
        }

        Ok(None)
    }

    async fn render_panel_controls(
        &self,
        channel_id: u64,
        message_id: u64,
        panel: &PanelDefinition,
    ) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .edit_message(
                &self.http,
                serenity::MessageId::new(message_id),
                serenity::EditMessage::new().components(panel_components(message_id, panel)),
            )
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn add_reaction(&self, channel_id: u64, message_id: u64, trigger: &TriggerKey) -> Result<(), PlatformError> {
        let reaction = reaction_from_trigger(trigger)
            .ok_or_else(|| PlatformError::Other(format!("`{}` cannot be used as a reaction", trigger)))?;

        serenity::ChannelId::new(channel_id)
            .create_reaction(&self.http, serenity::MessageId::new(message_id), reaction)
            .await
            .map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_emoji_convert_both_ways() {
        let trigger = TriggerKey::parse("<a:party:123>").unwrap();
        let reaction = reaction_from_trigger(&trigger).unwrap();
        assert_eq!(trigger_from_reaction(&reaction), Some(trigger));

        let label = TriggerKey::parse("Gamer").unwrap();
        assert!(reaction_from_trigger(&label).is_none());
    }

    #[test]
    fn panels_render_at_most_five_per_row() {
        let mut panel = PanelDefinition::new(1, Some(2), crate::core::panels::PanelKind::Button);
        for (i, emoji) in ["🍎", "🍌", "🍒", "🍇", "🍉", "🍋", "🍍"].iter().enumerate() {
            panel.roles.insert(emoji.to_string(), i as u64 + 1);
        }
        assert_eq!(panel_components(3, &panel).len(), 2);
    }
}
