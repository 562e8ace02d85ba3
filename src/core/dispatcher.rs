// Dispatcher - routes platform events to the engines.
//
// Per message the order is fixed: content filter first, and only a message
// that survives it reaches progression. Toggle events skip the filter and go
// straight to the panel service.

use crate::core::audit::{AuditEntry, AuditKind, Auditor};
use crate::core::config::ConfigService;
use crate::core::leveling::{Award, LevelingError, LevelingService};
use crate::core::moderation::{ContentFilter, FilterReason, FilterVerdict, ModerationService};
use crate::core::panels::{PanelError, PanelService, ReconcileSummary, ToggleOutcome, TriggerKey};
use crate::core::platform::{best_effort, display_guild, Platform};
use crate::core::store::StateStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A message as the platform delivered it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// `None` for direct messages.
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    /// Bots, webhooks and this service itself.
    pub author_is_automated: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    Ignored,
    Filtered(FilterReason),
    /// Survived the filter. `award` is `None` while on cooldown.
    Passed { award: Option<Award> },
}

pub struct Dispatcher<S: StateStore, P: Platform> {
    pub config: Arc<ConfigService<S>>,
    pub auditor: Arc<Auditor<S, P>>,
    pub filter: Arc<ContentFilter>,
    pub moderation: Arc<ModerationService<S, P>>,
    pub leveling: Arc<LevelingService<S, P>>,
    pub panels: Arc<PanelService<S, P>>,
    platform: Arc<P>,
}

impl<S: StateStore, P: Platform> Dispatcher<S, P> {
    /// Wire every engine over one store and one platform.
    pub fn new(store: Arc<S>, platform: Arc<P>) -> Self {
        let config = Arc::new(ConfigService::new(Arc::clone(&store)));
        let auditor = Arc::new(Auditor::new(Arc::clone(&config), Arc::clone(&platform)));

        Self {
            moderation: Arc::new(ModerationService::new(
                Arc::clone(&store),
                Arc::clone(&platform),
                Arc::clone(&auditor),
            )),
            leveling: Arc::new(LevelingService::new(
                Arc::clone(&store),
                Arc::clone(&platform),
                Arc::clone(&auditor),
            )),
            panels: Arc::new(PanelService::new(store, Arc::clone(&platform), Arc::clone(&auditor))),
            filter: Arc::new(ContentFilter::new()),
            config,
            auditor,
            platform,
        }
    }

    pub async fn on_message(&self, message: &InboundMessage) -> MessageDisposition {
        if message.author_is_automated {
            return MessageDisposition::Ignored;
        }
        let Some(guild_id) = message.guild_id else {
            return MessageDisposition::Ignored;
        };

        let config = match self.config.get(guild_id).await {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(guild_id, error = %err, "Could not load guild config; message skipped");
                return MessageDisposition::Ignored;
            }
        };

        let verdict = self.filter.classify(
            guild_id,
            message.author_id,
            &message.content,
            message.timestamp,
            &config.filters,
        );
        if let FilterVerdict::Reject(reason) = verdict {
            self.reject(guild_id, message, reason).await;
            return MessageDisposition::Filtered(reason);
        }

        match self
            .leveling
            .award_message(guild_id, message.author_id, message.timestamp, &config)
            .await
        {
            Ok(award) => MessageDisposition::Passed { award: Some(award) },
            Err(LevelingError::OnCooldown(_)) => MessageDisposition::Passed { award: None },
            Err(err) => {
                tracing::warn!(guild_id, user_id = message.author_id, error = %err, "XP award failed");
                MessageDisposition::Passed { award: None }
            }
        }
    }

    async fn reject(&self, guild_id: u64, message: &InboundMessage, reason: FilterReason) {
        tracing::info!(guild_id, user_id = message.author_id, %reason, "Message filtered");

        best_effort(
            "filter_delete",
            guild_id,
            self.platform
                .delete_message(message.channel_id, message.message_id)
                .await,
        );
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Warning,
                format!("Filtered: {}", reason),
                reason.audit_text(message.author_id),
            ))
            .await;
        best_effort(
            "filter_notice",
            guild_id,
            self.platform
                .send_direct_notice(
                    message.author_id,
                    &reason.notice_text(&display_guild(self.platform.as_ref(), guild_id)),
                )
                .await,
        );
    }

    /// Button press on a role panel.
    pub async fn on_toggle(
        &self,
        guild_id: u64,
        user_id: u64,
        message_id: u64,
        trigger: &TriggerKey,
    ) -> Result<ToggleOutcome, PanelError> {
        self.panels.toggle(guild_id, message_id, trigger, user_id).await
    }

    /// Raw reaction add or remove. Failures are logged, never surfaced.
    pub async fn on_reaction(
        &self,
        guild_id: u64,
        user_id: u64,
        message_id: u64,
        emoji: &str,
        added: bool,
    ) -> Option<ToggleOutcome> {
        let trigger = TriggerKey::parse(emoji)?;
        match self
            .panels
            .apply_reaction(guild_id, message_id, &trigger, user_id, added)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(guild_id, user_id, message_id, error = %err, "Reaction role change failed");
                None
            }
        }
    }

    pub async fn on_member_join(&self, guild_id: u64, user_id: u64, user_name: &str) {
        let config = match self.config.get(guild_id).await {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(guild_id, error = %err, "Could not load guild config for join");
                return;
            }
        };
        let server = display_guild(self.platform.as_ref(), guild_id);

        if let Some(channel_id) = config.welcome_channel {
            best_effort(
                "welcome_message",
                guild_id,
                self.platform
                    .send_channel_message(channel_id, &format!("🎉 Welcome <@{}> to **{}**!", user_id, server))
                    .await,
            );
        }

        best_effort(
            "welcome_dm",
            guild_id,
            self.platform
                .send_direct_notice(user_id, &config.render_welcome_dm(user_name, &server))
                .await,
        );

        if let Some(role_id) = config.auto_role {
            best_effort(
                "auto_role",
                guild_id,
                self.platform.grant_role(guild_id, user_id, role_id).await,
            );
        }

        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Info,
                "Member Joined",
                format!("✅ Member joined: {} (<@{}>)", user_name, user_id),
            ))
            .await;
    }

    pub async fn on_member_remove(&self, guild_id: u64, user_id: u64, user_name: &str) {
        let config = match self.config.get(guild_id).await {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(guild_id, error = %err, "Could not load guild config for leave");
                return;
            }
        };

        if let Some(channel_id) = config.goodbye_channel {
            best_effort(
                "goodbye_message",
                guild_id,
                self.platform
                    .send_channel_message(channel_id, &format!("👋 {} has left the server.", user_name))
                    .await,
            );
        }

        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Info,
                "Member Left",
                format!("❌ Member left: {} ({})", user_name, user_id),
            ))
            .await;
    }

    /// Startup recovery. A failure to list panels is logged and swallowed.
    pub async fn on_ready(&self) -> ReconcileSummary {
        match self.panels.reconcile_on_startup().await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::error!(error = %err, "Panel reconcile could not start");
                ReconcileSummary::default()
            }
        }
    }

    /// Drop expired spam windows and cooldowns.
    pub fn sweep_ephemeral(&self, now: DateTime<Utc>) {
        self.filter.sweep(now);
        self.leveling.sweep(now);
    }
}
