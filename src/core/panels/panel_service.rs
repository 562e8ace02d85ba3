// Panel reconciler - keeps persisted (panel -> trigger -> role) mappings in
// sync with toggle events and with the rendered controls after a restart.
//
// Rendering always starts from the full persisted mapping, never from a diff,
// and happens inside the panel's exclusive section. Whichever addMapping runs
// last therefore also renders last, and the visible panel matches storage.

use super::panel_models::*;
use crate::core::audit::{AuditEntry, AuditKind, Auditor};
use crate::core::platform::{best_effort, Platform, PlatformError};
use crate::core::store::{find_record, save_record, Domain, KeyedLocks, StateStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing permission: {0}")]
    Permission(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(String),
}

impl From<PlatformError> for PanelError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Forbidden(msg) => PanelError::Permission(msg),
            PlatformError::NotFound(msg) => PanelError::Validation(msg),
            PlatformError::Other(msg) => PanelError::Platform(msg),
        }
    }
}

pub struct PanelService<S: StateStore, P: Platform> {
    store: Arc<S>,
    platform: Arc<P>,
    auditor: Arc<Auditor<S, P>>,
    /// Keyed by panel message ID.
    panel_locks: KeyedLocks,
    /// Keyed by `<message>-<user>` so a double-delivered toggle flips twice
    /// instead of racing on the membership check.
    toggle_locks: KeyedLocks,
}

impl<S: StateStore, P: Platform> PanelService<S, P> {
    pub fn new(store: Arc<S>, platform: Arc<P>, auditor: Arc<Auditor<S, P>>) -> Self {
        Self {
            store,
            platform,
            auditor,
            panel_locks: KeyedLocks::new(),
            toggle_locks: KeyedLocks::new(),
        }
    }

    async fn load(&self, message_id: u64) -> Result<Option<PanelDefinition>, PanelError> {
        Ok(find_record(self.store.as_ref(), Domain::Panels, &message_id.to_string()).await?)
    }

    async fn require(&self, guild_id: u64, message_id: u64) -> Result<PanelDefinition, PanelError> {
        match self.load(message_id).await? {
            Some(panel) if panel.guild_id == guild_id => Ok(panel),
            _ => Err(PanelError::Validation(format!(
                "Message {} is not a role panel in this server.",
                message_id
            ))),
        }
    }

    pub async fn get(&self, message_id: u64) -> Result<Option<PanelDefinition>, PanelError> {
        self.load(message_id).await
    }

    /// Register an empty panel for a freshly posted message.
    pub async fn create_panel(
        &self,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
        kind: PanelKind,
    ) -> Result<PanelDefinition, PanelError> {
        let key = message_id.to_string();
        let _guard = self.panel_locks.acquire(Domain::Panels, &key).await;

        if self.load(message_id).await?.is_some() {
            return Err(PanelError::Validation(format!(
                "Message {} already has a panel.",
                message_id
            )));
        }

        let panel = PanelDefinition::new(guild_id, Some(channel_id), kind);
        save_record(self.store.as_ref(), Domain::Panels, &key, &panel).await?;

        tracing::info!(guild_id, message_id, kind = %kind, "Panel created");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Info,
                "Role Panel Created",
                format!("🧩 {} panel created in <#{}>", kind, channel_id),
            ))
            .await;
        Ok(panel)
    }

    /// Insert or overwrite one mapping, then bring the message in line.
    pub async fn add_mapping(
        &self,
        guild_id: u64,
        message_id: u64,
        trigger: &TriggerKey,
        role_id: u64,
    ) -> Result<MappingOutcome, PanelError> {
        let key = message_id.to_string();
        let _guard = self.panel_locks.acquire(Domain::Panels, &key).await;

        let mut panel = self.require(guild_id, message_id).await?;
        if panel.kind == PanelKind::Reaction && !trigger.is_emoji() {
            return Err(PanelError::Validation(format!(
                "`{}` is not an emoji; reaction panels need emoji triggers.",
                trigger
            )));
        }

        Self::check_fits(&panel, message_id, trigger)?;

        let replaced = panel.roles.insert(trigger.canonical().to_string(), role_id);
        save_record(self.store.as_ref(), Domain::Panels, &key, &panel).await?;
        tracing::info!(guild_id, message_id, trigger = %trigger, role_id, "Panel mapping saved");

        let rendered = match self.resolve_channel(&mut panel, &key, message_id).await {
            Some(channel_id) => match panel.kind {
                PanelKind::Button => best_effort(
                    "render_panel_controls",
                    guild_id,
                    self.platform
                        .render_panel_controls(channel_id, message_id, &panel)
                        .await,
                ),
                PanelKind::Reaction => best_effort(
                    "add_reaction",
                    guild_id,
                    self.platform.add_reaction(channel_id, message_id, trigger).await,
                ),
            },
            None => {
                tracing::warn!(guild_id, message_id, "Panel message not found; mapping saved without rendering");
                false
            }
        };

        Ok(MappingOutcome {
            panel,
            replaced,
            rendered,
        })
    }

    // Platform limits on controls per message and on control ids.
    fn check_fits(panel: &PanelDefinition, message_id: u64, trigger: &TriggerKey) -> Result<(), PanelError> {
        if !panel.roles.contains_key(trigger.canonical()) && panel.roles.len() >= panel.kind.capacity() {
            return Err(PanelError::Validation(format!(
                "A {} panel holds at most {} roles.",
                panel.kind,
                panel.kind.capacity()
            )));
        }

        if let TriggerKey::Label(label) = trigger {
            if label.chars().count() > MAX_LABEL_CHARS {
                return Err(PanelError::Validation(format!(
                    "Button labels can be at most {} characters.",
                    MAX_LABEL_CHARS
                )));
            }
        }

        if panel.kind == PanelKind::Button && control_id(message_id, trigger).chars().count() > MAX_CONTROL_ID_CHARS {
            return Err(PanelError::Validation(format!("`{}` is too long for a button.", trigger)));
        }
        Ok(())
    }

    // Caller must hold the panel lock. Uses the stored hint, then asks the
    // platform to search, writing back a changed channel.
    async fn resolve_channel(&self, panel: &mut PanelDefinition, key: &str, message_id: u64) -> Option<u64> {
        let found = match self
            .platform
            .locate_message(panel.guild_id, panel.channel_id, message_id)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(guild_id = panel.guild_id, message_id, error = %err, "Could not locate panel message");
                return None;
            }
        };

        if let Some(channel_id) = found {
            if panel.channel_id != Some(channel_id) {
                panel.channel_id = Some(channel_id);
                if let Err(err) = save_record(self.store.as_ref(), Domain::Panels, key, &*panel).await {
                    tracing::warn!(message_id, error = %err, "Could not persist panel channel hint");
                }
            }
        }
        found
    }

    /// Flip the member's role for `trigger`: revoke if held, grant otherwise.
    pub async fn toggle(
        &self,
        guild_id: u64,
        message_id: u64,
        trigger: &TriggerKey,
        user_id: u64,
    ) -> Result<ToggleOutcome, PanelError> {
        let panel = self.require(guild_id, message_id).await?;
        let role_id = panel.role_for(trigger).ok_or_else(|| {
            PanelError::Validation(format!("`{}` is not mapped on this panel.", trigger))
        })?;

        let toggle_key = format!("{}-{}", message_id, user_id);
        let _guard = self.toggle_locks.acquire(Domain::Panels, &toggle_key).await;

        let outcome = if self.platform.member_has_role(guild_id, user_id, role_id).await? {
            self.platform.revoke_role(guild_id, user_id, role_id).await?;
            ToggleOutcome::Revoked(role_id)
        } else {
            self.platform.grant_role(guild_id, user_id, role_id).await?;
            ToggleOutcome::Granted(role_id)
        };

        tracing::info!(guild_id, message_id, user_id, role_id, ?outcome, "Panel toggle");
        self.audit_role_change(guild_id, user_id, outcome).await;
        Ok(outcome)
    }

    async fn audit_role_change(&self, guild_id: u64, user_id: u64, outcome: ToggleOutcome) {
        let text = match outcome {
            ToggleOutcome::Granted(role_id) => format!("🎭 Reaction role added: <@{}> - <@&{}>", user_id, role_id),
            ToggleOutcome::Revoked(role_id) => format!("🎭 Reaction role removed: <@{}> - <@&{}>", user_id, role_id),
        };
        self.auditor
            .record(AuditEntry::new(guild_id, AuditKind::Info, "Role Panel", text))
            .await;
    }

    /// Raw reaction add/remove on a reaction panel. Reactions on messages
    /// that are not reaction panels, or with unmapped emoji, are ignored.
    pub async fn apply_reaction(
        &self,
        guild_id: u64,
        message_id: u64,
        trigger: &TriggerKey,
        user_id: u64,
        added: bool,
    ) -> Result<Option<ToggleOutcome>, PanelError> {
        let Some(panel) = self.load(message_id).await? else {
            return Ok(None);
        };
        if panel.guild_id != guild_id || panel.kind != PanelKind::Reaction {
            return Ok(None);
        }
        let Some(role_id) = panel.role_for(trigger) else {
            return Ok(None);
        };

        let toggle_key = format!("{}-{}", message_id, user_id);
        let _guard = self.toggle_locks.acquire(Domain::Panels, &toggle_key).await;

        let holds = self.platform.member_has_role(guild_id, user_id, role_id).await?;
        let outcome = match (added, holds) {
            (true, false) => {
                self.platform.grant_role(guild_id, user_id, role_id).await?;
                ToggleOutcome::Granted(role_id)
            }
            (false, true) => {
                self.platform.revoke_role(guild_id, user_id, role_id).await?;
                ToggleOutcome::Revoked(role_id)
            }
            // Already in the requested state.
            _ => return Ok(None),
        };

        tracing::info!(guild_id, message_id, user_id, role_id, ?outcome, "Reaction role applied");
        self.audit_role_change(guild_id, user_id, outcome).await;
        Ok(Some(outcome))
    }

    /// Re-render every persisted button panel. One panel failing never stops
    /// the others.
    pub async fn reconcile_on_startup(&self) -> Result<ReconcileSummary, PanelError> {
        let mut summary = ReconcileSummary::default();

        for key in self.store.keys(Domain::Panels).await? {
            summary.total += 1;
            let Ok(message_id) = key.parse::<u64>() else {
                tracing::warn!(key = %key, "Skipping panel with malformed key");
                summary.failed += 1;
                continue;
            };

            let _guard = self.panel_locks.acquire(Domain::Panels, &key).await;
            let mut panel = match self.load(message_id).await {
                Ok(Some(panel)) => panel,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(message_id, error = %err, "Skipping unreadable panel");
                    summary.failed += 1;
                    continue;
                }
            };

            let Some(channel_id) = self.resolve_channel(&mut panel, &key, message_id).await else {
                tracing::info!(guild_id = panel.guild_id, message_id, "Panel message is gone; skipped");
                summary.missing += 1;
                continue;
            };

            if panel.kind != PanelKind::Button {
                continue;
            }

            let rendered = best_effort(
                "reconcile_render",
                panel.guild_id,
                self.platform
                    .render_panel_controls(channel_id, message_id, &panel)
                    .await,
            );
            if rendered {
                summary.rendered += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::info!(
            total = summary.total,
            rendered = summary.rendered,
            missing = summary.missing,
            failed = summary.failed,
            "Panel reconcile finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigService;
    use crate::core::testing::{Call, MockPlatform};
    use crate::infra::store::InMemoryStateStore;

    const GUILD: u64 = 1;
    const CHANNEL: u64 = 2;
    const MESSAGE: u64 = 3;
    const USER: u64 = 4;

    fn make_service() -> (Arc<InMemoryStateStore>, Arc<MockPlatform>, Arc<PanelService<InMemoryStateStore, MockPlatform>>) {
        let store = Arc::new(InMemoryStateStore::new());
        let platform = Arc::new(MockPlatform::new());
        let config = Arc::new(ConfigService::new(Arc::clone(&store)));
        let auditor = Arc::new(Auditor::new(config, Arc::clone(&platform)));
        let service = Arc::new(PanelService::new(Arc::clone(&store), Arc::clone(&platform), auditor));
        (store, platform, service)
    }

    fn fire() -> TriggerKey {
        TriggerKey::parse("🔥").unwrap()
    }

    #[tokio::test]
    async fn toggle_flips_each_time() {
        let (_, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Button).await.unwrap();
        service.add_mapping(GUILD, MESSAGE, &fire(), 77).await.unwrap();

        assert_eq!(service.toggle(GUILD, MESSAGE, &fire(), USER).await.unwrap(), ToggleOutcome::Granted(77));
        assert!(platform.holds_role(GUILD, USER, 77));

        // Duplicate delivery flips back.
        assert_eq!(service.toggle(GUILD, MESSAGE, &fire(), USER).await.unwrap(), ToggleOutcome::Revoked(77));
        assert!(!platform.holds_role(GUILD, USER, 77));
    }

    #[tokio::test]
    async fn unknown_panel_or_trigger_is_a_validation_error() {
        let (_, platform, service) = make_service();
        assert!(matches!(
            service.add_mapping(GUILD, MESSAGE, &fire(), 77).await,
            Err(PanelError::Validation(_))
        ));

        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Button).await.unwrap();
        assert!(matches!(
            service.toggle(GUILD, MESSAGE, &fire(), USER).await,
            Err(PanelError::Validation(_))
        ));
        assert!(matches!(
            service.toggle(99, MESSAGE, &fire(), USER).await,
            Err(PanelError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_mappings_for_one_key_converge() {
        let (store, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Button).await.unwrap();

        let a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.add_mapping(GUILD, MESSAGE, &fire(), 10).await })
        };
        let b = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.add_mapping(GUILD, MESSAGE, &fire(), 20).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let stored: PanelDefinition = find_record(store.as_ref(), Domain::Panels, &MESSAGE.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.roles.len(), 1);

        let last_render = platform.last_render(MESSAGE).expect("panel was rendered");
        assert_eq!(last_render.roles, stored.roles);
    }

    #[tokio::test]
    async fn reaction_panels_pre_populate_and_follow_reactions() {
        let (_, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Reaction).await.unwrap();

        let outcome = service.add_mapping(GUILD, MESSAGE, &fire(), 55).await.unwrap();
        assert!(outcome.rendered);
        assert!(platform.calls().contains(&Call::AddReaction {
            channel_id: CHANNEL,
            message_id: MESSAGE,
            trigger: fire(),
        }));

        let label = TriggerKey::parse("Gamer").unwrap();
        assert!(matches!(
            service.add_mapping(GUILD, MESSAGE, &label, 56).await,
            Err(PanelError::Validation(_))
        ));

        assert_eq!(
            service.apply_reaction(GUILD, MESSAGE, &fire(), USER, true).await.unwrap(),
            Some(ToggleOutcome::Granted(55))
        );
        assert_eq!(service.apply_reaction(GUILD, MESSAGE, &fire(), USER, true).await.unwrap(), None);
        assert_eq!(
            service.apply_reaction(GUILD, MESSAGE, &fire(), USER, false).await.unwrap(),
            Some(ToggleOutcome::Revoked(55))
        );

        let other = TriggerKey::parse("🎮").unwrap();
        assert_eq!(service.apply_reaction(GUILD, MESSAGE, &other, USER, true).await.unwrap(), None);
        assert_eq!(service.apply_reaction(GUILD, 404, &fire(), USER, true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn button_panels_stop_at_the_platform_limit() {
        let (store, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Button).await.unwrap();

        for i in 0..MAX_BUTTONS {
            let trigger = TriggerKey::parse(&format!("Role {}", i)).unwrap();
            service.add_mapping(GUILD, MESSAGE, &trigger, i as u64 + 100).await.unwrap();
        }

        let extra = TriggerKey::parse("One Too Many").unwrap();
        assert!(matches!(
            service.add_mapping(GUILD, MESSAGE, &extra, 999).await,
            Err(PanelError::Validation(_))
        ));

        // Re-pointing an existing trigger does not grow the panel.
        let existing = TriggerKey::parse("Role 0").unwrap();
        let outcome = service.add_mapping(GUILD, MESSAGE, &existing, 555).await.unwrap();
        assert_eq!(outcome.replaced, Some(100));

        let stored: PanelDefinition = find_record(store.as_ref(), Domain::Panels, &MESSAGE.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.roles.len(), MAX_BUTTONS);
        assert!(!stored.roles.contains_key(extra.canonical()));
    }

    #[tokio::test]
    async fn reaction_panels_stop_at_the_reaction_limit() {
        let (_, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Reaction).await.unwrap();

        let emoji: Vec<char> = ('\u{1F600}'..='\u{1F615}').collect();
        assert_eq!(emoji.len(), MAX_REACTIONS + 2);
        for (i, c) in emoji.iter().take(MAX_REACTIONS).enumerate() {
            let trigger = TriggerKey::parse(&c.to_string()).unwrap();
            service.add_mapping(GUILD, MESSAGE, &trigger, i as u64 + 100).await.unwrap();
        }

        let extra = TriggerKey::parse(&emoji[MAX_REACTIONS].to_string()).unwrap();
        assert!(matches!(
            service.add_mapping(GUILD, MESSAGE, &extra, 999).await,
            Err(PanelError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn oversized_labels_are_rejected_before_storing() {
        let (store, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Button).await.unwrap();

        let too_long = TriggerKey::parse(&"x".repeat(MAX_LABEL_CHARS + 1)).unwrap();
        assert!(matches!(
            service.add_mapping(GUILD, MESSAGE, &too_long, 7).await,
            Err(PanelError::Validation(_))
        ));

        let at_limit = TriggerKey::parse(&"x".repeat(MAX_LABEL_CHARS)).unwrap();
        service.add_mapping(GUILD, MESSAGE, &at_limit, 7).await.unwrap();

        let stored: PanelDefinition = find_record(store.as_ref(), Domain::Panels, &MESSAGE.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.roles.len(), 1);
    }

    #[tokio::test]
    async fn labels_that_overflow_the_control_id_are_rejected() {
        let (_, platform, service) = make_service();
        let message = u64::MAX;
        platform.add_message(GUILD, CHANNEL, message);
        service.create_panel(GUILD, CHANNEL, message, PanelKind::Button).await.unwrap();

        // Fits the label limit, but "rr|<20 digits>|" leaves only 76 characters.
        let label = TriggerKey::parse(&"y".repeat(MAX_LABEL_CHARS - 1)).unwrap();
        assert!(control_id(message, &label).chars().count() > MAX_CONTROL_ID_CHARS);
        assert!(matches!(
            service.add_mapping(GUILD, message, &label, 7).await,
            Err(PanelError::Validation(_))
        ));

        let short = TriggerKey::parse(&"y".repeat(76)).unwrap();
        assert_eq!(control_id(message, &short).chars().count(), MAX_CONTROL_ID_CHARS);
        service.add_mapping(GUILD, message, &short, 7).await.unwrap();
    }

    #[tokio::test]
    async fn keycap_emoji_work_on_reaction_panels() {
        let (_, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Reaction).await.unwrap();

        let one = TriggerKey::parse("1\u{FE0F}\u{20E3}").unwrap();
        service.add_mapping(GUILD, MESSAGE, &one, 61).await.unwrap();

        // A client that drops the selector still hits the same mapping.
        let bare = TriggerKey::parse("1\u{20E3}").unwrap();
        assert_eq!(
            service.apply_reaction(GUILD, MESSAGE, &bare, USER, true).await.unwrap(),
            Some(ToggleOutcome::Granted(61))
        );
    }

    #[tokio::test]
    async fn forbidden_role_change_surfaces_as_permission_error() {
        let (_, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Button).await.unwrap();
        service.add_mapping(GUILD, MESSAGE, &fire(), 77).await.unwrap();

        platform.reject_roles(true);
        assert!(matches!(
            service.toggle(GUILD, MESSAGE, &fire(), USER).await,
            Err(PanelError::Permission(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_renders_buttons_and_skips_missing_messages() {
        let (store, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, 10);
        platform.add_message(GUILD, CHANNEL, 11);
        platform.add_message(GUILD, CHANNEL, 12);

        service.create_panel(GUILD, CHANNEL, 10, PanelKind::Button).await.unwrap();
        service.add_mapping(GUILD, 10, &fire(), 1).await.unwrap();
        service.create_panel(GUILD, CHANNEL, 11, PanelKind::Reaction).await.unwrap();
        service.create_panel(GUILD, CHANNEL, 12, PanelKind::Button).await.unwrap();
        platform.remove_message(12);

        store
            .put(Domain::Panels, "13", serde_json::json!({ "kind": 5 }))
            .await
            .unwrap();

        let before = platform.render_count();
        let summary = service.reconcile_on_startup().await.unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.rendered, 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(platform.render_count(), before + 1);
    }

    #[tokio::test]
    async fn reconcile_updates_a_moved_channel_hint() {
        let (store, platform, service) = make_service();
        platform.add_message(GUILD, CHANNEL, MESSAGE);
        service.create_panel(GUILD, CHANNEL, MESSAGE, PanelKind::Button).await.unwrap();

        platform.remove_message(MESSAGE);
        platform.add_message(GUILD, 9, MESSAGE);
        service.reconcile_on_startup().await.unwrap();

        let stored: PanelDefinition = find_record(store.as_ref(), Domain::Panels, &MESSAGE.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.channel_id, Some(9));
    }
}
