// Escalation engine - warnings, timeouts and the automatic ban that follows.
//
// State per (guild, user) is implicit in record lengths:
// - every 3rd recorded timeout appends one synthetic "Auto-Mod" warning
// - 5 or more warnings trigger a ban; on success the warnings are cleared
//
// Every read-modify-write happens inside the exclusive section for that
// record, and the ban check runs in the same section as the warning append,
// so two concurrent warnings can never both observe length 4 and skip the ban.
//
// NO Discord dependencies here - side effects go through the Platform port.

use super::duration::{parse_duration, MAX_TIMEOUT};
use super::moderation_models::*;
use crate::core::audit::{AuditEntry, AuditKind, Auditor};
use crate::core::platform::{best_effort, display_guild, Platform, PlatformError};
use crate::core::store::{load_record, member_key, save_record, Domain, KeyedLocks, StateStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing permission: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(String),
}

impl From<PlatformError> for ModerationError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Forbidden(msg) => ModerationError::Permission(msg),
            PlatformError::NotFound(msg) => ModerationError::NotFound(msg),
            PlatformError::Other(msg) => ModerationError::Platform(msg),
        }
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationService<S: StateStore, P: Platform> {
    store: Arc<S>,
    platform: Arc<P>,
    auditor: Arc<Auditor<S, P>>,
    locks: KeyedLocks,
}

impl<S: StateStore, P: Platform> ModerationService<S, P> {
    pub fn new(store: Arc<S>, platform: Arc<P>, auditor: Arc<Auditor<S, P>>) -> Self {
        Self {
            store,
            platform,
            auditor,
            locks: KeyedLocks::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Warnings
    // ------------------------------------------------------------------------

    /// Record a warning and evaluate the ban threshold in one critical section.
    pub async fn warn(
        &self,
        guild_id: u64,
        actor: Actor,
        user_id: u64,
        reason: &str,
    ) -> Result<WarnOutcome, ModerationError> {
        let key = member_key(guild_id, user_id);
        let _guard = self.locks.acquire(Domain::Warnings, &key).await;
        self.record_warning_locked(guild_id, actor, user_id, reason, &key)
            .await
    }

    /// Re-run the ban check without adding a warning, e.g. after a previous
    /// auto-ban failed for lack of permission and the permission was fixed.
    pub async fn evaluate_ban(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<BanOutcome>, ModerationError> {
        let key = member_key(guild_id, user_id);
        let _guard = self.locks.acquire(Domain::Warnings, &key).await;

        let record: WarningRecord = load_record(self.store.as_ref(), Domain::Warnings, &key).await?;
        if !record.reaches_ban_threshold() {
            return Ok(None);
        }
        Ok(Some(self.evaluate_ban_locked(guild_id, user_id, &key, record.len()).await))
    }

    /// Explicit moderator clear. Distinguishes "nothing to clear".
    pub async fn clear_warnings(
        &self,
        guild_id: u64,
        actor: Actor,
        user_id: u64,
    ) -> Result<ClearOutcome, ModerationError> {
        let key = member_key(guild_id, user_id);
        let _guard = self.locks.acquire(Domain::Warnings, &key).await;

        let record: WarningRecord = load_record(self.store.as_ref(), Domain::Warnings, &key).await?;
        if record.is_empty() {
            return Ok(ClearOutcome::NothingToClear);
        }

        let cleared = record.len();
        save_record(self.store.as_ref(), Domain::Warnings, &key, &WarningRecord::default()).await?;

        tracing::info!(guild_id, user_id, cleared, "Warnings cleared");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Info,
                "Warnings Cleared",
                format!("🧹 Cleared {} warning(s) for <@{}> by {}", cleared, user_id, actor.mention()),
            ))
            .await;

        Ok(ClearOutcome::Cleared(cleared))
    }

    pub async fn warnings(&self, guild_id: u64, user_id: u64) -> Result<WarningRecord, ModerationError> {
        let key = member_key(guild_id, user_id);
        Ok(load_record(self.store.as_ref(), Domain::Warnings, &key).await?)
    }

    // Caller must hold the warnings lock for `key`.
    async fn record_warning_locked(
        &self,
        guild_id: u64,
        actor: Actor,
        user_id: u64,
        reason: &str,
        key: &str,
    ) -> Result<WarnOutcome, ModerationError> {
        let mut record: WarningRecord = load_record(self.store.as_ref(), Domain::Warnings, key).await?;
        record.push(WarningEntry {
            moderator: actor.label(),
            reason: reason.to_string(),
            time: Utc::now(),
        });
        save_record(self.store.as_ref(), Domain::Warnings, key, &record).await?;

        let warning_count = record.len();
        tracing::info!(guild_id, user_id, warning_count, moderator = %actor.label(), "Warning recorded");

        let (notice, audit) = match actor {
            Actor::Moderator(_) => (
                format!(
                    "⚠️ You were warned in {}. Reason: {}",
                    display_guild(self.platform.as_ref(), guild_id),
                    reason
                ),
                AuditEntry::new(
                    guild_id,
                    AuditKind::Warning,
                    "Warning",
                    format!("⚠️ Warn: <@{}> by {}: {}", user_id, actor.mention(), reason),
                ),
            ),
            Actor::AutoMod => (
                "⚠️ You received an automatic warning for repeated timeouts.".to_string(),
                AuditEntry::new(
                    guild_id,
                    AuditKind::Warning,
                    "Auto-Warn",
                    format!("⚠️ Auto-warn: <@{}> ({})", user_id, reason),
                ),
            ),
        };
        best_effort(
            "warn_notice",
            guild_id,
            self.platform.send_direct_notice(user_id, &notice).await,
        );
        self.auditor.record(audit).await;

        let ban = if record.reaches_ban_threshold() {
            Some(self.evaluate_ban_locked(guild_id, user_id, key, warning_count).await)
        } else {
            None
        };

        Ok(WarnOutcome { warning_count, ban })
    }

    // Caller must hold the warnings lock for `key` and have observed a record
    // at or above the threshold.
    async fn evaluate_ban_locked(
        &self,
        guild_id: u64,
        user_id: u64,
        key: &str,
        warning_count: usize,
    ) -> BanOutcome {
        if let Err(err) = self
            .platform
            .ban_user(guild_id, user_id, AUTO_BAN_REASON)
            .await
        {
            tracing::warn!(guild_id, user_id, warning_count, error = %err, "Auto-ban failed; warnings kept");
            self.auditor
                .record(AuditEntry::new(
                    guild_id,
                    AuditKind::Failure,
                    "Auto-Ban Failed",
                    format!("⚠️ Auto-ban failed for <@{}> ({}). Missing permissions?", user_id, err),
                ))
                .await;
            return BanOutcome::Failed {
                warning_count,
                error: err.to_string(),
            };
        }

        best_effort(
            "auto_ban_notice",
            guild_id,
            self.platform
                .send_direct_notice(
                    user_id,
                    &format!(
                        "🚫 You were automatically banned from **{}** after receiving {} warnings.",
                        display_guild(self.platform.as_ref(), guild_id),
                        warning_count
                    ),
                )
                .await,
        );

        tracing::info!(guild_id, user_id, warning_count, "User auto-banned");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Punishment,
                "Auto-Ban",
                format!("🚫 Auto-ban: <@{}> (warnings: {})", user_id, warning_count),
            ))
            .await;

        // The ban already happened; a failed clear is reported, not raised.
        let cleared = match save_record(self.store.as_ref(), Domain::Warnings, key, &WarningRecord::default()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(guild_id, user_id, warning_count, error = %err, "Warnings not cleared after auto-ban");
                self.auditor
                    .record(AuditEntry::new(
                        guild_id,
                        AuditKind::Failure,
                        "Warnings Not Cleared",
                        format!(
                            "⚠️ <@{}> was banned but their {} warning(s) could not be cleared ({}). Use /clearwarnings before unbanning.",
                            user_id, warning_count, err
                        ),
                    ))
                    .await;
                false
            }
        };

        BanOutcome::Banned { warning_count, cleared }
    }

    // ------------------------------------------------------------------------
    // Timeouts
    // ------------------------------------------------------------------------

    /// Apply a platform timeout, then append it to the user's history. Every
    /// third recorded timeout synthesizes an automatic warning.
    pub async fn timeout(
        &self,
        guild_id: u64,
        actor: Actor,
        user_id: u64,
        duration_input: &str,
        reason: &str,
    ) -> Result<TimeoutOutcome, ModerationError> {
        let duration = parse_duration(duration_input)?;
        if duration > MAX_TIMEOUT {
            return Err(ModerationError::Validation(
                "Timeouts cannot be longer than 28 days.".to_string(),
            ));
        }

        let now = Utc::now();
        let until = now
            + chrono::Duration::from_std(duration)
                .map_err(|_| ModerationError::Validation("Duration out of range.".to_string()))?;

        self.platform
            .timeout_member(guild_id, user_id, until, reason)
            .await?;

        let key = member_key(guild_id, user_id);
        let _guard = self.locks.acquire(Domain::Timeouts, &key).await;

        let previous: TimeoutRecord = load_record(self.store.as_ref(), Domain::Timeouts, &key).await?;
        let mut record = previous.clone();
        record.push(TimeoutEntry {
            moderator: actor.label(),
            duration: duration_input.trim().to_string(),
            reason: reason.to_string(),
            timestamp: now,
        });
        save_record(self.store.as_ref(), Domain::Timeouts, &key, &record).await?;

        let timeout_count = record.len();

        // Lock order is always timeouts -> warnings, never the reverse.
        let auto_warn = if record.crossed_auto_warn_boundary() {
            let _warn_guard = self.locks.acquire(Domain::Warnings, &key).await;
            match self
                .record_warning_locked(guild_id, Actor::AutoMod, user_id, AUTO_WARN_REASON, &key)
                .await
            {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    // An entry on the boundary must come with its warning.
                    if let Err(rollback) = save_record(self.store.as_ref(), Domain::Timeouts, &key, &previous).await {
                        tracing::error!(guild_id, user_id, error = %rollback, "Timeout history rollback failed");
                    }
                    tracing::warn!(guild_id, user_id, timeout_count, error = %err, "Auto-warn failed; timeout not recorded");
                    return Err(err);
                }
            }
        } else {
            None
        };

        tracing::info!(guild_id, user_id, timeout_count, duration = %duration_input, "Timeout recorded");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Punishment,
                "Timeout",
                format!(
                    "⏳ Timeout: <@{}> for {} by {}: {}",
                    user_id,
                    duration_input.trim(),
                    actor.mention(),
                    reason
                ),
            ))
            .await;

        if auto_warn.is_some() {
            tracing::info!(guild_id, user_id, timeout_count, "Auto-warn issued for repeated timeouts");
        }

        Ok(TimeoutOutcome {
            timeout_count,
            auto_warn,
        })
    }

    /// Lift a platform timeout. The timeout history is an audit trail and is
    /// left untouched.
    pub async fn remove_timeout(&self, guild_id: u64, actor: Actor, user_id: u64) -> Result<(), ModerationError> {
        self.platform.clear_timeout(guild_id, user_id).await?;

        tracing::info!(guild_id, user_id, "Timeout removed");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Info,
                "Timeout Removed",
                format!("✅ Timeout removed: <@{}> by {}", user_id, actor.mention()),
            ))
            .await;
        Ok(())
    }

    pub async fn timeouts(&self, guild_id: u64, user_id: u64) -> Result<TimeoutRecord, ModerationError> {
        let key = member_key(guild_id, user_id);
        Ok(load_record(self.store.as_ref(), Domain::Timeouts, &key).await?)
    }

    pub async fn infractions(&self, guild_id: u64, user_id: u64) -> Result<Infractions, ModerationError> {
        Ok(Infractions {
            warnings: self.warnings(guild_id, user_id).await?,
            timeouts: self.timeouts(guild_id, user_id).await?,
        })
    }

    // ------------------------------------------------------------------------
    // Direct actions
    // ------------------------------------------------------------------------

    pub async fn ban(&self, guild_id: u64, actor: Actor, user_id: u64, reason: &str) -> Result<(), ModerationError> {
        self.platform.ban_user(guild_id, user_id, reason).await?;

        best_effort(
            "ban_notice",
            guild_id,
            self.platform
                .send_direct_notice(
                    user_id,
                    &format!(
                        "⛔ You were banned from {}. Reason: {}",
                        display_guild(self.platform.as_ref(), guild_id),
                        reason
                    ),
                )
                .await,
        );

        tracing::info!(guild_id, user_id, "User banned");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Punishment,
                "Ban",
                format!("⛔ Ban: <@{}> by {}: {}", user_id, actor.mention(), reason),
            ))
            .await;
        Ok(())
    }

    pub async fn kick(&self, guild_id: u64, actor: Actor, user_id: u64, reason: &str) -> Result<(), ModerationError> {
        self.platform.kick_user(guild_id, user_id, reason).await?;

        best_effort(
            "kick_notice",
            guild_id,
            self.platform
                .send_direct_notice(
                    user_id,
                    &format!(
                        "👢 You were kicked from {}. Reason: {}",
                        display_guild(self.platform.as_ref(), guild_id),
                        reason
                    ),
                )
                .await,
        );

        tracing::info!(guild_id, user_id, "User kicked");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Punishment,
                "Kick",
                format!("👢 Kick: <@{}> by {}: {}", user_id, actor.mention(), reason),
            ))
            .await;
        Ok(())
    }

    /// Unban by ID or by name. Returns the unbanned user's ID.
    pub async fn unban(&self, guild_id: u64, actor: Actor, target: &UnbanTarget) -> Result<u64, ModerationError> {
        let user_id = match target {
            UnbanTarget::Id(id) => *id,
            UnbanTarget::Name(name) => self
                .platform
                .find_banned_user(guild_id, name)
                .await?
                .ok_or_else(|| ModerationError::Validation(format!("`{}` was not found in the ban list.", name)))?,
        };

        match self.platform.unban_user(guild_id, user_id).await {
            Ok(()) => {}
            Err(PlatformError::NotFound(_)) => {
                return Err(ModerationError::Validation(format!(
                    "User {} is not banned.",
                    user_id
                )));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(guild_id, user_id, "User unbanned");
        self.auditor
            .record(AuditEntry::new(
                guild_id,
                AuditKind::Info,
                "Unban",
                format!("✅ Unban: <@{}> by {}", user_id, actor.mention()),
            ))
            .await;
        Ok(user_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ConfigField, ConfigService};
    use crate::core::testing::{Call, MockPlatform};
    use crate::infra::store::InMemoryStateStore;

    const GUILD: u64 = 100;
    const USER: u64 = 200;
    const MOD: Actor = Actor::Moderator(300);

    struct Harness {
        store: Arc<InMemoryStateStore>,
        platform: Arc<MockPlatform>,
        service: Arc<ModerationService<InMemoryStateStore, MockPlatform>>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStateStore::new());
        let platform = Arc::new(MockPlatform::new());
        let config = Arc::new(ConfigService::new(Arc::clone(&store)));
        config.set_field(GUILD, ConfigField::LogChannel(Some(999))).await.unwrap();
        let auditor = Arc::new(Auditor::new(config, Arc::clone(&platform)));
        let service = Arc::new(ModerationService::new(
            Arc::clone(&store),
            Arc::clone(&platform),
            auditor,
        ));
        Harness {
            store,
            platform,
            service,
        }
    }

    #[tokio::test]
    async fn warnings_accumulate_below_threshold() {
        let h = harness().await;

        for expected in 1..=4 {
            let outcome = h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
            assert_eq!(outcome.warning_count, expected);
            assert_eq!(outcome.ban, None);
        }

        assert_eq!(h.service.warnings(GUILD, USER).await.unwrap().len(), 4);
        assert_eq!(h.platform.ban_count(), 0);
    }

    #[tokio::test]
    async fn fifth_warning_bans_and_clears() {
        let h = harness().await;
        for _ in 0..4 {
            h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
        }

        let outcome = h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
        assert_eq!(outcome.warning_count, 5);
        assert_eq!(outcome.ban, Some(BanOutcome::Banned { warning_count: 5, cleared: true }));

        assert!(h.service.warnings(GUILD, USER).await.unwrap().is_empty());
        assert_eq!(h.platform.ban_count(), 1);
        assert!(h
            .platform
            .calls()
            .contains(&Call::Ban { guild_id: GUILD, user_id: USER, reason: AUTO_BAN_REASON.to_string() }));
        assert!(h.platform.audit_titles().contains(&"Auto-Ban".to_string()));
    }

    #[tokio::test]
    async fn rejected_ban_keeps_warnings_and_retries_next_time() {
        let h = harness().await;
        h.platform.reject_bans(true);

        for _ in 0..5 {
            h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
        }
        assert_eq!(h.service.warnings(GUILD, USER).await.unwrap().len(), 5);
        assert!(h.platform.audit_titles().contains(&"Auto-Ban Failed".to_string()));

        h.platform.reject_bans(false);
        let outcome = h.service.warn(GUILD, MOD, USER, "again").await.unwrap();
        assert_eq!(outcome.ban, Some(BanOutcome::Banned { warning_count: 6, cleared: true }));
        assert!(h.service.warnings(GUILD, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn evaluate_ban_retries_without_new_warning() {
        let h = harness().await;
        h.platform.reject_bans(true);
        for _ in 0..5 {
            h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
        }

        h.platform.reject_bans(false);
        let outcome = h.service.evaluate_ban(GUILD, USER).await.unwrap();
        assert_eq!(outcome, Some(BanOutcome::Banned { warning_count: 5, cleared: true }));
        assert_eq!(h.service.evaluate_ban(GUILD, USER).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_warnings_ban_exactly_once() {
        let h = harness().await;
        for _ in 0..3 {
            h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
        }

        // Both of these would observe length 4 without the per-user section.
        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&h.service);
            handles.push(tokio::spawn(async move {
                service.warn(GUILD, MOD, USER, "pile-on").await.unwrap()
            }));
        }
        let mut bans = 0;
        for handle in handles {
            if handle.await.unwrap().ban.is_some() {
                bans += 1;
            }
        }

        assert_eq!(bans, 1);
        assert_eq!(h.platform.ban_count(), 1);
    }

    #[tokio::test]
    async fn every_third_timeout_adds_one_auto_warning() {
        let h = harness().await;

        let mut auto_warns = 0;
        for i in 1..=9 {
            let outcome = h.service.timeout(GUILD, MOD, USER, "1m", "noise").await.unwrap();
            assert_eq!(outcome.timeout_count, i);
            if outcome.auto_warn.is_some() {
                auto_warns += 1;
                assert_eq!(i % 3, 0);
            }
        }

        assert_eq!(auto_warns, 3);
        let warnings = h.service.warnings(GUILD, USER).await.unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.0.iter().all(|w| w.moderator == AUTO_MOD_LABEL && w.reason == AUTO_WARN_REASON));
    }

    #[tokio::test]
    async fn escalation_scenario_warns_times_out_and_bans() {
        let h = harness().await;

        h.service.warn(GUILD, MOD, USER, "one").await.unwrap();
        h.service.warn(GUILD, MOD, USER, "two").await.unwrap();
        let third = h.service.warn(GUILD, MOD, USER, "three").await.unwrap();
        assert_eq!(third.warning_count, 3);
        assert_eq!(third.ban, None);

        let first = h.service.timeout(GUILD, MOD, USER, "10m", "t").await.unwrap();
        let second = h.service.timeout(GUILD, MOD, USER, "10m", "t").await.unwrap();
        assert!(first.auto_warn.is_none() && second.auto_warn.is_none());

        let third_timeout = h.service.timeout(GUILD, MOD, USER, "10m", "t").await.unwrap();
        let auto = third_timeout.auto_warn.expect("third timeout auto-warns");
        assert_eq!(auto.warning_count, 4);
        assert_eq!(auto.ban, None);

        let fourth = h.service.warn(GUILD, MOD, USER, "four").await.unwrap();
        assert_eq!(fourth.warning_count, 5);
        assert_eq!(fourth.ban, Some(BanOutcome::Banned { warning_count: 5, cleared: true }));
        assert!(h.service.warnings(GUILD, USER).await.unwrap().is_empty());
        assert_eq!(h.service.timeouts(GUILD, USER).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_duration_touches_nothing() {
        let h = harness().await;

        for input in ["abc", "0s", "29d"] {
            let result = h.service.timeout(GUILD, MOD, USER, input, "x").await;
            assert!(matches!(result, Err(ModerationError::Validation(_))), "{input}");
        }
        assert!(h.platform.calls().is_empty());
        assert!(h.service.timeouts(GUILD, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn forbidden_timeout_is_a_permission_error_and_not_recorded() {
        let h = harness().await;
        h.platform.reject_moderation(true);

        let result = h.service.timeout(GUILD, MOD, USER, "5m", "x").await;
        assert!(matches!(result, Err(ModerationError::Permission(_))));
        assert!(h.service.timeouts(GUILD, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_a_timeout_keeps_history() {
        let h = harness().await;
        h.service.timeout(GUILD, MOD, USER, "5m", "x").await.unwrap();
        h.service.remove_timeout(GUILD, MOD, USER).await.unwrap();

        assert_eq!(h.service.timeouts(GUILD, USER).await.unwrap().len(), 1);
        assert!(h.platform.calls().contains(&Call::ClearTimeout { guild_id: GUILD, user_id: USER }));
    }

    #[tokio::test]
    async fn clear_reports_nothing_to_clear() {
        let h = harness().await;
        assert_eq!(
            h.service.clear_warnings(GUILD, MOD, USER).await.unwrap(),
            ClearOutcome::NothingToClear
        );

        h.service.warn(GUILD, MOD, USER, "x").await.unwrap();
        h.service.warn(GUILD, MOD, USER, "y").await.unwrap();
        assert_eq!(
            h.service.clear_warnings(GUILD, MOD, USER).await.unwrap(),
            ClearOutcome::Cleared(2)
        );
        assert!(h.service.warnings(GUILD, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_surfaces_and_leaves_record_alone() {
        let h = harness().await;
        h.service.warn(GUILD, MOD, USER, "x").await.unwrap();

        h.store.set_read_only(true);
        let result = h.service.warn(GUILD, MOD, USER, "y").await;
        assert!(matches!(result, Err(ModerationError::Storage(_))));

        h.store.set_read_only(false);
        assert_eq!(h.service.warnings(GUILD, USER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_auto_warn_rolls_the_timeout_back() {
        let h = harness().await;
        h.service.timeout(GUILD, MOD, USER, "1m", "a").await.unwrap();
        h.service.timeout(GUILD, MOD, USER, "1m", "b").await.unwrap();

        h.store.fail_domain_after(Domain::Warnings, 0);
        let result = h.service.timeout(GUILD, MOD, USER, "1m", "c").await;
        assert!(matches!(result, Err(ModerationError::Storage(_))));
        assert_eq!(h.service.timeouts(GUILD, USER).await.unwrap().len(), 2);
        assert!(h.service.warnings(GUILD, USER).await.unwrap().is_empty());

        // Retrying lands on the same boundary and issues the warning then.
        h.store.heal_domain(Domain::Warnings);
        let outcome = h.service.timeout(GUILD, MOD, USER, "1m", "c").await.unwrap();
        assert_eq!(outcome.timeout_count, 3);
        assert_eq!(outcome.auto_warn.map(|w| w.warning_count), Some(1));
        assert_eq!(h.service.warnings(GUILD, USER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ban_stands_when_clearing_warnings_fails() {
        let h = harness().await;
        for _ in 0..4 {
            h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
        }

        // The fifth append is stored; the clear after the ban is not.
        h.store.fail_domain_after(Domain::Warnings, 1);
        let outcome = h.service.warn(GUILD, MOD, USER, "rude").await.unwrap();
        assert_eq!(
            outcome.ban,
            Some(BanOutcome::Banned {
                warning_count: 5,
                cleared: false
            })
        );
        assert_eq!(h.platform.ban_count(), 1);
        assert_eq!(h.service.warnings(GUILD, USER).await.unwrap().len(), 5);
        let titles = h.platform.audit_titles();
        assert!(titles.contains(&"Auto-Ban".to_string()));
        assert!(titles.contains(&"Warnings Not Cleared".to_string()));

        h.store.heal_domain(Domain::Warnings);
        assert_eq!(
            h.service.evaluate_ban(GUILD, USER).await.unwrap(),
            Some(BanOutcome::Banned {
                warning_count: 5,
                cleared: true
            })
        );
        assert!(h.service.warnings(GUILD, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocked_direct_messages_do_not_break_warnings() {
        let h = harness().await;
        h.platform.reject_notices(true);

        let outcome = h.service.warn(GUILD, MOD, USER, "x").await.unwrap();
        assert_eq!(outcome.warning_count, 1);
    }

    #[tokio::test]
    async fn unban_by_name_resolves_through_ban_list() {
        let h = harness().await;
        h.platform.add_banned_user("ferris#0001", 4242);

        let target = UnbanTarget::parse("ferris#0001").unwrap();
        assert_eq!(h.service.unban(GUILD, MOD, &target).await.unwrap(), 4242);

        let unknown = UnbanTarget::parse("nobody").unwrap();
        assert!(matches!(
            h.service.unban(GUILD, MOD, &unknown).await,
            Err(ModerationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn infractions_combine_both_histories() {
        let h = harness().await;
        h.service.warn(GUILD, MOD, USER, "x").await.unwrap();
        h.service.timeout(GUILD, MOD, USER, "1h", "y").await.unwrap();

        let infractions = h.service.infractions(GUILD, USER).await.unwrap();
        assert_eq!(infractions.total(), 2);
    }
}
