// This is the leveling module - it contains ALL the business logic for the progression system.
// Notice how this module has NO Discord-specific code (no serenity, no poise imports).
// It works with primitive types (u64, String) and talks to the platform only
// through the Platform port.

use crate::core::audit::{AuditEntry, AuditKind, Auditor};
use crate::core::config::GuildConfig;
use crate::core::platform::{best_effort, display_guild, Platform};
use crate::core::store::{
    find_record, load_record, member_key, parse_member_key, save_record, Domain, KeyedLocks, StateStore,
    StoreError,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Inclusive range of XP awarded per eligible message.
pub const MESSAGE_XP_MIN: u64 = 8;
pub const MESSAGE_XP_MAX: u64 = 16;
/// Minimum time between two awarded messages from the same member.
pub const MESSAGE_COOLDOWN: Duration = Duration::from_secs(30);

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// Durable XP and level for one (guild, user).
///
/// Invariant: `required_xp(level) <= xp < required_xp(level + 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    pub xp: u64,
    pub level: u32,
}

/// One crossed level boundary. A burst of XP produces one event per level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub level: u32,
    pub total_xp: u64,
}

/// Result of a successful award.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Award {
    pub gained: u64,
    pub record: ProgressionRecord,
    pub level_ups: Vec<LevelUpEvent>,
}

/// A member's standing for the rank command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankInfo {
    pub record: ProgressionRecord,
    /// Total XP at which the next level is reached.
    pub next_threshold: u64,
    /// 1-based leaderboard position, `None` without any XP.
    pub position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: u64,
    pub record: ProgressionRecord,
}

/// Total XP needed to reach `level`: `50·level² + 50·level`. Saturates for
/// display; level math goes through [`checked_required_xp`].
pub fn required_xp(level: u32) -> u64 {
    checked_required_xp(level).unwrap_or(u64::MAX)
}

/// `None` when the threshold does not fit in a u64, i.e. no XP total reaches it.
fn checked_required_xp(level: u32) -> Option<u64> {
    let level = u64::from(level);
    50u64.checked_mul(level)?.checked_mul(level)?.checked_add(50u64.checked_mul(level)?)
}

fn reached(level: u32, xp: u64) -> bool {
    checked_required_xp(level).is_some_and(|need| need <= xp)
}

/// Converge from `level` to the level `xp` belongs to. The float estimate
/// only picks a starting point; the final answer comes from integer thresholds.
fn converge_level(level: u32, xp: u64) -> u32 {
    let estimate = (((xp as f64 / 12.5 + 1.0).sqrt() - 1.0) / 2.0) as u32;
    let mut level = if reached(level, xp) { level.max(estimate) } else { estimate };
    while level > 0 && !reached(level, xp) {
        level -= 1;
    }
    while level < u32::MAX && reached(level + 1, xp) {
        level += 1;
    }
    level
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LevelingError {
    /// Not an error for the member; the dispatcher skips silently.
    #[error("User is on cooldown. Time remaining: {0:?}")]
    OnCooldown(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Invalid user or guild ID")]
    InvalidId,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct LevelingService<S: StateStore, P: Platform> {
    store: Arc<S>,
    platform: Arc<P>,
    auditor: Arc<Auditor<S, P>>,
    locks: KeyedLocks,
    /// (guild_id, user_id) -> last awarded message. Process-local.
    cooldowns: DashMap<(u64, u64), DateTime<Utc>>,
}

impl<S: StateStore, P: Platform> LevelingService<S, P> {
    pub fn new(store: Arc<S>, platform: Arc<P>, auditor: Arc<Auditor<S, P>>) -> Self {
        Self {
            store,
            platform,
            auditor,
            locks: KeyedLocks::new(),
            cooldowns: DashMap::new(),
        }
    }

    fn validate_ids(user_id: u64, guild_id: u64) -> Result<(), LevelingError> {
        if user_id == 0 || guild_id == 0 {
            Err(LevelingError::InvalidId)
        } else {
            Ok(())
        }
    }

    fn cooldown_remaining(&self, guild_id: u64, user_id: u64, now: DateTime<Utc>) -> Option<Duration> {
        let last = *self.cooldowns.get(&(guild_id, user_id))?;
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        MESSAGE_COOLDOWN.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Award message XP if the member is off cooldown.
    ///
    /// **Returns:**
    /// - `Ok(Award)` with one `LevelUpEvent` per crossed level
    /// - `Err(LevelingError::OnCooldown)` if the member was awarded recently
    /// - `Err(LevelingError::Storage)` if the record could not be written;
    ///   the cooldown is not started in that case
    pub async fn award_message(
        &self,
        guild_id: u64,
        user_id: u64,
        now: DateTime<Utc>,
        config: &GuildConfig,
    ) -> Result<Award, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;

        let key = member_key(guild_id, user_id);
        let _guard = self.locks.acquire(Domain::Xp, &key).await;

        if let Some(remaining) = self.cooldown_remaining(guild_id, user_id, now) {
            return Err(LevelingError::OnCooldown(remaining));
        }

        let gain = rand::thread_rng().gen_range(MESSAGE_XP_MIN..=MESSAGE_XP_MAX);
        let award = self.apply_gain_locked(guild_id, user_id, &key, gain, config).await?;
        self.cooldowns.insert((guild_id, user_id), now);
        Ok(award)
    }

    /// Admin award. Same convergence and rewards, no cooldown.
    pub async fn grant_xp(
        &self,
        guild_id: u64,
        user_id: u64,
        amount: u64,
        config: &GuildConfig,
    ) -> Result<Award, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;

        let key = member_key(guild_id, user_id);
        let _guard = self.locks.acquire(Domain::Xp, &key).await;
        self.apply_gain_locked(guild_id, user_id, &key, amount, config).await
    }

    // Caller must hold the xp lock for `key`.
    async fn apply_gain_locked(
        &self,
        guild_id: u64,
        user_id: u64,
        key: &str,
        gain: u64,
        config: &GuildConfig,
    ) -> Result<Award, LevelingError> {
        let mut record: ProgressionRecord = load_record(self.store.as_ref(), Domain::Xp, key).await?;
        let old_level = record.level;

        record.xp = record.xp.saturating_add(gain);
        record.level = converge_level(record.level, record.xp);

        save_record(self.store.as_ref(), Domain::Xp, key, &record).await?;

        let level_ups: Vec<LevelUpEvent> = (old_level.saturating_add(1)..=record.level)
            .map(|level| LevelUpEvent {
                guild_id,
                user_id,
                level,
                total_xp: record.xp,
            })
            .collect();

        for event in &level_ups {
            self.fire_level_up(event, config).await;
        }

        Ok(Award {
            gained: gain,
            record,
            level_ups,
        })
    }

    async fn fire_level_up(&self, event: &LevelUpEvent, config: &GuildConfig) {
        let guild_id = event.guild_id;
        tracing::info!(guild_id, user_id = event.user_id, level = event.level, "Level up");

        best_effort(
            "announce_level_up",
            guild_id,
            self.platform.announce_level_up(config.log_channel, event).await,
        );

        let Some(role_id) = config.reward_for_level(event.level) else {
            return;
        };

        match self.platform.grant_role(guild_id, event.user_id, role_id).await {
            Ok(()) => {
                tracing::info!(guild_id, user_id = event.user_id, role_id, level = event.level, "Level reward granted");
                best_effort(
                    "level_reward_notice",
                    guild_id,
                    self.platform
                        .send_direct_notice(
                            event.user_id,
                            &format!(
                                "🎉 You reached level {} in {} and earned <@&{}>!",
                                event.level,
                                display_guild(self.platform.as_ref(), guild_id),
                                role_id
                            ),
                        )
                        .await,
                );
            }
            Err(err) => {
                tracing::warn!(guild_id, user_id = event.user_id, role_id, error = %err, "Level reward grant failed");
                self.auditor
                    .record(AuditEntry::new(
                        guild_id,
                        AuditKind::Failure,
                        "Level Reward Failed",
                        format!(
                            "⚠️ Could not give <@&{}> to <@{}> for level {} ({})",
                            role_id, event.user_id, event.level, err
                        ),
                    ))
                    .await;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn rank(&self, guild_id: u64, user_id: u64) -> Result<RankInfo, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;

        let key = member_key(guild_id, user_id);
        let record: Option<ProgressionRecord> = find_record(self.store.as_ref(), Domain::Xp, &key).await?;

        let position = match record {
            Some(record) if record.xp > 0 => {
                let board = self.leaderboard(guild_id, usize::MAX).await?;
                board.iter().position(|entry| entry.user_id == user_id).map(|i| i + 1)
            }
            _ => None,
        };

        let record = record.unwrap_or_default();
        Ok(RankInfo {
            record,
            next_threshold: required_xp(record.level.saturating_add(1)),
            position,
        })
    }

    /// Every member of `guild_id` with XP, highest first. Ties keep ID order.
    pub async fn leaderboard(&self, guild_id: u64, limit: usize) -> Result<Vec<LeaderboardEntry>, LevelingError> {
        if guild_id == 0 {
            return Err(LevelingError::InvalidId);
        }

        let mut entries = Vec::new();
        for key in self.store.keys(Domain::Xp).await? {
            let Some((guild, user_id)) = parse_member_key(&key) else {
                continue;
            };
            if guild != guild_id {
                continue;
            }
            if let Some(record) = find_record::<ProgressionRecord, _>(self.store.as_ref(), Domain::Xp, &key).await? {
                if record.xp > 0 {
                    entries.push(LeaderboardEntry { user_id, record });
                }
            }
        }

        entries.sort_by(|a, b| b.record.xp.cmp(&a.record.xp).then(a.user_id.cmp(&b.user_id)));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Forget cooldowns that have already run out.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.cooldowns
            .retain(|_, last| (now - *last).to_std().map_or(true, |elapsed| elapsed < MESSAGE_COOLDOWN));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigService;
    use crate::core::testing::{Call, MockPlatform};
    use crate::infra::store::InMemoryStateStore;
    use chrono::Duration as ChronoDuration;

    const GUILD: u64 = 10;
    const USER: u64 = 20;

    fn make_service() -> (Arc<InMemoryStateStore>, Arc<MockPlatform>, LevelingService<InMemoryStateStore, MockPlatform>) {
        let store = Arc::new(InMemoryStateStore::new());
        let platform = Arc::new(MockPlatform::new());
        let config = Arc::new(ConfigService::new(Arc::clone(&store)));
        let auditor = Arc::new(Auditor::new(config, Arc::clone(&platform)));
        let service = LevelingService::new(Arc::clone(&store), Arc::clone(&platform), auditor);
        (store, platform, service)
    }

    #[test]
    fn test_required_xp() {
        assert_eq!(required_xp(0), 0);
        assert_eq!(required_xp(1), 100);
        assert_eq!(required_xp(2), 300);
        assert_eq!(required_xp(3), 600);
        assert_eq!(required_xp(10), 5_500);
    }

    #[test]
    fn test_level_calculation() {
        assert_eq!(converge_level(0, 0), 0);
        assert_eq!(converge_level(0, 99), 0);
        assert_eq!(converge_level(0, 100), 1);
        assert_eq!(converge_level(0, 299), 1);
        assert_eq!(converge_level(0, 300), 2);
    }

    #[test]
    fn level_invariant_holds_across_range() {
        for xp in (0..20_000).step_by(7) {
            let level = converge_level(0, xp);
            assert!(required_xp(level) <= xp);
            assert!(xp < required_xp(level + 1));
        }
    }

    #[test]
    fn level_invariant_holds_at_the_top_of_the_range() {
        // Highest level whose threshold still fits in a u64.
        const TOP_LEVEL: u32 = 607_400_099;
        assert!(checked_required_xp(TOP_LEVEL + 1).is_none());
        assert_eq!(converge_level(0, u64::MAX), TOP_LEVEL);

        for xp in [u64::MAX, u64::MAX - 1, required_xp(TOP_LEVEL), 1 << 63] {
            let level = converge_level(0, xp);
            assert!(level < u32::MAX, "{xp}");
            assert!(checked_required_xp(level).is_some_and(|need| need <= xp), "{xp}");
            assert!(checked_required_xp(level + 1).map_or(true, |need| xp < need), "{xp}");
        }
    }

    #[test]
    fn oversized_stored_level_converges_down() {
        let xp = 5_500;
        assert_eq!(converge_level(u32::MAX, xp), 10);
        assert_eq!(converge_level(11, xp), 10);
        assert_eq!(converge_level(3, xp), 10);
    }

    #[tokio::test]
    async fn message_award_is_in_range_and_persisted() {
        let (_, _, service) = make_service();
        let award = service
            .award_message(GUILD, USER, Utc::now(), &GuildConfig::default())
            .await
            .unwrap();

        assert!((MESSAGE_XP_MIN..=MESSAGE_XP_MAX).contains(&award.gained));
        let rank = service.rank(GUILD, USER).await.unwrap();
        assert_eq!(rank.record.xp, award.gained);
        assert_eq!(rank.record.level, 0);
        assert_eq!(rank.next_threshold, 100);
        assert_eq!(rank.position, Some(1));
    }

    #[tokio::test]
    async fn cooldown_blocks_second_message() {
        let (_, _, service) = make_service();
        let now = Utc::now();
        let config = GuildConfig::default();

        service.award_message(GUILD, USER, now, &config).await.unwrap();
        let second = service
            .award_message(GUILD, USER, now + ChronoDuration::seconds(10), &config)
            .await;
        assert!(matches!(second, Err(LevelingError::OnCooldown(_))));

        let later = service
            .award_message(GUILD, USER, now + ChronoDuration::seconds(31), &config)
            .await;
        assert!(later.is_ok());
    }

    #[tokio::test]
    async fn burst_crosses_several_levels_with_rewards() {
        let (_, platform, service) = make_service();
        let mut config = GuildConfig::default();
        config.level_rewards.insert(2, 7002);
        config.level_rewards.insert(5, 7005);

        let award = service.grant_xp(GUILD, USER, 650, &config).await.unwrap();
        assert_eq!(award.record.level, 3);
        let levels: Vec<u32> = award.level_ups.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![1, 2, 3]);

        assert_eq!(platform.level_up_count(), 3);
        assert!(platform.holds_role(GUILD, USER, 7002));
        assert!(!platform.holds_role(GUILD, USER, 7005));
    }

    #[tokio::test]
    async fn failed_reward_is_audited_and_record_still_saved() {
        let (_, platform, service) = make_service();
        platform.reject_roles(true);
        let mut config = GuildConfig::default();
        config.log_channel = Some(55);
        config.level_rewards.insert(1, 9001);

        let award = service.grant_xp(GUILD, USER, 100, &config).await.unwrap();
        assert_eq!(award.record.level, 1);
        assert!(!platform.holds_role(GUILD, USER, 9001));
        assert_eq!(service.rank(GUILD, USER).await.unwrap().record.level, 1);
        assert!(platform
            .calls()
            .iter()
            .any(|c| matches!(c, Call::LevelUp { channel_id: Some(55), .. })));
    }

    #[tokio::test]
    async fn storage_failure_leaves_record_and_cooldown_untouched() {
        let (store, platform, service) = make_service();
        store.set_read_only(true);

        let result = service
            .award_message(GUILD, USER, Utc::now(), &GuildConfig::default())
            .await;
        assert!(matches!(result, Err(LevelingError::Storage(_))));
        assert_eq!(platform.level_up_count(), 0);

        store.set_read_only(false);
        assert!(service
            .award_message(GUILD, USER, Utc::now(), &GuildConfig::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn leaderboard_is_per_guild_and_sorted() {
        let (_, _, service) = make_service();
        let config = GuildConfig::default();
        service.grant_xp(GUILD, 1, 50, &config).await.unwrap();
        service.grant_xp(GUILD, 2, 500, &config).await.unwrap();
        service.grant_xp(GUILD, 3, 200, &config).await.unwrap();
        service.grant_xp(99, 4, 9_999, &config).await.unwrap();

        let board = service.leaderboard(GUILD, 2).await.unwrap();
        let users: Vec<u64> = board.iter().map(|e| e.user_id).collect();
        assert_eq!(users, vec![2, 3]);
        assert_eq!(service.rank(GUILD, 1).await.unwrap().position, Some(3));
    }

    #[tokio::test]
    async fn zero_ids_are_rejected() {
        let (_, _, service) = make_service();
        let result = service.grant_xp(0, USER, 10, &GuildConfig::default()).await;
        assert!(matches!(result, Err(LevelingError::InvalidId)));
    }

    #[test]
    fn leveling_error_messages_are_descriptive() {
        let invalid_id = LevelingError::InvalidId;
        assert_eq!(invalid_id.to_string(), "Invalid user or guild ID");
    }

    #[tokio::test]
    async fn sweep_drops_expired_cooldowns() {
        let (_, _, service) = make_service();
        let now = Utc::now();
        service.award_message(GUILD, USER, now, &GuildConfig::default()).await.unwrap();

        service.sweep(now + ChronoDuration::seconds(5));
        assert_eq!(service.cooldowns.len(), 1);
        service.sweep(now + ChronoDuration::seconds(60));
        assert!(service.cooldowns.is_empty());
    }
}
