use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_WELCOME_DM: &str = "👋 Welcome {user} to {server}!";

/// The three content-filter switches. All default to on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterToggles {
    pub anti_link: bool,
    pub anti_spam: bool,
    pub caps_filter: bool,
}

impl Default for FilterToggles {
    fn default() -> Self {
        Self {
            anti_link: true,
            anti_spam: true,
            caps_filter: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    AntiLink,
    AntiSpam,
    CapsFilter,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::AntiLink => "anti_link",
            FilterKind::AntiSpam => "anti_spam",
            FilterKind::CapsFilter => "caps_filter",
        }
    }
}

impl FilterToggles {
    pub fn is_enabled(&self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::AntiLink => self.anti_link,
            FilterKind::AntiSpam => self.anti_spam,
            FilterKind::CapsFilter => self.caps_filter,
        }
    }

    pub fn set(&mut self, kind: FilterKind, enabled: bool) {
        match kind {
            FilterKind::AntiLink => self.anti_link = enabled,
            FilterKind::AntiSpam => self.anti_spam = enabled,
            FilterKind::CapsFilter => self.caps_filter = enabled,
        }
    }
}

/// One record per guild, created with defaults on first access.
///
/// Field names are part of the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    pub welcome_channel: Option<u64>,
    pub goodbye_channel: Option<u64>,
    pub log_channel: Option<u64>,
    /// Template for the join DM; `{user}` and `{server}` are substituted.
    pub welcome_dm: String,
    pub premium: bool,
    /// Level -> role granted when that level is reached.
    pub level_rewards: BTreeMap<u32, u64>,
    pub filters: FilterToggles,
    pub auto_role: Option<u64>,
    pub ticket_category: Option<u64>,
    pub staff_role: Option<u64>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            welcome_channel: None,
            goodbye_channel: None,
            log_channel: None,
            welcome_dm: DEFAULT_WELCOME_DM.to_string(),
            premium: false,
            level_rewards: BTreeMap::new(),
            filters: FilterToggles::default(),
            auto_role: None,
            ticket_category: None,
            staff_role: None,
        }
    }
}

impl GuildConfig {
    pub fn reward_for_level(&self, level: u32) -> Option<u64> {
        self.level_rewards.get(&level).copied()
    }

    pub fn render_welcome_dm(&self, user_name: &str, server_name: &str) -> String {
        self.welcome_dm
            .replace("{user}", user_name)
            .replace("{server}", server_name)
    }
}

/// A single administrative change to a guild's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigField {
    WelcomeChannel(Option<u64>),
    GoodbyeChannel(Option<u64>),
    LogChannel(Option<u64>),
    WelcomeDm(String),
    Premium(bool),
    Filter(FilterKind, bool),
    /// `role: None` removes the reward for that level.
    LevelReward { level: u32, role: Option<u64> },
    AutoRole(Option<u64>),
    TicketCategory(Option<u64>),
    StaffRole(Option<u64>),
}

impl ConfigField {
    pub fn apply(self, config: &mut GuildConfig) {
        match self {
            ConfigField::WelcomeChannel(id) => config.welcome_channel = id,
            ConfigField::GoodbyeChannel(id) => config.goodbye_channel = id,
            ConfigField::LogChannel(id) => config.log_channel = id,
            ConfigField::WelcomeDm(template) => config.welcome_dm = template,
            ConfigField::Premium(enabled) => config.premium = enabled,
            ConfigField::Filter(kind, enabled) => config.filters.set(kind, enabled),
            ConfigField::LevelReward { level, role } => match role {
                Some(role_id) => {
                    config.level_rewards.insert(level, role_id);
                }
                None => {
                    config.level_rewards.remove(&level);
                }
            },
            ConfigField::AutoRole(id) => config.auto_role = id,
            ConfigField::TicketCategory(id) => config.ticket_category = id,
            ConfigField::StaffRole(id) => config.staff_role = id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_every_filter() {
        let config = GuildConfig::default();
        assert!(config.filters.anti_link);
        assert!(config.filters.anti_spam);
        assert!(config.filters.caps_filter);
        assert_eq!(config.welcome_dm, DEFAULT_WELCOME_DM);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config: GuildConfig =
            serde_json::from_str(r#"{"log_channel": 9, "filters": {"anti_link": false}}"#).unwrap();
        assert_eq!(config.log_channel, Some(9));
        assert!(!config.filters.anti_link);
        assert!(config.filters.caps_filter);
    }

    #[test]
    fn level_rewards_can_be_set_and_removed() {
        let mut config = GuildConfig::default();
        ConfigField::LevelReward { level: 5, role: Some(77) }.apply(&mut config);
        assert_eq!(config.reward_for_level(5), Some(77));

        ConfigField::LevelReward { level: 5, role: None }.apply(&mut config);
        assert_eq!(config.reward_for_level(5), None);
    }

    #[test]
    fn welcome_template_substitutes_placeholders() {
        let config = GuildConfig::default();
        assert_eq!(
            config.render_welcome_dm("ferris", "Rustaceans"),
            "👋 Welcome ferris to Rustaceans!"
        );
    }
}
