// Moderation domain models - warning/timeout history and the outcomes the
// escalation engine reports back.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer turns outcomes into replies and embeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Warnings at or above this count trigger an automatic ban.
pub const BAN_THRESHOLD: usize = 5;
/// Every Nth recorded timeout synthesizes one automatic warning.
pub const TIMEOUTS_PER_AUTO_WARN: usize = 3;

pub const AUTO_MOD_LABEL: &str = "Auto-Mod";
pub const AUTO_WARN_REASON: &str = "repeated timeouts";
pub const AUTO_BAN_REASON: &str = "Auto-ban: exceeded 5 warnings";
pub const DEFAULT_REASON: &str = "No reason provided";

/// Who performed a moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Moderator(u64),
    AutoMod,
}

impl Actor {
    /// Value stored in the `moderator` field of history entries.
    pub fn label(&self) -> String {
        match self {
            Actor::Moderator(id) => id.to_string(),
            Actor::AutoMod => AUTO_MOD_LABEL.to_string(),
        }
    }

    pub fn mention(&self) -> String {
        match self {
            Actor::Moderator(id) => format!("<@{}>", id),
            Actor::AutoMod => AUTO_MOD_LABEL.to_string(),
        }
    }
}

/// Render a stored `moderator` label for display.
pub fn moderator_mention(label: &str) -> String {
    match label.parse::<u64>() {
        Ok(id) => format!("<@{}>", id),
        Err(_) => label.to_string(),
    }
}

// ============================================================================
// DURABLE RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningEntry {
    pub moderator: String,
    pub reason: String,
    pub time: DateTime<Utc>,
}

/// Ordered warning history for one (guild, user).
///
/// Append-only except for an explicit clear and the auto-ban consumption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarningRecord(pub Vec<WarningEntry>);

impl WarningRecord {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, entry: WarningEntry) {
        self.0.push(entry);
    }

    pub fn reaches_ban_threshold(&self) -> bool {
        self.len() >= BAN_THRESHOLD
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[WarningEntry] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutEntry {
    pub moderator: String,
    /// Duration as typed by the moderator, e.g. `10m`.
    pub duration: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only timeout history for one (guild, user). This is an audit trail;
/// whether the user is currently timed out is owned by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeoutRecord(pub Vec<TimeoutEntry>);

impl TimeoutRecord {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, entry: TimeoutEntry) {
        self.0.push(entry);
    }

    /// True when the record length sits on a multiple of the auto-warn step.
    pub fn crossed_auto_warn_boundary(&self) -> bool {
        !self.0.is_empty() && self.0.len() % TIMEOUTS_PER_AUTO_WARN == 0
    }

    pub fn recent(&self, n: usize) -> &[TimeoutEntry] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }
}

// ============================================================================
// CONTENT FILTER
// ============================================================================

/// Why the content filter rejected a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Link,
    Caps,
    Spam,
}

impl FilterReason {
    pub fn audit_text(&self, user_id: u64) -> String {
        match self {
            FilterReason::Link => format!("🚫 Link removed from <@{}>", user_id),
            FilterReason::Caps => format!("🧢 Caps message deleted from <@{}>", user_id),
            FilterReason::Spam => format!("🚷 Spam: <@{}>", user_id),
        }
    }

    pub fn notice_text(&self, guild_name: &str) -> String {
        match self {
            FilterReason::Link => format!("⚠️ Links are not allowed in {}.", guild_name),
            FilterReason::Caps => "🧢 Please avoid excessive caps.".to_string(),
            FilterReason::Spam => "⛔ Slow down, you're sending messages too quickly.".to_string(),
        }
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::Link => write!(f, "Link"),
            FilterReason::Caps => write!(f, "Excessive Caps"),
            FilterReason::Spam => write!(f, "Spam"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Pass,
    Reject(FilterReason),
}

// ============================================================================
// ESCALATION OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanOutcome {
    /// The user was banned. `cleared` is false when the warning record could
    /// not be reset afterwards and still holds `warning_count` entries.
    Banned { warning_count: usize, cleared: bool },
    /// The platform refused; the record is kept so the next warning retries.
    Failed { warning_count: usize, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarnOutcome {
    /// Record length right after the append.
    pub warning_count: usize,
    pub ban: Option<BanOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutOutcome {
    pub timeout_count: usize,
    pub auto_warn: Option<WarnOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared(usize),
    NothingToClear,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Infractions {
    pub warnings: WarningRecord,
    pub timeouts: TimeoutRecord,
}

impl Infractions {
    pub fn total(&self) -> usize {
        self.warnings.len() + self.timeouts.len()
    }
}

/// How a moderator identified the user to unban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnbanTarget {
    Id(u64),
    /// `name` or `name#discriminator`
    Name(String),
}

impl UnbanTarget {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match input.parse::<u64>() {
            Ok(id) => Some(UnbanTarget::Id(id)),
            Err(_) => Some(UnbanTarget::Name(input.to_string())),
        }
    }
}
