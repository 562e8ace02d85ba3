// Content filter - classifies one inbound message before anything else sees it.
//
// Checks run in a fixed order and the first match wins:
// anti-link -> caps -> anti-spam.
//
// The spam windows live only in this process. A restart empties them, which
// acts as a natural cool-down; they are never persisted.

use super::moderation_models::{FilterReason, FilterVerdict};
use crate::core::config::FilterToggles;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::collections::VecDeque;

/// Minimum number of letters before the caps check applies.
const CAPS_MIN_LETTERS: usize = 10;
/// Sliding window for the spam check.
const SPAM_WINDOW_SECS: i64 = 5;
/// More than this many messages inside the window is spam.
const SPAM_MAX_MESSAGES: usize = 5;

pub struct ContentFilter {
    link_pattern: Regex,
    /// (guild_id, user_id) -> recent message timestamps, oldest first
    spam_windows: DashMap<(u64, u64), VecDeque<DateTime<Utc>>>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFilter {
    pub fn new() -> Self {
        Self {
            link_pattern: Regex::new(r"(?i)https?://\S+").expect("link pattern is a valid regex"),
            spam_windows: DashMap::new(),
        }
    }

    /// Classify a message sent by `user_id` in `guild_id` at `now`.
    pub fn classify(
        &self,
        guild_id: u64,
        user_id: u64,
        content: &str,
        now: DateTime<Utc>,
        toggles: &FilterToggles,
    ) -> FilterVerdict {
        if toggles.anti_link && self.contains_link(content) {
            return FilterVerdict::Reject(FilterReason::Link);
        }

        if toggles.caps_filter && is_shouting(content) {
            return FilterVerdict::Reject(FilterReason::Caps);
        }

        if toggles.anti_spam && self.record_and_check_spam(guild_id, user_id, now) {
            return FilterVerdict::Reject(FilterReason::Spam);
        }

        FilterVerdict::Pass
    }

    fn contains_link(&self, content: &str) -> bool {
        self.link_pattern.is_match(content)
    }

    /// Push `now` into the sender's window, prune old entries, and report
    /// whether the window is over the limit.
    fn record_and_check_spam(&self, guild_id: u64, user_id: u64, now: DateTime<Utc>) -> bool {
        let window = Duration::seconds(SPAM_WINDOW_SECS);
        let mut timestamps = self.spam_windows.entry((guild_id, user_id)).or_default();

        timestamps.push_back(now);
        while let Some(oldest) = timestamps.front() {
            if now - *oldest >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        timestamps.len() > SPAM_MAX_MESSAGES
    }

    /// Drop windows whose newest entry is already outside the lookback.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let window = Duration::seconds(SPAM_WINDOW_SECS);
        self.spam_windows
            .retain(|_, timestamps| timestamps.back().is_some_and(|newest| now - *newest < window));
    }
}

/// At least ten letters once everything else is stripped, and every one of
/// them uppercase.
fn is_shouting(content: &str) -> bool {
    let letters: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= CAPS_MIN_LETTERS && letters.iter().all(|c| c.is_uppercase())
}
