// Panel domain models - declarative trigger -> role mappings anchored to a message.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Emoji presentation selector; clients send it inconsistently.
const VARIATION_SELECTOR: char = '\u{FE0F}';

/// Platform limits a panel must fit into.
pub const MAX_BUTTONS: usize = 25;
pub const MAX_REACTIONS: usize = 20;
pub const MAX_LABEL_CHARS: usize = 80;
pub const MAX_CONTROL_ID_CHARS: usize = 100;

/// Prefix of role panel control IDs: `rr|<message_id>|<trigger>`.
const CONTROL_ID_PREFIX: &str = "rr";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelKind {
    /// Interactive buttons, re-rendered from the mapping.
    Button,
    /// Raw reactions pre-populated on the message.
    Reaction,
}

impl PanelKind {
    /// Most distinct triggers one message can carry.
    pub fn capacity(&self) -> usize {
        match self {
            PanelKind::Button => MAX_BUTTONS,
            PanelKind::Reaction => MAX_REACTIONS,
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelKind::Button => write!(f, "button"),
            PanelKind::Reaction => write!(f, "reaction"),
        }
    }
}

/// What a member clicks or reacts with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerKey {
    /// Unicode emoji (without variation selectors) or a custom emoji
    /// in `<:name:id>` / `<a:name:id>` form.
    Emoji(String),
    /// Plain button text.
    Label(String),
}

impl TriggerKey {
    /// Canonicalize user or platform input. Returns `None` for blank input.
    ///
    /// Variation selectors are dropped, except inside keycap sequences
    /// (`1️⃣`, `#️⃣`) where the platform always sends `<base> FE0F 20E3`.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw.trim().chars().filter(|c| *c != VARIATION_SELECTOR).collect();
        if cleaned.is_empty() {
            return None;
        }

        if is_custom_emoji(&cleaned) || is_emoji_sequence(&cleaned) {
            Some(TriggerKey::Emoji(restore_keycaps(&cleaned)))
        } else {
            Some(TriggerKey::Label(cleaned))
        }
    }

    /// The string stored as the mapping key.
    pub fn canonical(&self) -> &str {
        match self {
            TriggerKey::Emoji(value) | TriggerKey::Label(value) => value,
        }
    }

    pub fn is_emoji(&self) -> bool {
        matches!(self, TriggerKey::Emoji(_))
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

const KEYCAP: char = '\u{20E3}';
const ZERO_WIDTH_JOINER: char = '\u{200D}';

/// Codepoints that only ever appear as part of an emoji presentation.
fn is_emoji_component(c: char) -> bool {
    matches!(
        c as u32,
        0x00A9 | 0x00AE
            | 0x203C | 0x2049 | 0x2122 | 0x2139
            | 0x2190..=0x21FF
            | 0x231A..=0x23FF
            | 0x24C2
            | 0x25A0..=0x27BF
            | 0x2900..=0x297F
            | 0x2B00..=0x2BFF
            | 0x3030 | 0x303D | 0x3297 | 0x3299
            | 0x1F000..=0x1FAFF
            | 0xE0020..=0xE007F
    ) || c == KEYCAP
        || c == ZERO_WIDTH_JOINER
        || c == VARIATION_SELECTOR
}

/// Input with its variation selectors already removed.
fn is_emoji_sequence(value: &str) -> bool {
    let rest: Vec<char> = value.chars().filter(|c| !is_emoji_component(*c)).collect();
    if value.contains(KEYCAP) {
        return matches!(rest.as_slice(), ['0'..='9' | '#' | '*']);
    }
    !rest.iter().any(|c| c.is_alphanumeric())
}

fn restore_keycaps(value: &str) -> String {
    value.replace(KEYCAP, "\u{FE0F}\u{20E3}")
}

fn is_custom_emoji(value: &str) -> bool {
    let Some(inner) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) else {
        return false;
    };
    let inner = inner.strip_prefix('a').unwrap_or(inner);
    let mut parts = inner.split(':');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some(""), Some(name), Some(id), None)
            if !name.is_empty() && !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
    )
}

/// ID attached to the control for `trigger` on panel `message_id`.
pub fn control_id(message_id: u64, trigger: &TriggerKey) -> String {
    format!("{}|{}|{}", CONTROL_ID_PREFIX, message_id, trigger.canonical())
}

/// Inverse of [`control_id`].
pub fn parse_control_id(custom_id: &str) -> Option<(u64, TriggerKey)> {
    let mut parts = custom_id.splitn(3, '|');
    if parts.next()? != CONTROL_ID_PREFIX {
        return None;
    }
    let message_id = parts.next()?.parse().ok()?;
    let trigger = TriggerKey::parse(parts.next()?)?;
    Some((message_id, trigger))
}

/// Persisted panel, keyed by its message ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelDefinition {
    pub guild_id: u64,
    /// Channel the message was last seen in. Reconcile tries it first.
    #[serde(default)]
    pub channel_id: Option<u64>,
    pub kind: PanelKind,
    /// Canonical trigger key -> role ID
    #[serde(default)]
    pub roles: BTreeMap<String, u64>,
}

impl PanelDefinition {
    pub fn new(guild_id: u64, channel_id: Option<u64>, kind: PanelKind) -> Self {
        Self {
            guild_id,
            channel_id,
            kind,
            roles: BTreeMap::new(),
        }
    }

    pub fn role_for(&self, trigger: &TriggerKey) -> Option<u64> {
        self.roles.get(trigger.canonical()).copied()
    }

    /// Mappings in render order.
    pub fn triggers(&self) -> impl Iterator<Item = (TriggerKey, u64)> + '_ {
        self.roles
            .iter()
            .filter_map(|(key, role)| TriggerKey::parse(key).map(|trigger| (trigger, *role)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Granted(u64),
    Revoked(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOutcome {
    pub panel: PanelDefinition,
    /// Previous role for the same trigger, if overwritten.
    pub replaced: Option<u64>,
    /// Whether the visible controls were updated.
    pub rendered: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub total: usize,
    pub rendered: usize,
    pub missing: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_variation_selectors_are_stripped() {
        let plain = TriggerKey::parse("❤").unwrap();
        let selected = TriggerKey::parse("❤\u{FE0F}").unwrap();
        assert_eq!(plain, selected);
        assert!(plain.is_emoji());
    }

    #[test]
    fn custom_emoji_and_labels_are_told_apart() {
        assert_eq!(
            TriggerKey::parse("<:ferris:1234>"),
            Some(TriggerKey::Emoji("<:ferris:1234>".into()))
        );
        assert_eq!(
            TriggerKey::parse("<a:party:99>"),
            Some(TriggerKey::Emoji("<a:party:99>".into()))
        );
        assert_eq!(TriggerKey::parse(" Gamer "), Some(TriggerKey::Label("Gamer".into())));
        assert_eq!(TriggerKey::parse("🔥"), Some(TriggerKey::Emoji("🔥".into())));
        assert_eq!(TriggerKey::parse("   "), None);
    }

    #[test]
    fn keycaps_are_emoji_and_keep_their_selector() {
        let one = TriggerKey::parse("1\u{FE0F}\u{20E3}").unwrap();
        assert_eq!(one, TriggerKey::Emoji("1\u{FE0F}\u{20E3}".into()));
        // Bare keycap without the selector canonicalizes to the same key.
        assert_eq!(TriggerKey::parse("1\u{20E3}").unwrap(), one);
        // Stored keys round-trip through parse unchanged.
        assert_eq!(TriggerKey::parse(one.canonical()).unwrap(), one);

        let hash = TriggerKey::parse("#\u{FE0F}\u{20E3}").unwrap();
        assert!(hash.is_emoji());
        assert_eq!(hash.canonical(), "#\u{FE0F}\u{20E3}");
    }

    #[test]
    fn symbol_emoji_are_not_labels() {
        let m = TriggerKey::parse("\u{24C2}\u{FE0F}").unwrap();
        assert_eq!(m, TriggerKey::Emoji("\u{24C2}".into()));
        assert!(TriggerKey::parse("©\u{FE0F}").unwrap().is_emoji());
        assert!(TriggerKey::parse("👩\u{200D}💻").unwrap().is_emoji());
    }

    #[test]
    fn text_next_to_an_emoji_is_still_a_label() {
        assert!(!TriggerKey::parse("🎮 Gamer").unwrap().is_emoji());
        assert!(!TriggerKey::parse("12\u{20E3}").unwrap().is_emoji());
        assert!(!TriggerKey::parse("ゲーマー").unwrap().is_emoji());
    }

    #[test]
    fn control_ids_round_trip_through_canonical_keys() {
        let trigger = TriggerKey::parse("🔥\u{FE0F}").unwrap();
        let id = control_id(42, &trigger);
        assert_eq!(id, "rr|42|🔥");
        assert_eq!(parse_control_id(&id), Some((42, trigger)));

        let keycap = TriggerKey::parse("2\u{FE0F}\u{20E3}").unwrap();
        assert_eq!(parse_control_id(&control_id(7, &keycap)), Some((7, keycap)));

        assert_eq!(parse_control_id("ticket|open"), None);
        assert_eq!(parse_control_id("rr|nope|🔥"), None);
    }

    #[test]
    fn panels_persist_with_lowercase_kind() {
        let mut panel = PanelDefinition::new(1, Some(2), PanelKind::Reaction);
        panel.roles.insert("🔥".into(), 77);
        let value = serde_json::to_value(&panel).unwrap();
        assert_eq!(value["kind"], "reaction");
        assert_eq!(value["roles"]["🔥"], 77);
    }
}
