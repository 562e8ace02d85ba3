use crate::core::leveling::{required_xp, LevelUpEvent};
use poise::serenity_prelude::{self as serenity, CreateEmbed};
use rand::seq::SliceRandom;

/// Level-up embed with progress toward the next level.
pub fn level_up_embed(level_up: &LevelUpEvent) -> CreateEmbed {
    let previous_threshold = required_xp(level_up.level);
    let next_threshold = required_xp(level_up.level.saturating_add(1));
    let level_span = next_threshold.saturating_sub(previous_threshold).max(1);
    let xp_in_level = level_up
        .total_xp
        .saturating_sub(previous_threshold)
        .min(level_span);
    let progress = xp_in_level as f64 / level_span as f64;

    CreateEmbed::new()
        .title("Level Up!")
        .description(format!(
            "🎉 <@{}> leveled up to **{}**!",
            level_up.user_id, level_up.level
        ))
        .color(level_color(level_up.level))
        .field("Total XP", level_up.total_xp.to_string(), true)
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                xp_in_level,
                level_span,
                build_progress_bar(progress, 18)
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(random_flavor_line()))
}

fn level_color(level: u32) -> serenity::Colour {
    if level >= 50 {
        serenity::Colour::DARK_PURPLE
    } else if level >= 25 {
        serenity::Colour::ORANGE
    } else if level >= 10 {
        serenity::Colour::GOLD
    } else if level >= 5 {
        serenity::Colour::BLURPLE
    } else {
        serenity::Colour::LIGHT_GREY
    }
}

pub fn build_progress_bar(progress: f64, length: usize) -> String {
    let clamped = progress.clamp(0.0, 1.0);
    let mut filled = (clamped * length as f64).round() as usize;
    if clamped > 0.0 && filled == 0 {
        filled = 1;
    }
    filled = filled.min(length);
    let bar = "▰".repeat(filled) + &"▱".repeat(length - filled);
    format!("{} ({}%)", bar, (clamped * 100.0).round() as u32)
}

fn random_flavor_line() -> &'static str {
    const FLAVOR_LINES: [&str; 4] = [
        "Keep chatting to climb higher.",
        "Another level in the books.",
        "The XP bar never stood a chance.",
        "Rewards unlock at milestone levels.",
    ];

    FLAVOR_LINES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FLAVOR_LINES[0])
}
