// Discord commands module.
// Each feature gets its own command file.

use crate::discord::{Data, Error};

pub mod help;
pub mod leveling;
pub mod moderation;
pub mod panels;
pub mod presence;
pub mod setup;

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        help::help(),
        setup::setup(),
        setup::premium_info(),
        moderation::warn(),
        moderation::clearwarnings(),
        moderation::recheckban(),
        moderation::warnings(),
        moderation::timeout(),
        moderation::untimeout(),
        moderation::timeouts(),
        moderation::infractions(),
        moderation::ban(),
        moderation::unban(),
        moderation::kick(),
        leveling::rank(),
        leveling::leaderboard(),
        leveling::give_xp(),
        panels::rolepanel(),
        crate::discord::tickets::ticket_panel(),
    ]
}
