// Bot presence rotation.
//
// Discord-layer glue only: Context, ActivityData and OnlineStatus never leave
// this file.

use poise::serenity_prelude as serenity;
use std::time::Duration;

const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Watching,
    Listening,
    Playing,
    Competing,
}

const STATUSES: &[(Verb, &str)] = &[
    (Verb::Watching, "over the server 👀"),
    (Verb::Listening, "to your commands 🎧"),
    (Verb::Playing, "with moderation tools 🛠️"),
    (Verb::Competing, "for best bot award 🏆"),
    (Verb::Watching, "for rule breakers ⚔️"),
    (Verb::Listening, "to feedback 💬"),
];

fn activity(index: usize) -> serenity::ActivityData {
    let (verb, text) = STATUSES[index % STATUSES.len()];
    match verb {
        Verb::Watching => serenity::ActivityData::watching(text),
        Verb::Listening => serenity::ActivityData::listening(text),
        Verb::Playing => serenity::ActivityData::playing(text),
        Verb::Competing => serenity::ActivityData::competing(text),
    }
}

/// Cycle through the status list forever. Spawn once from setup.
pub fn spawn_rotation(ctx: serenity::Context) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ROTATION_INTERVAL);
        let mut index = 0usize;
        loop {
            ticker.tick().await;
            ctx.set_presence(Some(activity(index)), serenity::OnlineStatus::Online);
            tracing::debug!(index, "Presence rotated");
            index = index.wrapping_add(1);
        }
    });
}
