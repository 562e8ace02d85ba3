// Discord layer - commands, event glue and the serenity Platform adapter.

use crate::core::dispatcher::Dispatcher;
use crate::infra::store::JsonStateStore;
use std::sync::Arc;

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "formatter.rs"]
pub mod formatter;

#[path = "leveling/leveling_announcements.rs"]
pub mod leveling_announcements;

#[path = "serenity_platform.rs"]
pub mod serenity_platform;

#[path = "tickets/tickets.rs"]
pub mod tickets;

pub use serenity_platform::SerenityPlatform;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// The engine stack as the bot runs it.
pub type Engine = Dispatcher<JsonStateStore, SerenityPlatform>;

/// User data, which is stored and accessible in all command invocations.
pub struct Data {
    pub engine: Arc<Engine>,
}

/// Reply privately with a failure message instead of bubbling the error up
/// to poise's generic handler.
pub async fn reply_error(ctx: Context<'_>, err: impl std::fmt::Display) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(format!("❌ {}", err))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
