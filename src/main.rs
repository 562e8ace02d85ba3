// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Engines and ports (platform-agnostic)
// - `infra/` = Implementations of core traits (durable stores)
// - `discord/` = Discord-specific adapters (commands, platform, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Translate gateway events into dispatcher calls

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::dispatcher::{Dispatcher, InboundMessage, MessageDisposition};
use crate::core::panels::{parse_control_id, ToggleOutcome};
use crate::discord::commands::{self, presence};
use crate::discord::serenity_platform::trigger_from_reaction;
use crate::discord::{tickets, Data, Error, SerenityPlatform};
use crate::infra::store::JsonStateStore;
use anyhow::Context as _;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            let inbound = InboundMessage {
                guild_id: new_message.guild_id.map(|id| id.get()),
                channel_id: new_message.channel_id.get(),
                message_id: new_message.id.get(),
                author_id: new_message.author.id.get(),
                author_is_automated: new_message.author.bot || new_message.webhook_id.is_some(),
                content: new_message.content.clone(),
                timestamp: Utc::now(),
            };

            if let MessageDisposition::Filtered(reason) = data.engine.on_message(&inbound).await {
                tracing::debug!(message_id = inbound.message_id, ?reason, "Message filtered");
            }
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            if let Err(e) = handle_component(ctx, data, component).await {
                tracing::error!("Error handling component interaction: {}", e);
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            handle_reaction(ctx, data, add_reaction, true).await;
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            handle_reaction(ctx, data, removed_reaction, false).await;
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if !new_member.user.bot {
                data.engine
                    .on_member_join(
                        new_member.guild_id.get(),
                        new_member.user.id.get(),
                        &new_member.user.name,
                    )
                    .await;
            }
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            if !user.bot {
                data.engine
                    .on_member_remove(guild_id.get(), user.id.get(), &user.name)
                    .await;
            }
        }
        _ => {}
    }

    Ok(())
}

async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    if tickets::handle_component(ctx, data, component).await? {
        return Ok(());
    }

    let Some((message_id, trigger)) = parse_control_id(&component.data.custom_id) else {
        tracing::debug!(custom_id = %component.data.custom_id, "Ignoring unknown component");
        return Ok(());
    };
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    let reply = match data
        .engine
        .on_toggle(guild_id.get(), component.user.id.get(), message_id, &trigger)
        .await
    {
        Ok(ToggleOutcome::Granted(role_id)) => format!("✅ Added <@&{}>", role_id),
        Ok(ToggleOutcome::Revoked(role_id)) => format!("❎ Removed <@&{}>", role_id),
        Err(err) => format!("❌ {}", err),
    };

    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(reply)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_reaction(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
    added: bool,
) {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return;
    };
    // Our own pre-populated reactions must not toggle anything.
    if user_id == ctx.cache.current_user().id {
        return;
    }
    let Some(trigger) = trigger_from_reaction(&reaction.emoji) else {
        return;
    };

    data.engine
        .on_reaction(
            guild_id.get(),
            user_id.get(),
            reaction.message_id.get(),
            trigger.canonical(),
            added,
        )
        .await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let token = std::env::var("DISCORD_TOKEN")
        .context("Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.")?;

    // Keep runtime state in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let store = Arc::new(
        JsonStateStore::open(&data_dir)
            .await
            .with_context(|| format!("Failed to open state directory {}", data_dir))?,
    );
    tracing::info!(data_dir = %data_dir, "State store ready");

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    if let poise::FrameworkError::Command { error, ctx, .. } = &error {
                        tracing::error!(command = %ctx.command().name, "Command failed: {}", error);
                    }
                    if let Err(e) = poise::builtins::on_error(error).await {
                        tracing::error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                // Composition root: one store, one platform adapter, all engines.
                let platform = Arc::new(SerenityPlatform::new(ctx.http.clone(), ctx.cache.clone()));
                let engine = Arc::new(Dispatcher::new(store, platform));

                let reconcile_engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let summary = reconcile_engine.on_ready().await;
                    tracing::info!(
                        total = summary.total,
                        rendered = summary.rendered,
                        missing = summary.missing,
                        failed = summary.failed,
                        "Startup panel reconcile finished"
                    );
                });

                // Spam windows and XP cooldowns are memory-only; prune them periodically.
                let sweep_engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                    loop {
                        ticker.tick().await;
                        sweep_engine.sweep_ephemeral(Utc::now());
                    }
                });

                presence::spawn_rotation(ctx.clone());
                tracing::info!("Bot is ready!");

                Ok(Data { engine })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
