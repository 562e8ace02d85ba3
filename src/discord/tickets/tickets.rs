// Support tickets - a button that opens a private channel per request.
//
// Tickets carry no durable state of their own: the channel IS the ticket.
// Only the category and staff role come from the guild config.

use crate::core::audit::{AuditEntry, AuditKind};
use crate::discord::{Context, Data, Error};
use poise::serenity_prelude as serenity;
use rand::Rng;

pub const OPEN_TICKET_ID: &str = "ticket|open";
pub const CLOSE_TICKET_ID: &str = "ticket|close";

/// Discord caps channel names at 100 characters.
const MAX_CHANNEL_NAME: usize = 100;

/// `ticket-<name>-<NNNN>`, lowercased and stripped to what Discord allows.
pub fn ticket_channel_name(user_name: &str, suffix: u16) -> String {
    let cleaned: String = user_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let cleaned = if cleaned.is_empty() { "user".to_string() } else { cleaned };

    let mut name = format!("ticket-{}", cleaned);
    let tail = format!("-{}", suffix);
    let budget = MAX_CHANNEL_NAME - tail.len();
    if name.chars().count() > budget {
        name = name.chars().take(budget).collect();
    }
    name + &tail
}

/// Post a ticket panel in the current channel.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD", rename = "ticket_panel")]
pub async fn ticket_panel(ctx: Context<'_>) -> Result<(), Error> {
    let components = vec![serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new(
        OPEN_TICKET_ID,
    )
    .label("Create Ticket")
    .emoji('🎫')
    .style(serenity::ButtonStyle::Success)])];

    ctx.send(
        poise::CreateReply::default()
            .content("🎫 Click to create a ticket.")
            .components(components),
    )
    .await?;
    Ok(())
}

async fn respond_ephemeral(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    text: impl Into<String>,
) -> Result<(), serenity::Error> {
    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await
}

/// Handle a ticket button. Returns `false` for any other component.
pub async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) -> Result<bool, Error> {
    match component.data.custom_id.as_str() {
        OPEN_TICKET_ID => {
            open_ticket(ctx, data, component).await?;
            Ok(true)
        }
        CLOSE_TICKET_ID => {
            close_ticket(ctx, data, component).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn open_ticket(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };
    let config = data.engine.config.get(guild_id.get()).await?;
    let user = &component.user;

    let view_and_talk = serenity::Permissions::VIEW_CHANNEL
        | serenity::Permissions::SEND_MESSAGES
        | serenity::Permissions::READ_MESSAGE_HISTORY;
    let mut permissions = vec![
        serenity::PermissionOverwrite {
            allow: serenity::Permissions::empty(),
            deny: serenity::Permissions::VIEW_CHANNEL,
            kind: serenity::PermissionOverwriteType::Role(serenity::RoleId::new(guild_id.get())),
        },
        serenity::PermissionOverwrite {
            allow: view_and_talk,
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Member(user.id),
        },
        serenity::PermissionOverwrite {
            allow: serenity::Permissions::VIEW_CHANNEL,
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Member(ctx.cache.current_user().id),
        },
    ];
    if let Some(staff_role) = config.staff_role {
        permissions.push(serenity::PermissionOverwrite {
            allow: view_and_talk,
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Role(serenity::RoleId::new(staff_role)),
        });
    }

    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    let name = ticket_channel_name(&user.name, suffix);

    let mut builder = serenity::CreateChannel::new(name.clone())
        .kind(serenity::ChannelType::Text)
        .permissions(permissions);
    if let Some(category) = config.ticket_category {
        builder = builder.category(serenity::ChannelId::new(category));
    }

    let channel = match guild_id.create_channel(&ctx.http, builder).await {
        Ok(channel) => channel,
        Err(err) => {
            tracing::warn!(guild_id = guild_id.get(), error = %err, "Ticket channel creation failed");
            respond_ephemeral(ctx, component, "❌ I couldn't create a ticket channel. Please tell a moderator.").await?;
            return Ok(());
        }
    };

    let close = vec![serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new(
        CLOSE_TICKET_ID,
    )
    .label("Close Ticket")
    .style(serenity::ButtonStyle::Danger)])];
    channel
        .send_message(
            &ctx.http,
            serenity::CreateMessage::new()
                .content(format!("<@{}> Ticket created. Staff will be with you soon.", user.id))
                .components(close),
        )
        .await?;

    respond_ephemeral(ctx, component, format!("✅ Ticket created: <#{}>", channel.id)).await?;

    tracing::info!(guild_id = guild_id.get(), user_id = user.id.get(), channel = %name, "Ticket opened");
    data.engine
        .auditor
        .record(AuditEntry::new(
            guild_id.get(),
            AuditKind::Info,
            "Ticket Created",
            format!("🎫 Ticket created: {} by <@{}>", name, user.id),
        ))
        .await;
    Ok(())
}

async fn close_ticket(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    let channel_name = component
        .channel_id
        .name(&ctx)
        .await
        .unwrap_or_else(|_| component.channel_id.to_string());

    respond_ephemeral(ctx, component, "🔒 Closing ticket...").await?;
    if let Err(err) = component.channel_id.delete(&ctx.http).await {
        tracing::warn!(guild_id = guild_id.get(), error = %err, "Ticket channel deletion failed");
        return Ok(());
    }

    tracing::info!(guild_id = guild_id.get(), channel = %channel_name, "Ticket closed");
    data.engine
        .auditor
        .record(AuditEntry::new(
            guild_id.get(),
            AuditKind::Info,
            "Ticket Closed",
            format!("📄 Ticket {} closed by <@{}>", channel_name, component.user.id),
        ))
        .await;
    Ok(())
}
