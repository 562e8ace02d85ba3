// Role panel commands. The panel engine owns the mapping; these commands only
// post the anchor message and forward ids.

use crate::core::panels::{PanelDefinition, PanelKind, TriggerKey};
use crate::discord::{reply_error, Context, Error};
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PanelChoice {
    #[name = "buttons"]
    Button,
    #[name = "reactions"]
    Reaction,
}

impl From<PanelChoice> for PanelKind {
    fn from(choice: PanelChoice) -> Self {
        match choice {
            PanelChoice::Button => PanelKind::Button,
            PanelChoice::Reaction => PanelKind::Reaction,
        }
    }
}

/// Message ids overflow Discord's integer option, so they arrive as text.
fn parse_message_id(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|id| *id != 0)
}

fn describe_mappings(panel: &PanelDefinition) -> String {
    let lines: Vec<String> = panel
        .triggers()
        .map(|(trigger, role)| format!("{} → <@&{}>", trigger, role))
        .collect();
    if lines.is_empty() {
        "No roles mapped yet.".to_string()
    } else {
        lines.join("\n")
    }
}

/// Self-assignable role panels.
#[poise::command(
    slash_command,
    subcommands("create", "add", "show"),
    required_permissions = "MANAGE_ROLES",
    guild_only
)]
pub async fn rolepanel(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Post a new role panel in this channel.
#[poise::command(slash_command, guild_only)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Buttons or reactions"] kind: PanelChoice,
    #[description = "Panel title"]
    #[max_length = 200]
    title: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let kind = PanelKind::from(kind);
    let hint = match kind {
        PanelKind::Button => "Press a button to toggle a role.",
        PanelKind::Reaction => "React to get a role, remove your reaction to drop it.",
    };

    let embed = serenity::CreateEmbed::new()
        .title(title)
        .description(hint)
        .color(serenity::Colour::BLURPLE);
    let message = ctx
        .channel_id()
        .send_message(ctx.http(), serenity::CreateMessage::new().embed(embed))
        .await?;

    match ctx
        .data()
        .engine
        .panels
        .create_panel(guild_id, ctx.channel_id().get(), message.id.get(), kind)
        .await
    {
        Ok(_) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!(
                        "✅ Panel created. Message id: `{}`. Use `/rolepanel add` to map roles.",
                        message.id
                    ))
                    .ephemeral(true),
            )
            .await?;
            Ok(())
        }
        Err(err) => {
            if let Err(delete_err) = message.delete(ctx.http()).await {
                tracing::warn!(guild_id, error = %delete_err, "Could not remove orphaned panel message");
            }
            reply_error(ctx, err).await
        }
    }
}

/// Map an emoji or button label to a role.
#[poise::command(slash_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Panel message id"] message_id: String,
    #[description = "Emoji or button label"] trigger: String,
    #[description = "Role to toggle"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let Some(message_id) = parse_message_id(&message_id) else {
        return reply_error(ctx, "That is not a valid message id.").await;
    };
    let Some(trigger) = TriggerKey::parse(&trigger) else {
        return reply_error(ctx, "The trigger can't be empty.").await;
    };

    match ctx
        .data()
        .engine
        .panels
        .add_mapping(guild_id, message_id, &trigger, role.id.get())
        .await
    {
        Ok(outcome) => {
            let mut text = format!("✅ {} → <@&{}>", trigger, role.id);
            if let Some(previous) = outcome.replaced {
                text.push_str(&format!(" (replaced <@&{}>)", previous));
            }
            if !outcome.rendered {
                text.push_str("\n⚠️ Saved, but the panel message could not be updated. It will be retried on restart.");
            }
            ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Show the roles mapped on a panel.
#[poise::command(slash_command, guild_only)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Panel message id"] message_id: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let Some(message_id) = parse_message_id(&message_id) else {
        return reply_error(ctx, "That is not a valid message id.").await;
    };

    let panel = match ctx.data().engine.panels.get(message_id).await {
        Ok(Some(panel)) if panel.guild_id == guild_id => panel,
        Ok(_) => return reply_error(ctx, "No panel is registered for that message.").await,
        Err(err) => return reply_error(ctx, err).await,
    };

    let channel = panel
        .channel_id
        .map_or_else(|| "unknown".to_string(), |id| format!("<#{}>", id));
    let embed = serenity::CreateEmbed::new()
        .title(format!("🧩 {} panel", panel.kind))
        .description(describe_mappings(&panel))
        .field("Channel", channel, true)
        .field("Message", format!("`{}`", message_id), true)
        .color(serenity::Colour::BLURPLE);
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_must_be_positive_integers() {
        assert_eq!(parse_message_id(" 1234567890123456789 "), Some(1234567890123456789));
        assert_eq!(parse_message_id("0"), None);
        assert_eq!(parse_message_id("abc"), None);
    }

    #[test]
    fn mappings_are_listed_per_trigger() {
        let mut panel = PanelDefinition::new(1, Some(2), PanelKind::Button);
        assert_eq!(describe_mappings(&panel), "No roles mapped yet.");
        panel.roles.insert("Gamer".into(), 77);
        assert_eq!(describe_mappings(&panel), "Gamer → <@&77>");
    }
}
