// Guild configuration commands.
//
// Each subcommand maps onto exactly one `ConfigField`; the config service
// owns persistence and the snapshot cache.

use crate::core::config::{ConfigField, FilterKind, GuildConfig};
use crate::discord::{reply_error, Context, Error};
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum FilterChoice {
    #[name = "anti_link"]
    AntiLink,
    #[name = "anti_spam"]
    AntiSpam,
    #[name = "caps_filter"]
    CapsFilter,
}

impl From<FilterChoice> for FilterKind {
    fn from(choice: FilterChoice) -> Self {
        match choice {
            FilterChoice::AntiLink => FilterKind::AntiLink,
            FilterChoice::AntiSpam => FilterKind::AntiSpam,
            FilterChoice::CapsFilter => FilterKind::CapsFilter,
        }
    }
}

/// Configure this server.
#[poise::command(
    slash_command,
    subcommands(
        "show",
        "welcome_channel",
        "goodbye_channel",
        "log_channel",
        "welcome_dm",
        "premium",
        "filter",
        "level_reward",
        "auto_role",
        "ticket_category",
        "staff_role"
    ),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn setup(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

async fn apply(ctx: Context<'_>, field: ConfigField, confirmation: String) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    match ctx.data().engine.config.set_field(guild_id, field).await {
        Ok(_) => {
            ctx.say(format!("✅ {}", confirmation)).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

fn channel_line(channel: Option<u64>) -> String {
    channel.map_or_else(|| "Not set".to_string(), |id| format!("<#{}>", id))
}

fn role_line(role: Option<u64>) -> String {
    role.map_or_else(|| "Not set".to_string(), |id| format!("<@&{}>", id))
}

fn toggle_line(enabled: bool) -> &'static str {
    if enabled {
        "✅ On"
    } else {
        "❌ Off"
    }
}

fn config_embed(config: &GuildConfig) -> serenity::CreateEmbed {
    let rewards = if config.level_rewards.is_empty() {
        "None".to_string()
    } else {
        config
            .level_rewards
            .iter()
            .map(|(level, role)| format!("Level {} → <@&{}>", level, role))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let filters = [FilterKind::AntiLink, FilterKind::AntiSpam, FilterKind::CapsFilter]
        .iter()
        .map(|kind| format!("{}: {}", kind.name(), toggle_line(config.filters.is_enabled(*kind))))
        .collect::<Vec<_>>()
        .join("\n");

    serenity::CreateEmbed::new()
        .title("⚙️ Server Configuration")
        .color(serenity::Colour::BLURPLE)
        .field("Welcome Channel", channel_line(config.welcome_channel), true)
        .field("Goodbye Channel", channel_line(config.goodbye_channel), true)
        .field("Log Channel", channel_line(config.log_channel), true)
        .field("Auto Role", role_line(config.auto_role), true)
        .field("Staff Role", role_line(config.staff_role), true)
        .field("Ticket Category", channel_line(config.ticket_category), true)
        .field("Premium", toggle_line(config.premium), true)
        .field("Filters", filters, false)
        .field("Level Rewards", rewards, false)
        .field("Welcome DM", config.welcome_dm.clone(), false)
}

/// Show the current configuration.
#[poise::command(slash_command, guild_only)]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    match ctx.data().engine.config.get(guild_id).await {
        Ok(config) => {
            ctx.send(
                poise::CreateReply::default()
                    .embed(config_embed(&config))
                    .ephemeral(true),
            )
            .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Set or clear the welcome channel.
#[poise::command(slash_command, guild_only)]
pub async fn welcome_channel(
    ctx: Context<'_>,
    #[description = "Channel for welcome messages (empty to disable)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let id = channel.map(|c| c.id.get());
    apply(ctx, ConfigField::WelcomeChannel(id), format!("Welcome channel: {}", channel_line(id))).await
}

/// Set or clear the goodbye channel.
#[poise::command(slash_command, guild_only)]
pub async fn goodbye_channel(
    ctx: Context<'_>,
    #[description = "Channel for goodbye messages (empty to disable)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let id = channel.map(|c| c.id.get());
    apply(ctx, ConfigField::GoodbyeChannel(id), format!("Goodbye channel: {}", channel_line(id))).await
}

/// Set or clear the moderation log channel.
#[poise::command(slash_command, guild_only)]
pub async fn log_channel(
    ctx: Context<'_>,
    #[description = "Channel for moderation logs (empty to disable)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let id = channel.map(|c| c.id.get());
    apply(ctx, ConfigField::LogChannel(id), format!("Log channel: {}", channel_line(id))).await
}

/// Set the DM sent to new members. Use {user} and {server} as placeholders.
#[poise::command(slash_command, guild_only)]
pub async fn welcome_dm(
    ctx: Context<'_>,
    #[description = "Message template"]
    #[max_length = 1500]
    message: String,
) -> Result<(), Error> {
    let preview = message.clone();
    apply(ctx, ConfigField::WelcomeDm(message), format!("Welcome DM set:\n>>> {}", preview)).await
}

/// Turn premium features on or off.
#[poise::command(slash_command, guild_only)]
pub async fn premium(
    ctx: Context<'_>,
    #[description = "Enable premium"] enabled: bool,
) -> Result<(), Error> {
    apply(ctx, ConfigField::Premium(enabled), format!("Premium: {}", toggle_line(enabled))).await
}

fn premium_summary(enabled: bool) -> &'static str {
    if enabled {
        "✨ Premium utilities are active: advanced logs, priority ticket handling and extra automod rules."
    } else {
        "This server does not have premium utilities enabled. Ask an admin to run `/setup premium true`."
    }
}

/// Show whether premium utilities are enabled here.
#[poise::command(slash_command, guild_only)]
pub async fn premium_info(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    match ctx.data().engine.config.get(guild_id).await {
        Ok(config) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(premium_summary(config.premium))
                    .ephemeral(true),
            )
            .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Toggle one of the content filters.
#[poise::command(slash_command, guild_only)]
pub async fn filter(
    ctx: Context<'_>,
    #[description = "Which filter"] kind: FilterChoice,
    #[description = "Enable or disable"] enabled: bool,
) -> Result<(), Error> {
    let kind = FilterKind::from(kind);
    apply(
        ctx,
        ConfigField::Filter(kind, enabled),
        format!("{}: {}", kind.name(), toggle_line(enabled)),
    )
    .await
}

/// Grant a role when members reach a level (leave the role empty to remove).
#[poise::command(slash_command, guild_only)]
pub async fn level_reward(
    ctx: Context<'_>,
    #[description = "Level that unlocks the reward"]
    #[min = 1]
    level: u32,
    #[description = "Role to grant"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let role_id = role.as_ref().map(|r| r.id.get());
    let confirmation = match role_id {
        Some(id) => format!("Level {} now grants <@&{}>", level, id),
        None => format!("Level {} reward removed", level),
    };
    apply(ctx, ConfigField::LevelReward { level, role: role_id }, confirmation).await
}

/// Set or clear the role given to every new member.
#[poise::command(slash_command, guild_only)]
pub async fn auto_role(
    ctx: Context<'_>,
    #[description = "Role for new members (empty to disable)"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let id = role.map(|r| r.id.get());
    apply(ctx, ConfigField::AutoRole(id), format!("Auto role: {}", role_line(id))).await
}

/// Set or clear the category ticket channels are created in.
#[poise::command(slash_command, guild_only)]
pub async fn ticket_category(
    ctx: Context<'_>,
    #[description = "Category for tickets"]
    #[channel_types("Category")]
    category: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let id = category.map(|c| c.id.get());
    apply(ctx, ConfigField::TicketCategory(id), format!("Ticket category: {}", channel_line(id))).await
}

/// Set or clear the staff role that can see tickets.
#[poise::command(slash_command, guild_only)]
pub async fn staff_role(
    ctx: Context<'_>,
    #[description = "Staff role (empty to clear)"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let id = role.map(|r| r.id.get());
    apply(ctx, ConfigField::StaffRole(id), format!("Staff role: {}", role_line(id))).await
}
