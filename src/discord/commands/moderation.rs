// Moderation commands - thin wrappers over the escalation engine.
//
// Extract ids, call the service, format the outcome. Errors are turned into
// ephemeral replies so moderators see exactly what the platform refused.

use crate::core::moderation::{
    moderator_mention, Actor, BanOutcome, ClearOutcome, TimeoutEntry, UnbanTarget, WarnOutcome,
    WarningEntry, BAN_THRESHOLD, DEFAULT_REASON,
};
use crate::discord::{reply_error, Context, Error};
use poise::serenity_prelude as serenity;

const HISTORY_LIMIT: usize = 10;
const INFRACTION_PREVIEW: usize = 5;

fn ids(ctx: &Context<'_>) -> Result<(u64, Actor), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    Ok((guild_id, Actor::Moderator(ctx.author().id.get())))
}

fn ban_summary(outcome: &BanOutcome) -> String {
    match outcome {
        BanOutcome::Banned {
            warning_count,
            cleared: true,
        } => format!("🔨 Auto-banned after {} warnings.", warning_count),
        BanOutcome::Banned {
            warning_count,
            cleared: false,
        } => format!(
            "🔨 Auto-banned after {} warnings, but the warnings could not be cleared. Run /clearwarnings before unbanning.",
            warning_count
        ),
        BanOutcome::Failed { error, .. } => {
            format!("❗ Auto-ban threshold reached but the ban failed: {}", error)
        }
    }
}

fn warn_summary(user_id: u64, outcome: &WarnOutcome) -> String {
    let mut text = format!(
        "⚠️ <@{}> has been warned. They now have **{}** warning(s).",
        user_id, outcome.warning_count
    );
    if let Some(ban) = &outcome.ban {
        text.push('\n');
        text.push_str(&ban_summary(ban));
    }
    text
}

fn warning_line(index: usize, entry: &WarningEntry) -> String {
    format!(
        "**{}.** {} by {} <t:{}:R>",
        index,
        entry.reason,
        moderator_mention(&entry.moderator),
        entry.time.timestamp()
    )
}

fn timeout_line(index: usize, entry: &TimeoutEntry) -> String {
    format!(
        "**{}.** {} for {} by {} <t:{}:R>",
        index,
        entry.reason,
        entry.duration,
        moderator_mention(&entry.moderator),
        entry.timestamp.timestamp()
    )
}

/// Number the last `shown` lines of a history of `total` entries.
fn numbered<T>(entries: &[T], total: usize, line: impl Fn(usize, &T) -> String) -> String {
    let first = total - entries.len() + 1;
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| line(first + i, entry))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Warn a member. The fifth warning bans automatically.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[description = "Reason"] reason: String,
) -> Result<(), Error> {
    let (guild_id, actor) = ids(&ctx)?;
    if user.bot {
        return reply_error(ctx, "Bots can't be warned.").await;
    }

    match ctx
        .data()
        .engine
        .moderation
        .warn(guild_id, actor, user.id.get(), &reason)
        .await
    {
        Ok(outcome) => {
            ctx.say(warn_summary(user.id.get(), &outcome)).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Retry the automatic ban for a member already at the warning threshold,
///
/// e.g. after the bot's ban permission was fixed.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn recheckban(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, _) = ids(&ctx)?;
    match ctx
        .data()
        .engine
        .moderation
        .evaluate_ban(guild_id, user.id.get())
        .await
    {
        Ok(Some(outcome)) => {
            ctx.say(format!("<@{}>: {}", user.id, ban_summary(&outcome))).await?;
            Ok(())
        }
        Ok(None) => {
            ctx.say(format!(
                "<@{}> is below the {}-warning threshold; nothing to do.",
                user.id, BAN_THRESHOLD
            ))
            .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Clear all warnings for a member.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn clearwarnings(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, actor) = ids(&ctx)?;
    match ctx
        .data()
        .engine
        .moderation
        .clear_warnings(guild_id, actor, user.id.get())
        .await
    {
        Ok(ClearOutcome::Cleared(count)) => {
            ctx.say(format!("🧹 Cleared {} warning(s) for <@{}>.", count, user.id))
                .await?;
            Ok(())
        }
        Ok(ClearOutcome::NothingToClear) => {
            ctx.say(format!("<@{}> has no warnings.", user.id)).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Show a member's recent warnings.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, _) = ids(&ctx)?;
    let record = match ctx.data().engine.moderation.warnings(guild_id, user.id.get()).await {
        Ok(record) => record,
        Err(err) => return reply_error(ctx, err).await,
    };

    if record.is_empty() {
        ctx.say(format!("<@{}> has no warnings.", user.id)).await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("⚠️ Warnings for {}", user.name))
        .color(serenity::Colour::ORANGE)
        .description(numbered(record.recent(HISTORY_LIMIT), record.len(), warning_line))
        .footer(serenity::CreateEmbedFooter::new(format!("Total: {}", record.len())));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Time a member out, e.g. `10m`, `2h`, `1d`.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn timeout(
    ctx: Context<'_>,
    #[description = "Member to time out"] user: serenity::User,
    #[description = "Duration such as 30s, 10m, 2h, 1d"] duration: String,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let (guild_id, actor) = ids(&ctx)?;
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());

    match ctx
        .data()
        .engine
        .moderation
        .timeout(guild_id, actor, user.id.get(), &duration, &reason)
        .await
    {
        Ok(outcome) => {
            let mut text = format!(
                "⏳ <@{}> timed out for **{}**. Timeouts on record: {}.",
                user.id,
                duration.trim(),
                outcome.timeout_count
            );
            if let Some(auto_warn) = &outcome.auto_warn {
                text.push('\n');
                text.push_str(&warn_summary(user.id.get(), auto_warn));
            }
            ctx.say(text).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Lift a member's timeout. Their timeout history is kept.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn untimeout(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, actor) = ids(&ctx)?;
    match ctx
        .data()
        .engine
        .moderation
        .remove_timeout(guild_id, actor, user.id.get())
        .await
    {
        Ok(()) => {
            ctx.say(format!("✅ Timeout removed for <@{}>.", user.id)).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Show a member's recent timeouts.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn timeouts(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, _) = ids(&ctx)?;
    let record = match ctx.data().engine.moderation.timeouts(guild_id, user.id.get()).await {
        Ok(record) => record,
        Err(err) => return reply_error(ctx, err).await,
    };

    if record.is_empty() {
        ctx.say(format!("<@{}> has no timeouts.", user.id)).await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("⏳ Timeouts for {}", user.name))
        .color(serenity::Colour::GOLD)
        .description(numbered(record.recent(HISTORY_LIMIT), record.len(), timeout_line))
        .footer(serenity::CreateEmbedFooter::new(format!("Total: {}", record.len())));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Summarize a member's warnings and timeouts.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn infractions(
    ctx: Context<'_>,
    #[description = "Member"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, _) = ids(&ctx)?;
    let summary = match ctx.data().engine.moderation.infractions(guild_id, user.id.get()).await {
        Ok(summary) => summary,
        Err(err) => return reply_error(ctx, err).await,
    };

    let warnings = if summary.warnings.is_empty() {
        "None".to_string()
    } else {
        numbered(
            summary.warnings.recent(INFRACTION_PREVIEW),
            summary.warnings.len(),
            warning_line,
        )
    };
    let timeouts = if summary.timeouts.is_empty() {
        "None".to_string()
    } else {
        numbered(
            summary.timeouts.recent(INFRACTION_PREVIEW),
            summary.timeouts.len(),
            timeout_line,
        )
    };

    let embed = serenity::CreateEmbed::new()
        .title(format!("📋 Infractions for {}", user.name))
        .color(serenity::Colour::RED)
        .field(format!("Warnings ({})", summary.warnings.len()), warnings, false)
        .field(format!("Timeouts ({})", summary.timeouts.len()), timeouts, false)
        .footer(serenity::CreateEmbedFooter::new(format!("Total infractions: {}", summary.total())));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Ban a member.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let (guild_id, actor) = ids(&ctx)?;
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    match ctx.data().engine.moderation.ban(guild_id, actor, user.id.get(), &reason).await {
        Ok(()) => {
            ctx.say(format!("🔨 Banned **{}**: {}", user.name, reason)).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Unban by user id, `name` or `name#discriminator`.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User id or name"] user: String,
) -> Result<(), Error> {
    let (guild_id, actor) = ids(&ctx)?;
    let Some(target) = UnbanTarget::parse(&user) else {
        return reply_error(ctx, "Give a user id or name.").await;
    };

    match ctx.data().engine.moderation.unban(guild_id, actor, &target).await {
        Ok(user_id) => {
            ctx.say(format!("✅ Unbanned <@{}>.", user_id)).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

/// Kick a member.
#[poise::command(slash_command, guild_only, required_permissions = "KICK_MEMBERS")]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let (guild_id, actor) = ids(&ctx)?;
    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    match ctx.data().engine.moderation.kick(guild_id, actor, user.id.get(), &reason).await {
        Ok(()) => {
            ctx.say(format!("👢 Kicked **{}**: {}", user.name, reason)).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(reason: &str) -> WarningEntry {
        WarningEntry {
            moderator: "42".into(),
            reason: reason.into(),
            time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn numbering_continues_from_the_full_history() {
        let entries = vec![entry("a"), entry("b")];
        let text = numbered(&entries, 7, warning_line);
        assert!(text.starts_with("**6.** a by <@42>"));
        assert!(text.contains("**7.** b by <@42> <t:1700000000:R>"));
    }

    #[test]
    fn warn_summary_mentions_auto_ban() {
        let banned = WarnOutcome {
            warning_count: 5,
            ban: Some(BanOutcome::Banned { warning_count: 5, cleared: true }),
        };
        assert!(warn_summary(9, &banned).contains("Auto-banned after 5 warnings"));

        let failed = WarnOutcome {
            warning_count: 6,
            ban: Some(BanOutcome::Failed {
                warning_count: 6,
                error: "Missing Permissions".into(),
            }),
        };
        assert!(warn_summary(9, &failed).contains("ban failed: Missing Permissions"));
    }

    #[test]
    fn uncleared_ban_points_at_clearwarnings() {
        let text = ban_summary(&BanOutcome::Banned {
            warning_count: 5,
            cleared: false,
        });
        assert!(text.contains("Auto-banned after 5 warnings"));
        assert!(text.contains("/clearwarnings"));
    }
}
