// Discord commands for the leveling system.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result

use crate::core::leveling::{required_xp, LeaderboardEntry};
use crate::discord::leveling_announcements::build_progress_bar;
use crate::discord::{reply_error, Context, Error};
use poise::serenity_prelude as serenity;

const LEADERBOARD_SIZE: usize = 10;
const MAX_GRANT: u64 = 1_000_000;

/// Show your current level and XP.
#[poise::command(slash_command, guild_only)]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target_user = user.as_ref().unwrap_or_else(|| ctx.author());
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    if target_user.bot {
        ctx.say("Bots don't earn XP! 🤖").await?;
        return Ok(());
    }

    let info = match ctx
        .data()
        .engine
        .leveling
        .rank(guild_id, target_user.id.get())
        .await
    {
        Ok(info) => info,
        Err(err) => return reply_error(ctx, err).await,
    };

    let previous_threshold = required_xp(info.record.level);
    let level_span = info.next_threshold.saturating_sub(previous_threshold).max(1);
    let xp_progress = info.record.xp.saturating_sub(previous_threshold);
    let xp_needed = info.next_threshold.saturating_sub(info.record.xp);
    let position = info
        .position
        .map_or_else(|| "Unranked".to_string(), |p| format!("#{}", p));

    let embed = serenity::CreateEmbed::new()
        .title(format!("Rank of {}", target_user.name))
        .color(0x00ff00)
        .thumbnail(target_user.face())
        .field("Level", info.record.level.to_string(), true)
        .field("Total XP", info.record.xp.to_string(), true)
        .field("Rank", position, true)
        .field(
            format!("Progress to level {}", info.record.level.saturating_add(1)),
            format!(
                "{}\n{} XP to go",
                build_progress_bar(xp_progress as f64 / level_span as f64, 18),
                xp_needed
            ),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn leaderboard_lines(entries: &[LeaderboardEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let medal = match index + 1 {
                1 => "🥇".to_string(),
                2 => "🥈".to_string(),
                3 => "🥉".to_string(),
                rank => format!("**{}.**", rank),
            };
            format!(
                "{} <@{}> - Level {} ({} XP)",
                medal, entry.user_id, entry.record.level, entry.record.xp
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Display the top members by XP.
#[poise::command(slash_command, guild_only)]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    // Reading every record of a large guild can take a moment.
    ctx.defer().await?;

    let entries = match ctx
        .data()
        .engine
        .leveling
        .leaderboard(guild_id, LEADERBOARD_SIZE)
        .await
    {
        Ok(entries) => entries,
        Err(err) => return reply_error(ctx, err).await,
    };

    if entries.is_empty() {
        ctx.say("No one has earned XP yet! Start chatting to get on the leaderboard! 💬")
            .await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title("🏆 Leaderboard")
        .description(leaderboard_lines(&entries))
        .color(serenity::Colour::GOLD)
        .timestamp(serenity::Timestamp::now());
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Award XP to a member (Admin only).
#[poise::command(
    slash_command,
    guild_only,
    rename = "give_xp",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn give_xp(
    ctx: Context<'_>,
    #[description = "Member to reward"] user: serenity::User,
    #[description = "Amount of XP"]
    #[min = 1]
    amount: u64,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    if user.bot {
        return reply_error(ctx, "Bots don't earn XP.").await;
    }
    if amount > MAX_GRANT {
        return reply_error(ctx, format!("You can grant at most {} XP at once.", MAX_GRANT)).await;
    }

    let engine = &ctx.data().engine;
    let config = match engine.config.get(guild_id).await {
        Ok(config) => config,
        Err(err) => return reply_error(ctx, err).await,
    };

    match engine
        .leveling
        .grant_xp(guild_id, user.id.get(), amount, &config)
        .await
    {
        Ok(award) => {
            let mut text = format!(
                "✨ Gave **{} XP** to <@{}>. They are now level **{}** with {} XP.",
                award.gained, user.id, award.record.level, award.record.xp
            );
            if !award.level_ups.is_empty() {
                text.push_str(&format!("\n🎉 Crossed {} level(s)!", award.level_ups.len()));
            }
            ctx.say(text).await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, err).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leveling::ProgressionRecord;

    #[test]
    fn top_three_get_medals() {
        let entries: Vec<LeaderboardEntry> = (1..=4)
            .map(|i| LeaderboardEntry {
                user_id: i,
                record: ProgressionRecord { xp: 500 - i * 10, level: 2 },
            })
            .collect();
        let lines: Vec<String> = leaderboard_lines(&entries).lines().map(String::from).collect();
        assert!(lines[0].starts_with("🥇 <@1>"));
        assert!(lines[2].starts_with("🥉 <@3>"));
        assert_eq!(lines[3], "**4.** <@4> - Level 2 (460 XP)");
    }
}
