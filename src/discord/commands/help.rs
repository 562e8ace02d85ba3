use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;

// Category definitions with emojis and order
const CATEGORY_ORDER: &[&str] = &[
    "Moderation",
    "Progress & Rewards",
    "Role Panels",
    "Support",
    "Server Setup",
];

fn get_category_emoji(category: &str) -> &'static str {
    match category {
        "Moderation" => "🛡️",
        "Progress & Rewards" => "📈",
        "Role Panels" => "🎭",
        "Support" => "🎫",
        "Server Setup" => "⚙️",
        _ => "•",
    }
}

struct CommandMetadata {
    category: &'static str,
    priority: i32,
    note: Option<&'static str>,
}

fn get_command_metadata(name: &str) -> CommandMetadata {
    let (category, priority, note) = match name {
        "warn" => ("Moderation", 100, Some("Five warnings ban automatically.")),
        "timeout" => ("Moderation", 95, Some("Every third timeout adds a warning.")),
        "untimeout" => ("Moderation", 90, None),
        "kick" => ("Moderation", 85, None),
        "ban" => ("Moderation", 80, None),
        "unban" => ("Moderation", 75, Some("Accepts an id, name or name#1234.")),
        "infractions" => ("Moderation", 70, None),
        "warnings" => ("Moderation", 65, None),
        "timeouts" => ("Moderation", 60, None),
        "clearwarnings" => ("Moderation", 55, None),
        "recheckban" => ("Moderation", 50, Some("Retries a failed auto-ban once permissions are fixed.")),
        "rank" => ("Progress & Rewards", 80, None),
        "leaderboard" => ("Progress & Rewards", 70, None),
        "give_xp" => ("Progress & Rewards", 0, None),
        "rolepanel" => ("Role Panels", 50, Some("Subcommands: create, add, show")),
        "ticket_panel" => ("Support", 50, None),
        "premium_info" => ("Server Setup", 40, Some("Turn it on with `/setup premium true`.")),
        "setup" => (
            "Server Setup",
            50,
            Some("Channels, filters, level rewards, auto role and more. Try `/setup show`."),
        ),
        _ => ("Server Setup", 0, None),
    };
    CommandMetadata {
        category,
        priority,
        note,
    }
}

/// Show a categorized list of commands.
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let mut categories: HashMap<&str, Vec<(i32, String)>> = HashMap::new();

    for command in &ctx.framework().options().commands {
        if command.hide_in_help || command.name == "help" {
            continue;
        }

        let metadata = get_command_metadata(&command.name);
        let description = command
            .description
            .as_deref()
            .unwrap_or("No description provided.");

        let mut entry = format!("• **/{}** - {}", command.name, description);
        if let Some(note) = metadata.note {
            entry.push_str(&format!("\n  ↳ {}", note));
        }

        categories
            .entry(metadata.category)
            .or_default()
            .push((metadata.priority, entry));
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Command Guide")
        .description("Use slash commands with `/`. The most used commands sit at the top of each section.")
        .color(serenity::Colour::from_rgb(88, 101, 242))
        .timestamp(serenity::Timestamp::now());

    let mut sorted_categories: Vec<_> = categories.keys().cloned().collect();
    sorted_categories.sort_by(|a, b| {
        let pos_a = CATEGORY_ORDER.iter().position(|&x| x == *a).unwrap_or(999);
        let pos_b = CATEGORY_ORDER.iter().position(|&x| x == *b).unwrap_or(999);
        pos_a.cmp(&pos_b).then(a.cmp(b))
    });

    for category in sorted_categories {
        if let Some(entries) = categories.get_mut(category) {
            // Priority descending, then name
            entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let title = format!("{} {}", get_category_emoji(category), category);
            let formatted_entries: Vec<String> = entries.iter().map(|(_, s)| s.clone()).collect();

            for (i, chunk) in chunk_entries(&formatted_entries).iter().enumerate() {
                let field_name = if i == 0 {
                    title.clone()
                } else {
                    format!("{} (cont.)", title)
                };
                embed = embed.field(field_name, chunk.join("\n"), false);
            }
        }
    }

    embed = embed.footer(serenity::CreateEmbedFooter::new(
        "Need a hand? Ping a moderator or open a ticket.",
    ));

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

fn chunk_entries(entries: &[String]) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current_chunk = Vec::new();
    let mut current_length = 0;

    for entry in entries {
        let entry_len = entry.len();
        // Field values are capped at 1024.
        if current_length + entry_len + 1 > 1000 && !current_chunk.is_empty() {
            chunks.push(current_chunk);
            current_chunk = Vec::new();
            current_length = 0;
        }

        current_chunk.push(entry.clone());
        current_length += entry_len + 1;
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_categories_are_split_under_the_field_limit() {
        let entries: Vec<String> = (0..30).map(|i| format!("{:0>60}", i)).collect();
        let chunks = chunk_entries(&entries);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.join("\n").len() <= 1024);
        }
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 30);
    }

    #[test]
    fn unknown_commands_fall_back_to_setup() {
        assert_eq!(get_command_metadata("warn").category, "Moderation");
        assert_eq!(get_command_metadata("mystery").category, "Server Setup");
    }
}
