use crate::core::audit::{AuditEntry, AuditKind};
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter};

pub fn audit_colour(kind: AuditKind) -> serenity::Colour {
    match kind {
        AuditKind::Info => serenity::Colour::BLURPLE,
        AuditKind::Warning => serenity::Colour::ORANGE,
        AuditKind::Punishment => serenity::Colour::RED,
        AuditKind::Failure => serenity::Colour::DARK_RED,
    }
}

pub fn audit_embed(entry: &AuditEntry) -> CreateEmbed {
    CreateEmbed::default()
        .title(entry.title.clone())
        .description(entry.text.clone())
        .color(audit_colour(entry.kind))
        .footer(CreateEmbedFooter::new(format!("Guild ID: {}", entry.guild_id)))
        .timestamp(serenity::Timestamp::now())
}
