use serenity::builder::{CreateEmbed, CreateMessage};
use serenity::model::prelude::*;
use serenity::prelude::*;
use tracing::{info, warn};

use crate::commands::find_channel;

const WELCOME_CHANNEL: &str = "👋welcome";
const WELCOME_GIF: &str = "https://media3.giphy.com/media/v1.Y2lkPTc5MGI3NjExaGE4MmxxbmkyemFjMWFoM29wYnRrb2VtOGxjc3JiNW11ancxem5pNSZlcD12MV9pbnRlcm5hbF9naWZfYnlfaWQmY3Q9Zw/8z7SsFoVNCEOj4vKlK/giphy.gif";

fn welcome_text(guild_name: &str, member: UserId, intro: &str, general: &str, services: &str) -> String {
    format!(
        "✨ Welcome to **{guild_name}** ✨\n\
         The first startup community of Bangladesh, where innovators and dreamers connect. 🚀\n\n\
         👋 Start by introducing yourself in {intro} so we get to know you better.\n\n\
         💬 Jump into {general} and say hi to the community.\n\n\
         💼 Got skills? Share your services in {services} and let others discover you.\n\n\
         🔥 Hey <@{member}>, let's make this journey unforgettable together!"
    )
}

async fn mention_or_name(ctx: &Context, guild_id: GuildId, name: &str) -> String {
    match find_channel(ctx, guild_id, name).await {
        Some(channel) => format!("<#{}>", channel.id),
        None => format!("#{}", name),
    }
}

pub async fn greet(ctx: &Context, member: &Member) {
    if member.user.bot {
        return;
    }
    let guild_id = member.guild_id;
    let Some(channel) = find_channel(ctx, guild_id, WELCOME_CHANNEL).await else {
        warn!("#{} not found in guild {}", WELCOME_CHANNEL, guild_id);
        return;
    };

    let guild_name = guild_id.name(&ctx.cache).unwrap_or_else(|| "the server".to_string());
    let intro = mention_or_name(ctx, guild_id, "introduction").await;
    let general = mention_or_name(ctx, guild_id, "general").await;
    let services = mention_or_name(ctx, guild_id, "post-service-or-jobs").await;

    let embed = CreateEmbed::new()
        .description(welcome_text(&guild_name, member.user.id, &intro, &general, &services))
        .color(0xF1C40F)
        .image(WELCOME_GIF);

    let message = CreateMessage::new()
        .content(format!("Hy <@{}>", member.user.id))
        .embed(embed);
    match channel.send_message(&ctx.http, message).await {
        Ok(_) => info!("Welcomed {} to guild {}", member.user.id, guild_id),
        Err(e) => warn!("Failed to send welcome message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_mentions_member_and_channels() {
        let text = welcome_text("Startup Hub", UserId::new(5), "<#1>", "#general", "<#3>");
        assert!(text.starts_with("✨ Welcome to **Startup Hub** ✨"));
        assert!(text.contains("introducing yourself in <#1>"));
        assert!(text.contains("Jump into #general"));
        assert!(text.contains("Hey <@5>"));
    }
}
