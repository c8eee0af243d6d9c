use serenity::model::prelude::*;
use serenity::prelude::*;
use tracing::{error, info, warn};

use crate::ai::{truncate_for_discord, Generation};
use crate::bot::Handler;

const AI_CHANNEL: &str = "ai-chat";
const OFFLINE: &str = "🤖 The AI assistant is offline right now. An admin needs to configure the API key.";
const BLOCKED: &str = "🚫 I can't answer that one. The request was blocked by the safety filters.";
const EMPTY: &str = "🤔 I couldn't come up with a response. Try rephrasing your question.";

fn reply_text(generation: Generation) -> String {
    match generation {
        Generation::Text(text) => truncate_for_discord(&text),
        Generation::Blocked(_) => BLOCKED.to_string(),
        Generation::Empty => EMPTY.to_string(),
    }
}

/// Answers messages posted in the AI channel. Returns `true` when handled.
pub async fn respond(handler: &Handler, ctx: &Context, msg: &Message) -> bool {
    if msg.author.bot || msg.guild_id.is_none() || msg.content.trim().is_empty() {
        return false;
    }
    match msg.channel_id.name(ctx).await {
        Ok(name) if name == AI_CHANNEL => {}
        _ => return false,
    }

    let Some(gemini) = &handler.gemini else {
        if let Err(e) = msg.reply(&ctx.http, OFFLINE).await {
            warn!("Failed to send offline notice: {}", e);
        }
        return true;
    };

    let typing = msg.channel_id.start_typing(&ctx.http);
    let reply = match gemini.generate_response(&msg.content).await {
        Ok(generation) => {
            if let Generation::Blocked(reason) = &generation {
                info!("Generation for {} blocked: {}", msg.author.id, reason);
            }
            reply_text(generation)
        }
        Err(e) => {
            error!("Failed to generate AI response: {}", e);
            e.user_message().to_string()
        }
    };
    typing.stop();

    if let Err(e) = msg.reply(&ctx.http, reply).await {
        error!("Failed to send AI response: {}", e);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::DISCORD_MESSAGE_LIMIT;

    #[test]
    fn replies_distinguish_blocked_from_empty() {
        assert_eq!(reply_text(Generation::Blocked("SAFETY".into())), BLOCKED);
        assert_eq!(reply_text(Generation::Empty), EMPTY);
        assert_ne!(BLOCKED, EMPTY);
    }

    #[test]
    fn long_replies_are_truncated() {
        let reply = reply_text(Generation::Text("x".repeat(5000)));
        assert!(reply.chars().count() <= DISCORD_MESSAGE_LIMIT);
        assert_eq!(reply_text(Generation::Text("hi".into())), "hi");
    }
}
