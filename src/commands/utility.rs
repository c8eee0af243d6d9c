//! Administrator utilities: announcements, DMs, the allow-list and AI status.

use serenity::builder::{CreateCommand, CreateCommandOption, CreateEmbed, CreateMessage};
use serenity::model::prelude::*;
use serenity::model::Timestamp;
use serenity::prelude::*;
use tracing::{info, warn};

use super::{caller_of, ephemeral, expand_newlines, Options};
use crate::bot::Handler;
use crate::store::permissions::Grant;

pub fn register_say() -> CreateCommand {
    CreateCommand::new("say")
        .description("Make the bot send a message to a channel.")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "Where to send the message.")
                .channel_types(vec![ChannelType::Text, ChannelType::News])
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "message", "The message. Use \\n for new lines.")
                .required(true),
        )
}

pub fn register_dm() -> CreateCommand {
    CreateCommand::new("dm")
        .description("Send a direct message to a member.")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "member", "Who to message.")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "message", "The message. Use \\n for new lines.")
                .required(true),
        )
}

pub fn register_permission() -> CreateCommand {
    CreateCommand::new("permission")
        .description("Manage who may use moderator commands.")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "action", "What to do.")
                .add_string_choice("Add", "add")
                .add_string_choice("Remove", "remove")
                .add_string_choice("List", "list")
                .required(true),
        )
        .add_option(CreateCommandOption::new(CommandOptionType::User, "user", "A user to add or remove."))
        .add_option(CreateCommandOption::new(CommandOptionType::Role, "role", "A role to add or remove."))
}

pub fn register_aicheck() -> CreateCommand {
    CreateCommand::new("aicheck")
        .description("Check the AI configuration status.")
        .default_member_permissions(Permissions::ADMINISTRATOR)
}

fn require_admin(command: &CommandInteraction) -> bool {
    caller_of(&command.user, command.member.as_deref()).administrator
}

pub async fn say(ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !require_admin(command) {
        command.create_response(&ctx.http, ephemeral("Administrator permission required.")).await?;
        return Ok(());
    }
    let options = Options::of(command);
    let (Some(channel), Some(message)) = (options.channel("channel"), options.str("message")) else {
        command.create_response(&ctx.http, ephemeral("Missing required options.")).await?;
        return Ok(());
    };

    let reply = match channel
        .send_message(&ctx.http, CreateMessage::new().content(expand_newlines(message)))
        .await
    {
        Ok(_) => {
            info!("{} used /say in {}", command.user.id, channel);
            format!("✅ Message sent to <#{}>.", channel)
        }
        Err(e) => {
            warn!("/say failed in {}: {}", channel, e);
            format!("❌ I could not send messages in <#{}>.", channel)
        }
    };
    command.create_response(&ctx.http, ephemeral(reply)).await?;
    Ok(())
}

pub async fn dm(ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !require_admin(command) {
        command.create_response(&ctx.http, ephemeral("Administrator permission required.")).await?;
        return Ok(());
    }
    let options = Options::of(command);
    let (Some(user_id), Some(message)) = (options.user("member"), options.str("message")) else {
        command.create_response(&ctx.http, ephemeral("Missing required options.")).await?;
        return Ok(());
    };

    let user = match command.data.resolved.users.get(&user_id) {
        Some(user) => user.clone(),
        None => user_id.to_user(&ctx.http).await?,
    };
    if user.bot {
        command.create_response(&ctx.http, ephemeral("❌ Bots cannot receive DMs.")).await?;
        return Ok(());
    }

    let sent = match user.create_dm_channel(&ctx.http).await {
        Ok(channel) => channel.say(&ctx.http, expand_newlines(message)).await.map(|_| ()),
        Err(e) => Err(e),
    };
    let reply = match sent {
        Ok(()) => {
            info!("{} sent a DM to {}", command.user.id, user.id);
            format!("✅ Message sent to <@{}>.", user.id)
        }
        Err(e) => {
            warn!("DM to {} failed: {}", user.id, e);
            format!("❌ Could not DM <@{}>. Their DMs may be closed.", user.id)
        }
    };
    command.create_response(&ctx.http, ephemeral(reply)).await?;
    Ok(())
}

pub async fn permission(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !require_admin(command) {
        command.create_response(&ctx.http, ephemeral("Administrator permission required.")).await?;
        return Ok(());
    }
    let options = Options::of(command);
    let action = options.str("action").unwrap_or("list");

    if action == "list" {
        let current = handler.permissions.snapshot().await;
        let users = mention_list(current.allowed_users.iter().map(|id| format!("<@{}>", id)));
        let roles = mention_list(current.allowed_roles.iter().map(|id| format!("<@&{}>", id)));
        let embed = CreateEmbed::new()
            .title("Moderator allow-list")
            .color(0x5865F2)
            .field("Users", users, false)
            .field("Roles", roles, false)
            .timestamp(Timestamp::now());
        command
            .create_response(
                &ctx.http,
                serenity::builder::CreateInteractionResponse::Message(
                    serenity::builder::CreateInteractionResponseMessage::new()
                        .embed(embed)
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    let mut grants = Vec::new();
    if let Some(user) = options.user("user") {
        grants.push(Grant::User(user.get()));
    }
    if let Some(role) = options.role("role") {
        grants.push(Grant::Role(role.get()));
    }
    if grants.is_empty() {
        command
            .create_response(&ctx.http, ephemeral("Provide a user or a role."))
            .await?;
        return Ok(());
    }

    let mut lines = Vec::new();
    for grant in grants {
        let subject = match grant {
            Grant::User(id) => format!("<@{}>", id),
            Grant::Role(id) => format!("<@&{}>", id),
        };
        let outcome = match action {
            "add" => handler.permissions.add(grant).await.map(|changed| {
                if changed {
                    format!("✅ Added {}.", subject)
                } else {
                    format!("{} is already allowed.", subject)
                }
            }),
            _ => handler.permissions.remove(grant).await.map(|changed| {
                if changed {
                    format!("✅ Removed {}.", subject)
                } else {
                    format!("{} was not in the list.", subject)
                }
            }),
        };
        match outcome {
            Ok(line) => lines.push(line),
            Err(e) => {
                warn!("Failed to update permissions: {}", e);
                lines.push(format!("❌ Could not update {}.", subject));
            }
        }
    }
    info!("{} ran /permission {}", command.user.id, action);
    command.create_response(&ctx.http, ephemeral(lines.join("\n"))).await?;
    Ok(())
}

fn mention_list(items: impl Iterator<Item = String>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "None".to_string()
    } else {
        joined
    }
}

/// Shows the first and last four characters of a secret.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

pub async fn aicheck(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !require_admin(command) {
        command.create_response(&ctx.http, ephemeral("Administrator permission required.")).await?;
        return Ok(());
    }
    let config = &handler.config;
    let gemini = match &config.gemini_api_key {
        Some(key) => format!("✅ Configured (`{}`)", mask_key(key)),
        None => "❌ Not set. Add GEMINI_API_KEY to the environment.".to_string(),
    };
    let perspective = match &config.perspective_api_key {
        Some(key) => format!("✅ Configured (`{}`)", mask_key(key)),
        None => "⚪ Not set. Toxicity scoring is disabled.".to_string(),
    };

    let embed = CreateEmbed::new()
        .title("🤖 AI Status")
        .color(if config.gemini_api_key.is_some() { 0x57F287 } else { 0xE74C3C })
        .field("Gemini API key", gemini, false)
        .field("Model", &config.gemini_model, true)
        .field("Perspective API key", perspective, false)
        .timestamp(Timestamp::now());

    command
        .create_response(
            &ctx.http,
            serenity::builder::CreateInteractionResponse::Message(
                serenity::builder::CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_masked() {
        assert_eq!(mask_key("AIzaSyExampleKey1234"), "AIza...1234");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn empty_lists_read_none() {
        assert_eq!(mention_list(std::iter::empty()), "None");
        assert_eq!(mention_list(["<@1>".to_string(), "<@2>".to_string()].into_iter()), "<@1>, <@2>");
    }
}
