pub mod market;
pub mod moderation;
pub mod profile;
pub mod ticket;
pub mod utility;

use serenity::builder::{
    CreateChannel, CreateCommand, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse,
};
use serenity::model::prelude::*;
use serenity::model::Timestamp;
use serenity::prelude::*;
use tracing::{info, warn};

use crate::store::permissions::Caller;

/// Every slash command the bot registers.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        register_ping(),
        market::register_postingsetup(),
        market::register_removebid(),
        market::register_dealstatus(),
        profile::register_setprofile(),
        profile::register_profile(),
        profile::register_deleteprofile(),
        moderation::register_warn(),
        moderation::register_timeout(),
        moderation::register_kick(),
        moderation::register_ban(),
        ticket::register_ticketsetup(),
        utility::register_say(),
        utility::register_dm(),
        utility::register_permission(),
        utility::register_aicheck(),
    ]
}

pub async fn ping(ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    info!("Ping command executed by {}", command.user.tag());
    let http = ctx.http.clone();
    let start = std::time::Instant::now();

    command.defer_ephemeral(&http).await?;

    let api_latency = start.elapsed().as_millis();

    let embed = CreateEmbed::new()
        .title("🏓 Pong!")
        .color(0x57F287)
        .field("Latency", format!("{}ms", api_latency), true)
        .timestamp(Timestamp::now());

    command
        .edit_response(&http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

pub fn register_ping() -> CreateCommand {
    CreateCommand::new("ping").description("Check the bot's latency")
}

/// A plain ephemeral reply.
pub fn ephemeral(content: impl Into<String>) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Slash command option values by name.
pub struct Options<'a> {
    options: &'a [CommandDataOption],
}

impl<'a> Options<'a> {
    pub fn of(command: &'a CommandInteraction) -> Self {
        Self {
            options: &command.data.options,
        }
    }

    fn get(&self, name: &str) -> Option<&'a CommandDataOptionValue> {
        self.options.iter().find(|o| o.name == name).map(|o| &o.value)
    }

    pub fn str(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(|v| v.as_str())
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_i64())
    }

    pub fn user(&self, name: &str) -> Option<UserId> {
        self.get(name).and_then(|v| v.as_user_id())
    }

    pub fn channel(&self, name: &str) -> Option<ChannelId> {
        self.get(name).and_then(|v| v.as_channel_id())
    }

    pub fn role(&self, name: &str) -> Option<RoleId> {
        self.get(name).and_then(|v| v.as_role_id())
    }
}

pub fn caller_of(user: &User, member: Option<&Member>) -> Caller {
    Caller::from_member(user.id.get(), member)
}

/// Turns literal `\n` sequences typed into a slash command into newlines.
pub fn expand_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Shortens `text` to at most `max` characters, marking the cut with `…`.
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub async fn find_channel(ctx: &Context, guild_id: GuildId, name: &str) -> Option<GuildChannel> {
    match guild_id.channels(&ctx.http).await {
        Ok(channels) => channels.into_values().find(|c| c.name == name),
        Err(e) => {
            warn!("Failed to list channels of guild {}: {}", guild_id, e);
            None
        }
    }
}

pub async fn find_role(ctx: &Context, guild_id: GuildId, name: &str) -> Option<Role> {
    match guild_id.roles(&ctx.http).await {
        Ok(roles) => roles.into_values().find(|r| r.name == name),
        Err(e) => {
            warn!("Failed to list roles of guild {}: {}", guild_id, e);
            None
        }
    }
}

pub fn hidden_from_everyone(guild_id: GuildId) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: Permissions::empty(),
        deny: Permissions::VIEW_CHANNEL,
        kind: PermissionOverwriteType::Role(guild_id.everyone_role()),
    }
}

pub fn member_can_talk(user_id: UserId) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY,
        deny: Permissions::empty(),
        kind: PermissionOverwriteType::Member(user_id),
    }
}

pub fn role_can_talk(role_id: RoleId) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY,
        deny: Permissions::empty(),
        kind: PermissionOverwriteType::Role(role_id),
    }
}

/// Finds a text channel by name, creating it readable only by the bot when
/// missing.
pub async fn ensure_private_channel(
    ctx: &Context,
    guild_id: GuildId,
    name: &str,
) -> Result<GuildChannel, serenity::Error> {
    if let Some(channel) = find_channel(ctx, guild_id, name).await {
        return Ok(channel);
    }

    let bot_id = ctx.cache.current_user().id;
    let channel = guild_id
        .create_channel(
            &ctx.http,
            CreateChannel::new(name)
                .kind(ChannelType::Text)
                .permissions(vec![hidden_from_everyone(guild_id), member_can_talk(bot_id)]),
        )
        .await?;
    info!("Created #{} in guild {}", name, guild_id);
    Ok(channel)
}
