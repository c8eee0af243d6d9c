//! Moderator commands and the punishment case log.

use chrono::Utc;
use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter, CreateMessage,
    EditInteractionResponse, EditMember,
};
use serenity::model::prelude::*;
use serenity::model::Timestamp;
use serenity::prelude::*;
use tracing::{info, warn};

use super::{caller_of, ephemeral, find_channel, Options};
use crate::bot::Handler;
use crate::moderation::{parse_duration, PunishmentCase};

const PUNISHMENT_LOG: &str = "punishment-log";
const INVALID_DURATION: &str =
    "❌ Invalid duration. Use a number followed by m, h or d (for example 10m, 1h, 2d), up to 28d.";

fn target_command(name: &str, description: &str, verb: &str) -> CreateCommand {
    CreateCommand::new(name)
        .description(description)
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", format!("The member to {}.", verb))
                .required(true),
        )
}

fn reason_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "reason", "The reason for this action.")
}

pub fn register_warn() -> CreateCommand {
    target_command("warn", "Warn a member.", "warn").add_option(reason_option().required(true))
}

pub fn register_timeout() -> CreateCommand {
    target_command("timeout", "Time out a member.", "time out")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "duration", "Duration such as 10m, 1h or 2d (max 28d).")
                .required(true),
        )
        .add_option(reason_option())
}

pub fn register_kick() -> CreateCommand {
    target_command("kick", "Kick a member from the server.", "kick").add_option(reason_option())
}

pub fn register_ban() -> CreateCommand {
    target_command("ban", "Ban a member from the server.", "ban").add_option(reason_option())
}

/// Posts a numbered case to `#punishment-log`. Without the channel nothing is
/// logged and no case number is used.
pub async fn log_punishment(
    handler: &Handler,
    ctx: &Context,
    guild_id: GuildId,
    action: &str,
    user: &User,
    moderator: UserId,
    reason: &str,
) {
    let Some(channel) = find_channel(ctx, guild_id, PUNISHMENT_LOG).await else {
        warn!("#{} not found in guild {}; case not logged", PUNISHMENT_LOG, guild_id);
        return;
    };

    let case_number = match handler.cases.next().await {
        Ok(n) => n,
        Err(e) => {
            warn!("Failed to allocate case number: {}", e);
            return;
        }
    };

    let case = PunishmentCase {
        case_number,
        action: action.to_string(),
        user_id: user.id.get(),
        user_name: user.name.clone(),
        moderator_id: moderator.get(),
        reason: reason.to_string(),
        timestamp: Utc::now(),
    };

    let embed = CreateEmbed::new()
        .title(case.title())
        .color(0xE74C3C)
        .field("User", format!("<@{}>", case.user_id), true)
        .field("Moderator", format!("<@{}>", case.moderator_id), true)
        .field("Reason", &case.reason, false)
        .footer(CreateEmbedFooter::new(case.footer()));

    match channel.send_message(&ctx.http, CreateMessage::new().embed(embed)).await {
        Ok(_) => info!("Logged case {} ({}) for {}", case.case_number, action, user.id),
        Err(e) => warn!("Failed to post case {}: {}", case.case_number, e),
    }
}

/// DMs a member about an action taken against them. Failures are ignored.
pub async fn notify(ctx: &Context, user: &User, text: String) {
    let sent = match user.create_dm_channel(&ctx.http).await {
        Ok(dm) => dm.say(&ctx.http, text).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = sent {
        info!("Could not DM {}: {}", user.id, e);
    }
}

/// Applies a communication timeout of `duration` from now.
pub async fn apply_timeout(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
    duration: std::time::Duration,
) -> Result<(), serenity::Error> {
    let until = Utc::now() + chrono::Duration::seconds(duration.as_secs() as i64);
    let until = Timestamp::from_unix_timestamp(until.timestamp()).map_err(|_| {
        serenity::Error::Other("timeout end out of range")
    })?;
    guild_id
        .edit_member(
            &ctx.http,
            user_id,
            EditMember::new().disable_communication_until_datetime(until),
        )
        .await?;
    Ok(())
}

struct Target {
    guild_id: GuildId,
    user: User,
    reason: String,
}

/// Checks authorization and resolves the `user` and `reason` options.
async fn resolve(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<Option<Target>> {
    if !handler.authorized(&caller_of(&command.user, command.member.as_deref())).await {
        command
            .create_response(&ctx.http, ephemeral("You do not have permission to use this command."))
            .await?;
        return Ok(None);
    }

    let options = Options::of(command);
    let (Some(guild_id), Some(user_id)) = (command.guild_id, options.user("user")) else {
        command.create_response(&ctx.http, ephemeral("Missing required options.")).await?;
        return Ok(None);
    };
    let user = match command.data.resolved.users.get(&user_id) {
        Some(user) => user.clone(),
        None => user_id.to_user(&ctx.http).await?,
    };
    let reason = options.str("reason").unwrap_or("No reason provided.").to_string();

    Ok(Some(Target { guild_id, user, reason }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sanction {
    Warn,
    Timeout,
    Kick,
    Ban,
}

impl Sanction {
    /// Rejections answered at once, before the command is deferred.
    fn refusal(self, target: UserId, moderator: UserId) -> Option<&'static str> {
        match self {
            Sanction::Kick if target == moderator => Some("You cannot kick yourself."),
            Sanction::Ban if target == moderator => Some("You cannot ban yourself."),
            _ => None,
        }
    }

    fn failure(self) -> &'static str {
        match self {
            Sanction::Warn => "❌ I could not warn that member.",
            Sanction::Timeout => "❌ I could not time out that member. Check my role position and permissions.",
            Sanction::Kick => "❌ I could not kick that member. Check my role position and permissions.",
            Sanction::Ban => "❌ I could not ban that member. Check my role position and permissions.",
        }
    }
}

/// Resolves the target, answers refusals, then defers so the DM, the action
/// and the case log can outlast the interaction deadline.
async fn begin(
    handler: &Handler,
    ctx: &Context,
    command: &CommandInteraction,
    sanction: Sanction,
    invalid: Option<&'static str>,
) -> anyhow::Result<Option<Target>> {
    let Some(target) = resolve(handler, ctx, command).await? else {
        return Ok(None);
    };
    if let Some(refusal) = invalid.or_else(|| sanction.refusal(target.user.id, command.user.id)) {
        command.create_response(&ctx.http, ephemeral(refusal)).await?;
        return Ok(None);
    }
    command.defer_ephemeral(&ctx.http).await?;
    Ok(Some(target))
}

async fn finish(ctx: &Context, command: &CommandInteraction, text: impl Into<String>) -> anyhow::Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}

pub async fn warn_member(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    let Some(target) = begin(handler, ctx, command, Sanction::Warn, None).await? else {
        return Ok(());
    };
    let guild_name = target.guild_id.name(&ctx.cache).unwrap_or_else(|| "the server".to_string());

    notify(ctx, &target.user, format!("⚠️ You have been warned in {}. Reason: {}", guild_name, target.reason)).await;
    log_punishment(handler, ctx, target.guild_id, "Warn", &target.user, command.user.id, &target.reason).await;

    finish(ctx, command, format!("✅ <@{}> has been warned.", target.user.id)).await
}

pub async fn timeout(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    let raw = Options::of(command).str("duration").unwrap_or_default();
    let duration = parse_duration(raw);
    let invalid = duration.is_none().then_some(INVALID_DURATION);
    let target = begin(handler, ctx, command, Sanction::Timeout, invalid).await?;
    let (Some(target), Some(duration)) = (target, duration) else {
        return Ok(());
    };

    if let Err(e) = apply_timeout(ctx, target.guild_id, target.user.id, duration).await {
        warn!("Failed to time out {}: {}", target.user.id, e);
        return finish(ctx, command, Sanction::Timeout.failure()).await;
    }

    let action = format!("Timeout ({})", raw.trim());
    notify(ctx, &target.user, format!("⏳ You have been timed out for {}. Reason: {}", raw.trim(), target.reason)).await;
    log_punishment(handler, ctx, target.guild_id, &action, &target.user, command.user.id, &target.reason).await;

    finish(ctx, command, format!("✅ <@{}> has been timed out for {}.", target.user.id, raw.trim())).await
}

pub async fn kick(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    let Some(target) = begin(handler, ctx, command, Sanction::Kick, None).await? else {
        return Ok(());
    };

    notify(ctx, &target.user, format!("👢 You have been kicked. Reason: {}", target.reason)).await;
    if let Err(e) = target
        .guild_id
        .kick_with_reason(&ctx.http, target.user.id, &target.reason)
        .await
    {
        warn!("Failed to kick {}: {}", target.user.id, e);
        return finish(ctx, command, Sanction::Kick.failure()).await;
    }

    log_punishment(handler, ctx, target.guild_id, "Kick", &target.user, command.user.id, &target.reason).await;
    finish(ctx, command, format!("✅ <@{}> has been kicked.", target.user.id)).await
}

pub async fn ban(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    let Some(target) = begin(handler, ctx, command, Sanction::Ban, None).await? else {
        return Ok(());
    };

    notify(ctx, &target.user, format!("🔨 You have been banned. Reason: {}", target.reason)).await;
    if let Err(e) = target
        .guild_id
        .ban_with_reason(&ctx.http, target.user.id, 0, &target.reason)
        .await
    {
        warn!("Failed to ban {}: {}", target.user.id, e);
        return finish(ctx, command, Sanction::Ban.failure()).await;
    }

    log_punishment(handler, ctx, target.guild_id, "Ban", &target.user, command.user.id, &target.reason).await;
    finish(ctx, command, format!("✅ <@{}> has been banned.", target.user.id)).await
}
