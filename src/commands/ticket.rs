//! Support tickets: the setup panel, private ticket channels and transcripts.

use chrono::{DateTime, Utc};
use serenity::builder::{
    CreateActionRow, CreateAttachment, CreateButton, CreateChannel, CreateCommand,
    CreateCommandOption, CreateEmbed, CreateEmbedFooter, CreateMessage, CreateSelectMenu,
    CreateSelectMenuKind, CreateSelectMenuOption, GetMessages,
};
use serenity::model::prelude::*;
use serenity::model::Timestamp;
use serenity::prelude::*;
use tracing::{info, warn};

use super::{
    caller_of, ensure_private_channel, ephemeral, expand_newlines, find_role,
    hidden_from_everyone, member_can_talk, role_can_talk, Options,
};
use crate::bot::Handler;
use crate::commands::market::SUPPORT_ROLE;
use crate::store::tickets::{Busy, TicketRecord};

pub const TICKET_DROPDOWN: &str = "ticket_dropdown";
pub const CLOSE_TICKET: &str = "close_ticket_button";
pub const TICKETS_CATEGORY: &str = "TICKETS";
const TICKET_LOGS: &str = "ticket-logs";

/// (value, label, description, emoji)
const REASONS: &[(&str, &str, &str, char)] = &[
    ("support", "Support", "General help with the server or the marketplace.", '🆘'),
    ("verification", "Verification", "Get verified as a member or seller.", '✅'),
    ("report", "Report User", "Report a member for breaking the rules.", '🚨'),
    ("middleman", "Middleman Request", "Request a middleman for a deal.", '🤝'),
];

pub fn register_ticketsetup() -> CreateCommand {
    CreateCommand::new("ticketsetup")
        .description("Sets up the support ticket panel.")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "The channel for the ticket panel.")
                .channel_types(vec![ChannelType::Text])
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "title", "The panel title.")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "description", "The panel description. Use \\n for new lines.")
                .required(true),
        )
}

pub async fn ticketsetup(ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !caller_of(&command.user, command.member.as_deref()).administrator {
        command
            .create_response(&ctx.http, ephemeral("You need Administrator permission to set up tickets."))
            .await?;
        return Ok(());
    }

    let options = Options::of(command);
    let (Some(channel), Some(title), Some(description)) = (
        options.channel("channel"),
        options.str("title"),
        options.str("description"),
    ) else {
        command.create_response(&ctx.http, ephemeral("Missing required options.")).await?;
        return Ok(());
    };

    let menu = CreateSelectMenu::new(
        TICKET_DROPDOWN,
        CreateSelectMenuKind::String {
            options: REASONS
                .iter()
                .map(|(value, label, description, emoji)| {
                    CreateSelectMenuOption::new(*label, *value)
                        .description(*description)
                        .emoji(*emoji)
                })
                .collect(),
        },
    )
    .placeholder("Select a reason to open a ticket");

    let embed = CreateEmbed::new()
        .title(title)
        .description(expand_newlines(description))
        .color(0x5865F2);

    if let Err(e) = channel
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .embed(embed)
                .components(vec![CreateActionRow::SelectMenu(menu)]),
        )
        .await
    {
        warn!("Failed to post ticket panel in {}: {}", channel, e);
        command
            .create_response(&ctx.http, ephemeral(format!("❌ I could not send messages in <#{}>.", channel)))
            .await?;
        return Ok(());
    }

    command
        .create_response(&ctx.http, ephemeral(format!("✅ Ticket panel set up in <#{}>.", channel)))
        .await?;
    Ok(())
}

pub fn close_button() -> CreateActionRow {
    CreateActionRow::Buttons(vec![CreateButton::new(CLOSE_TICKET)
        .label("Close Ticket")
        .style(ButtonStyle::Danger)
        .emoji('🔒')])
}

/// Finds a category channel by name, creating it when missing.
pub async fn ensure_category(ctx: &Context, guild_id: GuildId, name: &str) -> Result<ChannelId, serenity::Error> {
    let channels = guild_id.channels(&ctx.http).await?;
    if let Some(category) = channels
        .values()
        .find(|c| c.kind == ChannelType::Category && c.name == name)
    {
        return Ok(category.id);
    }

    let category = guild_id
        .create_channel(&ctx.http, CreateChannel::new(name).kind(ChannelType::Category))
        .await?;
    info!("Created category {} in guild {}", name, guild_id);
    Ok(category.id)
}

fn reason_label(value: &str) -> &'static str {
    REASONS
        .iter()
        .find(|(v, ..)| *v == value)
        .map(|(_, label, ..)| *label)
        .unwrap_or("Support")
}

fn instructions(reason: &str) -> Option<CreateEmbed> {
    let (title, body) = match reason {
        "Verification" => (
            "✅ Verification",
            "Please share:\n• Your full name\n• A link to your portfolio or previous work\n• Whether you want to be verified as a buyer or a seller",
        ),
        "Report User" => (
            "🚨 Report User",
            "Please share:\n• The user you are reporting\n• What happened\n• Screenshots or message links as evidence",
        ),
        "Middleman Request" => (
            "🤝 Middleman Request",
            "Please share:\n• The other party of the deal\n• What is being traded and the agreed price\n• Payment method\n\nA middleman will join shortly. Do not send any payment before they confirm.",
        ),
        _ => return None,
    };
    Some(CreateEmbed::new().title(title).description(body).color(0xF1C40F))
}

fn ticket_channel_name(username: &str) -> String {
    let cleaned: String = username
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("ticket-{}", cleaned)
}

pub async fn open_ticket(handler: &Handler, ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };
    let value = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values.first().cloned().unwrap_or_default(),
        _ => String::new(),
    };
    let reason = reason_label(&value);
    let user = &component.user;

    let claim = match handler.tickets.claim(user.id.get()).await {
        Ok(claim) => claim,
        Err(busy) => {
            let reply = match busy {
                Busy::Open(existing) => format!("You already have an open ticket: <#{}>", existing.channel_id),
                Busy::Opening => "Your ticket is already being created.".to_string(),
            };
            component.create_response(&ctx.http, ephemeral(reply)).await?;
            return Ok(());
        }
    };

    component.defer_ephemeral(&ctx.http).await?;

    let reply = match create_ticket_channel(ctx, guild_id, user, reason).await {
        Ok(channel) => {
            let record = TicketRecord {
                channel_id: channel.id.get(),
                owner_id: user.id.get(),
                reason: reason.to_string(),
                deal_number: None,
            };
            if let Err(e) = handler.tickets.insert(record).await {
                warn!("Failed to record ticket {}: {}", channel.id, e);
            }
            info!("Ticket {} opened by {} ({})", channel.id, user.id, reason);
            format!("✅ Your ticket has been created: <#{}>", channel.id)
        }
        Err(e) => {
            warn!("Failed to create ticket for {}: {}", user.id, e);
            "❌ I could not create your ticket. Please contact an admin.".to_string()
        }
    };

    drop(claim);

    component
        .edit_response(
            &ctx.http,
            serenity::builder::EditInteractionResponse::new().content(reply),
        )
        .await?;
    Ok(())
}

async fn create_ticket_channel(
    ctx: &Context,
    guild_id: GuildId,
    user: &User,
    reason: &str,
) -> Result<GuildChannel, serenity::Error> {
    let category = ensure_category(ctx, guild_id, TICKETS_CATEGORY).await?;
    let bot_id = ctx.cache.current_user().id;

    let mut overwrites = vec![
        hidden_from_everyone(guild_id),
        member_can_talk(user.id),
        member_can_talk(bot_id),
    ];
    let support = find_role(ctx, guild_id, SUPPORT_ROLE).await;
    if let Some(role) = &support {
        overwrites.push(role_can_talk(role.id));
    }

    let channel = guild_id
        .create_channel(
            &ctx.http,
            CreateChannel::new(ticket_channel_name(&user.name))
                .kind(ChannelType::Text)
                .category(category)
                .topic(format!("{} ticket for {}", reason, user.name))
                .permissions(overwrites),
        )
        .await?;

    let ping = match &support {
        Some(role) => format!("<@{}> <@&{}>", user.id, role.id),
        None => format!("<@{}>", user.id),
    };
    let welcome = CreateEmbed::new()
        .title(format!("🎫 {}", reason))
        .description("Thanks for reaching out! Describe your request and a member of the support team will be with you shortly.")
        .color(0x03A654)
        .footer(CreateEmbedFooter::new(format!("Opened by {}", user.name)))
        .timestamp(Timestamp::now());

    let mut message = CreateMessage::new()
        .content(ping)
        .embed(welcome)
        .components(vec![close_button()]);
    if let Some(extra) = instructions(reason) {
        message = message.add_embed(extra);
    }
    if let Err(e) = channel.send_message(&ctx.http, message).await {
        warn!("Failed to post welcome in ticket {}: {}", channel.id, e);
    }

    Ok(channel)
}

fn transcript_line(timestamp: DateTime<Utc>, author: &str, content: &str) -> String {
    format!("[{}] {}: {}", timestamp.format("%Y-%m-%d %H:%M:%S"), author, content)
}

/// Every message in the channel, oldest first.
async fn fetch_history(ctx: &Context, channel_id: ChannelId) -> Result<Vec<Message>, serenity::Error> {
    let mut history = Vec::new();
    let mut before: Option<MessageId> = None;
    loop {
        let mut request = GetMessages::new().limit(100);
        if let Some(id) = before {
            request = request.before(id);
        }
        let page = channel_id.messages(&ctx.http, request).await?;
        let done = page.len() < 100;
        before = page.last().map(|m| m.id);
        history.extend(page);
        if done || before.is_none() {
            break;
        }
    }
    history.reverse();
    Ok(history)
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let at = DateTime::<Utc>::from_timestamp(m.timestamp.unix_timestamp(), 0).unwrap_or_default();
            transcript_line(at, &m.author.name, &m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn close_ticket(handler: &Handler, ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    if !caller_of(&component.user, component.member.as_ref()).administrator {
        component
            .create_response(&ctx.http, ephemeral("Only administrators can close tickets."))
            .await?;
        return Ok(());
    }
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };
    let channel_id = component.channel_id;

    component
        .create_response(&ctx.http, ephemeral("🔒 Closing this ticket and saving the transcript..."))
        .await?;

    let record = handler.tickets.get(channel_id.get()).await;
    let transcript = match fetch_history(ctx, channel_id).await {
        Ok(messages) => render_transcript(&messages),
        Err(e) => {
            warn!("Failed to read history of ticket {}: {}", channel_id, e);
            String::new()
        }
    };

    match ensure_private_channel(ctx, guild_id, TICKET_LOGS).await {
        Ok(logs) => {
            let owner = record
                .as_ref()
                .map(|r| format!("<@{}>", r.owner_id))
                .unwrap_or_else(|| "Unknown".to_string());
            let reason = record.as_ref().map(|r| r.reason.as_str()).unwrap_or("Unknown");
            let mut embed = CreateEmbed::new()
                .title("Ticket Closed")
                .color(0xE74C3C)
                .field("Ticket", format!("#{}", channel_id.name(&ctx.http).await.unwrap_or_default()), true)
                .field("Owner", owner, true)
                .field("Closed by", format!("<@{}>", component.user.id), true)
                .field("Reason", reason, true)
                .timestamp(Timestamp::now());
            let deal = match record.as_ref().and_then(|r| r.deal_number) {
                Some(n) => handler.market.deal(n).await,
                None => None,
            };
            if let Some(deal) = deal {
                embed = embed.field(
                    "Deal",
                    format!("#{} • {} • {}", deal.deal_number, deal.agreed_price, deal.status),
                    false,
                );
            }
            let file = CreateAttachment::bytes(transcript.into_bytes(), format!("transcript-{}.txt", channel_id));
            if let Err(e) = logs
                .send_message(&ctx.http, CreateMessage::new().embed(embed).add_file(file))
                .await
            {
                warn!("Failed to post transcript of {}: {}", channel_id, e);
            }
        }
        Err(e) => warn!("Ticket log channel unavailable: {}", e),
    }

    if let Err(e) = handler.tickets.remove(channel_id.get()).await {
        warn!("Failed to drop ticket record {}: {}", channel_id, e);
    }
    channel_id.delete(&ctx.http).await?;
    info!("Ticket {} closed by {}", channel_id, component.user.id);
    Ok(())
}
