//! Marketplace panel, job/service posts, bidding and deal tickets.

use serenity::async_trait;
use serenity::builder::{
    CreateActionRow, CreateButton, CreateChannel, CreateCommand, CreateCommandOption,
    CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateForumPost, CreateInputText,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage, CreateModal,
    CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, EditMessage,
};
use serenity::model::prelude::*;
use serenity::model::Timestamp;
use serenity::prelude::*;
use tracing::{error, info, warn};

use super::{
    caller_of, clip, ensure_private_channel, ephemeral, expand_newlines, find_channel, find_role,
    hidden_from_everyone, member_can_talk, role_can_talk, Options,
};
use crate::bot::Handler;
use crate::commands::ticket::{self, TICKETS_CATEGORY};
use crate::error::MarketError;
use crate::market::{BiddingState, DealPlatform, DealStatus, DealTicket, JobPosting, JobState};
use crate::store::bids::{BidRecord, MAX_BIDS};
use crate::store::tickets::TicketRecord;

pub const POST_JOB: &str = "post_job_button";
pub const POST_SERVICE: &str = "post_service_button";
pub const APPLY_NOW: &str = "apply_now_button";
pub const BID_PLACE: &str = "bid_place";
pub const BID_WITHDRAW: &str = "bid_withdraw";
pub const BID_FINALIZE: &str = "bid_finalize";
pub const BID_PICK_PREFIX: &str = "bid_pick:";
pub const JOB_MODAL: &str = "job_post_modal";
pub const SERVICE_MODAL: &str = "service_post_modal";
pub const BID_MODAL_PREFIX: &str = "bid_modal:";

const JOBS_CHANNEL: &str = "jobs-market";
const SERVICES_CHANNEL: &str = "post-service";
const SUPPORT_CHANNEL: &str = "🆘support";
const ORDER_TRACKER_CHANNEL: &str = "🗳️order-tracker";
pub const SUPPORT_ROLE: &str = "Support Team";
const MARKETPLACE_GIF: &str = "https://media.discordapp.net/attachments/1068195433589002401/1415359273902411806/marketplace.gif";

const BLURPLE: u32 = 0x5865F2;
const GREEN: u32 = 0x03A654;
const GOLD: u32 = 0xF1C40F;
const GREY: u32 = 0x95A5A6;

pub fn register_postingsetup() -> CreateCommand {
    CreateCommand::new("postingsetup")
        .description("Sets up the job and service posting panel.")
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "The channel to set up the posting panel in.")
                .channel_types(vec![ChannelType::Text])
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "title", "The title for the posting panel embed.")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "description", "The description for the panel. Use \\n for new lines.")
                .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "image_url",
            "An optional image URL for the panel banner.",
        ))
}

pub fn register_removebid() -> CreateCommand {
    CreateCommand::new("removebid")
        .description("Remove a user's bid from a job posting.")
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "job_message_id", "ID of the job posting message.")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "The bidder whose bid to remove.")
                .required(true),
        )
}

pub fn register_dealstatus() -> CreateCommand {
    let mut status = CreateCommandOption::new(CommandOptionType::String, "status", "The new status of the deal.")
        .required(true);
    for s in DealStatus::ALL {
        status = status.add_string_choice(s.to_string(), s.key());
    }

    CreateCommand::new("dealstatus")
        .description("Update the status of a marketplace deal.")
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "deal_number", "The unique number of the deal (e.g., 1042).")
                .required(true),
        )
        .add_option(status)
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "note",
            "Optional note shown in the order tracker.",
        ))
}

pub async fn postingsetup(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !handler.authorized(&caller_of(&command.user, command.member.as_deref())).await {
        command
            .create_response(&ctx.http, ephemeral("You do not have permission to use this command."))
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

    let mut embed = CreateEmbed::new()
        .title(title)
        .description(expand_newlines(description))
        .color(GOLD);
    if let Some(url) = options.str("image_url") {
        embed = embed.image(url);
    }

    let panel = CreateActionRow::Buttons(vec![
        CreateButton::new(POST_JOB)
            .label("Post a Job")
            .style(ButtonStyle::Primary)
            .emoji('💼'),
        CreateButton::new(POST_SERVICE)
            .label("Post Your Service")
            .style(ButtonStyle::Secondary)
            .emoji('🛠'),
    ]);

    if let Err(e) = channel
        .send_message(&ctx.http, CreateMessage::new().embed(embed).components(vec![panel]))
        .await
    {
        warn!("Failed to post marketplace panel in {}: {}", channel, e);
        command
            .create_response(&ctx.http, ephemeral(format!("❌ I could not send messages in <#{}>.", channel)))
            .await?;
        return Ok(());
    }

    command
        .create_response(
            &ctx.http,
            ephemeral(format!("✅ The job and service posting panel has been set up in <#{}>.", channel)),
        )
        .await?;
    Ok(())
}

/// Discord caps select option labels and descriptions at this length.
const SELECT_TEXT_LIMIT: usize = 100;
/// Discord caps embed field values at this length.
const FIELD_LIMIT: usize = 1024;
/// Longest accepted bid price or delivery time.
const BID_TEXT_LIMIT: u16 = 50;

fn input(style: InputTextStyle, label: &str, id: &str, placeholder: &str, required: bool, max_length: u16) -> CreateActionRow {
    CreateActionRow::InputText(
        CreateInputText::new(style, label, id)
            .placeholder(placeholder)
            .required(required)
            .max_length(max_length),
    )
}

pub async fn open_job_modal(ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    let modal = CreateModal::new(JOB_MODAL, "Post a New Job").components(vec![
        input(InputTextStyle::Short, "Job Title", "title", "Example: Need a Graphics Designer", true, 100),
        input(InputTextStyle::Paragraph, "Job Description & Tasks", "description", "Provide a detailed job description and list the specific tasks.", true, FIELD_LIMIT as u16),
        input(InputTextStyle::Short, "Job Budget", "budget", "Example: $50 or 5000 BDT", true, 100),
        input(InputTextStyle::Short, "Deadline", "deadline", "Example: 7 days or 25-09-2025", true, 100),
        input(InputTextStyle::Short, "Preferred Location", "location", "Example: Remote or Dhaka, Bangladesh", false, 100),
    ]);
    component
        .create_response(&ctx.http, CreateInteractionResponse::Modal(modal))
        .await?;
    Ok(())
}

pub async fn open_service_modal(ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    let modal = CreateModal::new(SERVICE_MODAL, "Post Your Service").components(vec![
        input(InputTextStyle::Short, "Service Title", "title", "Example: Professional Logo Design", true, 100),
        input(InputTextStyle::Paragraph, "Service Description", "description", "Describe the service you are offering.", true, FIELD_LIMIT as u16),
        input(InputTextStyle::Short, "Budget / Pricing", "budget", "Example: Starts from $20 or 2000 BDT", true, 100),
        input(InputTextStyle::Short, "Delivery Time", "delivery", "Example: 3-5 Business Days", true, 100),
        input(InputTextStyle::Paragraph, "Your Experience", "experience", "Example: 5+ years in graphic design", true, FIELD_LIMIT as u16),
    ]);
    component
        .create_response(&ctx.http, CreateInteractionResponse::Modal(modal))
        .await?;
    Ok(())
}

/// Value of a modal text input by custom id; blank counts as absent.
pub fn modal_value(modal: &ModalInteraction, id: &str) -> Option<String> {
    modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|c| match c {
            ActionRowComponent::InputText(text) if text.custom_id == id => text.value.clone(),
            _ => None,
        })
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn seller_pings(ctx: &Context, guild_id: GuildId, roles: &[&str]) -> String {
    let mut mentions = Vec::new();
    for name in roles {
        if let Some(role) = find_role(ctx, guild_id, name).await {
            mentions.push(format!("<@&{}>", role.id));
        }
    }
    mentions.join(" & ")
}

/// Posts into a text channel or opens a forum post. Returns the channel the
/// message landed in and its id.
async fn publish(
    ctx: &Context,
    channel: &GuildChannel,
    thread_name: &str,
    message: CreateMessage,
) -> Result<(ChannelId, MessageId), serenity::Error> {
    if channel.kind == ChannelType::Forum {
        let thread = channel
            .id
            .create_forum_post(&ctx.http, CreateForumPost::new(thread_name, message))
            .await?;
        // A forum post's starter message shares the thread's id.
        Ok((thread.id, MessageId::new(thread.id.get())))
    } else {
        let sent = channel.send_message(&ctx.http, message).await?;
        Ok((channel.id, sent.id))
    }
}

/// Where a published post lives, as far as removing it is concerned.
#[derive(Debug, PartialEq, Eq)]
enum Published {
    Thread(ChannelId),
    Message(ChannelId, MessageId),
}

impl Published {
    fn of(posted_in: ChannelId, message_id: MessageId) -> Self {
        if posted_in.get() == message_id.get() {
            Published::Thread(posted_in)
        } else {
            Published::Message(posted_in, message_id)
        }
    }

    /// Takes down a post that could not be recorded.
    async fn withdraw(self, ctx: &Context) -> Result<(), serenity::Error> {
        match self {
            Published::Thread(thread) => thread.delete(&ctx.http).await.map(|_| ()),
            Published::Message(channel, message) => channel.delete_message(&ctx.http, message).await,
        }
    }
}

pub async fn submit_job(handler: &Handler, ctx: &Context, modal: &ModalInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = modal.guild_id else {
        modal.create_response(&ctx.http, ephemeral("This can only be used in a server.")).await?;
        return Ok(());
    };
    let Some(channel) = find_channel(ctx, guild_id, JOBS_CHANNEL).await else {
        modal
            .create_response(&ctx.http, ephemeral("❌ Error: `#jobs-market` channel not found. Please create it."))
            .await?;
        return Ok(());
    };

    let mut job = JobPosting {
        job_id: 0,
        channel_id: channel.id.get(),
        owner_id: modal.user.id.get(),
        title: modal_value(modal, "title").unwrap_or_default(),
        description: modal_value(modal, "description").unwrap_or_default(),
        budget: modal_value(modal, "budget").unwrap_or_default(),
        deadline: modal_value(modal, "deadline").unwrap_or_default(),
        location: modal_value(modal, "location").unwrap_or_else(|| "Not Specified".to_string()),
        state: JobState::Open,
    };

    let pings = seller_pings(ctx, guild_id, &["Verified Seller", "Verified Member"]).await;
    let message = CreateMessage::new()
        .content(format!("New job posted! {}", pings).trim_end().to_string())
        .embed(job_embed(&job, &modal.user, &[]))
        .components(job_components(BiddingState::Open));

    let (posted_in, job_id) = match publish(ctx, &channel, &job.title, message).await {
        Ok(posted) => posted,
        Err(e) => {
            warn!("Failed to publish job post: {}", e);
            modal
                .create_response(&ctx.http, ephemeral("❌ I could not post in `#jobs-market`. Please contact an admin."))
                .await?;
            return Ok(());
        }
    };

    job.job_id = job_id.get();
    job.channel_id = posted_in.get();
    if let Err(e) = handler.market.post_job(job).await {
        error!("Job {} posted but not recorded, removing it: {}", job_id, e);
        if let Err(e) = Published::of(posted_in, job_id).withdraw(ctx).await {
            warn!("Failed to remove unrecorded job post {}: {}", job_id, e);
        }
        modal.create_response(&ctx.http, ephemeral(e.user_message())).await?;
        return Ok(());
    }

    modal
        .create_response(&ctx.http, ephemeral("✅ Your job has been posted successfully in #jobs-market!"))
        .await?;
    // The footer shows the job id, known only once the message exists.
    refresh_posting(handler, ctx, job_id.get()).await;
    Ok(())
}

pub async fn submit_service(ctx: &Context, modal: &ModalInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = modal.guild_id else {
        modal.create_response(&ctx.http, ephemeral("This can only be used in a server.")).await?;
        return Ok(());
    };
    let Some(channel) = find_channel(ctx, guild_id, SERVICES_CHANNEL).await else {
        modal
            .create_response(&ctx.http, ephemeral("❌ Error: `#post-service` channel not found. Please create it."))
            .await?;
        return Ok(());
    };

    let title = modal_value(modal, "title").unwrap_or_default();
    let embed = CreateEmbed::new()
        .author(CreateEmbedAuthor::new(&title).icon_url(modal.user.face()))
        .description(format!("Offered by <@{}>", modal.user.id))
        .color(GREEN)
        .field("📄 Service Description", modal_value(modal, "description").unwrap_or_default(), false)
        .field("💡 My Experience", modal_value(modal, "experience").unwrap_or_default(), false)
        .field("💵 Pricing", modal_value(modal, "budget").unwrap_or_default(), true)
        .field("🚚 Delivery Time", modal_value(modal, "delivery").unwrap_or_default(), true)
        .image(MARKETPLACE_GIF)
        .footer(CreateEmbedFooter::new(format!("User ID: {}", modal.user.id)));

    let pings = seller_pings(ctx, guild_id, &["verified seller", "premium seller"]).await;
    let message = CreateMessage::new()
        .content(format!("New service available! {}", pings).trim_end().to_string())
        .embed(embed)
        .components(vec![CreateActionRow::Buttons(vec![CreateButton::new(APPLY_NOW)
            .label("Apply Now")
            .style(ButtonStyle::Success)])]);

    if let Err(e) = publish(ctx, &channel, &title, message).await {
        warn!("Failed to publish service post: {}", e);
        modal
            .create_response(&ctx.http, ephemeral("❌ I could not post in `#post-service`. Please contact an admin."))
            .await?;
        return Ok(());
    }

    modal
        .create_response(&ctx.http, ephemeral("✅ Your service has been posted successfully in #post-service!"))
        .await?;
    Ok(())
}

pub async fn apply_now(ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    let support = match component.guild_id {
        Some(guild_id) => find_channel(ctx, guild_id, SUPPORT_CHANNEL)
            .await
            .map(|c| format!("<#{}>", c.id)),
        None => None,
    }
    .unwrap_or_else(|| format!("#{}", SUPPORT_CHANNEL));

    component
        .create_response(
            &ctx.http,
            ephemeral(format!(
                "To apply or hire, please open a middleman request ticket in the {} channel. This ensures security for both parties.",
                support
            )),
        )
        .await?;
    Ok(())
}

fn job_embed(job: &JobPosting, owner: &User, bids: &[BidRecord]) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .author(CreateEmbedAuthor::new(&job.title).icon_url(owner.face()))
        .description(format!("Posted by <@{}>", job.owner_id))
        .color(BLURPLE)
        .field("📝 Description & Tasks", clip(&job.description, FIELD_LIMIT), false)
        .field("💰 Budget", &job.budget, true)
        .field("⏳ Deadline", &job.deadline, true)
        .field("📍 Location", &job.location, true)
        .field("👤 Client", format!("<@{}>", job.owner_id), true)
        .field(format!("📨 Bids ({}/{})", bids.len(), MAX_BIDS), render_bids(bids), false)
        .image(MARKETPLACE_GIF)
        .footer(CreateEmbedFooter::new(format!("Job ID: {}", job.job_id)));

    if let JobState::Finalized { deal_number, seller_id } = job.state {
        embed = embed.color(GREY).field(
            "🔒 Finalized",
            format!("Awarded to <@{}> • Deal #{}", seller_id, deal_number),
            false,
        );
    }
    embed
}

fn render_bids(bids: &[BidRecord]) -> String {
    if bids.is_empty() {
        return "No bids yet. Be the first!".to_string();
    }
    let list = bids
        .iter()
        .enumerate()
        .map(|(i, b)| format!("**{}.** <@{}> • {} • {}", i + 1, b.bidder_id, b.price, b.delivery_time))
        .collect::<Vec<_>>()
        .join("\n");
    clip(&list, FIELD_LIMIT)
}

fn winner_label(name: &str, bid: &BidRecord) -> String {
    clip(&format!("{} • {}", name, bid.price), SELECT_TEXT_LIMIT)
}

fn job_components(state: BiddingState) -> Vec<CreateActionRow> {
    if state == BiddingState::Finalized {
        return Vec::new();
    }
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(BID_PLACE)
            .label("Place Bid")
            .style(ButtonStyle::Success)
            .disabled(state != BiddingState::Open),
        CreateButton::new(BID_WITHDRAW)
            .label("Withdraw Bid")
            .style(ButtonStyle::Secondary),
        CreateButton::new(BID_FINALIZE)
            .label("Finalize")
            .style(ButtonStyle::Primary),
    ])]
}

/// Re-renders a posting's bid list and buttons from the stores.
async fn refresh_posting(handler: &Handler, ctx: &Context, job_id: u64) {
    let Some(job) = handler.market.job(job_id).await else {
        return;
    };
    let bids = handler.market.bids(job_id).await;
    let owner = match UserId::new(job.owner_id).to_user(&ctx.http).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Failed to fetch owner of job {}: {}", job_id, e);
            return;
        }
    };

    let edit = EditMessage::new()
        .embed(job_embed(&job, &owner, &bids))
        .components(job_components(job.bidding_state(bids.len())));

    if let Err(e) = ChannelId::new(job.channel_id)
        .edit_message(&ctx.http, MessageId::new(job_id), edit)
        .await
    {
        warn!("Failed to refresh job posting {}: {}", job_id, e);
    }
}

pub async fn open_bid_modal(handler: &Handler, ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    let job_id = component.message.id.get();
    let Some(job) = handler.market.job(job_id).await else {
        component
            .create_response(&ctx.http, ephemeral(MarketError::UnknownJob(job_id).user_message()))
            .await?;
        return Ok(());
    };
    if job.owner_id == component.user.id.get() {
        component
            .create_response(&ctx.http, ephemeral(MarketError::OwnJob.user_message()))
            .await?;
        return Ok(());
    }

    let modal = CreateModal::new(format!("{}{}", BID_MODAL_PREFIX, job_id), "Place a Bid").components(vec![
        input(InputTextStyle::Short, "Your Price", "price", "Example: $75 or 7500 BDT", true, BID_TEXT_LIMIT),
        input(InputTextStyle::Short, "Delivery Time", "delivery", "Example: 5 days", true, BID_TEXT_LIMIT),
    ]);
    component
        .create_response(&ctx.http, CreateInteractionResponse::Modal(modal))
        .await?;
    Ok(())
}

pub async fn submit_bid(handler: &Handler, ctx: &Context, modal: &ModalInteraction, job_id: u64) -> anyhow::Result<()> {
    let bid = BidRecord {
        bidder_id: modal.user.id.get(),
        price: modal_value(modal, "price").unwrap_or_default(),
        delivery_time: modal_value(modal, "delivery").unwrap_or_default(),
    };

    match handler.market.submit_bid(job_id, bid).await {
        Ok(bids) => {
            modal
                .create_response(
                    &ctx.http,
                    ephemeral(format!("✅ Your bid has been placed ({}/{}).", bids.len(), MAX_BIDS)),
                )
                .await?;
            refresh_posting(handler, ctx, job_id).await;
        }
        Err(e) => {
            info!("Bid on job {} by {} rejected: {}", job_id, modal.user.id, e);
            modal.create_response(&ctx.http, ephemeral(e.user_message())).await?;
        }
    }
    Ok(())
}

pub async fn withdraw_bid(handler: &Handler, ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    let job_id = component.message.id.get();
    match handler.market.withdraw_bid(job_id, component.user.id.get()).await {
        Ok(_) => {
            component
                .create_response(&ctx.http, ephemeral("✅ Your bid has been withdrawn."))
                .await?;
            refresh_posting(handler, ctx, job_id).await;
        }
        Err(e) => {
            component.create_response(&ctx.http, ephemeral(e.user_message())).await?;
        }
    }
    Ok(())
}

pub async fn removebid(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !handler.authorized(&caller_of(&command.user, command.member.as_deref())).await {
        command
            .create_response(&ctx.http, ephemeral("You do not have permission to remove bids."))
            .await?;
        return Ok(());
    }

    let options = Options::of(command);
    let job_id = options.str("job_message_id").and_then(|s| s.trim().parse::<u64>().ok());
    let (Some(job_id), Some(user)) = (job_id, options.user("user")) else {
        command
            .create_response(&ctx.http, ephemeral("❌ Provide a valid job message ID and user."))
            .await?;
        return Ok(());
    };

    match handler.market.withdraw_bid(job_id, user.get()).await {
        Ok(_) => {
            command
                .create_response(&ctx.http, ephemeral(format!("✅ Removed <@{}>'s bid.", user)))
                .await?;
            refresh_posting(handler, ctx, job_id).await;
        }
        Err(e) => {
            command.create_response(&ctx.http, ephemeral(e.user_message())).await?;
        }
    }
    Ok(())
}

pub async fn choose_winner(handler: &Handler, ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
    let job_id = component.message.id.get();
    let bids = match handler.market.can_finalize(job_id, component.user.id.get()).await {
        Ok(bids) => bids,
        Err(e) => {
            component.create_response(&ctx.http, ephemeral(e.user_message())).await?;
            return Ok(());
        }
    };

    let mut options = Vec::with_capacity(bids.len());
    for bid in &bids {
        let name = match UserId::new(bid.bidder_id).to_user(&ctx.http).await {
            Ok(user) => user.name,
            Err(_) => bid.bidder_id.to_string(),
        };
        options.push(
            CreateSelectMenuOption::new(winner_label(&name, bid), bid.bidder_id.to_string())
                .description(clip(&format!("Delivery: {}", bid.delivery_time), SELECT_TEXT_LIMIT)),
        );
    }

    let menu = CreateSelectMenu::new(
        format!("{}{}", BID_PICK_PREFIX, job_id),
        CreateSelectMenuKind::String { options },
    )
    .placeholder("Select the winning bid");

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content("Choose the bid you want to accept. A private deal ticket will be opened.")
                    .components(vec![CreateActionRow::SelectMenu(menu)])
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Opens deal channels in the guild a finalize interaction came from.
struct GuildDeals<'a> {
    handler: &'a Handler,
    ctx: &'a Context,
    guild_id: GuildId,
}

#[async_trait]
impl DealPlatform for GuildDeals<'_> {
    async fn is_member(&self, user_id: u64) -> Result<bool, serenity::Error> {
        match self.guild_id.member(&self.ctx.http, UserId::new(user_id)).await {
            Ok(_) => Ok(true),
            Err(serenity::Error::Http(e)) if e.status_code() == Some(serenity::http::StatusCode::NOT_FOUND) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn open_deal_channel(&self, deal: &DealTicket) -> Result<u64, serenity::Error> {
        let (ctx, guild_id) = (self.ctx, self.guild_id);
        let category = ticket::ensure_category(ctx, guild_id, TICKETS_CATEGORY).await?;
        let bot_id = ctx.cache.current_user().id;

        let mut overwrites = vec![
            hidden_from_everyone(guild_id),
            member_can_talk(UserId::new(deal.buyer_id)),
            member_can_talk(UserId::new(deal.seller_id)),
            member_can_talk(bot_id),
        ];
        if let Some(role) = find_role(ctx, guild_id, SUPPORT_ROLE).await {
            overwrites.push(role_can_talk(role.id));
        }

        let channel = guild_id
            .create_channel(
                &ctx.http,
                CreateChannel::new(format!("deal-{}", deal.deal_number))
                    .kind(ChannelType::Text)
                    .category(category)
                    .topic(format!("Deal #{} • {}", deal.deal_number, deal.job_title))
                    .permissions(overwrites),
            )
            .await?;

        let intro = CreateMessage::new()
            .content(format!("<@{}> <@{}>", deal.buyer_id, deal.seller_id))
            .embed(deal_embed(deal))
            .components(vec![ticket::close_button()]);
        if let Err(e) = channel.send_message(&ctx.http, intro).await {
            warn!("Failed to post intro in deal channel {}: {}", channel.id, e);
        }

        let record = TicketRecord {
            channel_id: channel.id.get(),
            owner_id: deal.buyer_id,
            reason: format!("Deal #{}", deal.deal_number),
            deal_number: Some(deal.deal_number),
        };
        if let Err(e) = self.handler.tickets.insert(record).await {
            warn!("Failed to record deal channel {}: {}", channel.id, e);
        }

        Ok(channel.id.get())
    }

    async fn remove_channel(&self, channel_id: u64) -> Result<(), serenity::Error> {
        if let Err(e) = self.handler.tickets.remove(channel_id).await {
            warn!("Failed to drop ticket record {}: {}", channel_id, e);
        }
        ChannelId::new(channel_id).delete(&self.ctx.http).await?;
        Ok(())
    }
}

fn deal_embed(deal: &DealTicket) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("🎟️ Deal #{}", deal.deal_number))
        .description(format!("**{}**", deal.job_title))
        .color(GREEN)
        .field("Buyer", format!("<@{}>", deal.buyer_id), true)
        .field("Seller", format!("<@{}>", deal.seller_id), true)
        .field("Agreed Price", &deal.agreed_price, true)
        .field("Status", deal.status.to_string(), true)
        .footer(CreateEmbedFooter::new(
            "A support member will guide both parties through payment and delivery.",
        ))
        .timestamp(Timestamp::now())
}

pub async fn finalize(handler: &Handler, ctx: &Context, component: &ComponentInteraction, job_id: u64) -> anyhow::Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };
    let selected = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => {
            values.first().and_then(|v| v.parse::<u64>().ok())
        }
        _ => None,
    };
    let Some(seller_id) = selected else {
        component.create_response(&ctx.http, ephemeral("❌ No bid selected.")).await?;
        return Ok(());
    };

    component.defer_ephemeral(&ctx.http).await?;

    let platform = GuildDeals { handler, ctx, guild_id };
    let reply = match handler
        .market
        .finalize(&platform, job_id, component.user.id.get(), seller_id)
        .await
    {
        Ok(deal) => {
            refresh_posting(handler, ctx, job_id).await;
            format!(
                "✅ Deal #{} created with <@{}>. Continue in <#{}>.",
                deal.deal_number, deal.seller_id, deal.channel_id
            )
        }
        Err(e) => {
            warn!("Finalize of job {} failed: {}", job_id, e);
            e.user_message()
        }
    };

    component
        .edit_response(
            &ctx.http,
            serenity::builder::EditInteractionResponse::new()
                .content(reply)
                .components(Vec::new()),
        )
        .await?;
    Ok(())
}

pub async fn dealstatus(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    if !handler.authorized(&caller_of(&command.user, command.member.as_deref())).await {
        command
            .create_response(&ctx.http, ephemeral("You do not have permission to update deals."))
            .await?;
        return Ok(());
    }

    let options = Options::of(command);
    let deal_number = options.int("deal_number").and_then(|n| u64::try_from(n).ok());
    let status = options.str("status").and_then(DealStatus::from_key);
    let (Some(deal_number), Some(status), Some(guild_id)) = (deal_number, status, command.guild_id) else {
        command
            .create_response(&ctx.http, ephemeral("❌ Provide a deal number and a status."))
            .await?;
        return Ok(());
    };

    let deal = match handler.market.advance_deal(deal_number, status).await {
        Ok(deal) => deal,
        Err(e) => {
            command.create_response(&ctx.http, ephemeral(e.user_message())).await?;
            return Ok(());
        }
    };

    let mut update = CreateEmbed::new()
        .title(format!("🎟️ Deal #{} - Status Update", deal.deal_number))
        .description(format!("**{}** → **{}**", deal.job_title, deal.status))
        .color(if status == DealStatus::Cancelled { 0xE74C3C } else { BLURPLE })
        .footer(
            CreateEmbedFooter::new(format!("Updated by {}", command.user.display_name()))
                .icon_url(command.user.face()),
        )
        .timestamp(Timestamp::now());
    if let Some(note) = options.str("note") {
        update = update.field("Note", expand_newlines(note), false);
    }

    if let Err(e) = ChannelId::new(deal.channel_id)
        .send_message(&ctx.http, CreateMessage::new().embed(update.clone()))
        .await
    {
        warn!("Failed to post status into deal channel {}: {}", deal.channel_id, e);
    }

    let reply = match ensure_private_channel(ctx, guild_id, ORDER_TRACKER_CHANNEL).await {
        Ok(tracker) => match tracker.send_message(&ctx.http, CreateMessage::new().embed(update)).await {
            Ok(_) => format!(
                "✅ The status for Deal #{} has been updated in <#{}>.",
                deal.deal_number, tracker.id
            ),
            Err(e) => {
                warn!("Failed to post to order tracker: {}", e);
                format!(
                    "⚠️ Deal #{} is now {}, but I could not post in <#{}>.",
                    deal.deal_number, deal.status, tracker.id
                )
            }
        },
        Err(e) => {
            warn!("Order tracker channel unavailable: {}", e);
            format!(
                "⚠️ Deal #{} is now {}, but the order tracker channel is not set up correctly.",
                deal.deal_number, deal.status
            )
        }
    };

    command.create_response(&ctx.http, ephemeral(reply)).await?;
    Ok(())
}
