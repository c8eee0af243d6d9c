//! Profile submission, moderator review and lookup.

use serenity::builder::{
    CreateActionRow, CreateButton, CreateCommand, CreateCommandOption, CreateEmbed,
    CreateEmbedFooter, CreateInteractionResponse, CreateInteractionResponseMessage,
    CreateMessage, CreateModal,
};
use serenity::model::prelude::*;
use serenity::model::Timestamp;
use serenity::prelude::*;
use tracing::{info, warn};

use super::market::modal_value;
use super::{caller_of, ephemeral, find_channel, Options};
use crate::bot::Handler;
use crate::profiles::{Profile, Review};

pub const PROFILE_MODAL: &str = "profile_modal";
pub const APPROVE_PREFIX: &str = "profile_approve:";
pub const DENY_PREFIX: &str = "profile_deny:";
const PROFILE_LOG: &str = "profile-log";

pub fn register_setprofile() -> CreateCommand {
    CreateCommand::new("setprofile")
        .description("Submit your professional profile for approval.")
        .dm_permission(false)
}

pub fn register_profile() -> CreateCommand {
    CreateCommand::new("profile")
        .description("View an approved profile.")
        .add_option(CreateCommandOption::new(
            CommandOptionType::User,
            "user",
            "Whose profile to view (defaults to you).",
        ))
}

pub fn register_deleteprofile() -> CreateCommand {
    CreateCommand::new("deleteprofile")
        .description("Delete an approved profile.")
        .dm_permission(false)
        .add_option(CreateCommandOption::new(
            CommandOptionType::User,
            "user",
            "Whose profile to delete (moderators only; defaults to you).",
        ))
}

pub async fn setprofile(ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    let row = |style, label: &str, id: &str, placeholder: &str| {
        CreateActionRow::InputText(
            serenity::builder::CreateInputText::new(style, label, id)
                .placeholder(placeholder)
                .required(true)
                .max_length(1024),
        )
    };
    let modal = CreateModal::new(PROFILE_MODAL, "Submit Your Profile").components(vec![
        row(InputTextStyle::Short, "Full Name", "name", "Your name"),
        row(InputTextStyle::Paragraph, "Skills", "skills", "Example: Logo design, Branding, Figma"),
        row(InputTextStyle::Short, "Portfolio Link", "portfolio", "https://..."),
        row(InputTextStyle::Paragraph, "Experience", "experience", "Example: 3 years freelancing"),
        row(InputTextStyle::Short, "Certification", "certification", "Example: Google UX Certificate, or None"),
    ]);
    command
        .create_response(&ctx.http, CreateInteractionResponse::Modal(modal))
        .await?;
    Ok(())
}

fn profile_embed(title: String, profile: &Profile) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .color(0x5865F2)
        .field("👤 Name", &profile.name, false)
        .field("🛠 Skills", &profile.skills, false)
        .field("🔗 Portfolio", &profile.portfolio, false)
        .field("📈 Experience", &profile.experience, false)
        .field("🎓 Certification", &profile.certification, false)
}

fn review_buttons(user_id: u64, disabled: bool) -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(format!("{}{}", APPROVE_PREFIX, user_id))
            .label("Approve")
            .style(ButtonStyle::Success)
            .disabled(disabled),
        CreateButton::new(format!("{}{}", DENY_PREFIX, user_id))
            .label("Deny")
            .style(ButtonStyle::Danger)
            .disabled(disabled),
    ])]
}

pub async fn submit(handler: &Handler, ctx: &Context, modal: &ModalInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = modal.guild_id else {
        return Ok(());
    };
    let Some(log) = find_channel(ctx, guild_id, PROFILE_LOG).await else {
        modal
            .create_response(&ctx.http, ephemeral("❌ Error: `#profile-log` channel not found. Please contact an admin."))
            .await?;
        return Ok(());
    };

    let profile = Profile {
        name: modal_value(modal, "name").unwrap_or_default(),
        skills: modal_value(modal, "skills").unwrap_or_default(),
        portfolio: modal_value(modal, "portfolio").unwrap_or_default(),
        experience: modal_value(modal, "experience").unwrap_or_default(),
        certification: modal_value(modal, "certification").unwrap_or_default(),
    };
    let user = &modal.user;

    if let Err(e) = handler.profiles.submit(user.id.get(), profile.clone()).await {
        warn!("Failed to store pending profile of {}: {}", user.id, e);
        modal
            .create_response(&ctx.http, ephemeral("❌ Could not save your submission. Please try again."))
            .await?;
        return Ok(());
    }

    let embed = profile_embed(format!("Profile submission from {}", user.name), &profile)
        .description(format!("<@{}>", user.id))
        .thumbnail(user.face())
        .footer(CreateEmbedFooter::new(format!("User ID: {}", user.id)))
        .timestamp(Timestamp::now());

    if let Err(e) = log
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .embed(embed)
                .components(review_buttons(user.id.get(), false)),
        )
        .await
    {
        warn!("Failed to post profile submission to #{}: {}", PROFILE_LOG, e);
        modal
            .create_response(&ctx.http, ephemeral("❌ Could not forward your profile for review. Please contact an admin."))
            .await?;
        return Ok(());
    }

    modal
        .create_response(&ctx.http, ephemeral("✅ Your profile has been submitted for review."))
        .await?;
    Ok(())
}

pub async fn review(
    handler: &Handler,
    ctx: &Context,
    component: &ComponentInteraction,
    user_id: u64,
    decision: Review,
) -> anyhow::Result<()> {
    let moderator = caller_of(&component.user, component.member.as_ref());
    let profile = match handler
        .profiles
        .review(&handler.permissions, &moderator, user_id, decision)
        .await
    {
        Ok(profile) => profile,
        Err(e) => {
            component.create_response(&ctx.http, ephemeral(e.user_message())).await?;
            return Ok(());
        }
    };

    let verdict = match decision {
        Review::Approved => format!("✅ Approved by <@{}>", component.user.id),
        Review::Denied => format!("❌ Denied by <@{}>", component.user.id),
    };
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .content(verdict)
                    .components(review_buttons(user_id, true)),
            ),
        )
        .await?;

    let notice = match decision {
        Review::Approved => "🎉 Your profile has been approved! Others can now view it with `/profile`.",
        Review::Denied => "Your profile submission was not approved. You may update it and submit again with `/setprofile`.",
    };
    let dm = match UserId::new(user_id).create_dm_channel(&ctx.http).await {
        Ok(channel) => channel.say(&ctx.http, notice).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = dm {
        info!("Could not DM {} about their profile: {}", user_id, e);
    }
    info!("Profile of {} reviewed: {} ({:?})", user_id, profile.name, decision);
    Ok(())
}

pub async fn show(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    let target = Options::of(command).user("user").unwrap_or(command.user.id);
    let reply = match handler.profiles.get(target.get()).await {
        Some(profile) => {
            let title = match target.to_user(&ctx.http).await {
                Ok(user) => format!("{}'s Profile", user.name),
                Err(_) => "Profile".to_string(),
            };
            CreateInteractionResponseMessage::new().embed(profile_embed(title, &profile))
        }
        None => CreateInteractionResponseMessage::new()
            .content(format!("<@{}> has no approved profile.", target))
            .ephemeral(true),
    };
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(reply))
        .await?;
    Ok(())
}

pub async fn delete(handler: &Handler, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
    let target = Options::of(command).user("user").unwrap_or(command.user.id);
    if target != command.user.id
        && !handler.authorized(&caller_of(&command.user, command.member.as_deref())).await
    {
        command
            .create_response(&ctx.http, ephemeral("You can only delete your own profile."))
            .await?;
        return Ok(());
    }

    let reply = match handler.profiles.delete(target.get()).await {
        Ok(true) => {
            info!("Profile of {} deleted by {}", target, command.user.id);
            format!("🗑️ The profile of <@{}> has been deleted.", target)
        }
        Ok(false) => format!("<@{}> has no profile to delete.", target),
        Err(e) => {
            warn!("Failed to delete profile of {}: {}", target, e);
            "❌ Could not delete the profile. Please try again.".to_string()
        }
    };
    command.create_response(&ctx.http, ephemeral(reply)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_buttons_carry_the_submitter() {
        let rows = serde_json::to_string(&review_buttons(77, false)).unwrap();
        assert!(rows.contains("profile_approve:77"));
        assert!(rows.contains("profile_deny:77"));
    }
}
