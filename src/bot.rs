use dashmap::DashMap;
use serenity::async_trait;
use serenity::client::{Context, EventHandler};
use serenity::model::application::{Command, CommandInteraction, ComponentInteraction, Interaction, ModalInteraction};
use serenity::model::gateway::Ready;
use serenity::model::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::ai::perspective::PerspectiveClient;
use crate::ai::GeminiClient;
use crate::commands::{self, ephemeral, market, moderation, profile, ticket, utility};
use crate::config::Config;
use crate::events::{ai_chat, auto_purge, automod, owner_notify, welcome};
use crate::market::Marketplace;
use crate::moderation::WordFilter;
use crate::profiles::{ProfileBook, Review};
use crate::store::counter::Counter;
use crate::store::permissions::{AuthPolicy, Caller, PermissionStore};
use crate::store::tickets::TicketStore;

const GENERIC_FAILURE: &str = "An error occurred while processing your request.";

pub struct Handler {
    pub config: Config,
    pub gemini: Option<GeminiClient>,
    pub perspective: Option<PerspectiveClient>,
    pub market: Marketplace,
    pub profiles: ProfileBook,
    pub permissions: PermissionStore,
    pub cases: Counter,
    pub tickets: TicketStore,
    pub word_filter: WordFilter,
    owner_waits: owner_notify::PendingWaits,
    purge_started: AtomicBool,
}

impl Handler {
    pub async fn new(config: Config) -> Self {
        let data_dir = config.data_dir.clone();

        let gemini = match &config.gemini_api_key {
            Some(key) => {
                info!("Gemini enabled with model {}", config.gemini_model);
                Some(GeminiClient::new(key.clone(), config.gemini_model.clone()))
            }
            None => {
                warn!("GEMINI_API_KEY not set; AI chat is offline");
                None
            }
        };
        let perspective = match &config.perspective_api_key {
            Some(key) => Some(PerspectiveClient::new(key.clone())),
            None => {
                info!("PERSPECTIVE_API_KEY not set; toxicity scoring disabled");
                None
            }
        };

        Self {
            gemini,
            perspective,
            market: Marketplace::open(&data_dir).await,
            profiles: ProfileBook::open(&data_dir).await,
            permissions: PermissionStore::open(data_dir.join("permissions.json")).await,
            cases: Counter::cases(data_dir.join("punishment_cases.json")).await,
            tickets: TicketStore::open(data_dir.join("tickets.json")).await,
            word_filter: WordFilter::load(&data_dir.join("banned_words.json")).await,
            owner_waits: Arc::new(DashMap::new()),
            purge_started: AtomicBool::new(false),
            config,
        }
    }

    pub async fn authorized(&self, caller: &Caller) -> bool {
        self.permissions.is_authorized(caller).await
    }

    async fn run_command(&self, ctx: &Context, command: &CommandInteraction) -> anyhow::Result<()> {
        match command.data.name.as_str() {
            "ping" => commands::ping(ctx, command).await,
            "postingsetup" => market::postingsetup(self, ctx, command).await,
            "removebid" => market::removebid(self, ctx, command).await,
            "dealstatus" => market::dealstatus(self, ctx, command).await,
            "setprofile" => profile::setprofile(ctx, command).await,
            "profile" => profile::show(self, ctx, command).await,
            "deleteprofile" => profile::delete(self, ctx, command).await,
            "warn" => moderation::warn_member(self, ctx, command).await,
            "timeout" => moderation::timeout(self, ctx, command).await,
            "kick" => moderation::kick(self, ctx, command).await,
            "ban" => moderation::ban(self, ctx, command).await,
            "ticketsetup" => ticket::ticketsetup(ctx, command).await,
            "say" => utility::say(ctx, command).await,
            "dm" => utility::dm(ctx, command).await,
            "permission" => utility::permission(self, ctx, command).await,
            "aicheck" => utility::aicheck(self, ctx, command).await,
            _ => {
                error!("Unknown command: {}", command.data.name);
                Ok(())
            }
        }
    }

    async fn run_component(&self, ctx: &Context, component: &ComponentInteraction) -> anyhow::Result<()> {
        let id = component.data.custom_id.as_str();
        if let Some(job_id) = parse_suffix(id, market::BID_PICK_PREFIX) {
            return market::finalize(self, ctx, component, job_id).await;
        }
        if let Some(user_id) = parse_suffix(id, profile::APPROVE_PREFIX) {
            return profile::review(self, ctx, component, user_id, Review::Approved).await;
        }
        if let Some(user_id) = parse_suffix(id, profile::DENY_PREFIX) {
            return profile::review(self, ctx, component, user_id, Review::Denied).await;
        }

        match id {
            market::POST_JOB => market::open_job_modal(ctx, component).await,
            market::POST_SERVICE => market::open_service_modal(ctx, component).await,
            market::APPLY_NOW => market::apply_now(ctx, component).await,
            market::BID_PLACE => market::open_bid_modal(self, ctx, component).await,
            market::BID_WITHDRAW => market::withdraw_bid(self, ctx, component).await,
            market::BID_FINALIZE => market::choose_winner(self, ctx, component).await,
            ticket::TICKET_DROPDOWN => ticket::open_ticket(self, ctx, component).await,
            ticket::CLOSE_TICKET => ticket::close_ticket(self, ctx, component).await,
            _ => {
                warn!("Unhandled component: {}", id);
                Ok(())
            }
        }
    }

    async fn run_modal(&self, ctx: &Context, modal: &ModalInteraction) -> anyhow::Result<()> {
        let id = modal.data.custom_id.as_str();
        if let Some(job_id) = parse_suffix(id, market::BID_MODAL_PREFIX) {
            return market::submit_bid(self, ctx, modal, job_id).await;
        }

        match id {
            market::JOB_MODAL => market::submit_job(self, ctx, modal).await,
            market::SERVICE_MODAL => market::submit_service(ctx, modal).await,
            profile::PROFILE_MODAL => profile::submit(self, ctx, modal).await,
            _ => {
                warn!("Unhandled modal: {}", id);
                Ok(())
            }
        }
    }
}

/// The numeric id after `prefix` in a component custom id.
fn parse_suffix(custom_id: &str, prefix: &str) -> Option<u64> {
    custom_id.strip_prefix(prefix)?.parse().ok()
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected and ready!", ready.user.name);

        match Command::set_global_commands(&ctx.http, commands::all_commands()).await {
            Ok(registered) => info!("Successfully registered {} application commands", registered.len()),
            Err(e) => error!("Failed to register application commands: {}", e),
        }

        if !self.purge_started.swap(true, Ordering::SeqCst) {
            auto_purge::spawn(ctx);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = self.run_command(&ctx, &command).await {
                    error!("Error handling command {}: {:?}", command.data.name, e);
                    let _ = command.create_response(&ctx.http, ephemeral(GENERIC_FAILURE)).await;
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = self.run_component(&ctx, &component).await {
                    error!("Error handling component {}: {:?}", component.data.custom_id, e);
                    let _ = component.create_response(&ctx.http, ephemeral(GENERIC_FAILURE)).await;
                }
            }
            Interaction::Modal(modal) => {
                if let Err(e) = self.run_modal(&ctx, &modal).await {
                    error!("Error handling modal {}: {:?}", modal.data.custom_id, e);
                    let _ = modal.create_response(&ctx.http, ephemeral(GENERIC_FAILURE)).await;
                }
            }
            _ => {}
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        if automod::screen(self, &ctx, &msg).await {
            return;
        }
        if ai_chat::respond(self, &ctx, &msg).await {
            return;
        }
        owner_notify::watch(&ctx, &msg, &self.config, &self.owner_waits);
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        welcome::greet(&ctx, &new_member).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_id_suffixes_parse() {
        assert_eq!(parse_suffix("bid_pick:123", market::BID_PICK_PREFIX), Some(123));
        assert_eq!(parse_suffix("profile_deny:9", profile::DENY_PREFIX), Some(9));
        assert_eq!(parse_suffix("bid_pick:", market::BID_PICK_PREFIX), None);
        assert_eq!(parse_suffix("bid_place", market::BID_PICK_PREFIX), None);
    }
}
