//! Banned-word filter and toxicity scoring for guild messages.

use serenity::async_trait;
use serenity::model::prelude::*;
use serenity::prelude::*;
use std::time::Duration;
use tracing::{info, warn};

use crate::ai::perspective::{select_timeout, Verdict};
use crate::bot::Handler;
use crate::commands::moderation::{apply_timeout, log_punishment};

/// What the filter can do to an offending message and its author.
#[async_trait]
pub trait Enforcement: Send + Sync {
    async fn delete_message(&self) -> Result<(), serenity::Error>;
    async fn time_out(&self, duration: Duration) -> Result<(), serenity::Error>;
    async fn dm_author(&self, text: String) -> Result<(), serenity::Error>;
    async fn log_case(&self, action: &str, reason: &str);
}

/// Deletes, logs once, then DMs. A failed DM changes nothing.
pub async fn enforce_banned_word(actions: &dyn Enforcement, word: &str) {
    if let Err(e) = actions.delete_message().await {
        warn!("Failed to delete message with banned word: {}", e);
    }
    actions
        .log_case("Warn (Auto)", &format!("Used a banned word: ||{}||", word))
        .await;
    let notice = "⚠️ Your message was removed because it contained a banned word. Please keep the conversation respectful.".to_string();
    if let Err(e) = actions.dm_author(notice).await {
        info!("Could not DM author about banned word: {}", e);
    }
}

pub async fn enforce_toxicity(actions: &dyn Enforcement, verdict: Verdict) {
    if let Err(e) = actions.delete_message().await {
        warn!("Failed to delete toxic message: {}", e);
    }
    if let Err(e) = actions.time_out(verdict.duration).await {
        warn!("Failed to time out toxic author: {}", e);
    }
    let notice = format!(
        "⏳ You have been timed out for {} because your message was flagged as toxic.",
        verdict.label
    );
    if let Err(e) = actions.dm_author(notice).await {
        info!("Could not DM author about timeout: {}", e);
    }
    actions
        .log_case(
            &format!("Timeout (Auto, {})", verdict.label),
            "Message flagged as toxic by the content filter.",
        )
        .await;
}

struct LiveMessage<'a> {
    handler: &'a Handler,
    ctx: &'a Context,
    msg: &'a Message,
    guild_id: GuildId,
}

#[async_trait]
impl Enforcement for LiveMessage<'_> {
    async fn delete_message(&self) -> Result<(), serenity::Error> {
        self.msg.delete(&self.ctx.http).await
    }

    async fn time_out(&self, duration: Duration) -> Result<(), serenity::Error> {
        apply_timeout(self.ctx, self.guild_id, self.msg.author.id, duration).await
    }

    async fn dm_author(&self, text: String) -> Result<(), serenity::Error> {
        let dm = self.msg.author.create_dm_channel(&self.ctx.http).await?;
        dm.say(&self.ctx.http, text).await?;
        Ok(())
    }

    async fn log_case(&self, action: &str, reason: &str) {
        let bot_id = self.ctx.cache.current_user().id;
        log_punishment(self.handler, self.ctx, self.guild_id, action, &self.msg.author, bot_id, reason).await;
    }
}

/// Administrators and the guild owner are exempt from filtering. The roles
/// come from the cache when the member is there, otherwise from the member
/// data Discord sends with the message.
fn is_exempt(ctx: &Context, guild_id: GuildId, msg: &Message) -> bool {
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return false;
    };
    if guild.owner_id == msg.author.id {
        return true;
    }
    let roles = match guild.members.get(&msg.author.id) {
        Some(member) => member.roles.clone(),
        None => msg.member.as_ref().map(|m| m.roles.clone()).unwrap_or_default(),
    };
    grants_admin(guild_id, &roles, |role_id| guild.roles.get(&role_id).map(|r| r.permissions))
}

/// Whether any of `roles`, or the guild's @everyone role, carries
/// Administrator.
fn grants_admin(guild_id: GuildId, roles: &[RoleId], permissions_of: impl Fn(RoleId) -> Option<Permissions>) -> bool {
    roles
        .iter()
        .copied()
        .chain(std::iter::once(RoleId::new(guild_id.get())))
        .any(|role_id| permissions_of(role_id).is_some_and(|p| p.administrator()))
}

/// Returns `true` when the message was removed.
pub async fn screen(handler: &Handler, ctx: &Context, msg: &Message) -> bool {
    let Some(guild_id) = msg.guild_id else {
        return false;
    };
    if msg.author.bot || is_exempt(ctx, guild_id, msg) {
        return false;
    }

    let live = LiveMessage { handler, ctx, msg, guild_id };

    if let Some(word) = handler.word_filter.find(&msg.content) {
        info!("Banned word from {} in {}", msg.author.id, msg.channel_id);
        enforce_banned_word(&live, word).await;
        return true;
    }

    let Some(perspective) = &handler.perspective else {
        return false;
    };
    if msg.content.trim().is_empty() {
        return false;
    }
    match perspective.analyze(&msg.content).await {
        Ok(scores) => match select_timeout(&scores) {
            Some(verdict) => {
                info!("Toxic message from {} ({:?}): {}", msg.author.id, scores, verdict.label);
                enforce_toxicity(&live, verdict).await;
                true
            }
            None => false,
        },
        Err(e) => {
            warn!("Toxicity scoring failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        dm_fails: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Enforcement for Recorder {
        async fn delete_message(&self) -> Result<(), serenity::Error> {
            self.calls.lock().unwrap().push("delete".into());
            Ok(())
        }

        async fn time_out(&self, duration: Duration) -> Result<(), serenity::Error> {
            self.calls.lock().unwrap().push(format!("timeout {}", duration.as_secs()));
            Ok(())
        }

        async fn dm_author(&self, _text: String) -> Result<(), serenity::Error> {
            self.calls.lock().unwrap().push("dm".into());
            if self.dm_fails {
                Err(serenity::Error::Other("dms closed"))
            } else {
                Ok(())
            }
        }

        async fn log_case(&self, action: &str, reason: &str) {
            self.calls.lock().unwrap().push(format!("log {} / {}", action, reason));
        }
    }

    #[tokio::test]
    async fn banned_word_is_deleted_and_logged_once_when_dm_fails() {
        let recorder = Recorder {
            dm_fails: true,
            ..Default::default()
        };
        enforce_banned_word(&recorder, "scam").await;

        let calls = recorder.calls();
        assert_eq!(calls.iter().filter(|c| *c == "delete").count(), 1);
        assert_eq!(calls.iter().filter(|c| c.starts_with("log ")).count(), 1);
        assert_eq!(calls[1], "log Warn (Auto) / Used a banned word: ||scam||");
        assert_eq!(calls.len(), 3);
    }

    #[tokio::test]
    async fn toxic_message_is_timed_out_for_the_verdict() {
        let recorder = Recorder::default();
        let verdict = Verdict {
            duration: Duration::from_secs(3600),
            label: "1h",
        };
        enforce_toxicity(&recorder, verdict).await;

        assert_eq!(
            recorder.calls(),
            vec![
                "delete".to_string(),
                "timeout 3600".to_string(),
                "dm".to_string(),
                "log Timeout (Auto, 1h) / Message flagged as toxic by the content filter.".to_string(),
            ]
        );
    }

    #[test]
    fn admin_roles_exempt_members_missing_from_cache() {
        let guild = GuildId::new(100);
        let perms: std::collections::HashMap<RoleId, Permissions> = [
            (RoleId::new(100), Permissions::SEND_MESSAGES),
            (RoleId::new(7), Permissions::KICK_MEMBERS),
            (RoleId::new(8), Permissions::ADMINISTRATOR | Permissions::SEND_MESSAGES),
        ]
        .into_iter()
        .collect();
        let lookup = |id: RoleId| perms.get(&id).copied();

        assert!(grants_admin(guild, &[RoleId::new(7), RoleId::new(8)], lookup));
        assert!(!grants_admin(guild, &[RoleId::new(7)], lookup));
        assert!(!grants_admin(guild, &[RoleId::new(99)], lookup));
        assert!(!grants_admin(guild, &[], lookup));

        let open_server = |id: RoleId| (id == RoleId::new(100)).then_some(Permissions::ADMINISTRATOR);
        assert!(grants_admin(guild, &[], open_server));
    }
}
