//! Away auto-reply when the server owner is mentioned and does not answer.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serenity::collector::MessageCollector;
use serenity::model::prelude::*;
use serenity::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;

const REPLY_WINDOW: Duration = Duration::from_secs(60);

/// Channels with a running wait, mapped to the member who mentioned the owner.
pub type PendingWaits = Arc<DashMap<ChannelId, UserId>>;

fn away_message(author: UserId, owner: UserId) -> String {
    format!(
        "Hey <@{author}> 👋\n\n\
         Our Owner 👑 <@{owner}> is currently away or busy right now.\n\n\
         They'll get back to you as soon as possible.\n\
         Thanks for your patience! ✨"
    )
}

/// Resolves the owner and their role from the cache. Both are looked up by name.
fn lookup_owner(ctx: &Context, guild_id: GuildId, config: &Config) -> Option<(UserId, Option<RoleId>)> {
    let username = config.owner_username.as_deref()?;
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let owner = guild
        .members
        .values()
        .find(|m| m.user.name == username)
        .map(|m| m.user.id)?;
    let role = config
        .owner_role_name
        .as_deref()
        .and_then(|name| guild.role_by_name(name).map(|r| r.id));
    Some((owner, role))
}

fn mentions_owner(msg: &Message, owner: UserId, role: Option<RoleId>) -> bool {
    msg.mentions.iter().any(|u| u.id == owner)
        || role.is_some_and(|r| msg.mention_roles.contains(&r))
}

pub fn watch(ctx: &Context, msg: &Message, config: &Config, pending: &PendingWaits) {
    let Some(guild_id) = msg.guild_id else {
        return;
    };
    if msg.author.bot {
        return;
    }
    let Some((owner, role)) = lookup_owner(ctx, guild_id, config) else {
        return;
    };
    if msg.author.id == owner || !mentions_owner(msg, owner, role) {
        return;
    }

    let channel_id = msg.channel_id;
    match pending.entry(channel_id) {
        Entry::Occupied(_) => {
            debug!("Already waiting for the owner in {}", channel_id);
            return;
        }
        Entry::Vacant(slot) => {
            slot.insert(msg.author.id);
        }
    }

    let ctx = ctx.clone();
    let pending = Arc::clone(pending);
    let author = msg.author.id;
    tokio::spawn(async move {
        let answered = MessageCollector::new(&ctx.shard)
            .channel_id(channel_id)
            .author_id(owner)
            .timeout(REPLY_WINDOW)
            .next()
            .await
            .is_some();
        pending.remove(&channel_id);

        if !answered {
            if let Err(e) = channel_id.say(&ctx.http, away_message(author, owner)).await {
                warn!("Failed to send owner away reply: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn away_message_mentions_both() {
        let text = away_message(UserId::new(1), UserId::new(2));
        assert!(text.starts_with("Hey <@1> 👋"));
        assert!(text.contains("Our Owner 👑 <@2>"));
    }

    #[test]
    fn one_wait_per_channel() {
        let pending: PendingWaits = Arc::new(DashMap::new());
        let channel = ChannelId::new(10);
        assert!(matches!(pending.entry(channel), Entry::Vacant(_)));
        pending.insert(channel, UserId::new(1));
        assert!(matches!(pending.entry(channel), Entry::Occupied(_)));
    }
}
