//! Daily cleanup of the bot command channel.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serenity::builder::GetMessages;
use serenity::model::prelude::*;
use serenity::prelude::*;
use std::time::Duration;
use tracing::{info, warn};

use crate::commands::find_channel;

const PURGE_CHANNEL: &str = "🤖bot-command";
const PURGE_EVERY: Duration = Duration::from_secs(24 * 3600);
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Messages older than this are purged.
fn cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - ChronoDuration::hours(27) - ChronoDuration::minutes(1)
}

/// The smallest message id Discord could assign at `at`.
fn snowflake_at(at: DateTime<Utc>) -> u64 {
    let ms = (at.timestamp_millis() - DISCORD_EPOCH_MS).max(1);
    (ms as u64) << 22
}

/// Bulk deletion only accepts messages younger than 14 days.
#[derive(Debug, Default, PartialEq, Eq)]
struct PurgePlan {
    bulk: Vec<Vec<MessageId>>,
    single: Vec<MessageId>,
}

fn plan(messages: &[(MessageId, DateTime<Utc>)], now: DateTime<Utc>) -> PurgePlan {
    let bulk_limit = now - ChronoDuration::days(14) + ChronoDuration::minutes(1);
    let mut young = Vec::new();
    let mut old = Vec::new();
    for &(id, at) in messages {
        if at > bulk_limit {
            young.push(id);
        } else {
            old.push(id);
        }
    }

    let mut plan = PurgePlan {
        single: old,
        ..Default::default()
    };
    for chunk in young.chunks(100) {
        if chunk.len() == 1 {
            plan.single.push(chunk[0]);
        } else {
            plan.bulk.push(chunk.to_vec());
        }
    }
    plan
}

/// Starts the purge loop. The first pass runs immediately.
pub fn spawn(ctx: Context) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_EVERY);
        loop {
            interval.tick().await;
            info!("Running daily auto-purge task...");
            for guild_id in ctx.cache.guilds() {
                if let Err(e) = purge_guild(&ctx, guild_id).await {
                    warn!("Auto-purge failed in guild {}: {}", guild_id, e);
                }
            }
        }
    });
}

async fn purge_guild(ctx: &Context, guild_id: GuildId) -> Result<(), serenity::Error> {
    let Some(channel) = find_channel(ctx, guild_id, PURGE_CHANNEL).await else {
        return Ok(());
    };
    let now = Utc::now();
    let mut before = MessageId::new(snowflake_at(cutoff(now)));
    let mut stale = Vec::new();

    loop {
        let page = channel
            .id
            .messages(&ctx.http, GetMessages::new().before(before).limit(100))
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        before = last.id;
        let full = page.len() == 100;
        stale.extend(page.iter().map(|m| {
            let at = DateTime::<Utc>::from_timestamp(m.timestamp.unix_timestamp(), 0).unwrap_or(now);
            (m.id, at)
        }));
        if !full {
            break;
        }
    }

    if stale.is_empty() {
        return Ok(());
    }

    let plan = plan(&stale, now);
    for ids in &plan.bulk {
        channel.id.delete_messages(&ctx.http, ids).await?;
    }
    for id in &plan.single {
        channel.id.delete_message(&ctx.http, *id).await?;
    }
    info!("Auto-purged {} messages from #{} in guild {}", stale.len(), PURGE_CHANNEL, guild_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_27_hours_and_a_minute() {
        let now = Utc.with_ymd_and_hms(2025, 9, 8, 12, 0, 0).unwrap();
        assert_eq!(cutoff(now), Utc.with_ymd_and_hms(2025, 9, 7, 8, 59, 0).unwrap());
    }

    #[test]
    fn snowflakes_encode_the_timestamp() {
        let at = Utc.timestamp_millis_opt(DISCORD_EPOCH_MS + 1000).unwrap();
        assert_eq!(snowflake_at(at), 1000 << 22);
    }

    #[test]
    fn old_messages_are_deleted_individually() {
        let now = Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap();
        let recent = now - ChronoDuration::days(2);
        let ancient = now - ChronoDuration::days(20);
        let messages = vec![
            (MessageId::new(3), recent),
            (MessageId::new(2), recent),
            (MessageId::new(1), ancient),
        ];

        let plan = plan(&messages, now);
        assert_eq!(plan.bulk, vec![vec![MessageId::new(3), MessageId::new(2)]]);
        assert_eq!(plan.single, vec![MessageId::new(1)]);
    }

    #[test]
    fn a_lone_recent_message_is_not_bulk_deleted() {
        let now = Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap();
        let plan = plan(&[(MessageId::new(9), now - ChronoDuration::days(1))], now);
        assert!(plan.bulk.is_empty());
        assert_eq!(plan.single, vec![MessageId::new(9)]);
    }

    #[test]
    fn bulk_batches_hold_at_most_100() {
        let now = Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap();
        let messages: Vec<_> = (1..=150)
            .map(|i| (MessageId::new(i), now - ChronoDuration::days(2)))
            .collect();
        let plan = plan(&messages, now);
        assert_eq!(plan.bulk.len(), 2);
        assert_eq!(plan.bulk[0].len(), 100);
        assert_eq!(plan.bulk[1].len(), 50);
        assert!(plan.single.is_empty());
    }
}
