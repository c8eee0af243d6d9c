//! Word filter, timeout parsing and punishment case records.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Used when the data directory has no `banned_words.json`.
pub const DEFAULT_BANNED_WORDS: &[&str] = &[
    "rape", "threats", "porn", "sex", "sucks", "fuck", "fucking", "fucker",
    "bokacoda", "magi", "bal", "khanki", "choda", "kutta", "haramjada",
    "bitch", "slut", "whore", "cunt", "nigger", "nigga", "asshole", "dick",
    "pussy", "bastard", "shit", "damn", "hell", "motherfucker",
    "sala", "shala", "shali", "chudirbhai", "mathachoda", "chodna", "baal",
    "kuttar baccha", "haramir baccha", "baper choda", "chagol", "gadha",
];

/// Discord refuses timeouts longer than 28 days.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(28 * 86_400);

pub struct WordFilter {
    words: Vec<String>,
}

impl WordFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Reads a JSON array of words, falling back to the default list.
    pub async fn load(path: &Path) -> Self {
        if let Ok(raw) = tokio::fs::read(path).await {
            match serde_json::from_slice::<Vec<String>>(&raw) {
                Ok(words) => {
                    info!("Loaded {} banned words from {}", words.len(), path.display());
                    return Self::new(words);
                }
                Err(e) => warn!("Ignoring malformed {}: {}", path.display(), e),
            }
        }
        Self::new(DEFAULT_BANNED_WORDS)
    }

    /// The first banned word contained anywhere in `content`, case-insensitive.
    pub fn find(&self, content: &str) -> Option<&str> {
        let lower = content.to_lowercase();
        self.words
            .iter()
            .find(|w| lower.contains(w.as_str()))
            .map(String::as_str)
    }
}

/// Parses `<n>m`, `<n>h` or `<n>d`. Zero and over-long durations are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();
    let unit = input.chars().last()?;
    let amount: u64 = input[..input.len() - unit.len_utf8()].trim().parse().ok()?;

    let seconds = match unit {
        'm' => amount.checked_mul(60)?,
        'h' => amount.checked_mul(3600)?,
        'd' => amount.checked_mul(86_400)?,
        _ => return None,
    };

    let duration = Duration::from_secs(seconds);
    if seconds == 0 || duration > MAX_TIMEOUT {
        return None;
    }
    Some(duration)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishmentCase {
    pub case_number: u64,
    pub action: String,
    pub user_id: u64,
    pub user_name: String,
    pub moderator_id: u64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl PunishmentCase {
    pub fn title(&self) -> String {
        format!("Case {} | {} | {}", self.case_number, self.action, self.user_name)
    }

    pub fn footer(&self) -> String {
        format!(
            "ID: {} • {}",
            self.user_id,
            self.timestamp.format("%d/%m/%Y, %H:%M")
        )
    }
}
