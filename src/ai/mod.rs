pub mod perspective;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Discord's message size limit.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
const TRUNCATION_SUFFIX: &str = "... (truncated)";

const SYSTEM_INSTRUCTION: &str = "You are a professional AI Business Consultant for 'Startup Bangladesh'. \
Your role is to assist users with startups, entrepreneurship, business strategies, \
marketing, finance, and professional career advice.\n\
RULES:\n\
1. Answer ONLY business-related questions.\n\
2. Be concise, professional, and helpful.\n\
3. If a user asks about non-business topics, politely refuse.";

#[derive(Error, Debug)]
pub enum AiError {
    #[error("invalid API key or model name")]
    InvalidRequest,

    #[error("API key has no access to this model")]
    PermissionDenied,

    #[error("request quota exceeded")]
    QuotaExceeded,

    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AiError {
    fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => AiError::InvalidRequest,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AiError::PermissionDenied,
            StatusCode::TOO_MANY_REQUESTS => AiError::QuotaExceeded,
            _ => AiError::Api { status, body },
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AiError::InvalidRequest => "⚠️ **AI Error:** Invalid API Key or Model Name. Please contact an Admin.",
            AiError::PermissionDenied => "⚠️ **AI Error:** Permission Denied. The API key might not have access to this model.",
            AiError::QuotaExceeded => "⚠️ **AI Error:** Quota Exceeded. Too many requests, please try again later.",
            AiError::Api { .. } | AiError::Http(_) => "⚠️ Sorry, I'm having trouble generating a response right now.",
        }
    }
}

/// Outcome of a generation request that reached the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text(String),
    /// Refused by the safety filters, with the reported reason.
    Blocked(String),
    Empty,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }

    pub async fn generate_response(&self, prompt: &str) -> Result<Generation, AiError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let payload = json!({
            "systemInstruction": {
                "parts": [{ "text": SYSTEM_INSTRUCTION }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": 0.7,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 800,
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::from_status(status, body));
        }

        let json: Value = response.json().await?;
        Ok(parse_generation(&json))
    }
}

fn parse_generation(json: &Value) -> Generation {
    if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
        return Generation::Blocked(reason.to_string());
    }

    let candidate = &json["candidates"][0];
    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate["finishReason"].as_str() {
            Some(reason @ ("SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                Generation::Blocked(reason.to_string())
            }
            _ => Generation::Empty,
        };
    }

    Generation::Text(text)
}

/// Shortens `text` to fit in one Discord message, respecting char boundaries.
pub fn truncate_for_discord(text: &str) -> String {
    if text.chars().count() <= DISCORD_MESSAGE_LIMIT {
        return text.to_string();
    }
    let keep = DISCORD_MESSAGE_LIMIT - TRUNCATION_SUFFIX.chars().count();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_for_discord("hello"), "hello");
        let exact = "a".repeat(DISCORD_MESSAGE_LIMIT);
        assert_eq!(truncate_for_discord(&exact), exact);
    }

    #[test]
    fn long_text_fits_limit_with_multibyte_chars() {
        let long = "স্টার্টআপ ".repeat(400);
        let out = truncate_for_discord(&long);
        assert_eq!(out.chars().count(), DISCORD_MESSAGE_LIMIT);
        assert!(out.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn parses_text_parts() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Validate " }, { "text": "your market." }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            parse_generation(&json),
            Generation::Text("Validate your market.".into())
        );
    }

    #[test]
    fn distinguishes_blocked_from_empty() {
        let prompt_blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert_eq!(parse_generation(&prompt_blocked), Generation::Blocked("SAFETY".into()));

        let candidate_blocked = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        assert_eq!(
            parse_generation(&candidate_blocked),
            Generation::Blocked("SAFETY".into())
        );

        let empty = json!({ "candidates": [{ "content": { "parts": [] }, "finishReason": "STOP" }] });
        assert_eq!(parse_generation(&empty), Generation::Empty);
        assert_eq!(parse_generation(&json!({})), Generation::Empty);
    }

    #[test]
    fn maps_status_codes() {
        assert!(matches!(
            AiError::from_status(StatusCode::BAD_REQUEST, String::new()),
            AiError::InvalidRequest
        ));
        assert!(matches!(
            AiError::from_status(StatusCode::FORBIDDEN, String::new()),
            AiError::PermissionDenied
        ));
        assert!(matches!(
            AiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            AiError::QuotaExceeded
        ));
        assert!(matches!(
            AiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            AiError::Api { .. }
        ));
    }
}
