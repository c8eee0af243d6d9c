//! Toxicity scoring through the Perspective comment analyzer.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::AiError;

const ANALYZE_URL: &str = "https://commentanalyzer.googleapis.com/v1alpha1/comments:analyze";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToxicityScores {
    pub toxicity: f64,
    pub severe_toxicity: f64,
    pub insult: f64,
    pub threat: f64,
}

/// The timeout a scored message earns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub duration: Duration,
    pub label: &'static str,
}

/// Highest matching tier wins: threats, then severe toxicity or insults,
/// then general toxicity.
pub fn select_timeout(scores: &ToxicityScores) -> Option<Verdict> {
    if scores.threat > 0.8 {
        Some(Verdict {
            duration: Duration::from_secs(24 * 3600),
            label: "24h",
        })
    } else if scores.severe_toxicity > 0.7 || scores.insult > 0.7 {
        Some(Verdict {
            duration: Duration::from_secs(3600),
            label: "1h",
        })
    } else if scores.toxicity > 0.6 {
        Some(Verdict {
            duration: Duration::from_secs(600),
            label: "10m",
        })
    } else {
        None
    }
}

pub struct PerspectiveClient {
    client: Client,
    api_key: String,
}

impl PerspectiveClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    pub async fn analyze(&self, text: &str) -> Result<ToxicityScores, AiError> {
        let payload = json!({
            "comment": { "text": text },
            "languages": ["en"],
            "doNotStore": true,
            "requestedAttributes": {
                "TOXICITY": {},
                "SEVERE_TOXICITY": {},
                "INSULT": {},
                "THREAT": {},
            }
        });

        let response = self
            .client
            .post(ANALYZE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::from_status(status, body));
        }

        let json: Value = response.json().await?;
        Ok(parse_scores(&json))
    }
}

fn parse_scores(json: &Value) -> ToxicityScores {
    let score = |attr: &str| {
        json["attributeScores"][attr]["summaryScore"]["value"]
            .as_f64()
            .unwrap_or(0.0)
    };
    ToxicityScores {
        toxicity: score("TOXICITY"),
        severe_toxicity: score("SEVERE_TOXICITY"),
        insult: score("INSULT"),
        threat: score("THREAT"),
    }
}
