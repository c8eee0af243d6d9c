use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub perspective_api_key: Option<String>,
    pub data_dir: PathBuf,
    pub owner_username: Option<String>,
    pub owner_role_name: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Only the Discord token is
    /// required; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = get("DISCORD_TOKEN")
            .context("DISCORD_TOKEN environment variable not set")?;

        let gemini_api_key = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY"));
        let gemini_model = get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let perspective_api_key = get("PERSPECTIVE_API_KEY");
        let data_dir = get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

        Ok(Config {
            discord_token,
            gemini_api_key,
            gemini_model,
            perspective_api_key,
            data_dir,
            owner_username: get("OWNER_USERNAME"),
            owner_role_name: get("OWNER_ROLE_NAME"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn optional_keys_default() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t")])).unwrap();
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.perspective_api_key, None);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.owner_username, None);
    }

    #[test]
    fn google_key_is_a_fallback_for_gemini() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("GOOGLE_API_KEY", "g"),
        ]))
        .unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("g"));

        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("GOOGLE_API_KEY", "g"),
            ("GEMINI_API_KEY", "m"),
        ]))
        .unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("m"));
    }
}
