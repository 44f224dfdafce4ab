use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::warn;

/// Hard ceiling on repair attempts after the first model call.
pub const MAX_REPAIR_RETRIES_CAP: u32 = 2;

/// Application configuration loaded from environment variables.
/// Nothing is required: without `OPENAI_API_KEY` the local backend is used.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub hosted_base_url: String,
    pub hosted_model: String,
    pub local_llm_url: String,
    pub local_model: String,
    pub llm_timeout_secs: u64,
    pub max_repair_retries: u32,
    /// `None` disables the disk layer of the result cache.
    pub cache_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let requested_retries: u32 = parse_or(&get, "MAX_REPAIR_RETRIES", 2)?;
        if requested_retries > MAX_REPAIR_RETRIES_CAP {
            warn!(
                "MAX_REPAIR_RETRIES={requested_retries} exceeds the cap, using {MAX_REPAIR_RETRIES_CAP}"
            );
        }

        // An explicitly empty CACHE_DIR disables the disk layer.
        let cache_dir = match lookup("CACHE_DIR") {
            Some(dir) if dir.trim().is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from("cache")),
        };

        Ok(Config {
            openai_api_key: get("OPENAI_API_KEY"),
            hosted_base_url: or("HOSTED_BASE_URL", "https://api.openai.com/v1"),
            hosted_model: or("HOSTED_MODEL", "gpt-4o"),
            local_llm_url: or("LOCAL_LLM_URL", "http://localhost:11434"),
            local_model: or("LOCAL_MODEL", "llama3.2:3b"),
            llm_timeout_secs: parse_or(&get, "LLM_TIMEOUT_SECS", 120)?,
            max_repair_retries: requested_retries.min(MAX_REPAIR_RETRIES_CAP),
            cache_dir,
            output_dir: PathBuf::from(or("OUTPUT_DIR", "output")),
            port: parse_or(&get, "PORT", 8080)?,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_any_variables() {
        let config = config_from(&[]).unwrap();
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.hosted_model, "gpt-4o");
        assert_eq!(config.local_model, "llama3.2:3b");
        assert_eq!(config.llm_timeout_secs, 120);
        assert_eq!(config.max_repair_retries, 2);
        assert_eq!(config.cache_dir, Some(PathBuf::from("cache")));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_repair_retries_are_capped() {
        let config = config_from(&[("MAX_REPAIR_RETRIES", "9")]).unwrap();
        assert_eq!(config.max_repair_retries, MAX_REPAIR_RETRIES_CAP);
        let config = config_from(&[("MAX_REPAIR_RETRIES", "0")]).unwrap();
        assert_eq!(config.max_repair_retries, 0);
    }

    #[test]
    fn test_empty_cache_dir_disables_disk_layer() {
        let config = config_from(&[("CACHE_DIR", "")]).unwrap();
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_blank_api_key_counts_as_unset() {
        let config = config_from(&[("OPENAI_API_KEY", "  ")]).unwrap();
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
