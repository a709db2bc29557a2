use std::env;

use anyhow::Result;

/// Runtime configuration, loaded once in `main` and handed to each provider
/// client at construction. Credentials never live in process-global state.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub narrative_api_key: String,
    pub narrative_base_url: String,
    pub narrative_model: String,
    pub narrative_timeout_secs: u64,
    pub stability_api_key: String,
    pub stability_endpoint: String,
    pub stability_timeout_secs: u64,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

impl Config {
    /// API keys are allowed to be empty here so that the read-only modes
    /// (`list`, `show`) work without credentials; the capture path checks
    /// for them before touching the network.
    pub fn load() -> Result<Self> {
        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            narrative_api_key: env_string("NARRATIVE_API_KEY", ""),
            narrative_base_url: env_string("NARRATIVE_BASE_URL", "https://api.openai.com/v1"),
            narrative_model: env_string("NARRATIVE_MODEL", "gpt-3.5-turbo"),
            narrative_timeout_secs: env_u64("NARRATIVE_TIMEOUT_SECS", 60),
            stability_api_key: env_string("STABILITY_API_KEY", ""),
            stability_endpoint: env_string(
                "STABILITY_ENDPOINT",
                "https://api.stability.ai/v2beta/stable-image/generate/sd3",
            ),
            stability_timeout_secs: env_u64("STABILITY_TIMEOUT_SECS", 120),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fills_defaults_when_env_is_unset() {
        let config = Config::load().expect("config should load");
        assert_eq!(config.narrative_model, "gpt-3.5-turbo");
        assert!(config.stability_endpoint.contains("stability.ai"));
        assert!(config.narrative_timeout_secs > 0);
    }
}
