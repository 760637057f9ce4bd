// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_daily_limit() -> u32 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" (case-insensitive); anything else disables the AI stage.
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: default_model(),
            daily_limit: default_daily_limit(),
            api_key: String::new(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.to_lowercase();

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.daily_limit == 0 {
            cfg.daily_limit = default_daily_limit();
        }

        Ok(cfg)
    }

    /// Like `load_from_file` but falls back to a disabled config.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!(error = %e, "AI config unavailable; AI stage disabled");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_key_resolution_and_normalization() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("ai.json");
        fs::write(
            &p,
            r#"{"enabled":true,"provider":"OpenAI","api_key":"ENV","daily_limit":0}"#,
        )
        .unwrap();

        env::set_var("OPENAI_API_KEY", "sk-test");
        let cfg = AiConfig::load_from_file(&p).unwrap();
        env::remove_var("OPENAI_API_KEY");

        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.model, "gpt-4o-mini");
        assert_eq!(cfg.daily_limit, 200);
    }

    #[test]
    fn missing_file_means_disabled() {
        let cfg = AiConfig::load_or_default("/nope/ai.json");
        assert!(!cfg.enabled);
    }
}
