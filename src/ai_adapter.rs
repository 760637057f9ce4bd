//! AI adapter: provider abstraction + daily limit + response sanitizing.
//!
//! The AI stage only sees [`AiClient`]; `None` from `analyze` means "no
//! opinion" (disabled, over budget, provider error) and the stage degrades.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ai::AiConfig;

/// Longest response the stage will look at.
pub const MAX_RESPONSE_CHARS: usize = 600;

/// Trait object used by the AI stage (and tests).
pub trait AiClient: Send + Sync {
    fn analyze<'a>(&'a self, prompt: &'a str)
        -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    /// `false` when AI is switched off; the AI stage is then left out.
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider (OpenAI) wrapped with the daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynAiClient {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(LimitedClient::new(
            MockProvider::neutral(),
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => Arc::new(LimitedClient::new(
            OpenAiProvider::new(&config.api_key, &config.model),
            config.daily_limit,
        )),
        other => {
            tracing::warn!(provider = other, "unsupported AI provider; AI stage disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// Low-level provider: does the actual remote call.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, prompt: &'a str)
        -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("crypto-sentiment-gateway/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

const SYSTEM_PROMPT: &str = "You assess crypto market sentiment from news headlines. \
Reply on one line as: SENTIMENT: BULLISH|BEARISH|NEUTRAL; CONFIDENCE: 0.0-1.0; SUMMARY: <one sentence>. \
Plain ASCII, no emojis.";

impl Provider for OpenAiProvider {
    fn fetch<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return None;
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Msg {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.2,
                max_tokens: 160,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .ok()?;
            if !resp.status().is_success() {
                tracing::warn!(status = %resp.status(), "openai call failed");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            body.choices.into_iter().next().map(|c| c.message.content)
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Returns `None` always; used when AI is disabled.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn analyze<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Fixed answer; for tests and offline runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn neutral() -> Self {
        Self {
            fixed: "SENTIMENT: NEUTRAL; CONFIDENCE: 0.5; SUMMARY: Mixed headlines (mock)".into(),
        }
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Daily limit wrapper
// ------------------------------------------------------------

#[derive(Debug)]
struct DailyCounter {
    day: i64,
    count: u32,
}

fn today() -> i64 {
    chrono::Utc::now().timestamp().div_euclid(86_400)
}

/// Counts successful provider calls per UTC day; over budget yields `None`.
pub struct LimitedClient<P: Provider> {
    inner: P,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> LimitedClient<P> {
    pub fn new(inner: P, daily_limit: u32) -> Self {
        Self {
            inner,
            daily_limit,
            counter: Mutex::new(DailyCounter {
                day: today(),
                count: 0,
            }),
        }
    }

    fn with_counter<T>(&self, f: impl FnOnce(&mut DailyCounter) -> T) -> T {
        let mut g = match self.counter.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        let now = today();
        if g.day != now {
            g.day = now;
            g.count = 0;
        }
        f(&mut g)
    }

    async fn analyze_impl(&self, prompt: &str) -> Option<String> {
        if self.with_counter(|c| c.count >= self.daily_limit) {
            tracing::debug!(limit = self.daily_limit, "AI daily limit reached");
            return None;
        }
        let raw = self.inner.fetch(prompt).await?;
        let cleaned = sanitize_response(&raw, MAX_RESPONSE_CHARS);
        if cleaned.is_empty() {
            return None;
        }
        self.with_counter(|c| c.count = c.count.saturating_add(1));
        Some(cleaned)
    }
}

impl<P: Provider> AiClient for LimitedClient<P> {
    fn analyze<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(self.analyze_impl(prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// ASCII-only, single line, at most `max` chars, collapsed whitespace.
pub fn sanitize_response(input: &str, max: usize) -> String {
    let mut out = String::with_capacity(max.min(input.len()));
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c if c.is_ascii() => c,
            _ => ' ',
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.len() >= max {
            break;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_non_ascii_and_newlines() {
        let s = sanitize_response("  Bullish 🚀\n\nETF   flows\tstrong  ", 100);
        assert_eq!(s, "Bullish ETF flows strong");
        assert_eq!(sanitize_response(&"x".repeat(50), 10).len(), 10);
    }

    #[tokio::test]
    async fn daily_limit_blocks_after_budget() {
        let client = LimitedClient::new(MockProvider::neutral(), 2);
        assert!(client.analyze("a").await.is_some());
        assert!(client.analyze("b").await.is_some());
        assert!(client.analyze("c").await.is_none());
        assert_eq!(client.provider_name(), "mock");
    }

    #[tokio::test]
    async fn disabled_config_yields_no_opinion() {
        let cfg = AiConfig::default();
        let client = build_client_from_config(&cfg);
        if std::env::var("AI_TEST_MODE").is_err() {
            assert_eq!(client.provider_name(), "disabled");
            assert!(client.analyze("anything").await.is_none());
        }
    }
}
