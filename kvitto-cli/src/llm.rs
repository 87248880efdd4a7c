//! LLM-backed [`FallbackParser`].
//!
//! Sends receipt text to OpenAI or Anthropic and reads back
//! `{"items": [...], "anomalies": [...]}`.

use std::fmt;

use anyhow::{Result, bail};
use futures_util::future::BoxFuture;
use kvitto_core::FallbackError;
use kvitto_ingest::{FallbackOutput, FallbackParser};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthState;
use crate::config::LlmSection;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

const SYSTEM_PROMPT: &str = "\
You read Swedish grocery receipts. Reply with one JSON object and nothing else:
{\"items\": [{\"name\": string, \"price\": number, \"quantity\": number, \"category\": string, \"discount\": number}],
 \"anomalies\": [{\"type\": string, \"description\": string, \"severity\": \"low\"|\"medium\"|\"high\"|\"critical\"}]}
Rules:
- Amounts use a comma decimal separator on the receipt; output plain numbers.
- price is what was paid for the line after promotions. For <N>F<price> multi-buy
  promotions the price is the bundle price and discount is the original price minus
  the bundle price, never negative. Ignore the printed -X figure on those lines.
- Join the item name line and the promotion label with a space to form name.
- Omit discount when there is none. Use category \"other\" when unsure.
- Skip totals, VAT, payment and store header lines.
- Report anything you had to guess as an anomaly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => bail!("unknown llm provider '{other}' (expected openai or anthropic)"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => ANTHROPIC_BASE_URL,
            Provider::OpenAI => OPENAI_BASE_URL,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct LlmFallback {
    client: reqwest::Client,
    provider: Provider,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
}

impl fmt::Debug for LlmFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmFallback")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LlmFallback {
    /// Build from config. `Ok(None)` when the fallback is disabled or no key
    /// is available for the configured provider.
    pub fn from_config(section: &LlmSection, auth: &AuthState) -> Result<Option<Self>> {
        if !section.enabled {
            return Ok(None);
        }
        let provider = Provider::parse(&section.provider)?;
        let Some(api_key) = auth.key_for(provider) else {
            debug!(%provider, "no api key; AI fallback disabled");
            return Ok(None);
        };
        let base_url = if section.base_url.trim().is_empty() {
            provider.default_base_url().to_string()
        } else {
            section.base_url.trim_end_matches('/').to_string()
        };

        Ok(Some(Self {
            client: reqwest::Client::new(),
            provider,
            model: section.model.clone(),
            base_url,
            temperature: section.temperature,
            max_tokens: section.max_tokens,
            api_key,
        }))
    }

    async fn complete(&self, receipt: &str) -> Result<String, FallbackError> {
        match self.provider {
            Provider::Anthropic => self.anthropic_complete(receipt).await,
            Provider::OpenAI => self.openai_complete(receipt).await,
        }
    }

    async fn anthropic_complete(&self, receipt: &str) -> Result<String, FallbackError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Msg {
                role: "user",
                content: receipt,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| FallbackError::Request(format!("invalid api key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| FallbackError::Request(format!("anthropic request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(FallbackError::Request(format!("anthropic error: {status} {txt}")));
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| FallbackError::InvalidResponse(format!("anthropic response: {e}")))?;
        let text: String = out
            .content
            .into_iter()
            .filter(|b| b.t == "text")
            .filter_map(|b| b.text)
            .collect();
        Ok(text.trim().to_string())
    }

    async fn openai_complete(&self, receipt: &str) -> Result<String, FallbackError> {
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
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: receipt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| FallbackError::Request(format!("openai request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(FallbackError::Request(format!("openai error: {status} {txt}")));
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| FallbackError::InvalidResponse(format!("openai response: {e}")))?;
        let content = out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

impl FallbackParser for LlmFallback {
    fn fallback_parse<'a>(
        &'a self,
        raw_text: &'a str,
    ) -> BoxFuture<'a, Result<FallbackOutput, FallbackError>> {
        Box::pin(async move {
            debug!(provider = %self.provider, model = %self.model, bytes = raw_text.len(), "fallback request");
            let reply = self.complete(raw_text).await?;
            parse_reply(&reply)
        })
    }
}

/// Drop a surrounding Markdown code fence (```` ```json ... ``` ````).
pub fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (`json`) up to the first newline.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_reply(reply: &str) -> Result<FallbackOutput, FallbackError> {
    let json = strip_fences(reply);
    if json.is_empty() {
        return Err(FallbackError::InvalidResponse("empty reply".to_string()));
    }
    serde_json::from_str(json).map_err(|e| FallbackError::InvalidResponse(e.to_string()))
}
