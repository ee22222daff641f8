// AI Provider Service
// Chat-completion calls against GLM, DeepSeek, OpenAI-compatible and Anthropic endpoints

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;

const GLM_DEFAULT_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
const DEEPSEEK_DEFAULT_URL: &str = "https://api.deepseek.com/chat/completions";
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";

const HTTP_TIMEOUT_SECS: u64 = 80;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Glm,
    Deepseek,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Result<Self, ProviderError> {
        match name.trim().to_lowercase().as_str() {
            "glm" | "zhipu" => Ok(Self::Glm),
            "deepseek" => Ok(Self::Deepseek),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Glm => "glm",
            Self::Deepseek => "deepseek",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Highest temperature the endpoint accepts
    fn max_temperature(self) -> f64 {
        match self {
            Self::Anthropic | Self::Glm => 1.0,
            Self::Deepseek | Self::OpenAi => 2.0,
        }
    }

    fn supports_top_k(self) -> bool {
        matches!(self, Self::Anthropic)
    }
}

/// Sampling parameters forwarded to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct Sampling {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: Option<u32>,
}

impl Default for Sampling {
    fn default() -> Self {
        Self { temperature: 0.0, top_p: 1.0, top_k: None }
    }
}

impl Sampling {
    /// Clamp to what the provider accepts, dropping top-k where unsupported
    pub fn for_provider(&self, kind: ProviderKind) -> Sampling {
        Sampling {
            temperature: self.temperature.clamp(0.0, kind.max_temperature()),
            top_p: self.top_p.clamp(0.0, 1.0),
            top_k: if kind.supports_top_k() { self.top_k } else { None },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: i32,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

pub struct ProviderClient {
    client: Client,
    glm_url: String,
    deepseek_url: String,
    openai_url: String,
    anthropic_url: String,
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

fn env_url(var: &str, fallback: &str) -> String {
    env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn json_object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("json object regex"))
}

impl ProviderClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    pub fn with_proxy(proxy_url: &str) -> Result<Self, ProviderError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .proxy(proxy)
            .build()?;
        Ok(Self::with_client(client))
    }

    fn with_client(client: Client) -> Self {
        Self {
            client,
            glm_url: env_url("GLM_API_URL", GLM_DEFAULT_URL),
            deepseek_url: env_url("DEEPSEEK_API_URL", DEEPSEEK_DEFAULT_URL),
            openai_url: env_url("OPENAI_API_URL", OPENAI_DEFAULT_URL),
            anthropic_url: env_url("ANTHROPIC_API_URL", ANTHROPIC_DEFAULT_URL),
        }
    }

    fn url_for<'a>(&'a self, kind: ProviderKind, custom_url: Option<&'a str>) -> &'a str {
        if let Some(url) = custom_url.filter(|u| !u.trim().is_empty()) {
            return url;
        }
        match kind {
            ProviderKind::Glm => &self.glm_url,
            ProviderKind::Deepseek => &self.deepseek_url,
            ProviderKind::OpenAi => &self.openai_url,
            ProviderKind::Anthropic => &self.anthropic_url,
        }
    }

    /// Send one system+user exchange and return the reply text.
    /// The prompt is expected to ask for JSON; chat endpoints get `json_object` response format.
    pub async fn call(
        &self,
        kind: ProviderKind,
        custom_url: Option<&str>,
        model: &str,
        api_key: &str,
        system: &str,
        user: &str,
        max_tokens: i32,
        sampling: &Sampling,
    ) -> Result<ChatResult, ProviderError> {
        let url = self.url_for(kind, custom_url);
        let sampling = sampling.for_provider(kind);
        match kind {
            ProviderKind::Anthropic => {
                self.call_anthropic_api(url, model, api_key, system, user, max_tokens, &sampling)
                    .await
            }
            _ => {
                self.call_chat_api(url, model, api_key, system, user, max_tokens, &sampling)
                    .await
            }
        }
    }

    async fn call_anthropic_api(
        &self,
        url: &str,
        model: &str,
        api_key: &str,
        system: &str,
        user: &str,
        max_tokens: i32,
        sampling: &Sampling,
    ) -> Result<ChatResult, ProviderError> {
        #[derive(Serialize)]
        struct AnthropicRequest {
            model: String,
            max_tokens: i32,
            #[serde(skip_serializing_if = "String::is_empty")]
            system: String,
            messages: Vec<ChatMessage>,
            temperature: f64,
            top_p: f64,
            #[serde(skip_serializing_if = "Option::is_none")]
            top_k: Option<u32>,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Option<Vec<AnthropicContent>>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            text: Option<String>,
        }

        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens,
            system: system.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            }],
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            top_k: sampling.top_k,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .content
            .and_then(|c| c.into_iter().find_map(|c| c.text))
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }

    async fn call_chat_api(
        &self,
        url: &str,
        model: &str,
        api_key: &str,
        system: &str,
        user: &str,
        max_tokens: i32,
        sampling: &Sampling,
    ) -> Result<ChatResult, ProviderError> {
        let request = build_chat_request(model, system, user, max_tokens, sampling);

        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = extract_chat_content(data).ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }
}

fn build_chat_request(
    model: &str,
    system: &str,
    user: &str,
    max_tokens: i32,
    sampling: &Sampling,
) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ],
        max_tokens,
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        response_format: Some(ResponseFormat {
            r#type: "json_object".to_string(),
        }),
    }
}

/// Message content, or the JSON object embedded in reasoning output when content is empty
fn extract_chat_content(data: ChatResponse) -> Option<String> {
    let message = data
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message);

    let (content, reasoning) = match message {
        Some(m) => (m.content, m.reasoning_content.or(data.reasoning_content)),
        None => (None, data.reasoning_content),
    };

    content.filter(|c| !c.trim().is_empty()).or_else(|| {
        reasoning.and_then(|r| json_object_regex().find(&r).map(|m| m.as_str().to_string()))
    })
}

/// Get API key from environment or config file
pub fn get_api_key(provider: &str) -> Option<String> {
    let env_keys: &[&str] = match provider {
        "glm" => &["GLM_API_KEY", "HUMANIZEAI_GLM_API_KEY"],
        "deepseek" => &["DEEPSEEK_API_KEY", "HUMANIZEAI_DEEPSEEK_API_KEY"],
        "anthropic" | "claude" => &["ANTHROPIC_API_KEY", "HUMANIZEAI_ANTHROPIC_API_KEY"],
        "openai" => &["OPENAI_API_KEY", "HUMANIZEAI_OPENAI_API_KEY"],
        _ => &[],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    if let Some(config_dir) = super::ConfigStore::default_config_dir() {
        let store = super::ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(provider) {
            return Some(key);
        }
    }

    None
}
