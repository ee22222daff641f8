// Generation Back Ends
// Paraphrase services behind one async trait; the bundled one speaks chat completions

use super::error::BackendError;
use crate::models::GenerationRequest;
use crate::services::config_store::BackendConfig;
use crate::services::providers::{get_api_key, ProviderClient, ProviderKind, Sampling};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Opaque text-to-text service. Implementations must be safe to call concurrently.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, BackendError>;
}

const PARAPHRASE_SYSTEM_PROMPT: &str = r#"You rewrite text so it reads as if a person wrote it.
Keep the meaning, facts and names. Vary sentence length and rhythm, prefer plain words,
avoid stock phrases such as "delve", "furthermore", "in today's landscape".
Reply with JSON only: {"paraphrases": ["...", "..."]}"#;

#[derive(Debug, Deserialize)]
struct ParaphraseReply {
    #[serde(default)]
    paraphrases: Vec<String>,
}

/// Extract JSON from response content
fn extract_json(content: &str) -> Result<&str, String> {
    let content = content.trim();
    if content.starts_with('{') {
        Ok(content)
    } else if let Some(start) = content.find('{') {
        match content.rfind('}') {
            Some(end) if end > start => Ok(&content[start..=end]),
            _ => Err("Invalid JSON response".to_string()),
        }
    } else {
        Err("No JSON in response".to_string())
    }
}

/// Parse the `{"paraphrases": [...]}` reply, dropping blank entries
pub fn parse_paraphrases(content: &str, limit: usize) -> Result<Vec<String>, BackendError> {
    let json = extract_json(content).map_err(BackendError::Malformed)?;
    let reply: ParaphraseReply =
        serde_json::from_str(json).map_err(|e| BackendError::Malformed(e.to_string()))?;

    let outputs: Vec<String> = reply
        .paraphrases
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .take(limit.max(1))
        .collect();

    if outputs.is_empty() {
        return Err(BackendError::EmptyOutput);
    }
    Ok(outputs)
}

fn build_user_prompt(request: &GenerationRequest) -> String {
    format!(
        "Write {} distinct paraphrases of the text below and return them as JSON.\n\n{}",
        request.params.num_sequences.max(1),
        request.source_text
    )
}

fn build_system_prompt(request: &GenerationRequest) -> String {
    match &request.style {
        Some(style) => format!(
            "{}\nTarget style ({}): {}",
            PARAPHRASE_SYSTEM_PROMPT,
            style.category.as_str(),
            style.instruction
        ),
        None => PARAPHRASE_SYSTEM_PROMPT.to_string(),
    }
}

/// Paraphrase back end over a chat-completion provider
pub struct ChatParaphraseBackend {
    id: String,
    kind: ProviderKind,
    model: String,
    base_url: Option<String>,
    api_key: String,
    client: Arc<ProviderClient>,
}

impl ChatParaphraseBackend {
    pub fn new(config: &BackendConfig, api_key: String, client: Arc<ProviderClient>) -> Result<Self, String> {
        let kind = ProviderKind::parse(&config.provider).map_err(|e| e.to_string())?;
        Ok(Self {
            id: config.id.clone(),
            kind,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            api_key,
            client,
        })
    }

    /// Build every configured back end that has an API key, in configuration order
    pub fn from_configs(
        configs: &[BackendConfig],
        stored_keys: &std::collections::HashMap<String, String>,
        client: Arc<ProviderClient>,
    ) -> Vec<Arc<dyn GenerationBackend>> {
        let mut backends: Vec<Arc<dyn GenerationBackend>> = Vec::new();
        for config in configs {
            let key = get_api_key(&config.provider).or_else(|| stored_keys.get(&config.provider).cloned());
            let Some(key) = key else {
                warn!("[BACKENDS] {} skipped: no API key for provider {}", config.id, config.provider);
                continue;
            };
            match Self::new(config, key, Arc::clone(&client)) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => warn!("[BACKENDS] {} skipped: {}", config.id, e),
            }
        }
        info!("[BACKENDS] {} of {} configured back ends available", backends.len(), configs.len());
        backends
    }
}

#[async_trait]
impl GenerationBackend for ChatParaphraseBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, BackendError> {
        let sampling = Sampling {
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            top_k: Some(request.params.top_k),
        };
        let words = request.source_text.split_whitespace().count();
        let max_tokens = ((words * 2 * request.params.num_sequences.max(1)) as i32 + 256).clamp(512, 4096);

        let result = self
            .client
            .call(
                self.kind,
                self.base_url.as_deref(),
                &self.model,
                &self.api_key,
                &build_system_prompt(request),
                &build_user_prompt(request),
                max_tokens,
                &sampling,
            )
            .await
            .map_err(|e| BackendError::Provider(e.to_string()))?;

        info!(
            "[BACKENDS] {} model={} latency_ms={}",
            self.id, self.model, result.latency_ms
        );
        parse_paraphrases(&result.content, request.params.num_sequences)
    }
}
