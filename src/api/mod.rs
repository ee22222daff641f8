// HumanizeAI Command Layer
// Thin command handlers over the engine and the configuration store

use crate::models::{AnalysisReport, BatchItem, ComparisonReport, HumanizeRequest, HumanizeResponse};
use crate::services::config_store::{AppConfig, ConfigStore};
use crate::services::providers::ProviderClient;
use crate::services::{ChatParaphraseBackend, HumanizeEngine, LocalEntropyOracle};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const MAX_BATCH_SIZE: usize = 10;

/// Shared state for every command. The engine is rebuilt when the configuration is saved.
pub struct AppState {
    engine: RwLock<Arc<HumanizeEngine>>,
    store: ConfigStore,
}

impl AppState {
    pub fn new(store: ConfigStore) -> Result<Self, String> {
        let config = store.load()?;
        let engine = build_engine(&config)?;
        Ok(Self::with_engine(Arc::new(engine), store))
    }

    pub fn with_engine(engine: Arc<HumanizeEngine>, store: ConfigStore) -> Self {
        Self {
            engine: RwLock::new(engine),
            store,
        }
    }

    /// State backed by the platform config directory
    pub fn from_default_location() -> Result<Self, String> {
        let dir = ConfigStore::default_config_dir()
            .ok_or_else(|| "Could not determine config directory".to_string())?;
        Self::new(ConfigStore::new(dir))
    }

    pub fn engine(&self) -> Result<Arc<HumanizeEngine>, String> {
        self.engine
            .read()
            .map(|e| Arc::clone(&*e))
            .map_err(|_| "Engine lock poisoned".to_string())
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }
}

/// Wire configured back ends, the local oracle and the tuning block into an engine
pub fn build_engine(config: &AppConfig) -> Result<HumanizeEngine, String> {
    let proxy_url = config
        .proxy
        .as_ref()
        .filter(|p| p.enabled)
        .and_then(|p| p.https.clone().or_else(|| p.http.clone()))
        .filter(|u| !u.trim().is_empty());

    let client = match proxy_url {
        Some(url) => {
            info!("[API] using proxy {}", url);
            ProviderClient::with_proxy(&url).map_err(|e| e.to_string())?
        }
        None => ProviderClient::new(),
    };

    let backends = ChatParaphraseBackend::from_configs(&config.backends, &config.api_keys, Arc::new(client));
    if backends.is_empty() {
        warn!("[API] no generation back end has an API key; humanize requests will fail");
    }

    HumanizeEngine::new(config.humanizer.clone(), Arc::new(LocalEntropyOracle::new()), backends)
        .map_err(|e| e.to_string())
}

pub async fn humanize_text(
    state: &AppState,
    request: HumanizeRequest,
    cancel: &CancellationToken,
) -> Result<HumanizeResponse, String> {
    let engine = state.engine()?;
    engine.humanize(&request, cancel).await.map_err(|e| e.to_string())
}

/// Humanize up to `MAX_BATCH_SIZE` texts one after another; failures are reported per item
pub async fn humanize_batch(
    state: &AppState,
    requests: Vec<HumanizeRequest>,
    cancel: &CancellationToken,
) -> Result<Vec<BatchItem>, String> {
    if requests.is_empty() {
        return Err("Batch is empty".to_string());
    }
    if requests.len() > MAX_BATCH_SIZE {
        return Err(format!(
            "Batch too large: {} texts (max {})",
            requests.len(),
            MAX_BATCH_SIZE
        ));
    }

    let engine = state.engine()?;
    let mut items = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        if cancel.is_cancelled() {
            items.push(BatchItem {
                index,
                response: None,
                error: Some("Request cancelled".to_string()),
            });
            continue;
        }
        let item = match engine.humanize(request, cancel).await {
            Ok(response) => BatchItem { index, response: Some(response), error: None },
            Err(e) => {
                warn!("[API] batch item {} failed: {}", index, e);
                BatchItem { index, response: None, error: Some(e.to_string()) }
            }
        };
        items.push(item);
    }

    info!(
        "[API] batch finished: {} of {} succeeded",
        items.iter().filter(|i| i.response.is_some()).count(),
        items.len()
    );
    Ok(items)
}

pub fn analyze_text(state: &AppState, text: &str) -> Result<AnalysisReport, String> {
    state.engine()?.analyze(text).map_err(|e| e.to_string())
}

pub fn compare_texts(state: &AppState, original: &str, rewritten: &str) -> Result<ComparisonReport, String> {
    state
        .engine()?
        .compare(original, rewritten)
        .map_err(|e| e.to_string())
}

pub fn get_config(state: &AppState) -> Result<AppConfig, String> {
    state.store.load()
}

fn swap_engine(state: &AppState, engine: HumanizeEngine) -> Result<(), String> {
    let mut guard = state
        .engine
        .write()
        .map_err(|_| "Engine lock poisoned".to_string())?;
    *guard = Arc::new(engine);
    Ok(())
}

/// Rebuild the engine from the stored configuration so key changes reach the back ends
fn reload_engine(state: &AppState) -> Result<(), String> {
    let config = state.store.load()?;
    swap_engine(state, build_engine(&config)?)
}

/// Persist the configuration and swap in an engine built from it
pub fn save_config(state: &AppState, config: AppConfig) -> Result<(), String> {
    let engine = build_engine(&config)?;
    state.store.save(&config)?;
    swap_engine(state, engine)?;
    info!("[API] configuration saved; engine rebuilt");
    Ok(())
}

pub fn store_api_key(state: &AppState, provider: String, key: String) -> Result<(), String> {
    state.store.set_api_key(&provider, &key)?;
    reload_engine(state)?;
    info!("[API] API key stored for {}; engine rebuilt", provider);
    Ok(())
}

pub fn get_api_key(state: &AppState, provider: String) -> Result<Option<String>, String> {
    state.store.get_api_key(&provider)
}

pub fn delete_api_key(state: &AppState, provider: String) -> Result<(), String> {
    state.store.delete_api_key(&provider)?;
    reload_engine(state)?;
    info!("[API] API key removed for {}; engine rebuilt", provider);
    Ok(())
}
