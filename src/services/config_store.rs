// Configuration Storage Service
// Handles config file read/write, version backup and humanizer tuning defaults

use crate::models::{Mode, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub default_strategy: Strategy,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub humanizer: HumanizerConfig,
    /// Ordered by priority; the first entry wins selection ties.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            default_strategy: Strategy::Adaptive,
            proxy: None,
            humanizer: HumanizerConfig::default(),
            backends: default_backends(),
            api_keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub id: String,
    /// Provider kind: glm, deepseek, openai, anthropic
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

// ============ Humanizer Tuning ============

/// Composite score weights. All eight must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositeWeights {
    pub perplexity: f64,
    pub burstiness: f64,
    pub bigram_entropy: f64,
    pub trigram_entropy: f64,
    pub pos_entropy: f64,
    pub type_token_ratio: f64,
    pub coherence: f64,
    pub repetition: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            perplexity: 0.22,
            burstiness: 0.20,
            bigram_entropy: 0.12,
            trigram_entropy: 0.10,
            pos_entropy: 0.10,
            type_token_ratio: 0.10,
            coherence: 0.08,
            repetition: 0.08,
        }
    }
}

impl CompositeWeights {
    pub fn total(&self) -> f64 {
        self.perplexity
            + self.burstiness
            + self.bigram_entropy
            + self.trigram_entropy
            + self.pos_entropy
            + self.type_token_ratio
            + self.coherence
            + self.repetition
    }
}

/// Lower bounds of each resistance label above LOW
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResistanceThresholds {
    pub very_high: f64,
    pub high: f64,
    pub medium_high: f64,
    pub medium: f64,
}

impl Default for ResistanceThresholds {
    fn default() -> Self {
        Self {
            very_high: 85.0,
            high: 70.0,
            medium_high: 55.0,
            medium: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub variations: usize,
}

impl StrategyParams {
    fn new(temperature: f64, top_k: u32, top_p: f64, variations: usize) -> Self {
        Self { temperature, top_k, top_p, variations }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyTable {
    pub weighted: StrategyParams,
    pub diverse: StrategyParams,
    pub mixed: StrategyParams,
    pub best: StrategyParams,
    pub cascade: StrategyParams,
    pub style_transfer: StrategyParams,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            weighted: StrategyParams::new(1.5, 120, 0.95, 3),
            diverse: StrategyParams::new(1.9, 180, 0.98, 4),
            mixed: StrategyParams::new(1.7, 150, 0.97, 3),
            best: StrategyParams::new(1.3, 100, 0.93, 3),
            cascade: StrategyParams::new(1.6, 150, 0.96, 2),
            style_transfer: StrategyParams::new(1.4, 120, 0.95, 2),
        }
    }
}

impl StrategyTable {
    /// Parameters for a resolved strategy. `Adaptive` never reaches the table and maps to cascade.
    pub fn get(&self, strategy: Strategy) -> &StrategyParams {
        match strategy {
            Strategy::Weighted => &self.weighted,
            Strategy::Diverse => &self.diverse,
            Strategy::Mixed => &self.mixed,
            Strategy::Best => &self.best,
            Strategy::Cascade | Strategy::Adaptive => &self.cascade,
            Strategy::StyleTransfer => &self.style_transfer,
        }
    }
}

/// Adaptive decision thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveRules {
    pub low_diversity: f64,
    pub diverse_temperature_boost: f64,
    pub long_sentence: f64,
}

impl Default for AdaptiveRules {
    fn default() -> Self {
        Self {
            low_diversity: 0.5,
            diverse_temperature_boost: 0.3,
            long_sentence: 25.0,
        }
    }
}

/// Refinement budget and parameter aggressiveness for one mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModeProfile {
    pub max_iterations: u32,
    pub temperature_boost: f64,
    pub temperature_cap: f64,
    pub top_k_boost: u32,
    pub top_k_cap: u32,
    pub top_p_floor: f64,
    pub min_variations: usize,
    pub pre_passes: usize,
    pub post_passes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModeProfiles {
    pub standard: ModeProfile,
    pub ultra: ModeProfile,
}

impl Default for ModeProfiles {
    fn default() -> Self {
        Self {
            standard: ModeProfile {
                max_iterations: 3,
                temperature_boost: 0.0,
                temperature_cap: 2.5,
                top_k_boost: 0,
                top_k_cap: 250,
                top_p_floor: 0.0,
                min_variations: 0,
                pre_passes: 1,
                post_passes: 0,
            },
            ultra: ModeProfile {
                max_iterations: 5,
                temperature_boost: 0.5,
                temperature_cap: 2.5,
                top_k_boost: 50,
                top_k_cap: 250,
                top_p_floor: 0.995,
                min_variations: 5,
                pre_passes: 3,
                post_passes: 2,
            },
        }
    }
}

impl ModeProfiles {
    pub fn get(&self, mode: Mode) -> &ModeProfile {
        match mode {
            Mode::Standard => &self.standard,
            Mode::Ultra => &self.ultra,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HumanizerConfig {
    #[serde(default)]
    pub weights: CompositeWeights,
    #[serde(default)]
    pub resistance: ResistanceThresholds,
    #[serde(default = "default_target_score")]
    pub target_score: f64,
    #[serde(default = "default_tolerance")]
    pub improvement_tolerance: f64,
    /// Non-improving rounds (after the first) tolerated before stopping early
    #[serde(default = "default_early_stop_streak")]
    pub early_stop_streak: u32,
    #[serde(default = "default_diverse_tolerance")]
    pub diverse_tolerance: f64,
    #[serde(default = "default_diversity_floor")]
    pub diversity_floor: usize,
    #[serde(default = "default_min_length_ratio")]
    pub min_length_ratio: f64,
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub strategies: StrategyTable,
    #[serde(default)]
    pub adaptive: AdaptiveRules,
    #[serde(default)]
    pub modes: ModeProfiles,
}

impl Default for HumanizerConfig {
    fn default() -> Self {
        Self {
            weights: CompositeWeights::default(),
            resistance: ResistanceThresholds::default(),
            target_score: default_target_score(),
            improvement_tolerance: default_tolerance(),
            early_stop_streak: default_early_stop_streak(),
            diverse_tolerance: default_diverse_tolerance(),
            diversity_floor: default_diversity_floor(),
            min_length_ratio: default_min_length_ratio(),
            backend_timeout_secs: default_backend_timeout(),
            max_input_chars: default_max_input_chars(),
            cache_capacity: default_cache_capacity(),
            strategies: StrategyTable::default(),
            adaptive: AdaptiveRules::default(),
            modes: ModeProfiles::default(),
        }
    }
}

impl HumanizerConfig {
    /// Reject weight sets that do not sum to 1 and cut points that are not strictly descending
    pub fn validate(&self) -> Result<(), String> {
        let total = self.weights.total();
        if (total - 1.0).abs() > 1e-6 {
            return Err(format!("Composite weights must sum to 1.0, got {:.4}", total));
        }

        let r = &self.resistance;
        let descending = r.very_high > r.high && r.high > r.medium_high && r.medium_high > r.medium;
        if !descending || r.medium < 0.0 || r.very_high > 100.0 {
            return Err("Resistance thresholds must be strictly descending within [0, 100]".to_string());
        }

        if !(0.0..=100.0).contains(&self.target_score) {
            return Err(format!("Target score {} is outside [0, 100]", self.target_score));
        }
        if self.improvement_tolerance < 0.0 || self.diverse_tolerance < 0.0 {
            return Err("Tolerances must not be negative".to_string());
        }
        if self.modes.standard.max_iterations == 0 || self.modes.ultra.max_iterations == 0 {
            return Err("Mode iteration budgets must be at least 1".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("Metrics cache capacity must be at least 1".to_string());
        }

        Ok(())
    }
}

fn default_version() -> String { "1.0.0".to_string() }
fn default_target_score() -> f64 { 85.0 }
fn default_tolerance() -> f64 { 0.5 }
fn default_early_stop_streak() -> u32 { 1 }
fn default_diverse_tolerance() -> f64 { 5.0 }
fn default_diversity_floor() -> usize { 2 }
fn default_min_length_ratio() -> f64 { 0.5 }
fn default_backend_timeout() -> u64 { 60 }
fn default_max_input_chars() -> usize { 10_000 }
fn default_cache_capacity() -> usize { 1000 }

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            id: "deepseek".to_string(),
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
        },
        BackendConfig {
            id: "glm".to_string(),
            provider: "glm".to_string(),
            model: "glm-4-flash".to_string(),
            base_url: None,
        },
    ]
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("humanizeAI"))
    }

    pub fn ensure_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))
    }

    /// Load configuration from file, falling back to defaults when absent
    pub fn load(&self) -> Result<AppConfig, String> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;

        config.humanizer.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        config.humanizer.validate()?;
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_file, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }

    fn create_backup(&self) -> Result<(), String> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        self.cleanup_old_backups(&backup_dir, 10)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), String> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| format!("Failed to read backup dir: {}", e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Timestamped names sort chronologically
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, String> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    pub fn delete_api_key(&self, provider: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.humanizer.target_score, 85.0);
        assert_eq!(config.humanizer.cache_capacity, 1000);
        assert_eq!(config.default_strategy, Strategy::Adaptive);
        assert!(config.humanizer.validate().is_ok());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = CompositeWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = HumanizerConfig::default();
        config.weights.perplexity = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_thresholds() {
        let mut config = HumanizerConfig::default();
        config.resistance.high = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"humanizer":{"targetScore":80.0}}"#).unwrap();
        assert_eq!(parsed.humanizer.target_score, 80.0);
        assert_eq!(parsed.humanizer.improvement_tolerance, 0.5);
        assert_eq!(parsed.backends.len(), 2);
        assert_eq!(parsed.humanizer.strategies.diverse.top_k, 180);
    }

    #[test]
    fn test_save_load_and_backups() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());

        store.set_api_key("glm", "key-1").unwrap();
        store.set_api_key("deepseek", "key-2").unwrap();
        assert_eq!(store.get_api_key("glm").unwrap().as_deref(), Some("key-1"));

        store.delete_api_key("glm").unwrap();
        assert_eq!(store.get_api_key("glm").unwrap(), None);

        let backups = fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert!(backups >= 1 && backups <= 10);
    }
}
