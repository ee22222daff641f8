// Strategy Selector
// Maps a text profile and requested strategy to generation parameters

use super::error::HumanizeError;
use crate::models::{
    GenerationParams, SentenceLength, Strategy, StrategyPlan, StyleTemplate, TextCategory, TextProfile,
};
use crate::services::config_store::{AdaptiveRules, ModeProfile, StrategyTable};

/// One row of the adaptive decision table
struct AdaptiveRow {
    name: &'static str,
    applies: fn(&TextProfile, &AdaptiveRules) -> bool,
    strategy: Strategy,
    boost_temperature: bool,
    style: Option<TextCategory>,
}

/// First matching row wins; the last row always matches
const ADAPTIVE_TABLE: &[AdaptiveRow] = &[
    AdaptiveRow {
        name: "low_diversity",
        applies: |p, r| p.vocabulary_diversity < r.low_diversity,
        strategy: Strategy::Diverse,
        boost_temperature: true,
        style: None,
    },
    AdaptiveRow {
        name: "long_sentences",
        applies: |p, r| p.avg_sentence_length > r.long_sentence,
        strategy: Strategy::StyleTransfer,
        boost_temperature: false,
        style: Some(TextCategory::Creative),
    },
    AdaptiveRow {
        name: "default_cascade",
        applies: |_, _| true,
        strategy: Strategy::Cascade,
        boost_temperature: false,
        style: None,
    },
];

pub fn style_template(category: TextCategory) -> StyleTemplate {
    let (formality, sentence_length, complexity, instruction, temperature_bias) = match category {
        TextCategory::Academic => (
            0.9,
            SentenceLength::Long,
            "high",
            "Formal register, precise vocabulary, no contractions, well-developed sentences.",
            -0.1,
        ),
        TextCategory::Casual => (
            0.3,
            SentenceLength::Short,
            "low",
            "Conversational tone, contractions welcome, short punchy sentences.",
            0.2,
        ),
        TextCategory::Professional => (
            0.7,
            SentenceLength::Medium,
            "medium",
            "Clear business tone, direct statements, moderate sentence length.",
            0.0,
        ),
        TextCategory::Creative => (
            0.4,
            SentenceLength::Varied,
            "medium",
            "Vivid wording, mix very short sentences with longer flowing ones.",
            0.15,
        ),
    };

    StyleTemplate {
        category,
        formality,
        sentence_length,
        complexity: complexity.to_string(),
        instruction: instruction.to_string(),
        temperature_bias,
    }
}

pub struct StrategySelector {
    table: StrategyTable,
    rules: AdaptiveRules,
}

impl StrategySelector {
    pub fn new(table: StrategyTable, rules: AdaptiveRules) -> Self {
        Self { table, rules }
    }

    /// Resolve a requested strategy; `Adaptive` goes through the decision table
    pub fn resolve(&self, profile: &TextProfile, requested: Strategy) -> StrategyPlan {
        let (strategy, boost, style, rule) = if requested == Strategy::Adaptive {
            let row = ADAPTIVE_TABLE
                .iter()
                .find(|row| (row.applies)(profile, &self.rules))
                .unwrap_or(&ADAPTIVE_TABLE[ADAPTIVE_TABLE.len() - 1]);
            (row.strategy, row.boost_temperature, row.style, row.name.to_string())
        } else {
            let style = (requested == Strategy::StyleTransfer).then_some(profile.category);
            (requested, false, style, format!("explicit_{}", requested.as_str()))
        };

        let entry = self.table.get(strategy);
        let temperature = if boost {
            entry.temperature + self.rules.diverse_temperature_boost
        } else {
            entry.temperature
        };

        StrategyPlan {
            requested,
            strategy,
            params: GenerationParams {
                temperature,
                top_k: entry.top_k,
                top_p: entry.top_p,
                num_sequences: entry.variations,
            },
            style,
            rule,
        }
    }

    /// Resolve and then apply mode aggressiveness and the caller's variation cap
    pub fn plan(
        &self,
        profile: &TextProfile,
        requested: Strategy,
        mode: &ModeProfile,
        max_variations: usize,
    ) -> Result<StrategyPlan, HumanizeError> {
        if max_variations == 0 {
            return Err(HumanizeError::InputError("max_variations must be at least 1".to_string()));
        }
        let mut plan = self.resolve(profile, requested);
        plan.params = apply_mode(&plan.params, mode, max_variations);
        Ok(plan)
    }
}

pub fn apply_mode(params: &GenerationParams, mode: &ModeProfile, max_variations: usize) -> GenerationParams {
    let temperature = (params.temperature + mode.temperature_boost).min(mode.temperature_cap.max(params.temperature));
    let top_k = (params.top_k + mode.top_k_boost).min(mode.top_k_cap.max(params.top_k));
    let variations = params.num_sequences.max(mode.min_variations);

    GenerationParams {
        temperature,
        top_k,
        top_p: params.top_p.max(mode.top_p_floor).min(1.0),
        num_sequences: variations.min(max_variations).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_store::ModeProfiles;

    fn selector() -> StrategySelector {
        StrategySelector::new(StrategyTable::default(), AdaptiveRules::default())
    }

    fn profile(category: TextCategory, diversity: f64, avg_sentence: f64) -> TextProfile {
        TextProfile {
            word_count: 120,
            avg_word_length: 5.0,
            sentence_count: 6,
            avg_sentence_length: avg_sentence,
            vocabulary_diversity: diversity,
            category,
        }
    }

    #[test]
    fn test_adaptive_is_total() {
        let selector = selector();
        for category in TextCategory::ALL {
            for diversity in [0.0, 0.3, 0.49, 0.5, 0.51, 0.8, 1.0] {
                for avg in [1.0, 10.0, 24.9, 25.0, 25.1, 40.0, 200.0] {
                    let plan = selector.resolve(&profile(category, diversity, avg), Strategy::Adaptive);
                    assert!(Strategy::RESOLVED.contains(&plan.strategy), "unresolved for {:?}", plan);
                }
            }
        }
    }

    #[test]
    fn test_adaptive_rows() {
        let selector = selector();

        let plan = selector.resolve(&profile(TextCategory::Casual, 0.3, 30.0), Strategy::Adaptive);
        assert_eq!(plan.strategy, Strategy::Diverse);
        assert!((plan.params.temperature - 2.2).abs() < 1e-9);

        let plan = selector.resolve(&profile(TextCategory::Academic, 0.7, 30.0), Strategy::Adaptive);
        assert_eq!(plan.strategy, Strategy::StyleTransfer);
        assert_eq!(plan.style, Some(TextCategory::Creative));

        let plan = selector.resolve(&profile(TextCategory::Academic, 0.7, 12.0), Strategy::Adaptive);
        assert_eq!(plan.strategy, Strategy::Cascade);
        assert_eq!(plan.rule, "default_cascade");
    }

    #[test]
    fn test_explicit_strategy_uses_table() {
        let plan = selector().resolve(&profile(TextCategory::Casual, 0.3, 30.0), Strategy::Best);
        assert_eq!(plan.strategy, Strategy::Best);
        assert_eq!(plan.params.top_k, 100);
        assert_eq!(plan.params.num_sequences, 3);
        assert_eq!(plan.style, None);

        let plan = selector().resolve(&profile(TextCategory::Professional, 0.7, 12.0), Strategy::StyleTransfer);
        assert_eq!(plan.style, Some(TextCategory::Professional));
    }

    #[test]
    fn test_ultra_mode_boosts_and_caps() {
        let modes = ModeProfiles::default();
        let plan = selector()
            .plan(&profile(TextCategory::Casual, 0.3, 30.0), Strategy::Diverse, &modes.ultra, 10)
            .unwrap();
        assert!((plan.params.temperature - 2.4).abs() < 1e-9);
        assert_eq!(plan.params.top_k, 230);
        assert_eq!(plan.params.top_p, 0.995);
        assert_eq!(plan.params.num_sequences, 5);

        let capped = apply_mode(
            &GenerationParams { temperature: 2.3, top_k: 240, top_p: 0.9, num_sequences: 2 },
            &modes.ultra,
            3,
        );
        assert_eq!(capped.temperature, 2.5);
        assert_eq!(capped.top_k, 250);
        assert_eq!(capped.num_sequences, 3);
    }

    #[test]
    fn test_zero_variations_rejected() {
        let modes = ModeProfiles::default();
        let result = selector().plan(&profile(TextCategory::Casual, 0.3, 30.0), Strategy::Best, &modes.standard, 0);
        assert!(matches!(result, Err(HumanizeError::InputError(_))));
    }

    #[test]
    fn test_style_templates() {
        assert_eq!(style_template(TextCategory::Academic).formality, 0.9);
        assert_eq!(style_template(TextCategory::Creative).sentence_length, SentenceLength::Varied);
    }
}
