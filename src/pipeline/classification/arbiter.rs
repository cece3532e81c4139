use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::keywords::KeywordTable;
use super::model::{DocumentModel, ModelError};
use crate::models::{CategoryLabel, DecisionSource};
use crate::pipeline::extraction::clean_text;

/// Decision thresholds. Defaults reproduce the production policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Keyword hits needed before rules may short-circuit the model.
    pub min_rule_hits: u32,
    /// Rule confidence at or above this short-circuits.
    pub rule_short_circuit: f64,
    /// Ceiling on rule confidence.
    pub rule_confidence_cap: f64,
    /// Model confidence strictly above this overrides the rules.
    pub model_override: f64,
    /// Confidence assigned to models without probabilities.
    pub model_default_confidence: f64,
    /// Floor when model and rules agree.
    pub corroboration_floor: f64,
    /// Ceiling on rule confidence once the model had its say.
    pub rules_fallback_cap: f64,
    pub no_evidence_confidence: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            min_rule_hits: 2,
            rule_short_circuit: 0.5,
            rule_confidence_cap: 0.95,
            model_override: 0.80,
            model_default_confidence: 0.85,
            corroboration_floor: 0.70,
            rules_fallback_cap: 0.80,
            no_evidence_confidence: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: CategoryLabel,
    /// Always within [0, 1].
    pub confidence: f64,
    pub source: DecisionSource,
}

impl ClassificationResult {
    fn new(category: CategoryLabel, confidence: f64, source: DecisionSource) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            category,
            confidence,
            source,
        }
    }
}

/// Combines keyword evidence with an optional learned model.
///
/// Strong keyword evidence wins outright. Otherwise a confident model wins,
/// a hesitant model can still corroborate the rules, and weak rules are the
/// last resort before `AUTRE`.
pub struct ClassificationArbiter {
    keywords: KeywordTable,
    model: Option<Box<dyn DocumentModel>>,
    config: ArbiterConfig,
}

impl ClassificationArbiter {
    pub fn new(
        keywords: KeywordTable,
        model: Option<Box<dyn DocumentModel>>,
        config: ArbiterConfig,
    ) -> Self {
        Self {
            keywords,
            model,
            config,
        }
    }

    /// Default keyword table, no model, default thresholds.
    pub fn rules_only() -> Self {
        Self::new(KeywordTable::default(), None, ArbiterConfig::default())
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Classify raw text. Never fails.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let clean = clean_text(text);
        let scores = self.keywords.score(&clean);
        let (best_rule, best_score) = scores.best();
        let total_hits = scores.total();
        let rule_ratio = if total_hits > 0 {
            best_score as f64 / total_hits as f64
        } else {
            0.0
        };

        debug!(
            best_rule = best_rule.as_str(),
            best_score, total_hits, "Keyword scores computed"
        );

        // Strong keyword evidence.
        if total_hits >= self.config.min_rule_hits {
            let confidence = rule_ratio.min(self.config.rule_confidence_cap);
            if confidence >= self.config.rule_short_circuit {
                return self.decide(best_rule, confidence, DecisionSource::Rules);
            }
        }

        // Learned model.
        if let Some(model) = &self.model {
            if !clean.is_empty() {
                match self.consult(model.as_ref(), &clean) {
                    Ok((label, confidence)) => {
                        if confidence > self.config.model_override {
                            return self.decide(label, confidence, DecisionSource::Model);
                        }
                        if label == best_rule && total_hits > 0 {
                            return self.decide(
                                label,
                                confidence.max(self.config.corroboration_floor),
                                DecisionSource::Corroborated,
                            );
                        }
                        debug!(
                            model_label = label.as_str(),
                            confidence, "Model not confident and not corroborated"
                        );
                    }
                    Err(e) => warn!(error = %e, "Model prediction failed, using rules only"),
                }
            }
        }

        // Weak keyword evidence.
        if total_hits > 0 {
            return self.decide(
                best_rule,
                rule_ratio.min(self.config.rules_fallback_cap),
                DecisionSource::RulesFallback,
            );
        }

        self.decide(
            CategoryLabel::Autre,
            self.config.no_evidence_confidence,
            DecisionSource::NoEvidence,
        )
    }

    /// Model label and its confidence.
    fn consult(
        &self,
        model: &dyn DocumentModel,
        clean: &str,
    ) -> Result<(CategoryLabel, f64), ModelError> {
        let label = model.predict(clean)?;
        let top_probability = if model.supports_proba() {
            let top = model
                .predict_proba(clean)?
                .and_then(|dist| dist.iter().map(|(_, p)| *p).reduce(f64::max));
            if top.is_none() {
                debug!("Model returned no probabilities, using default model confidence");
            }
            top
        } else {
            None
        };
        let confidence = top_probability.unwrap_or(self.config.model_default_confidence);
        Ok((label, confidence))
    }

    fn decide(
        &self,
        category: CategoryLabel,
        confidence: f64,
        source: DecisionSource,
    ) -> ClassificationResult {
        let result = ClassificationResult::new(category, confidence, source);
        debug!(
            category = result.category.as_str(),
            confidence = result.confidence,
            source = result.source.as_str(),
            "Classification decided"
        );
        result
    }
}
