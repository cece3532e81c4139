//! Learned-model contract and the linear text model artifact.
//!
//! The training job exports a linear model over bag-of-words features
//! (multinomial naive Bayes, logistic regression or linear SVM all reduce to
//! `intercept + W·x` at inference). This module only consumes that artifact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CategoryLabel;
use crate::pipeline::extraction::clean_text;

/// Two or more word characters, the usual vectorizer token rule.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid model artifact JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid model artifact: {0}")]
    Validation(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Probability per class, in the model's class order.
pub type ClassDistribution = Vec<(CategoryLabel, f64)>;

/// What the arbiter needs from a learned model.
pub trait DocumentModel: Send + Sync {
    /// Most likely label for already-cleaned text.
    fn predict(&self, text: &str) -> Result<CategoryLabel, ModelError>;

    /// Class probabilities, or `None` when the model has no calibrated
    /// probabilities (see [`DocumentModel::supports_proba`]).
    fn predict_proba(&self, text: &str) -> Result<Option<ClassDistribution>, ModelError>;

    fn supports_proba(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    NaiveBayes,
    LogisticRegression,
    LinearSvm,
}

impl ModelKind {
    pub fn has_probabilities(&self) -> bool {
        !matches!(self, Self::LinearSvm)
    }
}

/// On-disk artifact layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub kind: ModelKind,
    pub classes: Vec<String>,
    /// Term -> feature column.
    pub vocabulary: HashMap<String, usize>,
    #[serde(default)]
    pub idf: Option<Vec<f64>>,
    #[serde(default)]
    pub l2_normalize: bool,
    pub intercept: Vec<f64>,
    /// One row per class, one column per feature.
    pub coefficients: Vec<Vec<f64>>,
}

/// Validated linear model ready for inference.
#[derive(Debug, Clone)]
pub struct LinearTextModel {
    kind: ModelKind,
    classes: Vec<CategoryLabel>,
    vocabulary: HashMap<String, usize>,
    idf: Option<Vec<f64>>,
    l2_normalize: bool,
    intercept: Vec<f64>,
    coefficients: Vec<Vec<f64>>,
}

impl LinearTextModel {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        let invalid = |msg: String| Err(ModelError::Validation(msg));

        if artifact.classes.is_empty() {
            return invalid("no classes".into());
        }
        let mut classes = Vec::with_capacity(artifact.classes.len());
        for name in &artifact.classes {
            let label: CategoryLabel = name
                .parse()
                .map_err(|e| ModelError::Validation(format!("{e}")))?;
            if classes.contains(&label) {
                return invalid(format!("class {label} listed twice"));
            }
            classes.push(label);
        }

        let n_classes = classes.len();
        if artifact.intercept.len() != n_classes {
            return invalid(format!(
                "intercept has {} entries for {n_classes} classes",
                artifact.intercept.len()
            ));
        }
        if artifact.coefficients.len() != n_classes {
            return invalid(format!(
                "coefficients have {} rows for {n_classes} classes",
                artifact.coefficients.len()
            ));
        }

        let n_features = artifact.coefficients[0].len();
        if n_features == 0 {
            return invalid("coefficients have no feature columns".into());
        }
        if let Some(row) = artifact.coefficients.iter().position(|r| r.len() != n_features) {
            return invalid(format!("coefficient row {row} has a different width"));
        }
        if artifact.vocabulary.len() > n_features {
            return invalid(format!(
                "vocabulary has {} terms for {n_features} features",
                artifact.vocabulary.len()
            ));
        }
        if let Some((term, column)) = artifact.vocabulary.iter().find(|(_, &c)| c >= n_features) {
            return invalid(format!("term {term:?} maps to column {column} out of range"));
        }
        if let Some(idf) = &artifact.idf {
            if idf.len() != n_features {
                return invalid(format!("idf has {} entries for {n_features} features", idf.len()));
            }
        }

        let all_finite = artifact.intercept.iter().all(|v| v.is_finite())
            && artifact.coefficients.iter().flatten().all(|v| v.is_finite())
            && artifact
                .idf
                .as_ref()
                .map_or(true, |idf| idf.iter().all(|v| v.is_finite()));
        if !all_finite {
            return invalid("non-finite number in weights".into());
        }

        Ok(Self {
            kind: artifact.kind,
            classes,
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
            l2_normalize: artifact.l2_normalize,
            intercept: artifact.intercept,
            coefficients: artifact.coefficients,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Self::from_artifact(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let json = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn classes(&self) -> &[CategoryLabel] {
        &self.classes
    }

    /// Sparse feature vector: token counts, optionally idf-weighted and
    /// L2-normalized. Out-of-vocabulary tokens are ignored.
    fn features(&self, text: &str) -> HashMap<usize, f64> {
        let clean = clean_text(text);
        let mut features: HashMap<usize, f64> = HashMap::new();
        for token in TOKEN.find_iter(&clean) {
            if let Some(&column) = self.vocabulary.get(token.as_str()) {
                *features.entry(column).or_insert(0.0) += 1.0;
            }
        }

        if let Some(idf) = &self.idf {
            for (column, value) in features.iter_mut() {
                *value *= idf[*column];
            }
        }

        if self.l2_normalize {
            let norm = features.values().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                features.values_mut().for_each(|v| *v /= norm);
            }
        }
        features
    }

    /// Decision scores, one per class.
    fn scores(&self, text: &str) -> Vec<f64> {
        let features = self.features(text);
        self.coefficients
            .iter()
            .zip(&self.intercept)
            .map(|(row, intercept)| {
                intercept
                    + features
                        .iter()
                        .map(|(&column, value)| row[column] * value)
                        .sum::<f64>()
            })
            .collect()
    }
}

/// Numerically stable softmax.
fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

impl DocumentModel for LinearTextModel {
    fn predict(&self, text: &str) -> Result<CategoryLabel, ModelError> {
        let scores = self.scores(text);
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        if !scores[best].is_finite() {
            return Err(ModelError::ModelUnavailable("non-finite decision score".into()));
        }
        Ok(self.classes[best])
    }

    fn predict_proba(&self, text: &str) -> Result<Option<ClassDistribution>, ModelError> {
        if !self.supports_proba() {
            return Ok(None);
        }
        let probabilities = softmax(&self.scores(text));
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::ModelUnavailable("non-finite probability".into()));
        }
        Ok(Some(self.classes.iter().copied().zip(probabilities).collect()))
    }

    fn supports_proba(&self) -> bool {
        self.kind.has_probabilities()
    }
}

/// Load the model artifact at `path`. Never fails: a missing or corrupt
/// artifact is logged and the caller runs rule-only.
pub fn load_classifier(path: &Path) -> Option<Box<dyn DocumentModel>> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No model artifact found, classifying with rules only");
        return None;
    }

    match LinearTextModel::load(path) {
        Ok(model) => {
            tracing::info!(
                path = %path.display(),
                kind = ?model.kind(),
                classes = model.classes().len(),
                "Loaded classification model"
            );
            Some(Box::new(model))
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Model artifact unusable, classifying with rules only"
            );
            None
        }
    }
}
