//! DualModelInference: run both scorers and threshold their output
//!
//! The two decision paths compare differently against the threshold. Binary
//! decisions use `>=` and multi-label decisions use `>`; stored predictions
//! were produced under these rules, so they are kept as separate named
//! constants rather than unified.

use cxr_common::config::validate_threshold;
use cxr_common::labels::{FINDING_CODE, NO_FINDING_CODE};
use cxr_common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

use super::scorer::{BinaryScorer, MultiLabelScorer, ScorerError};

/// How a probability is compared against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionRule {
    /// `probability >= threshold`
    AtLeast,
    /// `probability > threshold`
    Above,
}

impl DecisionRule {
    pub fn decide(self, probability: f64, threshold: f64) -> bool {
        match self {
            DecisionRule::AtLeast => probability >= threshold,
            DecisionRule::Above => probability > threshold,
        }
    }
}

/// Decision rule of the binary path
pub const BINARY_DECISION: DecisionRule = DecisionRule::AtLeast;

/// Decision rule of every multi-label entry
pub const MULTILABEL_DECISION: DecisionRule = DecisionRule::Above;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryPrediction {
    /// "Finding" or "No Finding"
    pub label: String,
    pub probability: f64,
    pub decision: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelPrediction {
    pub code: String,
    pub probability: f64,
    pub decision: bool,
}

/// Unified output of one inference call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    pub binary: BinaryPrediction,
    /// Multi-label entries in scorer order
    pub labels: Vec<LabelPrediction>,
    pub threshold: f64,
}

impl InferenceResult {
    pub fn label(&self, code: &str) -> Option<&LabelPrediction> {
        self.labels.iter().find(|l| l.code == code)
    }
}

/// Both scorers, injected by the composition root
#[derive(Clone)]
pub struct DualModelInference {
    multilabel: Arc<dyn MultiLabelScorer>,
    binary: Arc<dyn BinaryScorer>,
}

impl DualModelInference {
    pub fn new(
        multilabel: Arc<dyn MultiLabelScorer>,
        binary: Arc<dyn BinaryScorer>,
    ) -> Self {
        Self { multilabel, binary }
    }

    /// Names of the wired scorers (multi-label, binary)
    pub fn scorer_names(&self) -> (&str, &str) {
        (self.multilabel.name(), self.binary.name())
    }

    /// Score one image
    ///
    /// Any scorer failure, or a probability outside [0, 1], fails the whole
    /// call with `ModelUnavailable`; no partial result is returned.
    pub async fn infer(&self, image: &[u8], threshold: f64) -> Result<InferenceResult> {
        validate_threshold(threshold)?;

        // Separate preprocessing per scorer; the inputs are distinct types
        let ml_input = self
            .multilabel
            .preprocess(image)
            .map_err(|e| unavailable(self.multilabel.name(), e))?;
        let bin_input = self
            .binary
            .preprocess(image)
            .map_err(|e| unavailable(self.binary.name(), e))?;

        let ml_future = self.multilabel.score(ml_input);
        let bin_future = self.binary.score(bin_input);
        let (ml_scores, bin_score) = tokio::join!(ml_future, bin_future);

        let ml_scores = ml_scores
            .map_err(|e| unavailable(self.multilabel.name(), e))?;
        let p_bin = bin_score.map_err(|e| unavailable(self.binary.name(), e))?;

        check_probability(self.binary.name(), "binary", p_bin)?;
        let decision = BINARY_DECISION.decide(p_bin, threshold);
        let binary = BinaryPrediction {
            label: (if decision { FINDING_CODE } else { NO_FINDING_CODE }).to_string(),
            probability: p_bin,
            decision,
        };

        let mut labels = Vec::with_capacity(ml_scores.len());
        for (code, probability) in ml_scores {
            check_probability(self.multilabel.name(), &code, probability)?;
            labels.push(LabelPrediction {
                decision: MULTILABEL_DECISION.decide(probability, threshold),
                code,
                probability,
            });
        }

        tracing::debug!(
            binary = binary.label.as_str(),
            p_bin,
            labels = labels.len(),
            threshold,
            "Inference complete"
        );

        Ok(InferenceResult {
            binary,
            labels,
            threshold,
        })
    }
}

fn unavailable(scorer: &str, err: ScorerError) -> Error {
    tracing::error!(scorer, error = %err, "Scorer failed");
    Error::ModelUnavailable {
        scorer: scorer.to_string(),
        reason: err.to_string(),
    }
}

fn check_probability(scorer: &str, label: &str, probability: f64) -> Result<()> {
    if (0.0..=1.0).contains(&probability) {
        Ok(())
    } else {
        let reason = format!(
            "probability {} for '{}' outside [0, 1]",
            probability, label
        );
        Err(unavailable(scorer, ScorerError::Scoring(reason)))
    }
}
