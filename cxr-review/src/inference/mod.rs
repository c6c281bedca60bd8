//! Dual-model inference
//!
//! Two independently configured scorers (multi-label and binary) run against
//! the same image. Each scorer owns its preprocessing; the numerical kernels
//! are injected by the composition root.

pub mod dual;
pub mod scorer;

pub use dual::{
    BinaryPrediction, DecisionRule, DualModelInference, InferenceResult, LabelPrediction,
    BINARY_DECISION, MULTILABEL_DECISION,
};
pub use scorer::{
    BinaryInput, BinaryScorer, MultiLabelInput, MultiLabelScorer, ScorerError, Tensor,
    UnavailableScorer,
};
