//! Scorer boundary
//!
//! The two scorers take different input types so that a tensor prepared for
//! one can never be handed to the other. A multi-label input is always a
//! single channel; a binary input is one channel or three duplicated
//! channels, depending on the binary scorer's own contract.

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a scorer implementation
#[derive(Debug, Error)]
pub enum ScorerError {
    /// Weights were never loaded
    #[error("weights not loaded: {0}")]
    WeightsMissing(String),

    /// Input could not be turned into the scorer's tensor
    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    /// Kernel failed while scoring
    #[error("scoring failed: {0}")]
    Scoring(String),
}

/// Dense CHW tensor of normalized pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<f32>,
    ) -> Result<Self, ScorerError> {
        let expected = channels * height * width;
        if expected == 0 || data.len() != expected {
            return Err(ScorerError::Preprocess(format!(
                "tensor shape {}x{}x{} does not match {} values",
                channels,
                height,
                width,
                data.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    /// Repeat a single-channel tensor into three identical channels
    pub fn replicate_channels(&self, channels: usize) -> Result<Self, ScorerError> {
        if self.channels != 1 {
            return Err(ScorerError::Preprocess(format!(
                "cannot replicate a {}-channel tensor",
                self.channels
            )));
        }
        let mut data = Vec::with_capacity(self.data.len() * channels);
        for _ in 0..channels {
            data.extend_from_slice(&self.data);
        }
        Tensor::new(channels, self.height, self.width, data)
    }
}

/// Single-channel tensor normalized for the multi-label scorer
#[derive(Debug, Clone, PartialEq)]
pub struct MultiLabelInput(Tensor);

impl MultiLabelInput {
    pub fn new(tensor: Tensor) -> Result<Self, ScorerError> {
        if tensor.channels != 1 {
            return Err(ScorerError::Preprocess(format!(
                "multi-label input must have 1 channel, got {}",
                tensor.channels
            )));
        }
        Ok(Self(tensor))
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }
}

/// One- or three-channel tensor normalized for the binary scorer
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryInput(Tensor);

impl BinaryInput {
    pub fn new(tensor: Tensor) -> Result<Self, ScorerError> {
        if tensor.channels != 1 && tensor.channels != 3 {
            return Err(ScorerError::Preprocess(format!(
                "binary input must have 1 or 3 channels, got {}",
                tensor.channels
            )));
        }
        Ok(Self(tensor))
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }
}

/// Per-label probabilities in the scorer's fixed label order
#[async_trait]
pub trait MultiLabelScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Decode and normalize image bytes for this scorer only
    fn preprocess(&self, image: &[u8]) -> Result<MultiLabelInput, ScorerError>;

    async fn score(&self, input: MultiLabelInput) -> Result<Vec<(String, f64)>, ScorerError>;
}

/// Probability that any finding is present
#[async_trait]
pub trait BinaryScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Decode and normalize image bytes for this scorer only
    fn preprocess(&self, image: &[u8]) -> Result<BinaryInput, ScorerError>;

    async fn score(&self, input: BinaryInput) -> Result<f64, ScorerError>;
}

/// Stand-in wired when a scorer's weights are not configured
#[derive(Debug, Clone)]
pub struct UnavailableScorer {
    name: String,
    reason: String,
}

impl UnavailableScorer {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MultiLabelScorer for UnavailableScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn preprocess(&self, _image: &[u8]) -> Result<MultiLabelInput, ScorerError> {
        Err(ScorerError::WeightsMissing(self.reason.clone()))
    }

    async fn score(&self, _input: MultiLabelInput) -> Result<Vec<(String, f64)>, ScorerError> {
        Err(ScorerError::WeightsMissing(self.reason.clone()))
    }
}

#[async_trait]
impl BinaryScorer for UnavailableScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn preprocess(&self, _image: &[u8]) -> Result<BinaryInput, ScorerError> {
        Err(ScorerError::WeightsMissing(self.reason.clone()))
    }

    async fn score(&self, _input: BinaryInput) -> Result<f64, ScorerError> {
        Err(ScorerError::WeightsMissing(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_shape_must_match_data() {
        assert!(Tensor::new(1, 2, 2, vec![0.0; 4]).is_ok());
        assert!(Tensor::new(1, 2, 2, vec![0.0; 3]).is_err());
        assert!(Tensor::new(0, 2, 2, vec![]).is_err());
    }

    #[test]
    fn test_multilabel_input_rejects_three_channels() {
        let rgb = Tensor::new(3, 1, 1, vec![0.1, 0.1, 0.1]).unwrap();
        assert!(MultiLabelInput::new(rgb.clone()).is_err());
        assert!(BinaryInput::new(rgb).is_ok());
    }

    #[test]
    fn test_replicated_channels_are_identical() {
        let gray = Tensor::new(1, 1, 2, vec![0.25, 0.75]).unwrap();
        let rgb = gray.replicate_channels(3).unwrap();
        assert_eq!(rgb.channels, 3);
        assert_eq!(rgb.data, vec![0.25, 0.75, 0.25, 0.75, 0.25, 0.75]);
        assert!(rgb.replicate_channels(3).is_err());
    }
}
