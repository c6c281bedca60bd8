//! Shared fixtures for cxr-review integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cxr_common::db::init_database;
use cxr_review::db::subjects::{insert_subject, Subject};
use cxr_review::inference::{
    BinaryInput, BinaryScorer, DualModelInference, MultiLabelInput, MultiLabelScorer, ScorerError,
    Tensor, UnavailableScorer,
};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Smallest well-formed PNG: signature, IHDR (1x1 grayscale), IEND
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R', 0, 0, 0,
    1, 0, 0, 0, 1, 8, 0, 0, 0, 0, 0x3A, 0x7E, 0x9B, 0x55, 0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xAE,
    0x42, 0x60, 0x82,
];

/// Multi-label scorer returning whatever scores are currently set
pub struct FixedMultiLabel {
    scores: Mutex<Vec<(String, f64)>>,
}

impl FixedMultiLabel {
    pub fn new(scores: &[(&str, f64)]) -> Arc<Self> {
        let scorer = Arc::new(Self {
            scores: Mutex::new(Vec::new()),
        });
        scorer.set(scores);
        scorer
    }

    pub fn set(&self, scores: &[(&str, f64)]) {
        *self.scores.lock().unwrap() = scores.iter().map(|(c, p)| (c.to_string(), *p)).collect();
    }
}

#[async_trait]
impl MultiLabelScorer for FixedMultiLabel {
    fn name(&self) -> &str {
        "fixed-multilabel"
    }

    fn preprocess(&self, _image: &[u8]) -> Result<MultiLabelInput, ScorerError> {
        MultiLabelInput::new(Tensor::new(1, 1, 1, vec![0.0])?)
    }

    async fn score(&self, _input: MultiLabelInput) -> Result<Vec<(String, f64)>, ScorerError> {
        Ok(self.scores.lock().unwrap().clone())
    }
}

/// Binary scorer returning the currently set probability
pub struct FixedBinary {
    probability: Mutex<f64>,
}

impl FixedBinary {
    pub fn new(probability: f64) -> Arc<Self> {
        Arc::new(Self {
            probability: Mutex::new(probability),
        })
    }

    pub fn set(&self, probability: f64) {
        *self.probability.lock().unwrap() = probability;
    }
}

#[async_trait]
impl BinaryScorer for FixedBinary {
    fn name(&self) -> &str {
        "fixed-binary"
    }

    fn preprocess(&self, _image: &[u8]) -> Result<BinaryInput, ScorerError> {
        BinaryInput::new(Tensor::new(1, 1, 1, vec![0.0])?)
    }

    async fn score(&self, _input: BinaryInput) -> Result<f64, ScorerError> {
        Ok(*self.probability.lock().unwrap())
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub multilabel: Arc<FixedMultiLabel>,
    pub binary: Arc<FixedBinary>,
}

impl Fixture {
    pub fn inference(&self) -> DualModelInference {
        DualModelInference::new(self.multilabel.clone(), self.binary.clone())
    }
}

/// Fresh database with subject 1 and fixed scorers
pub async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("review.db")).await.unwrap();
    insert_subject(
        &pool,
        &Subject {
            id: 1,
            external_id: Some("NIH_1".to_string()),
            birth_year: Some(1970),
            sex: Some("M".to_string()),
        },
    )
    .await
    .unwrap();

    Fixture {
        dir,
        pool,
        multilabel: FixedMultiLabel::new(&[("Cardiomegaly", 0.8), ("Edema", 0.2), ("Hernia", 0.5)]),
        binary: FixedBinary::new(0.9),
    }
}

/// Inference with both scorers unavailable
pub fn unavailable_inference() -> DualModelInference {
    DualModelInference::new(
        Arc::new(UnavailableScorer::new("multilabel", "weights path not configured")),
        Arc::new(UnavailableScorer::new("binary", "weights path not configured")),
    )
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
