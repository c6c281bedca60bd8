//! Seed record formats
//!
//! The cohort builder writes one JSON array per collection into a seed
//! directory; the review service reloads them idempotently. Image bytes live
//! next to the JSON files under `images/`.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

use crate::Result;

pub const SUBJECTS_FILE: &str = "subjects.json";
pub const CASES_FILE: &str = "cases.json";
pub const ARTIFACTS_FILE: &str = "artifacts.json";
pub const MODEL_RUNS_FILE: &str = "model_runs.json";
pub const PREDICTIONS_FILE: &str = "predictions.json";
pub const ANNOTATIONS_FILE: &str = "annotations.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const IMAGES_DIR: &str = "images";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSeed {
    pub id: i64,
    pub external_id: Option<String>,
    pub birth_year: Option<i32>,
    pub sex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSeed {
    pub id: i64,
    pub subject_id: i64,
    pub reason: Option<String>,
    /// RFC 3339; absent means the case is stamped with the load time
    #[serde(default)]
    pub taken_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSeed {
    pub id: i64,
    pub case_id: i64,
    pub filename: String,
    pub content_type: String,
    pub view_position: Option<String>,
    pub follow_up: i64,
    /// RFC 3339; absent means the artifact is pending review
    pub reviewed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRunSeed {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub artifact_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSeed {
    pub artifact_id: i64,
    pub model_run_id: i64,
    pub label_code: String,
    pub probability: f64,
    pub decision: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSeed {
    pub artifact_id: i64,
    pub model_run_id: i64,
    pub label_code: String,
    pub is_present: bool,
    pub comment: Option<String>,
    /// Reviewer email; the reviewer row is created on reload if absent
    pub reviewer: String,
}

/// Totals written alongside the collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub subjects: usize,
    pub cases: usize,
    pub artifacts: usize,
    pub images_copied: usize,
    pub images_missing: usize,
    pub predictions: usize,
    pub annotations: usize,
    pub model_runs: Vec<String>,
}

/// Write one collection as pretty JSON
pub fn write_collection<T: Serialize>(dir: &Path, file: &str, records: &[T]) -> Result<()> {
    let content = serde_json::to_string_pretty(records)?;
    std::fs::write(dir.join(file), content)?;
    Ok(())
}

/// Read one collection; a missing file is an empty collection
pub fn read_collection<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Vec<T>> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_collection_reads_empty() {
        let dir = TempDir::new().unwrap();
        let subjects: Vec<SubjectSeed> = read_collection(dir.path(), SUBJECTS_FILE).unwrap();
        assert!(subjects.is_empty());
    }

    #[test]
    fn test_pending_artifact_omits_reviewed_at() {
        let json = r#"[{"id":3,"case_id":1,"filename":"a.png","content_type":"image/png",
                       "view_position":null,"follow_up":0,"reviewed_at":null}]"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ARTIFACTS_FILE);
        std::fs::write(path, json).unwrap();
        let artifacts: Vec<ArtifactSeed> = read_collection(dir.path(), ARTIFACTS_FILE).unwrap();
        assert_eq!(artifacts[0].id, 3);
        assert!(artifacts[0].reviewed_at.is_none());
    }
}
