//! Population manifest and image availability
//!
//! The manifest is a JSON array with one record per source image. Only
//! records whose image file is present under the image root are eligible for
//! sampling.

use cxr_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One source image as listed in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// File name of the image, unique across the source dataset
    pub image_index: String,
    pub subject_id: i64,
    /// Pipe-separated finding codes, e.g. `"Edema|Mass"`
    #[serde(default)]
    pub finding_labels: Option<String>,
    #[serde(default)]
    pub follow_up: Option<i64>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub view_position: Option<String>,
}

impl ImageRecord {
    /// Trimmed, non-empty finding codes in manifest order
    pub fn findings(&self) -> Vec<&str> {
        self.finding_labels
            .as_deref()
            .map(|labels| {
                labels
                    .split('|')
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Manifest records, in manifest order
#[derive(Debug, Clone, Default)]
pub struct Population {
    records: Vec<ImageRecord>,
}

impl Population {
    pub fn from_records(records: Vec<ImageRecord>) -> Self {
        Self { records }
    }

    /// Read a JSON manifest
    pub fn load_manifest(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::InvalidInput(format!(
                "Manifest not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let records: Vec<ImageRecord> = serde_json::from_str(&content)?;
        info!(
            records = records.len(),
            "Loaded manifest {}",
            path.display()
        );
        Ok(Self { records })
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct subject ids
    pub fn subject_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.subject_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Keep only records whose image is present in `index`
    pub fn restrict_to(&self, index: &ImageIndex) -> Population {
        let records: Vec<ImageRecord> = self
            .records
            .iter()
            .filter(|r| index.contains(&r.image_index))
            .cloned()
            .collect();
        info!(
            available = records.len(),
            listed = self.records.len(),
            "Filtered manifest to available images"
        );
        Population { records }
    }

    /// Keep only records belonging to the given subjects
    pub fn subset(&self, subject_ids: &BTreeSet<i64>) -> Population {
        Population {
            records: self
                .records
                .iter()
                .filter(|r| subject_ids.contains(&r.subject_id))
                .cloned()
                .collect(),
        }
    }

    /// Union of finding codes per subject, subjects in first-appearance order
    pub fn subject_findings(&self) -> Vec<(i64, BTreeSet<String>)> {
        let mut position: HashMap<i64, usize> = HashMap::new();
        let mut subjects: Vec<(i64, BTreeSet<String>)> = Vec::new();
        for record in &self.records {
            let slot = *position.entry(record.subject_id).or_insert_with(|| {
                subjects.push((record.subject_id, BTreeSet::new()));
                subjects.len() - 1
            });
            subjects[slot]
                .1
                .extend(record.findings().into_iter().map(str::to_string));
        }
        subjects
    }

    /// A subject's records ordered by follow-up number (missing counts as 0)
    pub fn records_for(&self, subject_id: i64) -> Vec<&ImageRecord> {
        let mut records: Vec<&ImageRecord> = self
            .records
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .collect();
        records.sort_by_key(|r| r.follow_up.unwrap_or(0));
        records
    }
}

/// File name to path map built from a recursive scan of the image root
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    paths: HashMap<String, PathBuf>,
}

impl ImageIndex {
    /// Scan `root` recursively; the first path seen for a file name wins
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Image directory not found: {}",
                root.display()
            )));
        }

        let mut paths: HashMap<String, PathBuf> = HashMap::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let Some(name) = entry.file_name().to_str() else {
                        continue;
                    };
                    if let Some(previous) = paths.get(name) {
                        debug!(
                            "Duplicate image name {} (keeping {})",
                            name,
                            previous.display()
                        );
                        continue;
                    }
                    paths.insert(name.to_string(), entry.path().to_path_buf());
                }
                Err(e) => warn!("Error accessing entry: {}", e),
            }
        }

        info!(
            images = paths.len(),
            "Scanned image directory {}",
            root.display()
        );
        Ok(Self { paths })
    }

    pub fn contains(&self, image_index: &str) -> bool {
        self.paths.contains_key(image_index)
    }

    pub fn path(&self, image_index: &str) -> Option<&Path> {
        self.paths.get(image_index).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
