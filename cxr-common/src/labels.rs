//! Label catalog
//!
//! Static mapping of finding codes to display metadata. Codes match the
//! multi-label scorer output and the source dataset's `Finding Labels` column.
//! Rows seeded from this catalog are never modified afterwards.

use serde::Serialize;

/// Code of the designated label carrying the binary scorer's prediction
pub const ANY_FINDING_CODE: &str = "ANY_FINDING";

/// Finding code used by the source dataset for a clean study
pub const NO_FINDING_CODE: &str = "No Finding";

/// Binary scorer output label when the decision is positive
pub const FINDING_CODE: &str = "Finding";

/// Display metadata for one label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelInfo {
    pub code: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
}

const fn info(
    code: &'static str,
    display_name: &'static str,
    description: &'static str,
) -> LabelInfo {
    LabelInfo {
        code,
        display_name,
        description,
    }
}

/// Multi-label finding codes, in catalog order
const FINDINGS: &[LabelInfo] = &[
    info(
        "Atelectasis",
        "Atelectasis",
        "Collapse or incomplete inflation of the lung",
    ),
    info("Cardiomegaly", "Cardiomegaly", "Enlargement of the heart"),
    info(
        "Consolidation",
        "Consolidation",
        "Region of normally compressible lung tissue filled with liquid",
    ),
    info("Edema", "Edema", "Fluid accumulation in the lungs"),
    info(
        "Effusion",
        "Effusion",
        "Abnormal fluid accumulation in pleural space",
    ),
    info(
        "Emphysema",
        "Emphysema",
        "Enlargement of air spaces in the lungs",
    ),
    info(
        "Fibrosis",
        "Fibrosis",
        "Thickening and scarring of connective tissue",
    ),
    info("Hernia", "Hernia", "Abnormal protrusion of tissue"),
    info(
        "Infiltration",
        "Infiltration",
        "Presence of substances denser than air in lung parenchyma",
    ),
    info("Mass", "Mass", "Space-occupying lesion larger than 3 cm"),
    info(
        NO_FINDING_CODE,
        "No Finding",
        "No pathology detected in the X-ray",
    ),
    info("Nodule", "Nodule", "Space-occupying lesion less than 3 cm"),
    info(
        "Pleural_Thickening",
        "Pleural Thickening",
        "Thickening of the pleura",
    ),
    info("Pneumonia", "Pneumonia", "Infection of the lung"),
    info(
        "Pneumothorax",
        "Pneumothorax",
        "Presence of air in the pleural space",
    ),
];

/// Labels produced by the binary path
const BINARY: &[LabelInfo] = &[
    info(
        FINDING_CODE,
        "Finding",
        "Any pathology detected in the X-ray (binary classification)",
    ),
    info(
        ANY_FINDING_CODE,
        "Any Finding",
        "Binary classification: Finding vs No Finding",
    ),
];

/// Read-only view over the seeded label set
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelCatalog;

impl LabelCatalog {
    /// Every label seeded into the `labels` table
    pub fn all() -> impl Iterator<Item = &'static LabelInfo> {
        FINDINGS.iter().chain(BINARY.iter())
    }

    /// Finding codes the multi-label path may report
    pub fn finding_codes() -> impl Iterator<Item = &'static str> {
        FINDINGS.iter().map(|l| l.code)
    }

    /// Metadata of the designated any-finding label
    pub fn any_finding() -> &'static LabelInfo {
        &BINARY[1]
    }

    /// Exact code lookup
    pub fn by_code(code: &str) -> Option<&'static LabelInfo> {
        Self::all().find(|l| l.code == code)
    }
}
