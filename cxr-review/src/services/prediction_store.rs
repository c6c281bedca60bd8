//! PredictionStore: idempotent persistence of an inference result
//!
//! Writes one row per (artifact, model run, label) through the upsert
//! primitive. The binary probability is filed under the designated
//! any-finding label. Review status is left to the caller.

use cxr_common::db::find_or_create;
use cxr_common::labels::LabelCatalog;
use cxr_common::Result;
use sqlx::SqliteConnection;
use tracing::warn;

use crate::db::labels::{find_label_by_code, EnsureLabel};
use crate::db::PredictionUpsert;
use crate::inference::InferenceResult;

/// Upsert every prediction of `result`; returns affected row ids
///
/// The binary row comes first, then the multi-label rows in scorer order.
/// Codes missing from the label table are skipped with a warning.
pub async fn persist(
    conn: &mut SqliteConnection,
    artifact_id: i64,
    model_run_id: i64,
    result: &InferenceResult,
) -> Result<Vec<i64>> {
    let mut affected = Vec::with_capacity(result.labels.len() + 1);

    let any_finding = EnsureLabel(LabelCatalog::any_finding());
    let any_finding = find_or_create(&mut *conn, &any_finding).await?;
    let id = find_or_create(
        &mut *conn,
        &PredictionUpsert {
            artifact_id,
            model_run_id,
            label_id: any_finding.id,
            probability: result.binary.probability,
            decision: result.binary.decision,
        },
    )
    .await?;
    affected.push(id);

    for entry in &result.labels {
        let Some(label) = find_label_by_code(&mut *conn, &entry.code).await? else {
            warn!(
                artifact_id,
                label = entry.code.as_str(),
                "Scorer returned unknown label code, skipping"
            );
            continue;
        };

        let id = find_or_create(
            &mut *conn,
            &PredictionUpsert {
                artifact_id,
                model_run_id,
                label_id: label.id,
                probability: entry.probability,
                decision: entry.decision,
            },
        )
        .await?;
        affected.push(id);
    }

    tracing::debug!(
        artifact_id,
        model_run_id,
        rows = affected.len(),
        "Predictions persisted"
    );
    Ok(affected)
}
