//! Find-or-create with bounded retry
//!
//! Every lazily created row (model runs, reviewers, labels) and every keyed
//! upsert (predictions, annotations) goes through the same sequence:
//!
//! 1. `find_existing`: look the row up by its natural key. Upserts refresh the
//!    row in place here and report it as found.
//! 2. `insert_new`: insert when nothing was found.
//! 3. A UNIQUE violation on insert means a concurrent writer won the race; the
//!    loop goes back to step 1 and picks up the winner's row.
//! 4. `database is locked` backs off (10ms doubling, capped at 1000ms) and
//!    retries.
//!
//! The loop is bounded to [`MAX_ATTEMPTS`]; any other error is returned as is.

use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::time::{Duration, Instant};

use crate::Result;

/// Upper bound on lookup/insert rounds before the last error is surfaced
pub const MAX_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// One keyed row that can be looked up, and inserted when missing
#[async_trait]
pub trait FindOrCreate: Send + Sync {
    type Output: Send;

    /// Short description of the key for logs, e.g. `model_run=dual_v1`
    fn describe(&self) -> String;

    /// Look the row up by key; upserts update it here and return `Some`
    async fn find_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self::Output>>;

    /// Insert a fresh row
    async fn insert_new(&self, conn: &mut SqliteConnection) -> Result<Self::Output>;
}

/// Run the find-then-insert sequence with race recovery
///
/// `conn` may be a pooled connection (`&mut *pool.acquire().await?`) or an
/// open transaction (`&mut *tx`); inside a transaction a failed INSERT only
/// rolls back that statement, so the retried lookup sees a consistent state.
pub async fn find_or_create<F>(conn: &mut SqliteConnection, key: &F) -> Result<F::Output>
where
    F: FindOrCreate + ?Sized,
{
    let start = Instant::now();
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match key.find_existing(conn).await {
            Ok(Some(found)) => Ok(found),
            Ok(None) => key.insert_new(conn).await,
            Err(err) => Err(err),
        };

        let err = match outcome {
            Ok(output) => {
                if attempt > 1 {
                    tracing::debug!(
                        key = %key.describe(),
                        attempt,
                        elapsed_ms = start.elapsed().as_millis(),
                        "find-or-create succeeded after retry"
                    );
                }
                return Ok(output);
            }
            Err(err) => err,
        };

        let retryable = err.is_unique_violation() || err.is_lock_contention();
        if !retryable {
            return Err(err);
        }

        if attempt >= MAX_ATTEMPTS {
            tracing::error!(
                key = %key.describe(),
                attempt,
                elapsed_ms = start.elapsed().as_millis(),
                error = %err,
                "find-or-create gave up"
            );
            return Err(err);
        }

        if err.is_unique_violation() {
            // Another writer inserted the same key; the next lookup finds it
            tracing::warn!(
                key = %key.describe(),
                attempt,
                "Concurrent insert detected, retrying lookup"
            );
        } else {
            let delay = backoff_ms.min(MAX_BACKOFF_MS);
            tracing::warn!(
                key = %key.describe(),
                attempt,
                backoff_ms = delay,
                "Database locked, will retry after backoff"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }
    }
}
