//! Monitored unit of work
//!
//! One transaction per inference, annotation or ingestion call. Acquisition
//! wait and hold time are logged so pool saturation and long-held write locks
//! show up in the trace output.
//!
//! Units of work open with `BEGIN IMMEDIATE`: the write lock is taken up
//! front, so concurrent writers queue on the busy timeout instead of failing
//! on a stale read snapshot. [`retry_on_lock`] re-runs a whole unit of work
//! when the busy timeout still runs out.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::future::Future;
use std::time::{Duration, Instant};

use crate::Result;

const SLOW_ACQUIRE_MS: u128 = 1000;
const LONG_HOLD_MS: u128 = 2000;

/// Total time [`retry_on_lock`] keeps re-running a unit of work
pub const MAX_LOCK_WAIT_MS: u64 = 10_000;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Transaction wrapper that logs its acquisition and release timing
pub struct UnitOfWork<'c> {
    tx: Transaction<'c, Sqlite>,
    timer: HoldTimer,
}

/// Logs hold time on release; a drop without commit is a rollback
struct HoldTimer {
    caller: &'static str,
    acquired_at: Instant,
    released: bool,
}

impl HoldTimer {
    fn release(&mut self, how: &'static str) {
        self.released = true;
        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > LONG_HOLD_MS {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                how,
                "Long transaction, write lock held for extended period"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, how, "Connection released");
        }
    }
}

impl Drop for HoldTimer {
    fn drop(&mut self) {
        if !self.released {
            self.release("drop");
        }
    }
}

impl<'c> UnitOfWork<'c> {
    /// Connection handle for queries and [`find_or_create`](super::find_or_create)
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Commit every write of this call atomically
    pub async fn commit(self) -> Result<()> {
        let UnitOfWork { tx, mut timer } = self;
        tx.commit().await?;
        timer.release("commit");
        Ok(())
    }
}

/// Begin a write unit of work, logging how long the pool and the write lock
/// took to become available
pub async fn begin_unit_of_work<'c>(
    pool: &'c SqlitePool,
    caller: &'static str,
) -> Result<UnitOfWork<'c>> {
    let start = Instant::now();
    let tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > SLOW_ACQUIRE_MS {
        tracing::warn!(
            caller,
            wait_ms,
            "Slow connection acquisition, pool may be saturated"
        );
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(UnitOfWork {
        tx,
        timer: HoldTimer {
            caller,
            acquired_at: Instant::now(),
            released: false,
        },
    })
}

/// Re-run `operation` while SQLite reports lock contention
///
/// `operation` must begin and commit its own unit of work, so every attempt
/// starts from a fresh transaction. Backoff starts at 10ms and doubles up to
/// 1000ms; after [`MAX_LOCK_WAIT_MS`] the last lock error is returned. Any
/// other error is returned immediately.
pub async fn retry_on_lock<F, Fut, T>(caller: &'static str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let max_wait = Duration::from_millis(MAX_LOCK_WAIT_MS);
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(output) => {
                if attempt > 1 {
                    tracing::debug!(
                        caller,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Unit of work succeeded after retry"
                    );
                }
                return Ok(output);
            }
            Err(err) => err,
        };

        if !err.is_lock_contention() {
            return Err(err);
        }

        let elapsed = start.elapsed();
        if elapsed >= max_wait {
            tracing::error!(
                caller,
                attempt,
                elapsed_ms = elapsed.as_millis(),
                error = %err,
                "Unit of work gave up, database stayed locked"
            );
            return Err(err);
        }

        tracing::warn!(
            caller,
            attempt,
            backoff_ms,
            "Database locked, retrying unit of work after backoff"
        );
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn locked() -> Error {
        Error::Database(sqlx::Error::Protocol("database is locked".to_string()))
    }

    async fn model_run_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM model_runs")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists_writes() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("uow.db")).await.unwrap();

        let mut uow = begin_unit_of_work(&pool, "test::commit").await.unwrap();
        sqlx::query("INSERT INTO model_runs (name) VALUES ('a')")
            .execute(uow.conn())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(model_run_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards_writes() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("uow.db")).await.unwrap();

        {
            let mut uow = begin_unit_of_work(&pool, "test::drop").await.unwrap();
            sqlx::query("INSERT INTO model_runs (name) VALUES ('a')")
                .execute(uow.conn())
                .await
                .unwrap();
        }

        assert_eq!(model_run_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_second_writer_waits_for_first_commit() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("uow.db")).await.unwrap();

        let mut first = begin_unit_of_work(&pool, "test::first").await.unwrap();
        sqlx::query("INSERT INTO model_runs (name) VALUES ('first')")
            .execute(first.conn())
            .await
            .unwrap();

        let second = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut uow = begin_unit_of_work(&pool, "test::second").await?;
                sqlx::query("INSERT INTO model_runs (name) VALUES ('second')")
                    .execute(uow.conn())
                    .await?;
                uow.commit().await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        first.commit().await.unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(model_run_count(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_retry_on_lock_reruns_until_success() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let value = retry_on_lock("test::retry", || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(locked())
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_on_lock_returns_other_errors_at_once() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let err = retry_on_lock("test::retry", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::UnknownLabel("Nope".to_string()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::UnknownLabel(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
