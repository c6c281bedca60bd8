//! Reviewer identities
//!
//! Reviewers are keyed by a UUID and looked up by email. There is no
//! authentication; the identity is whatever the caller (or the configured
//! default) supplies.

use async_trait::async_trait;
use cxr_common::db::FindOrCreate;
use cxr_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reviewer {
    pub guid: Uuid,
    pub email: String,
    pub full_name: String,
}

/// Find-or-create a reviewer by email
#[derive(Debug, Clone)]
pub struct ReviewerByEmail<'a> {
    pub email: &'a str,
    pub full_name: &'a str,
}

#[async_trait]
impl<'a> FindOrCreate for ReviewerByEmail<'a> {
    type Output = Reviewer;

    fn describe(&self) -> String {
        format!("reviewer={}", self.email)
    }

    async fn find_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Reviewer>> {
        let row = sqlx::query("SELECT guid, email, full_name FROM reviewers WHERE email = ?")
            .bind(self.email)
            .fetch_optional(conn)
            .await?;

        match row {
            Some(row) => {
                let guid_str: String = row.get("guid");
                let guid = Uuid::parse_str(&guid_str).map_err(|e| {
                    Error::Internal(format!("Invalid reviewer guid '{}': {}", guid_str, e))
                })?;
                Ok(Some(Reviewer {
                    guid,
                    email: row.get("email"),
                    full_name: row.get("full_name"),
                }))
            }
            None => Ok(None),
        }
    }

    async fn insert_new(&self, conn: &mut SqliteConnection) -> Result<Reviewer> {
        let guid = Uuid::new_v4();
        sqlx::query("INSERT INTO reviewers (guid, email, full_name) VALUES (?, ?, ?)")
            .bind(guid.to_string())
            .bind(self.email)
            .bind(self.full_name)
            .execute(conn)
            .await?;

        tracing::info!(reviewer = self.email, %guid, "Registered new reviewer");

        Ok(Reviewer {
            guid,
            email: self.email.to_string(),
            full_name: self.full_name.to_string(),
        })
    }
}
