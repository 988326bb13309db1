//! Registration URL repair, backed by SQLite.

use crate::{
    models::registration::{RegistrationRecord, UrlField},
    services::storage_service::encode_object_path,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("registration `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Point every record whose `field` contains `old_path` at `new_url`.
    ///
    /// Returns how many rows changed. Re-running with the same arguments
    /// rewrites the same rows to the same value.
    async fn repair_url(
        &self,
        field: UrlField,
        old_path: &str,
        new_url: &str,
    ) -> RepositoryResult<u64>;
}

#[derive(Clone)]
pub struct SqliteRegistrations {
    db: Arc<SqlitePool>,
}

impl SqliteRegistrations {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn insert(
        &self,
        application_id: &str,
        payment_proof_url: Option<&str>,
        payment_receipt_url: Option<&str>,
    ) -> RepositoryResult<RegistrationRecord> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, RegistrationRecord>(
            r#"
            INSERT INTO registrations (
                id, application_id, payment_proof_url, payment_receipt_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, application_id, payment_proof_url, payment_receipt_url,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(payment_proof_url)
        .bind(payment_receipt_url)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;
        Ok(record)
    }

    pub async fn find_by_application_id(
        &self,
        application_id: &str,
    ) -> RepositoryResult<RegistrationRecord> {
        sqlx::query_as::<_, RegistrationRecord>(
            "SELECT id, application_id, payment_proof_url, payment_receipt_url,
                    created_at, updated_at
             FROM registrations WHERE application_id = ?",
        )
        .bind(application_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(application_id.to_string()))
    }
}

#[async_trait]
impl RegistrationRepository for SqliteRegistrations {
    async fn repair_url(
        &self,
        field: UrlField,
        old_path: &str,
        new_url: &str,
    ) -> RepositoryResult<u64> {
        if old_path.is_empty() {
            return Ok(0);
        }
        let column = field.column();
        // instr() is a literal substring test; LIKE would treat `_` as a wildcard.
        let sql = format!(
            "UPDATE registrations SET {column} = ?, updated_at = ?
             WHERE {column} IS NOT NULL AND (instr({column}, ?) > 0 OR instr({column}, ?) > 0)"
        );
        let result = sqlx::query(&sql)
            .bind(new_url)
            .bind(Utc::now())
            .bind(old_path)
            .bind(encode_object_path(old_path))
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
