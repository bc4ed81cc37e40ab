//! PostgreSQL-backed grant store
//!
//! Grants live in a single `authz_grants` table (see [`crate::schema`]).
//! Wildcard fields are stored as the empty string so the unique index over
//! (subject, relation, entity) treats them as ordinary values.

use crate::{
    error::{GrantError, Result},
    models::*,
    repository::{GrantStore, GrantTransaction},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::debug;

/// SQLSTATEs after which a create transaction may simply be re-run:
/// serialization_failure, deadlock_detected and unique_violation (a racing
/// insert of the same triple).
const RETRYABLE_SQLSTATES: [&str; 3] = ["40001", "40P01", "23505"];

const SELECT_GRANT: &str =
    "SELECT subject, relation, entity, expires_at, created_at FROM authz_grants WHERE ";

/// PostgreSQL-backed grant store
#[derive(Clone)]
pub struct PostgresGrantStore {
    pool: PgPool,
}

impl PostgresGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create with connection string
    pub async fn from_connection_string(connection_string: &str) -> Result<Self> {
        let pool = PgPool::connect(connection_string).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `(expires_at IS NULL OR expires_at > now) AND (p1 OR p2 ...)`, first row only.
fn check_query(query: &CheckQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_GRANT);
    builder.push("(expires_at IS NULL OR expires_at > ");
    builder.push_bind(query.now);
    builder.push(") AND (");
    for (i, pattern) in query.patterns.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder.push("(subject = ");
        builder.push_bind(pattern.subject.as_stored().to_owned());
        builder.push(" AND relation = ");
        builder.push_bind(pattern.relation.as_stored().to_owned());
        builder.push(" AND entity = ");
        builder.push_bind(pattern.entity.as_stored().to_owned());
        builder.push(")");
    }
    builder.push(") LIMIT 1");
    builder
}

fn revoke_query(filter: &RevokeFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("DELETE FROM authz_grants WHERE ");
    let columns = [
        ("subject", &filter.subject),
        ("relation", &filter.relation),
        ("entity", &filter.entity),
    ];
    let mut first = true;
    for (column, value) in columns {
        if let Some(value) = value {
            if !first {
                builder.push(" AND ");
            }
            builder.push(column);
            builder.push(" = ");
            builder.push_bind(value.as_stored().to_owned());
            first = false;
        }
    }
    builder
}

/// Errors raised inside a create transaction.
fn transaction_error(err: sqlx::Error) -> GrantError {
    if let sqlx::Error::Database(db) = &err {
        let retryable = db
            .code()
            .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&&*code));
        if retryable {
            return GrantError::SerializationConflict(db.message().to_string());
        }
    }
    GrantError::Database(err)
}

fn grant_from_row(row: &PgRow) -> Result<Grant> {
    Ok(Grant {
        subject: GrantField::from_stored(row.try_get("subject")?),
        relation: GrantField::from_stored(row.try_get("relation")?),
        entity: GrantField::from_stored(row.try_get("entity")?),
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl GrantStore for PostgresGrantStore {
    async fn begin_serializable(&self) -> Result<Box<dyn GrantTransaction>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(transaction_error)?;
        Ok(Box::new(PostgresGrantTransaction { tx: Some(tx) }))
    }

    async fn find_live(&self, query: &CheckQuery) -> Result<Option<Grant>> {
        debug!("Checking {} patterns at {}", query.patterns.len(), query.now);
        let row = check_query(query).build().fetch_optional(&self.pool).await?;
        row.as_ref().map(grant_from_row).transpose()
    }

    async fn delete_matching(&self, filter: &RevokeFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(GrantError::invalid("refusing to delete without a filter"));
        }
        let result = revoke_query(filter).build().execute(&self.pool).await?;
        debug!("Deleted {} rows matching filter", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM authz_grants WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Wraps a sqlx transaction; sqlx rolls back on drop if it was never committed.
pub struct PostgresGrantTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresGrantTransaction {
    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| GrantError::StorageError("transaction already finished".to_string()))
    }
}

#[async_trait]
impl GrantTransaction for PostgresGrantTransaction {
    async fn find_live(&mut self, query: &CheckQuery) -> Result<Option<Grant>> {
        let tx = self.open()?;
        let row = check_query(query)
            .build()
            .fetch_optional(&mut **tx)
            .await
            .map_err(transaction_error)?;
        row.as_ref().map(grant_from_row).transpose()
    }

    async fn delete_stale(&mut self, triple: &GrantPattern, now: DateTime<Utc>) -> Result<u64> {
        let tx = self.open()?;
        let result = sqlx::query(
            r#"
            DELETE FROM authz_grants
            WHERE subject = $1
              AND relation = $2
              AND entity = $3
              AND expires_at IS NOT NULL
              AND expires_at <= $4
            "#,
        )
        .bind(triple.subject.as_stored())
        .bind(triple.relation.as_stored())
        .bind(triple.entity.as_stored())
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(transaction_error)?;
        Ok(result.rows_affected())
    }

    async fn insert(&mut self, grant: &Grant) -> Result<()> {
        let tx = self.open()?;
        sqlx::query(
            r#"
            INSERT INTO authz_grants (subject, relation, entity, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(grant.subject.as_stored())
        .bind(grant.relation.as_stored())
        .bind(grant.entity.as_stored())
        .bind(grant.expires_at)
        .bind(grant.created_at)
        .execute(&mut **tx)
        .await
        .map_err(transaction_error)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| GrantError::StorageError("transaction already finished".to_string()))?;
        tx.commit().await.map_err(transaction_error)?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
