//! Table layout for the PostgreSQL grant store.
//!
//! The check query filters on liveness first and then on the pattern
//! disjunction, so the composite index leads with `expires_at`. The unique
//! index doubles as the lookup path for exact-triple matches.

use crate::error::Result;
use sqlx::PgPool;
use tracing::info;

pub const CREATE_GRANTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS authz_grants (
    subject     TEXT NOT NULL,
    relation    TEXT NOT NULL,
    entity      TEXT NOT NULL,
    expires_at  TIMESTAMPTZ NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_GRANTS_INDEXES: [&str; 3] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS authz_grants_triple_key \
     ON authz_grants (subject, relation, entity)",
    "CREATE INDEX IF NOT EXISTS authz_grants_expiry_triple_idx \
     ON authz_grants (expires_at, subject, relation, entity)",
    "CREATE INDEX IF NOT EXISTS authz_grants_expiry_idx ON authz_grants (expires_at)",
];

/// Create the grants table and its indexes if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(CREATE_GRANTS_TABLE).execute(pool).await?;
    for statement in CREATE_GRANTS_INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("authz_grants schema is up to date");
    Ok(())
}
