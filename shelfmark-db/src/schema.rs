use crate::error::DbError;
use crate::pool::DbPool;

/// Schema statements applied in order at startup. Each statement is
/// idempotent so re-running on an existing database is a no-op.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS entries (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        title TEXT,
        description TEXT,
        detailed_description TEXT,
        thumbnail_path TEXT,
        thumbnail_large_path TEXT,
        manual_thumbnail_url TEXT,
        important INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entry_tags (
        entry_id TEXT NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
        tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        PRIMARY KEY (entry_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attachments (
        id TEXT PRIMARY KEY,
        entry_id TEXT NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        original_name TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        storage_path TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        status TEXT NOT NULL,
        entry_id TEXT NOT NULL,
        payload_json TEXT,
        attempts INTEGER NOT NULL DEFAULT 0,
        locked_at TEXT,
        finished_at TEXT,
        last_error TEXT,
        last_response TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_entry ON jobs(entry_id)",
    "CREATE INDEX IF NOT EXISTS idx_attachments_entry ON attachments(entry_id)",
];

/// Apply the embedded schema. Called once at startup before serving.
pub async fn apply_schema(pool: &DbPool) -> Result<(), DbError> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    tracing::debug!(statements = SCHEMA.len(), "database schema applied");
    Ok(())
}
