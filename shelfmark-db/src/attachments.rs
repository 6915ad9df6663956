use sqlx::types::Uuid;

use crate::error::DbError;
use crate::now_rfc3339;
use crate::pool::DbPool;

/// What an attachment contributes to enrichment: inline image bytes,
/// extracted document text, or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttachmentKind {
    Image,
    Text,
    Other,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Text => "TEXT",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "IMAGE" => Self::Image,
            "TEXT" => Self::Text,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Attachment {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub kind: AttachmentKind,
    pub original_name: String,
    pub mime_type: String,
    pub storage_path: String,
    pub created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    entry_id: Uuid,
    kind: String,
    original_name: String,
    mime_type: String,
    storage_path: String,
    created_at: String,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row.id,
            entry_id: row.entry_id,
            kind: AttachmentKind::parse(&row.kind),
            original_name: row.original_name,
            mime_type: row.mime_type,
            storage_path: row.storage_path,
            created_at: row.created_at,
        }
    }
}

/// Repository for per-entry attachments.
#[derive(Clone)]
pub struct AttachmentStore {
    pool: DbPool,
}

impl AttachmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn add(
        &self,
        entry_id: Uuid,
        kind: AttachmentKind,
        original_name: &str,
        mime_type: &str,
        storage_path: &str,
    ) -> Result<Attachment, DbError> {
        let id = Uuid::new_v4();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO attachments (id, entry_id, kind, original_name, mime_type, storage_path, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(entry_id)
        .bind(kind.as_str())
        .bind(original_name)
        .bind(mime_type)
        .bind(storage_path)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Attachment {
            id,
            entry_id,
            kind,
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
            storage_path: storage_path.to_string(),
            created_at: now,
        })
    }

    pub async fn list_for_entry(&self, entry_id: Uuid) -> Result<Vec<Attachment>, DbError> {
        let rows: Vec<AttachmentRow> = sqlx::query_as(
            "SELECT id, entry_id, kind, original_name, mime_type, storage_path, created_at \
             FROM attachments WHERE entry_id = ? ORDER BY created_at ASC",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntryStore;
    use crate::pool::{create_pool, DbConnectionConfig};
    use crate::schema::apply_schema;

    #[tokio::test]
    async fn add_and_list() {
        let mut cfg = DbConnectionConfig::new("sqlite::memory:");
        cfg.max_connections = 1;
        let pool = create_pool(&cfg).await.expect("pool");
        apply_schema(&pool).await.expect("schema");
        let entries = EntryStore::new(pool.clone());
        let store = AttachmentStore::new(pool);

        let entry = entries
            .create("https://example.com", None, None, false)
            .await
            .unwrap();
        store
            .add(entry.id, AttachmentKind::Image, "photo.png", "image/png", "files/x/photo.png")
            .await
            .unwrap();

        let listed = store.list_for_entry(entry.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, AttachmentKind::Image);
        assert_eq!(listed[0].original_name, "photo.png");
    }
}
