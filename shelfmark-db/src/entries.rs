use sqlx::types::Uuid;

use crate::error::DbError;
use crate::now_rfc3339;
use crate::pool::DbPool;

/// A bookmark entry with its ordered tag list.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Entry {
    pub id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub detailed_description: Option<String>,
    pub thumbnail_path: Option<String>,
    pub thumbnail_large_path: Option<String>,
    pub manual_thumbnail_url: Option<String>,
    pub important: bool,
    pub created_at: String,
    pub updated_at: String,
    pub tags: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    url: String,
    title: Option<String>,
    description: Option<String>,
    detailed_description: Option<String>,
    thumbnail_path: Option<String>,
    thumbnail_large_path: Option<String>,
    manual_thumbnail_url: Option<String>,
    important: i64,
    created_at: String,
    updated_at: String,
}

impl EntryRow {
    fn into_entry(self, tags: Vec<String>) -> Entry {
        Entry {
            id: self.id,
            url: self.url,
            title: self.title,
            description: self.description,
            detailed_description: self.detailed_description,
            thumbnail_path: self.thumbnail_path,
            thumbnail_large_path: self.thumbnail_large_path,
            manual_thumbnail_url: self.manual_thumbnail_url,
            important: self.important != 0,
            created_at: self.created_at,
            updated_at: self.updated_at,
            tags,
        }
    }
}

const ENTRY_COLUMNS: &str = "id, url, title, description, detailed_description, thumbnail_path, \
     thumbnail_large_path, manual_thumbnail_url, important, created_at, updated_at";

/// Repository for bookmark entries and their tags.
#[derive(Clone)]
pub struct EntryStore {
    pool: DbPool,
}

impl EntryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        url: &str,
        title: Option<&str>,
        description: Option<&str>,
        important: bool,
    ) -> Result<Entry, DbError> {
        let id = Uuid::new_v4();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO entries (id, url, title, description, important, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(url)
        .bind(title)
        .bind(description)
        .bind(important as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Entry>, DbError> {
        let row: Option<EntryRow> =
            sqlx::query_as(&format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let tags = self.tags_for_entry(id).await?;
        Ok(Some(row.into_entry(tags)))
    }

    /// Partial update of the core text fields. `None` leaves a column
    /// unchanged; updating a field to empty is expressed with `Some("")`.
    pub async fn update_core(
        &self,
        id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
        detailed_description: Option<&str>,
        important: Option<bool>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE entries SET \
               title = COALESCE(?, title), \
               description = COALESCE(?, description), \
               detailed_description = COALESCE(?, detailed_description), \
               important = COALESCE(?, important), \
               updated_at = ? \
             WHERE id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(detailed_description)
        .bind(important.map(|b| b as i64))
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_thumbnail_paths(
        &self,
        id: Uuid,
        thumbnail_path: &str,
        thumbnail_large_path: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE entries SET thumbnail_path = ?, thumbnail_large_path = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(thumbnail_path)
        .bind(thumbnail_large_path)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the entry's tag set with the given ordered names. Tag rows
    /// are created on demand; names are stored as-is (callers normalize).
    pub async fn replace_tags(&self, id: Uuid, tags: &[String]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entry_tags WHERE entry_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (position, name) in tags.iter().enumerate() {
            let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
            let tag_id = match existing {
                Some(tag_id) => tag_id,
                None => {
                    let tag_id = Uuid::new_v4();
                    sqlx::query("INSERT INTO tags (id, name) VALUES (?, ?)")
                        .bind(tag_id)
                        .bind(name)
                        .execute(&mut *tx)
                        .await?;
                    tag_id
                }
            };
            sqlx::query("INSERT INTO entry_tags (entry_id, tag_id, position) VALUES (?, ?, ?)")
                .bind(id)
                .bind(tag_id)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE entries SET updated_at = ? WHERE id = ?")
            .bind(now_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn tags_for_entry(&self, id: Uuid) -> Result<Vec<String>, DbError> {
        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT t.name FROM tags t \
             INNER JOIN entry_tags et ON et.tag_id = t.id \
             WHERE et.entry_id = ? \
             ORDER BY et.position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_pool, DbConnectionConfig};
    use crate::schema::apply_schema;

    async fn test_store() -> EntryStore {
        // One connection keeps the in-memory database shared across queries.
        let mut cfg = DbConnectionConfig::new("sqlite::memory:");
        cfg.max_connections = 1;
        let pool = create_pool(&cfg).await.expect("pool");
        apply_schema(&pool).await.expect("schema");
        EntryStore::new(pool)
    }

    #[tokio::test]
    async fn create_and_fetch_roundtrip() {
        let store = test_store().await;
        let entry = store
            .create("https://example.com", Some("Example"), None, false)
            .await
            .expect("create");
        let fetched = store.get_by_id(entry.id).await.expect("get").expect("some");
        assert_eq!(fetched.url, "https://example.com");
        assert_eq!(fetched.title.as_deref(), Some("Example"));
        assert!(fetched.tags.is_empty());
    }

    #[tokio::test]
    async fn update_core_only_touches_given_fields() {
        let store = test_store().await;
        let entry = store
            .create("https://example.com", Some("Keep me"), None, false)
            .await
            .expect("create");

        store
            .update_core(entry.id, None, Some("new description"), None, None)
            .await
            .expect("update");

        let fetched = store.get_by_id(entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Keep me"));
        assert_eq!(fetched.description.as_deref(), Some("new description"));
    }

    #[tokio::test]
    async fn replace_tags_preserves_order_and_reuses_names() {
        let store = test_store().await;
        let a = store
            .create("https://a.example", None, None, false)
            .await
            .unwrap();
        let b = store
            .create("https://b.example", None, None, false)
            .await
            .unwrap();

        store
            .replace_tags(a.id, &["music".into(), "youtube".into()])
            .await
            .unwrap();
        store
            .replace_tags(b.id, &["youtube".into()])
            .await
            .unwrap();

        let a = store.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(a.tags, vec!["music", "youtube"]);

        store
            .replace_tags(a.id, &["coding".into()])
            .await
            .unwrap();
        let a = store.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(a.tags, vec!["coding"]);

        // Shared tag row is untouched by the other entry's replace.
        let b = store.get_by_id(b.id).await.unwrap().unwrap();
        assert_eq!(b.tags, vec!["youtube"]);
    }
}
