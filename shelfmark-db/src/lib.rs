//! SQLite persistence for the Shelfmark backend.
//!
//! Provides the connection pool, the embedded schema, and the entity
//! repositories (entries, tags, attachments) that job handlers read and
//! write through. The job queue itself lives in `shelfmark-job-queue` and
//! shares the pool created here.

mod attachments;
mod entries;
mod error;
mod pool;
mod schema;

pub use attachments::{Attachment, AttachmentKind, AttachmentStore};
pub use entries::{Entry, EntryStore};
pub use error::DbError;
pub use pool::{create_pool, DbConnectionConfig, DbPool};
pub use schema::apply_schema;

/// Current UTC instant as the RFC3339 string stored in timestamp columns.
#[inline]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
