use thiserror::Error;

/// Errors raised while opening the database or running queries.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url is empty")]
    EmptyDatabaseUrl,

    #[error("database file bootstrap failed: {0}")]
    FileCreation(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
