use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Stored row could not be decoded: {0}")]
    Corrupt(String),

    #[error("The requested record was not found: {0}")]
    NotFound(String),
}
