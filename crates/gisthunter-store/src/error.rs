use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Workspace '{0}' already exists")]
    AlreadyExists(String),

    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("No discovered gist at index {index} (workspace holds {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("No discovered gist with id '{0}'")]
    UnknownItem(String),

    #[error("Invalid workspace name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
