use gisthunter_store::StoreError;
use thiserror::Error;

/// All the ways a Gist Hunter operation can fail
///
/// Rate limits and transient failures during discovery never show up
/// here: the engine absorbs them and reports them in its summary instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to fetch gist {remote_id}: {reason}")]
    FetchFailed { remote_id: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
