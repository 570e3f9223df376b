use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::RemotePage;

/// Typed failure of a listing or fetch call
///
/// The discovery engine decides what to do per variant: rate limits drive
/// the throttle, everything else skips the item (or ends the listing).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("rate limited")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request failed: {0}")]
    Failed(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Where gists come from - GitHub in production, fixtures in tests
#[async_trait]
pub trait GistSource: Send + Sync {
    /// Fetch one page; `cursor` is the `next` value of the previous page
    async fn list_page(&self, cursor: Option<&str>) -> SourceResult<RemotePage>;

    /// Raw content of every file of a gist
    async fn fetch_content(&self, remote_id: &str) -> SourceResult<String>;
}
