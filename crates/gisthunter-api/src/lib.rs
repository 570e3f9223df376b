// GitHub gist API client
pub mod github;
pub mod retry;

// Re-export common types
pub use github::{
    Gist, GistClient, GistError, GistFile, GistOwner, GistPage, RateLimitStatus,
    DEFAULT_PER_PAGE, GITHUB_API_BASE,
};
pub use retry::RetryConfig;
