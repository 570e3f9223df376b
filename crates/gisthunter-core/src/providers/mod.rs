// Source implementations backed by real APIs
pub mod github;

pub use github::GitHubGistSource;
