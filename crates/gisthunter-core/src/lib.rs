// Core business logic - discovery, matching and the read-back façade
pub mod budget;
pub mod config;
pub mod discovery;
pub mod error;
pub mod matcher;
pub mod models;
pub mod providers;
pub mod retrieval;
pub mod source;
pub mod throttle;

pub use budget::RequestBudget;
pub use config::Config;
pub use discovery::{DiscoveryEngine, DiscoveryReport, StopReason};
pub use error::Error;
pub use matcher::{ContentProbe, FuzzyScorer, MatchSettings, Scorer};
pub use models::{RemoteItem, RemotePage};
pub use providers::GitHubGistSource;
pub use retrieval::ListingEntry;
pub use source::{GistSource, SourceError};
pub use throttle::{Throttle, ThrottleAction, ThrottleState};

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
