use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named search campaign and the file that holds its log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// A remote gist that matched at least one search term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub remote_id: String,
    pub owner: Option<String>,
    pub url: String,
    pub matched_terms: Vec<String>,
    pub discovered_at: DateTime<Utc>,
    /// Set once the content has been pulled with `--fetch`
    pub seen: bool,
}

impl DiscoveredItem {
    pub fn new(
        remote_id: impl Into<String>,
        owner: Option<String>,
        url: impl Into<String>,
        matched_terms: Vec<String>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            owner,
            url: url.into(),
            matched_terms,
            discovered_at: Utc::now(),
            seen: false,
        }
    }
}
