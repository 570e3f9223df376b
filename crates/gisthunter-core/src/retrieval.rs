// Read-back operations over a workspace: listing and fetching matches
use gisthunter_store::{StoreError, WorkspaceStore};
use tracing::info;

use crate::{source::GistSource, Error, Result};

/// One line of `--list-discovered`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// 1-based, stable across runs
    pub index: usize,
    pub url: String,
    pub seen: bool,
}

impl std::fmt::Display for ListingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.index, self.url)
    }
}

/// Every match in the workspace, numbered in discovery order
pub fn list_discovered(store: &WorkspaceStore) -> Result<Vec<ListingEntry>> {
    let entries = store
        .list()?
        .into_iter()
        .enumerate()
        .map(|(i, item)| ListingEntry {
            index: i + 1,
            url: item.url,
            seen: item.seen,
        })
        .collect();

    Ok(entries)
}

/// Turn a `--fetch` argument into a listing index
///
/// A number inside the listing is an index. Anything else, including old
/// all-digit gist ids past the end of the listing, is looked up as a remote id.
pub fn resolve_selector(store: &WorkspaceStore, selector: &str) -> Result<usize> {
    let selector = selector.trim();
    let as_index = selector.parse::<usize>().ok();
    let len = store.count()?;

    if let Some(index) = as_index.filter(|i| (1..=len).contains(i)) {
        return Ok(index);
    }

    if let Some(index) = store.index_of(selector)? {
        return Ok(index);
    }

    Err(match as_index {
        Some(index) => StoreError::OutOfRange { index, len },
        None => StoreError::UnknownItem(selector.to_string()),
    }
    .into())
}

/// Raw content of the match at `index`
///
/// Any failure is returned, never swallowed: the user asked for this gist
/// by number. A successful fetch flags the item as seen.
pub async fn fetch(store: &WorkspaceStore, source: &dyn GistSource, index: usize) -> Result<String> {
    let item = store.get(index)?;
    info!("Fetching gist {} ({})", item.remote_id, item.url);

    let content = source
        .fetch_content(&item.remote_id)
        .await
        .map_err(|e| Error::FetchFailed {
            remote_id: item.remote_id.clone(),
            reason: e.to_string(),
        })?;

    if content.trim().is_empty() {
        return Err(Error::FetchFailed {
            remote_id: item.remote_id,
            reason: "gist has no content".to_string(),
        });
    }

    store.mark_seen(index)?;
    Ok(content)
}
