#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gisthunter_core::{GistSource, RemoteItem, RemotePage, SourceError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

/// File names of the 12-gist fixture; only #3 and #7 mention "todo"
pub const FIXTURE_FILES: [&str; 12] = [
    "hello.rs",
    "main.py",
    "TODO.md",
    "config.yaml",
    "index.js",
    "readme.md",
    "todo-list.txt",
    "build.sh",
    "query.sql",
    "makefile",
    "alias.zsh",
    "notes.json",
];

pub fn gist(n: usize, file: &str) -> RemoteItem {
    RemoteItem {
        id: format!("gist-{}", n),
        owner: Some(format!("user{}", n)),
        url: format!("https://gist.github.com/gist-{}", n),
        description: None,
        file_names: vec![file.to_string()],
        has_content: true,
    }
}

/// The standard fixture: 12 gists, 3 per page, content for the two matches
pub fn twelve_gists() -> FixtureSource {
    let items: Vec<RemoteItem> = FIXTURE_FILES
        .iter()
        .enumerate()
        .map(|(i, file)| gist(i + 1, file))
        .collect();

    FixtureSource::new(items.chunks(3).map(|c| c.to_vec()).collect())
        .with_content("gist-3", "- [ ] write the tests\n- [ ] ship it")
        .with_content("gist-7", "buy milk")
}

/// In-memory listing with scripted failures and call counters
pub struct FixtureSource {
    pages: Vec<Vec<RemoteItem>>,
    contents: HashMap<String, String>,
    failing: HashSet<String>,
    rate_limited_fetches: HashMap<String, Option<DateTime<Utc>>>,
    rate_limited_calls: HashSet<u32>,
    flaky_calls: HashSet<u32>,
    list_calls: AtomicU32,
    fetch_calls: AtomicU32,
}

impl FixtureSource {
    pub fn new(pages: Vec<Vec<RemoteItem>>) -> Self {
        Self {
            pages,
            contents: HashMap::new(),
            failing: HashSet::new(),
            rate_limited_fetches: HashMap::new(),
            rate_limited_calls: HashSet::new(),
            flaky_calls: HashSet::new(),
            list_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
        }
    }

    pub fn with_content(mut self, id: &str, content: &str) -> Self {
        self.contents.insert(id.to_string(), content.to_string());
        self
    }

    /// Fetching this id times out
    pub fn with_failing_fetch(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Fetching this id is rate limited, with a reset that already passed
    pub fn with_rate_limited_fetch(mut self, id: &str) -> Self {
        self.rate_limited_fetches
            .insert(id.to_string(), Some(Utc::now() - chrono::Duration::seconds(1)));
        self
    }

    /// Fetching this id is rate limited with no known reset
    pub fn with_blocked_fetch(mut self, id: &str) -> Self {
        self.rate_limited_fetches.insert(id.to_string(), None);
        self
    }

    /// The n-th listing call (1-based) fails with a server error
    pub fn with_flaky_listing_on_call(mut self, call: u32) -> Self {
        self.flaky_calls.insert(call);
        self
    }

    /// The n-th listing call (1-based) answers with a rate limit that has
    /// already reset
    pub fn with_rate_limit_on_call(mut self, call: u32) -> Self {
        self.rate_limited_calls.insert(call);
        self
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GistSource for FixtureSource {
    async fn list_page(&self, cursor: Option<&str>) -> Result<RemotePage, SourceError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.rate_limited_calls.contains(&call) {
            return Err(SourceError::RateLimited {
                reset_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            });
        }

        if self.flaky_calls.contains(&call) {
            return Err(SourceError::Transient("502 Bad Gateway".to_string()));
        }

        let index = match cursor {
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| SourceError::Failed(format!("bad cursor {}", c)))?,
            None => 0,
        };

        let items = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));

        Ok(RemotePage { items, next })
    }

    async fn fetch_content(&self, remote_id: &str) -> Result<String, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reset_at) = self.rate_limited_fetches.get(remote_id) {
            return Err(SourceError::RateLimited {
                reset_at: *reset_at,
            });
        }

        if self.failing.contains(remote_id) {
            return Err(SourceError::Transient("operation timed out".to_string()));
        }

        self.contents
            .get(remote_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(remote_id.to_string()))
    }
}
