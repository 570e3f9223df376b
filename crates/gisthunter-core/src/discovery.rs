// Incremental gist discovery - page through the listing, score, record
use chrono::Utc;
use gisthunter_store::{DiscoveredItem, WorkspaceStore};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    budget::RequestBudget,
    matcher::{ContentProbe, FuzzyScorer, MatchSettings, Scorer},
    models::RemoteItem,
    source::{GistSource, SourceError},
    throttle::{Throttle, ThrottleAction},
    Error, Result,
};

/// Why a discovery run ended - none of these are errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    NoMorePages,
    BudgetExhausted,
    RateLimited,
    ListingFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::NoMorePages => write!(f, "no more pages"),
            StopReason::BudgetExhausted => write!(f, "request budget exhausted"),
            StopReason::RateLimited => write!(f, "rate limited"),
            StopReason::ListingFailed => write!(f, "listing request failed"),
        }
    }
}

/// Summary of one discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Listing requests issued, retries included
    pub requests: u32,
    pub pages: u32,
    /// Every item the listing returned
    pub scanned: usize,
    /// Skipped because an earlier run already handled them
    pub already_seen: usize,
    /// Evaluated and found wanting
    pub rejected: usize,
    /// No usable text at all
    pub discarded_empty: usize,
    /// Skipped after a fetch failure, will be retried next run
    pub failures: usize,
    pub new_matches: usize,
    pub stop_reason: StopReason,
}

/// What evaluating one item came to
enum Verdict {
    Match(Vec<String>),
    NoMatch,
    Empty,
    Failed(SourceError),
}

/// Drives a source page by page and records matches into a workspace
pub struct DiscoveryEngine {
    source: Arc<dyn GistSource>,
    scorer: Box<dyn Scorer>,
    settings: MatchSettings,
    max_rate_limit_wait: Duration,
}

impl DiscoveryEngine {
    pub fn new(source: Arc<dyn GistSource>) -> Self {
        Self {
            source,
            scorer: Box::new(FuzzyScorer::new()),
            settings: MatchSettings::default(),
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_settings(mut self, settings: MatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    /// Run one discovery pass
    ///
    /// Issues at most `max_requests` listing requests, retries included.
    /// Items already recorded in this workspace, or already evaluated by a
    /// search with the same terms and settings, are skipped before any
    /// scoring happens. Rate limits and transient failures end or shorten
    /// the run but never fail it; only store errors and empty term lists
    /// come back as `Err`.
    pub async fn discover(
        &self,
        store: &WorkspaceStore,
        terms: &[String],
        max_requests: u32,
        verbose: bool,
    ) -> Result<DiscoveryReport> {
        let terms = normalize_terms(terms);
        if terms.is_empty() {
            return Err(Error::ConfigError("No search terms given".into()));
        }

        let key = search_key(&terms, &self.settings);
        let mut budget = RequestBudget::new(max_requests);
        let mut throttle = Throttle::new(self.max_rate_limit_wait);
        let mut report = DiscoveryReport::default();
        let mut cursor: Option<String> = None;
        let mut listing_retried = false;

        info!(
            "Scanning public gists for {:?} (budget {} requests)",
            terms, max_requests
        );

        let stop_reason = loop {
            if !budget.try_consume() {
                break StopReason::BudgetExhausted;
            }

            let page = match self.source.list_page(cursor.as_deref()).await {
                Ok(page) => {
                    throttle.on_success();
                    listing_retried = false;
                    page
                }
                Err(SourceError::RateLimited { reset_at }) => {
                    match throttle.on_rate_limited(reset_at, Utc::now()) {
                        ThrottleAction::Wait(wait) => {
                            info!("Rate limited, waiting {:?} before retrying", wait);
                            sleep(wait).await;
                            continue;
                        }
                        ThrottleAction::Stop => {
                            warn!("Rate limited, stopping discovery for this run");
                            break StopReason::RateLimited;
                        }
                    }
                }
                // One more attempt at the same page, paid for like any request
                Err(err @ SourceError::Transient(_)) if !listing_retried => {
                    report_failure(verbose, "listing page, retrying", &err);
                    listing_retried = true;
                    continue;
                }
                Err(err) => {
                    report_failure(verbose, "listing page", &err);
                    break StopReason::ListingFailed;
                }
            };

            report.pages += 1;
            debug!("Page {} has {} gists", report.pages, page.items.len());

            let mut halted = None;
            for item in &page.items {
                if let ControlFlow::Break(reason) = self
                    .evaluate(store, item, &terms, &key, verbose, &mut throttle, &mut report)
                    .await?
                {
                    halted = Some(reason);
                    break;
                }
            }

            if let Some(reason) = halted {
                break reason;
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break StopReason::NoMorePages,
            }
        };

        report.requests = budget.consumed();
        report.stop_reason = stop_reason;

        info!(
            "Scanned {} gists over {} pages, {} new matches ({})",
            report.scanned, report.pages, report.new_matches, report.stop_reason
        );

        Ok(report)
    }

    /// Score one item and persist the outcome
    async fn evaluate(
        &self,
        store: &WorkspaceStore,
        item: &RemoteItem,
        terms: &[String],
        key: &str,
        verbose: bool,
        throttle: &mut Throttle,
        report: &mut DiscoveryReport,
    ) -> Result<ControlFlow<StopReason>> {
        report.scanned += 1;

        if store.has_seen(&item.id)? || store.was_scanned(&item.id, key)? {
            report.already_seen += 1;
            return Ok(ControlFlow::Continue(()));
        }

        match self.judge(item, terms, throttle).await {
            Verdict::Match(matched) => {
                let record = DiscoveredItem::new(
                    item.id.clone(),
                    item.owner.clone(),
                    item.url.clone(),
                    matched,
                );

                if store.record(&record)? {
                    report.new_matches += 1;
                    if verbose {
                        info!("Found matching gist: {}", item.url);
                    }
                }
                store.mark_scanned(&item.id, key)?;
            }
            Verdict::NoMatch => {
                report.rejected += 1;
                store.mark_scanned(&item.id, key)?;
            }
            Verdict::Empty => {
                report.discarded_empty += 1;
                store.mark_scanned(&item.id, key)?;
            }
            Verdict::Failed(SourceError::RateLimited { reset_at }) => {
                report.failures += 1;
                match throttle.on_rate_limited(reset_at, Utc::now()) {
                    ThrottleAction::Wait(wait) => {
                        debug!("Content fetch rate limited, waiting {:?}", wait);
                        sleep(wait).await;
                    }
                    ThrottleAction::Stop => {
                        warn!("Rate limited while fetching content, stopping discovery");
                        return Ok(ControlFlow::Break(StopReason::RateLimited));
                    }
                }
            }
            Verdict::Failed(err) => {
                report.failures += 1;
                report_failure(verbose, &item.url, &err);
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    /// A content fetch that went through also clears a pending throttle
    async fn fetch_content(
        &self,
        remote_id: &str,
        throttle: &mut Throttle,
    ) -> std::result::Result<String, SourceError> {
        let content = self.source.fetch_content(remote_id).await?;
        throttle.on_success();
        Ok(content)
    }

    /// Apply the match policy to one unseen item
    async fn judge(&self, item: &RemoteItem, terms: &[String], throttle: &mut Throttle) -> Verdict {
        let metadata = item.metadata_text();
        let hits = self
            .settings
            .matching_terms(self.scorer.as_ref(), &metadata, terms);
        let metadata_blank = metadata.is_empty();

        let no_hit = || {
            if metadata_blank {
                Verdict::Empty
            } else {
                Verdict::NoMatch
            }
        };

        match self.settings.content_probe {
            ContentProbe::Never => {
                if hits.is_empty() {
                    no_hit()
                } else {
                    Verdict::Match(hits)
                }
            }
            ContentProbe::Verify => {
                if hits.is_empty() {
                    return no_hit();
                }
                if !item.has_content {
                    return Verdict::Empty;
                }

                match self.fetch_content(&item.id, throttle).await {
                    Ok(content) if !content.trim().is_empty() => Verdict::Match(hits),
                    Ok(_) => Verdict::Empty,
                    // Deleted between listing and fetch
                    Err(SourceError::NotFound(_)) => Verdict::Empty,
                    Err(err) => Verdict::Failed(err),
                }
            }
            ContentProbe::OnMiss => {
                if !hits.is_empty() {
                    return Verdict::Match(hits);
                }
                if !item.has_content {
                    return no_hit();
                }

                match self.fetch_content(&item.id, throttle).await {
                    Ok(content) => {
                        let content_hits =
                            self.settings
                                .matching_terms(self.scorer.as_ref(), &content, terms);
                        if !content_hits.is_empty() {
                            Verdict::Match(content_hits)
                        } else if content.trim().is_empty() {
                            no_hit()
                        } else {
                            Verdict::NoMatch
                        }
                    }
                    Err(SourceError::NotFound(_)) => no_hit(),
                    Err(err) => Verdict::Failed(err),
                }
            }
        }
    }
}

/// Identifies a search in the scan log: the same terms (any order, any
/// case) under the same threshold and probe policy give the same key
fn search_key(terms: &[String], settings: &MatchSettings) -> String {
    let mut lowered: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
    lowered.sort();
    lowered.dedup();

    format!(
        "{}|{}|{}",
        lowered.join("\u{1f}"),
        settings.threshold,
        settings.content_probe
    )
}

/// Trim, drop blanks and duplicates, keep the caller's order
fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(terms.len());

    for term in terms {
        let term = term.trim();
        if !term.is_empty() && !cleaned.iter().any(|t| t == term) {
            cleaned.push(term.to_string());
        }
    }

    cleaned
}

/// Transient failures are only worth shouting about in verbose mode
fn report_failure(verbose: bool, what: &str, err: &SourceError) {
    if verbose {
        warn!("Skipping {}: {}", what, err);
    } else {
        debug!("Skipping {}: {}", what, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_terms() {
        let terms = vec![
            " TODO ".to_string(),
            "".to_string(),
            "secret".to_string(),
            "TODO".to_string(),
        ];
        assert_eq!(normalize_terms(&terms), vec!["TODO", "secret"]);
    }

    #[test]
    fn test_search_key_ignores_order_and_case() {
        let settings = MatchSettings::default();
        let a = search_key(&["TODO".to_string(), "secret".to_string()], &settings);
        let b = search_key(&["Secret".to_string(), "todo".to_string()], &settings);
        assert_eq!(a, b);

        let other_terms = search_key(&["FIXME".to_string()], &settings);
        assert_ne!(a, other_terms);

        let stricter = MatchSettings {
            threshold: 90,
            ..settings
        };
        assert_ne!(a, search_key(&["todo".to_string(), "secret".to_string()], &stricter));
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::BudgetExhausted.to_string(), "request budget exhausted");
        assert_eq!(StopReason::default(), StopReason::NoMorePages);
    }
}
