use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Similarity between a text and a search term, 0 (nothing) to 100 (exact)
///
/// The engine only sees this trait, so a typo-tolerant scorer can be
/// plugged in with `DiscoveryEngine::with_scorer`.
pub trait Scorer: Send + Sync {
    fn score(&self, text: &str, term: &str) -> u8;
}

/// Skim-style fuzzy scorer
///
/// The term has to appear in the text as a (case-insensitive) subsequence.
/// The similarity is how tightly packed that subsequence is: a contiguous
/// hit scores 100, a term whose 4 characters are spread over 8 scores 50.
///
/// Matching is subsequence-only. Extra characters between the term's
/// letters are tolerated, but transposed or missing ones are not:
/// "passwrod" never matches "password".
pub struct FuzzyScorer {
    matcher: SkimMatcherV2,
}

impl FuzzyScorer {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default().ignore_case(),
        }
    }
}

impl Default for FuzzyScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for FuzzyScorer {
    fn score(&self, text: &str, term: &str) -> u8 {
        let term = term.trim();
        if term.is_empty() || text.trim().is_empty() {
            return 0;
        }

        let Some((_, indices)) = self.matcher.fuzzy_indices(text, term) else {
            return 0;
        };

        match (indices.first(), indices.last()) {
            (Some(&first), Some(&last)) => {
                let span = last - first + 1;
                ((indices.len() * 100) / span).min(100) as u8
            }
            _ => 0,
        }
    }
}

/// When gist contents get downloaded during discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentProbe {
    /// Metadata decides alone
    Never,
    /// A metadata match must be backed by non-empty content
    #[default]
    Verify,
    /// Content is scored too when metadata did not match
    OnMiss,
}

impl FromStr for ContentProbe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(ContentProbe::Never),
            "verify" => Ok(ContentProbe::Verify),
            "on-miss" | "on_miss" => Ok(ContentProbe::OnMiss),
            other => Err(format!(
                "unknown content probe '{}', expected never, verify or on-miss",
                other
            )),
        }
    }
}

impl std::fmt::Display for ContentProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentProbe::Never => write!(f, "never"),
            ContentProbe::Verify => write!(f, "verify"),
            ContentProbe::OnMiss => write!(f, "on-miss"),
        }
    }
}

/// Tunables for deciding what counts as a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSettings {
    /// Minimum similarity (0-100) a term needs to count as present
    pub threshold: u8,
    pub content_probe: ContentProbe,
}

pub const DEFAULT_THRESHOLD: u8 = 50;

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            content_probe: ContentProbe::default(),
        }
    }
}

impl MatchSettings {
    /// Terms whose similarity with `text` reaches the threshold
    pub fn matching_terms(&self, scorer: &dyn Scorer, text: &str, terms: &[String]) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        terms
            .iter()
            .filter(|term| scorer.score(text, term) >= self.threshold)
            .cloned()
            .collect()
    }
}
