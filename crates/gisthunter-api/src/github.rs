use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::retry::{is_retryable_status, with_retry, RetryConfig};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Page size GitHub uses when none is requested
pub const DEFAULT_PER_PAGE: u32 = 30;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum GistError {
    #[error("API request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Rate limit exceeded")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Gist not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Parse(#[from] serde_json::Error),
}

impl GistError {
    /// Failures that might go away on their own: timeouts, dropped
    /// connections, garbage bodies and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            GistError::Network(_) | GistError::Parse(_) => true,
            GistError::RequestFailed { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GistError>;

/// One page of the public gist timeline
#[derive(Debug, Clone)]
pub struct GistPage {
    pub gists: Vec<Gist>,
    /// Absolute URL of the following page, taken from the `Link` header
    pub next: Option<String>,
}

pub struct GistClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
    retry_config: RetryConfig,
    /// Listing calls are metered by the caller, so they default to no retries
    listing_retry: RetryConfig,
}

impl GistClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_BASE.to_string())
    }

    /// For GitHub Enterprise or a local mock server
    pub fn with_base_url(token: Option<String>, base_url: String) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("GistHunter/0.1.0"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
            listing_retry: RetryConfig::none(),
        })
    }

    /// Swap the retry policy for single-gist, raw and rate-limit calls
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Retry policy for `list_public`
    ///
    /// Every attempt is a separate HTTP request, so a caller enforcing a
    /// request budget should leave this at `RetryConfig::none()`.
    pub fn with_listing_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.listing_retry = retry_config;
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);

        if let Some(ref token) = self.token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("token {}", token));
        }

        request
    }

    /// Send a request and turn every non-2xx status into a typed error
    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if let Some(limited) = rate_limit_signal(status, response.headers()) {
            return Err(limited);
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GistError::NotFound(what.to_string()));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GistError::AuthRequired);
        }

        let body = response.text().await.unwrap_or_default();
        Err(GistError::RequestFailed {
            status: status.as_u16(),
            message: body,
        })
    }

    /// Fetch one page of public gists
    ///
    /// `cursor` is the `next` URL of a previous page; `None` starts from the
    /// newest gists. One call is one HTTP request unless a listing retry
    /// policy was set.
    pub async fn list_public(&self, cursor: Option<&str>, per_page: u32) -> Result<GistPage> {
        let first_page = format!("{}/gists/public", self.base_url);

        with_retry(&self.listing_retry, GistError::is_transient, || async {
            let request = match cursor {
                Some(next) => self.get(next),
                None => self
                    .get(&first_page)
                    .query(&[("per_page", per_page.to_string())]),
            };

            let response = self.send(request, "public gists").await?;

            let next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_next_link);

            let body = response.text().await?;
            let gists: Vec<Gist> = serde_json::from_str(&body)?;
            debug!("Fetched {} gists, next page: {:?}", gists.len(), next);

            Ok(GistPage { gists, next })
        })
        .await
    }

    /// Get a single gist, including (possibly truncated) file contents
    pub async fn get_gist(&self, id: &str) -> Result<Gist> {
        let url = format!("{}/gists/{}", self.base_url, id);

        with_retry(&self.retry_config, GistError::is_transient, || async {
            let response = self.send(self.get(&url), id).await?;
            let body = response.text().await?;
            let gist: Gist = serde_json::from_str(&body)?;
            Ok(gist)
        })
        .await
    }

    /// Raw text of a file, used when the API truncated its inline content
    pub async fn get_raw(&self, raw_url: &str) -> Result<String> {
        with_retry(&self.retry_config, GistError::is_transient, || async {
            let response = self.send(self.get(raw_url), raw_url).await?;
            Ok(response.text().await?)
        })
        .await
    }

    /// All file contents of a gist, joined with newlines in file name order
    pub async fn fetch_content(&self, id: &str) -> Result<String> {
        let gist = self.get_gist(id).await?;
        let mut parts = Vec::with_capacity(gist.files.len());

        for file in gist.files.values() {
            let text = match (&file.content, &file.raw_url) {
                (Some(content), _) if !file.truncated => content.clone(),
                (_, Some(raw_url)) => self.get_raw(raw_url).await?,
                (Some(content), None) => content.clone(),
                (None, None) => continue,
            };
            parts.push(text);
        }

        Ok(parts.join("\n"))
    }

    /// Current core rate limit for the configured token
    pub async fn rate_limit(&self) -> Result<RateLimitStatus> {
        let url = format!("{}/rate_limit", self.base_url);

        with_retry(&self.retry_config, GistError::is_transient, || async {
            let response = self.send(self.get(&url), "rate limit").await?;
            let body = response.text().await?;
            let parsed: RateLimitResponse = serde_json::from_str(&body)?;
            Ok(parsed.rate)
        })
        .await
    }
}

/// Decide whether a failed response is GitHub telling us to slow down
///
/// Primary limits come back as 403 with `x-ratelimit-remaining: 0`,
/// secondary limits as 403/429 with `retry-after`.
fn rate_limit_signal(
    status: reqwest::StatusCode,
    headers: &reqwest::header::HeaderMap,
) -> Option<GistError> {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    let exhausted = header_u64("x-ratelimit-remaining") == Some(0);
    let retry_after = header_u64("retry-after");

    let limited = status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || (status == reqwest::StatusCode::FORBIDDEN && (exhausted || retry_after.is_some()));

    if !limited {
        return None;
    }

    let reset_at = match retry_after {
        Some(secs) => Some(Utc::now() + chrono::Duration::seconds(secs as i64)),
        None => header_u64("x-ratelimit-reset")
            .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single()),
    };

    Some(GistError::RateLimited { reset_at })
}

/// Pull the `rel="next"` target out of a `Link` header
pub(crate) fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|s| s.trim() == r#"rel="next""#);

        if is_next {
            Some(
                target
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            )
        } else {
            None
        }
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gist {
    pub id: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<GistOwner>,
    #[serde(default)]
    pub files: BTreeMap<String, GistFile>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Gist {
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(key, file)| {
            if file.filename.is_empty() {
                key.as_str()
            } else {
                file.filename.as_str()
            }
        })
    }

    pub fn owner_login(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.login.as_str())
    }

    /// At least one file reports a non-zero size
    pub fn has_sized_files(&self) -> bool {
        self.files.values().any(|f| f.size > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GistOwner {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GistFile {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub raw_url: Option<String>,
    /// Only present on the single-gist endpoint
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    rate: RateLimitStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    #[serde(default)]
    pub used: u32,
    #[serde(rename = "reset", with = "chrono::serde::ts_seconds")]
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> GistClient {
        GistClient::with_base_url(token.map(String::from), server.uri())
            .unwrap()
            .with_retry_config(RetryConfig::none())
    }

    fn gist_json(id: &str, filename: &str, size: u64) -> serde_json::Value {
        let mut files = serde_json::Map::new();
        files.insert(
            filename.to_string(),
            json!({
                "filename": filename,
                "size": size,
                "raw_url": format!("https://gist.githubusercontent.com/raw/{}", id)
            }),
        );

        json!({
            "id": id,
            "html_url": format!("https://gist.github.com/{}", id),
            "description": null,
            "owner": { "login": "octocat" },
            "files": files,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_parse_next_link() {
        let header = r#"<https://api.github.com/gists/public?page=2>; rel="next", <https://api.github.com/gists/public?page=100>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/gists/public?page=2")
        );

        let last_page = r#"<https://api.github.com/gists/public?page=1>; rel="prev", <https://api.github.com/gists/public?page=1>; rel="first""#;
        assert_eq!(parse_next_link(last_page), None);
    }

    #[test]
    fn test_transient_classification() {
        let server_error = GistError::RequestFailed {
            status: 502,
            message: String::new(),
        };
        let forbidden = GistError::RequestFailed {
            status: 403,
            message: String::new(),
        };

        assert!(server_error.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!GistError::RateLimited { reset_at: None }.is_transient());
        assert!(!GistError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn test_gist_helpers() {
        let gist: Gist = serde_json::from_value(gist_json("abc", "notes.md", 0)).unwrap();
        assert_eq!(gist.file_names().collect::<Vec<_>>(), vec!["notes.md"]);
        assert_eq!(gist.owner_login(), Some("octocat"));
        assert!(!gist.has_sized_files());
    }

    #[tokio::test]
    async fn test_list_public_follows_link_header() {
        let server = MockServer::start().await;
        let next = format!("{}/gists/public?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/gists/public"))
            .and(query_param("per_page", "2"))
            .and(header("authorization", "token secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([gist_json("a1", "a.rs", 10), gist_json("a2", "b.rs", 5)]))
                    .insert_header("link", format!(r#"<{}>; rel="next""#, next).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/gists/public"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([gist_json("a3", "c.rs", 1)])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));

        let first = client.list_public(None, 2).await.unwrap();
        assert_eq!(first.gists.len(), 2);
        assert_eq!(first.next.as_deref(), Some(next.as_str()));

        let second = client.list_public(first.next.as_deref(), 2).await.unwrap();
        assert_eq!(second.gists[0].id, "a3");
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_is_typed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gists/public"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "1700000000"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.list_public(None, 30).await.unwrap_err();

        match err {
            GistError::RateLimited { reset_at } => {
                assert_eq!(reset_at.map(|t| t.timestamp()), Some(1_700_000_000));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_forbidden_is_not_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gists/public"))
            .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.list_public(None, 30).await.unwrap_err();
        assert!(matches!(err, GistError::RequestFailed { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_malformed_page_is_parse_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gists/public"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.list_public(None, 30).await.unwrap_err();
        assert!(matches!(err, GistError::Parse(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_listing_is_one_request_by_default() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gists/public"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        // Default retry policy, unlike client_for
        let client = GistClient::with_base_url(None, server.uri()).unwrap();
        let err = client.list_public(None, 30).await.unwrap_err();

        assert!(matches!(err, GistError::RequestFailed { status: 502, .. }));
        assert!(err.is_transient());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_retry_is_opt_in() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gists/public"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let client = GistClient::with_base_url(None, server.uri())
            .unwrap()
            .with_listing_retry_config(RetryConfig {
                max_retries: 1,
                initial_delay_ms: 1,
                ..RetryConfig::default()
            });

        assert!(client.list_public(None, 30).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_content_reads_truncated_files_from_raw_url() {
        let server = MockServer::start().await;
        let raw_url = format!("{}/raw/big.txt", server.uri());

        Mock::given(method("GET"))
            .and(path("/gists/g1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "g1",
                "html_url": "https://gist.github.com/g1",
                "files": {
                    "a.txt": { "filename": "a.txt", "size": 5, "content": "alpha", "truncated": false },
                    "big.txt": {
                        "filename": "big.txt",
                        "size": 900000,
                        "content": "trunc",
                        "truncated": true,
                        "raw_url": raw_url
                    }
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/raw/big.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("the whole file"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let content = client.fetch_content("g1").await.unwrap();
        assert_eq!(content, "alpha\nthe whole file");
    }

    #[tokio::test]
    async fn test_missing_gist_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gists/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.get_gist("missing").await.unwrap_err();
        assert!(matches!(err, GistError::NotFound(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": {},
                "rate": { "limit": 5000, "remaining": 4990, "used": 10, "reset": 1700000060 }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let status = client.rate_limit().await.unwrap();

        assert_eq!(status.remaining, 4990);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(status.seconds_until_reset(now), 60);
    }
}
