// GitHub provider - bridges the gist API client with the GistSource trait
use async_trait::async_trait;
use gisthunter_api::{Gist, GistClient, GistError};

use crate::{
    config::Config,
    models::{RemoteItem, RemotePage},
    source::{GistSource, SourceError, SourceResult},
    Error, Result,
};

/// Wrapper around GistClient that implements GistSource
pub struct GitHubGistSource {
    client: GistClient,
    per_page: u32,
}

impl GitHubGistSource {
    pub fn new(client: GistClient, per_page: u32) -> Self {
        Self { client, per_page }
    }

    /// Build a source from config; the token has already been resolved
    pub fn from_config(config: &Config, token: String) -> Result<Self> {
        let client = GistClient::with_base_url(Some(token), config.github.api_url.clone())
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::new(client, config.github.per_page))
    }

    pub fn client(&self) -> &GistClient {
        &self.client
    }
}

#[async_trait]
impl GistSource for GitHubGistSource {
    async fn list_page(&self, cursor: Option<&str>) -> SourceResult<RemotePage> {
        let page = self.client.list_public(cursor, self.per_page).await?;

        Ok(RemotePage {
            items: page.gists.into_iter().map(gist_to_item).collect(),
            next: page.next,
        })
    }

    async fn fetch_content(&self, remote_id: &str) -> SourceResult<String> {
        Ok(self.client.fetch_content(remote_id).await?)
    }
}

impl From<GistError> for SourceError {
    fn from(err: GistError) -> Self {
        match err {
            GistError::RateLimited { reset_at } => SourceError::RateLimited { reset_at },
            GistError::NotFound(what) => SourceError::NotFound(what),
            ref e if e.is_transient() => SourceError::Transient(e.to_string()),
            e => SourceError::Failed(e.to_string()),
        }
    }
}

/// Convert a GitHub gist to our internal RemoteItem model
fn gist_to_item(gist: Gist) -> RemoteItem {
    RemoteItem {
        owner: gist.owner_login().map(String::from),
        file_names: gist.file_names().map(String::from).collect(),
        has_content: gist.has_sized_files(),
        id: gist.id,
        url: gist.html_url,
        description: gist.description,
    }
}
