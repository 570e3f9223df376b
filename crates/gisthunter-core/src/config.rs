use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::matcher::{ContentProbe, MatchSettings, DEFAULT_THRESHOLD};

/// Main configuration structure
///
/// Loaded from the config file and then overridden by env vars and CLI args.
/// Priority: CLI > Env > File > Defaults. It is handed to every component
/// explicitly; nothing reads it from a global.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Load config from the default location, or defaults if there is none
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// XDG config dir on Linux, Application Support on macOS, AppData on Windows
    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("gisthunter");

        Ok(config_dir.join("config.toml"))
    }

    /// Token from the environment wins over the one in the file
    pub fn resolve_token(&self, from_env: Option<String>) -> crate::Result<String> {
        from_env
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.github.token.clone().filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| {
                crate::Error::ConfigError(
                    "GITHUB_TOKEN not found. Set it in the environment or a .env file".into(),
                )
            })
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            threshold: self.discovery.threshold,
            content_probe: self.discovery.content_probe,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub personal access token
    /// Get one at https://github.com/settings/tokens
    pub token: Option<String>,

    /// API URL (for GitHub Enterprise)
    #[serde(default = "default_github_url")]
    pub api_url: String,

    /// Gists per listing request, GitHub caps this at 100
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_github_url() -> String {
    gisthunter_api::GITHUB_API_BASE.to_string()
}

fn default_per_page() -> u32 {
    gisthunter_api::DEFAULT_PER_PAGE
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_github_url(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Minimum similarity (0-100) for a term to count as a match
    #[serde(default = "default_threshold")]
    pub threshold: u8,

    #[serde(default)]
    pub content_probe: ContentProbe,

    /// Longest rate-limit reset worth sleeping through before giving up
    #[serde(default = "default_max_wait")]
    pub max_rate_limit_wait_secs: u64,
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

fn default_max_wait() -> u64 {
    60
}

impl DiscoveryConfig {
    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.max_rate_limit_wait_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            content_probe: ContentProbe::default(),
            max_rate_limit_wait_secs: default_max_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory holding `<name>.db` files and the current-workspace pointer
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}
