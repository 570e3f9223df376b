use anyhow::{bail, Context};
use clap::{ArgGroup, Parser};
use gisthunter_core::{
    retrieval, Config, ContentProbe, DiscoveryEngine, GitHubGistSource, StopReason,
};
use gisthunter_store::WorkspaceRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gisthunter")]
#[command(
    version,
    about = "Search public GitHub gists and keep a per-workspace log of matches",
    long_about = None
)]
#[command(group(
    ArgGroup::new("action")
        .args(["define_workspace", "list_discovered", "fetch", "list_workspaces", "rate_limit"])
))]
struct Cli {
    /// Search terms to look for in gists
    search_terms: Vec<String>,

    /// Create a new workspace with the given name and make it current
    #[arg(long, value_name = "NAME")]
    define_workspace: Option<String>,

    /// List discovered gists from the current workspace
    #[arg(long)]
    list_discovered: bool,

    /// Fetch a discovered gist by its number in --list-discovered or its gist id
    #[arg(long, value_name = "ID_OR_INDEX")]
    fetch: Option<String>,

    /// Maximum number of listing requests for this run
    #[arg(long, value_name = "N", default_value_t = 10)]
    max_requests: u32,

    /// Report skipped gists and every match as it is found
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the workspace databases
    #[arg(long, value_name = "PATH")]
    workspace: Option<PathBuf>,

    /// Use this workspace instead of the current one
    #[arg(long, value_name = "NAME")]
    use_workspace: Option<String>,

    /// List every workspace under the workspace directory
    #[arg(long)]
    list_workspaces: bool,

    /// Show the remaining GitHub API requests and time until reset
    #[arg(long)]
    rate_limit: bool,

    /// Minimum similarity (0-100) for a search term to count as a match
    #[arg(long, value_name = "0-100", value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,

    /// When to download gist contents: never, verify or on-miss
    #[arg(long, value_name = "MODE")]
    content_probe: Option<ContentProbe>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// GitHub token (usually read from GITHUB_TOKEN or .env)
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env has to be loaded before clap reads GITHUB_TOKEN
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    if let Some(threshold) = cli.threshold {
        config.discovery.threshold = threshold;
    }
    if let Some(probe) = cli.content_probe {
        config.discovery.content_probe = probe;
    }

    let root = cli
        .workspace
        .clone()
        .unwrap_or_else(|| config.workspace.root.clone());
    tracing::debug!("Workspace root: {}", root.display());
    let registry = WorkspaceRegistry::new(root);

    if let Some(name) = &cli.define_workspace {
        let workspace = registry.define(name)?;
        println!("Workspace '{}' has been defined.", workspace.name);
        return Ok(());
    }

    if cli.list_workspaces {
        return list_workspaces(&registry);
    }

    if cli.rate_limit {
        return show_rate_limit(&cli, &config).await;
    }

    if cli.list_discovered {
        return list_discovered(&cli, &registry);
    }

    if let Some(selector) = &cli.fetch {
        return fetch(&cli, &config, &registry, selector).await;
    }

    if !cli.search_terms.is_empty() {
        return discover(&cli, &config, &registry).await;
    }

    bail!("No action given. Pass search terms, --define-workspace, --list-discovered or --fetch.")
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "gisthunter=debug"
    } else {
        "gisthunter=info"
    };

    // Diagnostics go to stderr so stdout stays clean for results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn github_source(cli: &Cli, config: &Config) -> anyhow::Result<GitHubGistSource> {
    let token = config.resolve_token(cli.token.clone())?;
    Ok(GitHubGistSource::from_config(config, token)?)
}

fn list_workspaces(registry: &WorkspaceRegistry) -> anyhow::Result<()> {
    let workspaces = registry.list_workspaces()?;
    let current = registry.current()?;

    if workspaces.is_empty() {
        println!("No workspaces under {}.", registry.root().display());
        return Ok(());
    }

    for workspace in workspaces {
        let marker = if current.as_deref() == Some(workspace.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {} (created {})",
            marker,
            workspace.name,
            workspace.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

async fn show_rate_limit(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let source = github_source(cli, config)?;
    let status = source
        .client()
        .rate_limit()
        .await
        .context("Failed to query the GitHub rate limit")?;

    println!("Remaining Requests: {}/{}", status.remaining, status.limit);
    println!(
        "Seconds Until Reset: {}",
        status.seconds_until_reset(chrono::Utc::now())
    );
    Ok(())
}

fn list_discovered(cli: &Cli, registry: &WorkspaceRegistry) -> anyhow::Result<()> {
    let workspace = registry.resolve(cli.use_workspace.as_deref())?;
    let store = registry.open(&workspace)?;
    let entries = retrieval::list_discovered(&store)?;

    if entries.is_empty() {
        println!("No discovered gists in workspace '{}'.", workspace.name);
        return Ok(());
    }

    println!("Discovered gists:");
    for entry in entries {
        println!("{}", entry);
    }
    Ok(())
}

async fn fetch(
    cli: &Cli,
    config: &Config,
    registry: &WorkspaceRegistry,
    selector: &str,
) -> anyhow::Result<()> {
    let workspace = registry.resolve(cli.use_workspace.as_deref())?;
    let store = registry.open(&workspace)?;
    let index = retrieval::resolve_selector(&store, selector)?;
    let source = github_source(cli, config)?;

    let content = retrieval::fetch(&store, &source, index).await?;

    println!("{}", "-".repeat(40));
    println!("{}", content);
    println!("{}", "-".repeat(40));
    Ok(())
}

async fn discover(cli: &Cli, config: &Config, registry: &WorkspaceRegistry) -> anyhow::Result<()> {
    let workspace = registry.resolve(cli.use_workspace.as_deref())?;
    let store = registry.open(&workspace)?;
    let source = github_source(cli, config)?;

    let engine = DiscoveryEngine::new(Arc::new(source))
        .with_settings(config.match_settings())
        .with_max_rate_limit_wait(config.discovery.max_rate_limit_wait());

    let report = engine
        .discover(&store, &cli.search_terms, cli.max_requests, cli.verbose)
        .await?;

    println!(
        "Scanned {} gists ({} already seen) with {} requests.",
        report.scanned, report.already_seen, report.requests
    );
    println!(
        "Found {} new matching gists in workspace '{}'.",
        report.new_matches, workspace.name
    );

    if report.stop_reason == StopReason::RateLimited {
        println!("Stopped early: GitHub rate limit reached. Try again later.");
    }

    Ok(())
}
