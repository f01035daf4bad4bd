//! Archivist command line
//!
//! `init` writes a default configuration; `extract` runs the postprocessor on
//! a single body read from disk and prints what it found.

use anyhow::{Context, Result};
use archivist::{
    config::{Config, DEFAULT_CONFIG_FILE},
    item::{Item, ItemSource, ItemStatus, ItemTree},
    postprocess::{Env, Postprocessor, PostprocessorPool},
    urls::{Body, CrawlUrl, Response},
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(about = "Asset and outlink extraction for web archiving")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Postprocess a fetched body stored on disk
    Extract {
        /// Body file
        file: PathBuf,

        /// URL the body was fetched from
        #[arg(short, long)]
        url: String,

        /// Content-Type response header
        #[arg(long)]
        content_type: Option<String>,

        /// HTTP status code
        #[arg(long, default_value = "200")]
        status: u16,

        /// Extra response header, as `Name: value`
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{}'", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Serialize)]
struct Report {
    url: String,
    status: ItemStatus,
    error: Option<String>,
    redirection: Option<String>,
    assets: Vec<String>,
    outlinks: Vec<Outlink>,
    stats: archivist::postprocess::StatsSnapshot,
}

#[derive(Serialize)]
struct Outlink {
    url: String,
    hops: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    config.logging.init(cli.verbose)?;

    match cli.command {
        Commands::Init { path } => init_config(path),
        Commands::Extract {
            file,
            url,
            content_type,
            status,
            headers,
        } => extract(config, file, url, content_type, status, headers).await,
    }
}

fn init_config(path: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    let content = format!("# Archivist configuration\n\n{}", Config::default().to_toml()?);
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    info!("Wrote {}", config_path.display());
    Ok(())
}

async fn extract(
    config: Config,
    file: PathBuf,
    raw_url: String,
    content_type: Option<String>,
    status: u16,
    headers: Vec<(String, String)>,
) -> Result<()> {
    let mut url = CrawlUrl::parse(&raw_url).with_context(|| format!("Invalid URL '{}'", raw_url))?;

    let mut response = Response::new(status, url.parsed().clone());
    if let Some(content_type) = content_type {
        response = response.with_header("Content-Type", content_type);
    }
    for (name, value) in headers {
        response = response.with_header(name, value);
    }
    url.set_response(response);

    let body = File::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;
    url.set_body(Body::from_reader(body).with_context(|| format!("Failed to read {}", file.display()))?);

    let channel_capacity = config.crawl.channel_capacity;
    let env = Env::new(config).context("Failed to open seen-check store")?;
    let pool = PostprocessorPool::new(Postprocessor::new(env));

    let (in_tx, in_rx) = mpsc::channel(channel_capacity);
    let (out_tx, mut out_rx) = mpsc::channel(channel_capacity);
    pool.start(in_rx, out_tx)?;

    let seed = Item::new(url, ItemSource::Insert).with_status(ItemStatus::Archived);
    in_tx.send(ItemTree::new(seed)?).await?;
    drop(in_tx);

    let processed = out_rx
        .recv()
        .await
        .context("Postprocessor produced no output")?;
    let mut outlinks = Vec::new();
    while let Some(tree) = out_rx.recv().await {
        let root = tree.root();
        outlinks.push(Outlink {
            url: root.url.raw().to_string(),
            hops: root.url.hops(),
        });
    }
    pool.join().await?;

    let root = processed.root();
    let redirection = match root.redirection {
        Some(id) => Some(processed.get(id)?.url.raw().to_string()),
        None => None,
    };
    let assets = root
        .children()
        .iter()
        .filter(|&&c| Some(c) != root.redirection)
        .map(|&c| processed.get(c).map(|i| i.url.raw().to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    let report = Report {
        url: root.url.raw().to_string(),
        status: root.status,
        error: root.error.clone(),
        redirection,
        assets,
        outlinks,
        stats: pool.postprocessor().env().stats.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
