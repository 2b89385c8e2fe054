//! Tokenswap CLI
//!
//! Reads hex frames on stdin and writes rewritten requests to stdout. Logs go
//! to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenswap::cache::CacheSet;
use tokenswap::config::{normalize_redis_url, Backend, Config, REDIS_ADDR_ENV};
use tokenswap::rewrite::{self, RewriteEngine};

#[derive(Debug, Parser)]
#[command(name = "tokenswap", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Idle seconds before a cached credential is dropped
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Cache backend
    #[arg(long, value_parser = parse_backend)]
    backend: Option<Backend>,

    /// Shared store address (`host:port` or `redis://` URL)
    #[arg(long, env = REDIS_ADDR_ENV)]
    redis_url: Option<String>,
}

fn parse_backend(value: &str) -> Result<Backend, String> {
    match value {
        "local" => Ok(Backend::Local),
        "redis" => Ok(Backend::Redis),
        other => Err(format!("unknown backend '{other}', expected local or redis")),
    }
}

fn init_logging() {
    // stdout carries frames
    let default_filter = if std::env::var_os("GOR_TEST").is_some() {
        "warn"
    } else {
        "tokenswap=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(ttl_secs) = cli.ttl_secs {
        config.ttl_secs = ttl_secs;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(url) = cli.redis_url.filter(|url| !url.is_empty()) {
        config.redis_url = Some(normalize_redis_url(&url));
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = load_config(Cli::parse())?;
    let caches = CacheSet::from_config(&config)
        .await
        .context("building caches")?;
    let engine = RewriteEngine::new(caches, config.rewrite.clone());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = rewrite::run(&engine, stdin, stdout) => {
            result.context("processing frames")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
