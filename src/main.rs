use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use lantern::cache::{FileCache, watcher};
use lantern::config::Config;
use lantern::server::Server;

/// Non-blocking static file server
#[derive(Parser)]
#[command(name = "lantern", version)]
struct Cli {
    /// Path to a YAML config file
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Accept backlog
    #[arg(long)]
    backlog: Option<i32>,

    /// Directory to serve
    #[arg(long)]
    root: Option<PathBuf>,

    /// Map files on every request instead of caching them
    #[arg(long)]
    no_cache: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(backlog) = self.backlog {
            cfg.server.backlog = backlog;
        }
        if let Some(root) = &self.root {
            cfg.cache.root = root.clone();
        }
        if self.no_cache {
            cfg.cache.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let mut cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{:#}\n", e);
            eprintln!("{}", Cli::command().render_usage());
            std::process::exit(1);
        }
    };
    cli.apply(&mut cfg);

    tracing::info!(
        addr = %cfg.listen_addr(),
        backlog = cfg.server.backlog,
        caching = cfg.cache.enabled,
        root = %cfg.cache.root.display(),
        "Starting"
    );

    let cache = Arc::new(FileCache::from_config(&cfg.cache));
    if cache.is_enabled() {
        // Never serve from a cache that failed to build.
        cache.rebuild().context("Can't start caching")?;
        watcher::spawn(Arc::clone(&cache))?;
    }

    let server = Server::bind(&cfg.server, cache)?.start()?;

    tokio::select! {
        res = server.stopped() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
