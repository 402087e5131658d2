//! Sitelens main entry point
//!
//! This is the command-line interface for the Sitelens crawl server.

use clap::Parser;
use sitelens::config::load_config_with_hash;
use sitelens::renderer::ChromiumRenderer;
use sitelens::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Sitelens: a streaming site crawler with accessibility audits
///
/// Sitelens serves one streaming endpoint that crawls a website from a
/// seed URL, captures full-page screenshots, and runs WCAG rule checks
/// against each rendered page.
#[derive(Parser, Debug)]
#[command(name = "sitelens")]
#[command(version = "1.0.0")]
#[command(about = "A streaming crawl and accessibility-audit server", long_about = None)]
struct Cli {
    /// Path to TOML configuration file; defaults apply when omitted
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the effective settings without serving
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((cfg, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    cfg
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            sitelens::Config::default()
        }
    };

    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let renderer = Arc::new(ChromiumRenderer::new(config.renderer.clone()));
    let state = AppState {
        config: Arc::new(config),
        renderer,
    };

    let bind_address = state.config.server.bind_address.clone();
    match server::serve(state, &bind_address).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("Server failed: {}", e);
            Err(e.into())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitelens=info,warn"),
            1 => EnvFilter::new("sitelens=debug,info"),
            2 => EnvFilter::new("sitelens=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and prints effective settings
fn handle_dry_run(config: &sitelens::Config) {
    println!("=== Sitelens Dry Run ===\n");

    println!("Server:");
    println!("  Bind address: {}", config.server.bind_address);
    println!("  Screenshot directory: {}", config.server.screenshot_dir);

    println!("\nCrawler:");
    println!(
        "  Navigation timeout: {}s",
        config.crawler.navigation_timeout_secs
    );
    println!("  Batch timeout: {}s", config.crawler.batch_timeout_secs);
    println!("  Wait policy: {:?}", config.crawler.wait_policy);
    println!("  Blocked hosts: {}", config.crawler.blocked_hosts.len());

    println!("\nRenderer:");
    println!("  Pool size: {}", config.renderer.pool_size);
    println!("  Launch args: {}", config.renderer.launch_args.join(" "));

    println!("\nAudit:");
    println!("  Rule script: {}", config.audit.rule_script_path);
    println!("  Engine global: {}", config.audit.engine_global);
    println!("  Rules: {}", config.audit.rules.join(", "));
    println!(
        "  Attempts: {} x {}s",
        config.audit.max_attempts, config.audit.attempt_timeout_secs
    );

    println!("\n✓ Configuration is valid");
}
