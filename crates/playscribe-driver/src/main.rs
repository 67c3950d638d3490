use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use playscribe_driver::{mcp, DriverConfig, Router};

#[derive(Parser)]
#[command(name = "playscribe-driver")]
#[command(about = "Browser tool server over MCP stdio")]
#[command(version)]
struct Cli {
    /// Launch browsers headless unless a call says otherwise
    #[arg(long)]
    headless: bool,

    /// YAML file with extra site profiles (overrides PLAYSCRIBE_SITES)
    #[arg(long, value_name = "FILE")]
    sites: Option<PathBuf>,

    /// Use the in-memory browser instead of Chrome
    #[arg(long)]
    dry_run: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stdout carries the protocol
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .init();

    let mut config = DriverConfig::from_env()?;
    if cli.headless {
        config.headless = true;
    }
    if cli.sites.is_some() {
        config.sites = cli.sites;
    }
    config.simulate = cli.dry_run;

    let router = Arc::new(Router::new(config.build_driver()?));
    mcp::run_server(router).await
}
