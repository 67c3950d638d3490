use std::io::BufRead;
use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use playscribe_driver::{DriverConfig, Router};
use playscribe_runner::{
    Bridge, CommandPlanner, Orchestrator, Planner, ProgressEvent, RunnerConfig, StaticPlanner,
    ToolInvoker,
};

#[derive(Parser)]
#[command(name = "playscribe")]
#[command(about = "Run browser tasks from plain-language prompts and write Playwright tests")]
#[command(version)]
struct Cli {
    /// Prompts to run in order (read from stdin, one per line, when omitted)
    prompts: Vec<String>,

    /// Runner config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use a fixed plan instead of the planner command
    #[arg(long, value_name = "FILE")]
    plan_file: Option<PathBuf>,

    /// Write the generated test to this file (overrides config)
    #[arg(short, long, value_name = "FILE")]
    out: Option<String>,

    /// Name of the generated test (overrides config)
    #[arg(long)]
    test_name: Option<String>,

    /// Run the driver inside this process instead of spawning it
    #[arg(long)]
    in_process: bool,

    /// Run in-process against the simulated browser
    #[arg(long)]
    dry_run: bool,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Print the driver's tools and exit
    #[arg(long)]
    list_tools: bool,

    /// Validate config without running
    #[arg(long)]
    check: bool,

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

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = match cli.config {
        Some(ref path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if cli.headless {
        config.headless = true;
    }
    if let Some(ref out) = cli.out {
        config.output.script_path = Some(out.clone());
    }
    if let Some(ref name) = cli.test_name {
        config.output.test_name = name.clone();
    }
    config.validate()?;

    if cli.check {
        print_config(&config);
        return Ok(());
    }

    let ok = if cli.in_process || cli.dry_run {
        let mut driver_config = DriverConfig::from_env()?;
        driver_config.headless |= config.headless;
        driver_config.simulate = cli.dry_run;
        let router = Router::new(driver_config.build_driver()?);
        run(router, &cli, &config).await?
    } else {
        let bridge = Bridge::spawn(&config.driver, config.headless)?;
        bridge.connect().await?;
        run(bridge, &cli, &config).await?
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn print_config(config: &RunnerConfig) {
    println!("Config valid");
    println!(
        "  Driver: {} {}",
        config.driver.program,
        config.driver.args.join(" ")
    );
    println!("  Call timeout: {}ms", config.driver.call_timeout_ms);
    println!("  Ready timeout: {}ms", config.driver.ready_timeout_ms);
    match config.planner {
        Some(ref planner) => println!(
            "  Planner: {} {} ({}ms)",
            planner.program,
            planner.args.join(" "),
            planner.timeout_ms
        ),
        None => println!("  Planner: none (use --plan-file)"),
    }
    println!("  Test name: {}", config.output.test_name);
    if let Some(ref path) = config.output.script_path {
        println!("  Output: {}", path);
    }
    println!("  Headless: {}", config.headless);
}

fn planner(cli: &Cli, config: &RunnerConfig) -> anyhow::Result<Box<dyn Planner>> {
    if let Some(ref path) = cli.plan_file {
        return Ok(Box::new(StaticPlanner::from_file(path)?));
    }
    match config.planner {
        Some(ref cmd) => Ok(Box::new(CommandPlanner::from(cmd))),
        None => anyhow::bail!("no planner configured: pass --plan-file or set `planner` in the config"),
    }
}

fn prompts(cli: &Cli) -> anyhow::Result<Vec<String>> {
    if !cli.prompts.is_empty() {
        return Ok(cli.prompts.clone());
    }
    let mut prompts = Vec::new();
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            prompts.push(line.to_string());
        }
    }
    Ok(prompts)
}

/// Run every prompt; false if any of them failed.
async fn run<I: ToolInvoker>(invoker: I, cli: &Cli, config: &RunnerConfig) -> anyhow::Result<bool> {
    if cli.list_tools {
        for tool in invoker.list_tools().await? {
            println!("{:<18} {}", tool.name, tool.description);
        }
        invoker.shutdown().await?;
        return Ok(true);
    }

    let planner = planner(cli, config)?;
    let prompts = prompts(cli)?;
    let mut orchestrator =
        Orchestrator::new(invoker, planner).test_name(config.output.test_name.clone());
    if let Some(ref path) = config.output.script_path {
        orchestrator = orchestrator.output_path(path.clone());
    }

    let mut ok = true;
    for prompt in &prompts {
        eprintln!("▶ {}", prompt);
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_progress(rx));
        let result = orchestrator.process_prompt(prompt, Some(&tx)).await;
        drop(tx);
        let _ = printer.await;

        match result {
            Ok(outcome) => {
                match outcome.failure {
                    Some(ref failure) => {
                        ok = false;
                        eprintln!("✗ Stopped at action {} ({})", failure.index, failure.tool);
                    }
                    None => eprintln!("✓ {} actions", outcome.actions.len()),
                }
                match config.output.script_path {
                    Some(ref path) => eprintln!("  Test written to {}", path),
                    None => println!("{}", outcome.script),
                }
            }
            Err(e) => {
                ok = false;
                eprintln!("✗ {}", e);
            }
        }
    }

    if let Err(e) = orchestrator.shutdown().await {
        warn!(error = %e, "shutdown failed");
    }
    Ok(ok)
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Planned { count } => eprintln!("  Plan: {} actions", count),
            ProgressEvent::ActionCompleted {
                index,
                action,
                result,
            } => {
                let text = result.first_text().unwrap_or_default();
                let summary = text.lines().next().unwrap_or("");
                eprintln!("  ✓ {}. {} {}", index, action.name, summary);
            }
            ProgressEvent::ActionFailed {
                index,
                action,
                error,
            } => eprintln!("  ✗ {}. {}: {}", index, action.name, error),
        }
    }
}
