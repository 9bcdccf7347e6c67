use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use path_clean::PathClean;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repostat::{
    render_json, render_table, AnsiPalette, Config, Discoverer, Palette, PlainPalette, ReportContext,
    StatusCollector, SyncOutcome, Syncer, TransportTarget,
};

#[derive(Parser)]
#[command(name = "repostat")]
#[command(about = "Status of every git repository below a directory, local or over SSH")]
#[command(version)]
#[command(group(ArgGroup::new("target").required(true).args(["dir", "remote_dir"])))]
struct Cli {
    /// Local directory to scan
    #[arg(long, conflicts_with = "remote_host")]
    dir: Option<String>,

    /// Directory to scan on the remote host
    #[arg(long, requires = "remote_host")]
    remote_dir: Option<String>,

    /// Remote host, as `host` or `user@host`
    #[arg(long, requires = "remote_dir")]
    remote_host: Option<String>,

    /// User to log in as on the remote host
    #[arg(long, requires = "remote_host", conflicts_with = "dir")]
    ssh_user: Option<String>,

    /// How deep below the directory to look for repositories
    #[arg(long)]
    max_depth: Option<u32>,

    /// Rebase-pull repositories that are cleanly behind their upstream
    #[arg(long)]
    auto_sync: bool,

    /// Maximum number of repositories processed at once
    #[arg(long)]
    parallel: Option<usize>,

    /// Timeout in seconds for each git or find invocation
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.clone())?;
    apply_overrides(&mut config, &cli);
    config.validate().context("Invalid command-line options")?;

    init_logging(cli.verbose, &config.logging.level, config.logging.color)?;
    info!("Starting repostat v{}", env!("CARGO_PKG_VERSION"));

    let target = resolve_target(&cli)?;
    if let Err(e) = run(&cli, &config, &target).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize logging on stderr; stdout carries the report
fn init_logging(verbose: bool, level: &str, color: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .with_context(|| format!("Invalid log level: {}", level))?
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(color))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Command-line flags win over configuration values
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(max_depth) = cli.max_depth {
        config.scan.max_depth = max_depth;
    }
    if cli.auto_sync {
        config.sync.auto_sync = true;
    }
    if let Some(parallel) = cli.parallel {
        config.sync.max_parallel = parallel;
    }
    if let Some(timeout) = cli.timeout {
        config.transport.timeout = timeout;
    }
    if cli.no_color {
        config.logging.color = false;
    }
}

fn resolve_target(cli: &Cli) -> Result<TransportTarget> {
    match (&cli.dir, &cli.remote_dir, &cli.remote_host) {
        (_, Some(remote_dir), Some(host)) => {
            TransportTarget::remote(host.clone(), cli.ssh_user.clone(), remote_root(remote_dir))
        }
        (Some(dir), _, _) => {
            let expanded = shellexpand::full(dir)
                .with_context(|| format!("Failed to expand directory: {}", dir))?;
            Ok(TransportTarget::local(PathBuf::from(expanded.as_ref()).clean()))
        }
        _ => anyhow::bail!("Either --dir or --remote-dir with --remote-host is required"),
    }
}

/// Remote commands start in the login directory, so `~/x` becomes `x`
fn remote_root(dir: &str) -> PathBuf {
    match dir {
        "~" | "~/" => PathBuf::from("."),
        _ => match dir.strip_prefix("~/") {
            Some(relative) => PathBuf::from(relative),
            None => PathBuf::from(dir),
        },
    }
}

async fn run(cli: &Cli, config: &Config, target: &TransportTarget) -> Result<()> {
    let transport = target.connect(&config.transport);
    let root = target.root();

    eprintln!("🔍 Discovering repositories in {}...", root.display());
    let discoverer = Discoverer::new(transport.clone(), config.scan.max_depth);
    let mut repos = discoverer.discover(root).await?;

    if repos.is_empty() {
        anyhow::bail!("No git repositories found in {}", root.display());
    }
    repos.sort();
    eprintln!("   Found {} repositories", repos.len());

    let collector = StatusCollector::new(transport.clone(), config.sync.max_parallel);
    let mut statuses = collector.collect_all(&repos).await;

    if config.sync.auto_sync {
        let syncer = Syncer::new(transport.clone(), collector, true, config.sync.max_parallel);
        let summary = syncer.sync_all(&mut statuses).await;

        if summary.attempted > 0 {
            eprintln!("\n🔄 Auto-syncing {} repositories", summary.attempted);
            for outcome in &summary.outcomes {
                match outcome {
                    SyncOutcome::Synced { name, message, .. } => eprintln!("   ✓ {}: {}", name, message),
                    SyncOutcome::Failed { name, error, .. } => eprintln!("   ✗ {}: {}", name, error),
                }
            }
            eprintln!(
                "   {} synced, {} failed in {:.2}s\n",
                summary.succeeded,
                summary.failed,
                summary.duration.as_secs_f64()
            );
        }
    }

    let context = ReportContext {
        location: transport.describe(),
        directory: root.display().to_string(),
    };

    let report = if cli.json {
        render_json(&statuses, &context)?
    } else {
        let palette: &dyn Palette = if config.logging.color {
            &AnsiPalette
        } else {
            &PlainPalette
        };
        render_table(&statuses, &context, palette)
    };
    println!("{}", report);

    Ok(())
}
