mod app;
mod config;
mod domain;
mod repo;
#[cfg(test)]
mod test_utils;
mod usecase;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use time::OffsetDateTime;
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::{App, Shutdown};
use config::Config;
use domain::pr::PrIdentity;
use domain::state::{IssueKind, PrState};
use repo::StateStore;
use repo::github::GithubGateway;
use repo::github::auth::{api_base_from_env, resolve_token};
use repo::github::timeutil::format_datetime;
use repo::memory::InMemoryStateStore;
use repo::sqlite::SqliteStateStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "gh-nudger: nudge coding agents on GitHub pull requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default config file if it does not exist
    Init {
        #[arg(long, env = "GH_NUDGER_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Evaluate pull requests and post nudges
    Run(RunArgs),
    /// Inspect or reset stored per-PR state
    State {
        #[arg(long, env = "GH_NUDGER_STATE", global = true)]
        state: Option<PathBuf>,

        #[command(subcommand)]
        command: StateCommand,
    },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Config file (default: OS config dir)
    #[arg(long, env = "GH_NUDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite state file (default: OS state dir)
    #[arg(long, env = "GH_NUDGER_STATE")]
    state: Option<PathBuf>,

    /// Keep state in memory instead of SQLite
    #[arg(long, default_value_t = false)]
    memory: bool,

    /// Decide and log, but post nothing and write no state
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Run a single cycle (default)
    #[arg(long, conflicts_with = "daemon")]
    once: bool,

    /// Keep running cycles until interrupted
    #[arg(long)]
    daemon: bool,

    /// Seconds between daemon cycles (default: from config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_seconds: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum StateCommand {
    /// Print one line per tracked pull request
    List,
    /// Zero the review nudge counter of a pull request
    Reset {
        /// owner/name#number
        pr: PrIdentity,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show {
        #[arg(long, env = "GH_NUDGER_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let verbose = matches!(&cli.command, Command::Run(args) if args.verbose);
    init_tracing(verbose);

    match cli.command {
        Command::Init { config } => init(config),
        Command::Run(args) => run(args),
        Command::State { state, command } => state_command(state.as_deref(), command),
        Command::Config {
            command: ConfigCommand::Show { config },
        } => show_config(config),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("gh_nudger=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gh_nudger=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn init(config: Option<PathBuf>) -> Result<ExitCode> {
    let path = config.unwrap_or_else(config::default_config_path);
    if config::write_default_config(&path)? {
        println!("Wrote default config to {}", path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let config_path = args.config.unwrap_or_else(config::default_config_path);
    if !config_path.exists() {
        eprintln!(
            "Config not found at {}. Run `gh-nudger init` to create one.",
            config_path.display()
        );
        return Ok(ExitCode::from(2));
    }
    let config = Config::from_file(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store = open_store(args.state.as_deref(), args.memory)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let token = resolve_token()?;
    let gateway = GithubGateway::connect(rt.handle().clone(), token, api_base_from_env())?;

    let mut app = App::new(store, gateway, &config, args.dry_run);
    if args.once || !args.daemon {
        app.run_cycle(OffsetDateTime::now_utc());
        return Ok(ExitCode::SUCCESS);
    }

    let interval = args
        .interval_seconds
        .unwrap_or(config.general.interval_seconds);
    let shutdown = Shutdown::new();
    let latch = Arc::clone(&shutdown);
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping after the current cycle");
            latch.trigger();
        }
    });
    info!(interval_seconds = interval, dry_run = args.dry_run, "daemon started");
    app.run_daemon(rt.handle(), Duration::from_secs(interval), &shutdown);
    Ok(ExitCode::SUCCESS)
}

fn open_store(state: Option<&Path>, memory: bool) -> Result<Box<dyn StateStore>> {
    if memory {
        return Ok(Box::new(InMemoryStateStore::default()));
    }
    let store = match state {
        Some(path) => SqliteStateStore::open(path),
        None => SqliteStateStore::open_default(),
    }
    .context("failed to open state store")?;
    Ok(Box::new(store))
}

fn state_command(state: Option<&Path>, command: StateCommand) -> Result<ExitCode> {
    let mut store = open_store(state, false)?;
    match command {
        StateCommand::List => {
            for row in store.list()? {
                println!("{}", describe_state(&row));
            }
            Ok(ExitCode::SUCCESS)
        }
        StateCommand::Reset { pr } => {
            if store.reset_review_counter(&pr)? {
                println!("Reset review nudge counter for {pr}");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("No stored state for {pr}");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn describe_state(row: &PrState) -> String {
    let opt_id = |id: Option<u64>| id.map_or_else(|| "-".to_string(), |v| v.to_string());
    let last_nudge = row
        .last_nudge_at
        .map_or_else(|| "-".to_string(), format_datetime);
    let markers: Vec<&str> = IssueKind::ALL
        .into_iter()
        .filter(|k| row.markers.is_set(*k))
        .map(IssueKind::as_key)
        .collect();
    format!(
        "{} seen={} nudged={} count={} last_nudge={} markers={} updated={}",
        row.pr,
        opt_id(row.last_seen_review_id),
        opt_id(row.last_nudged_review_id),
        row.review_nudge_count,
        last_nudge,
        if markers.is_empty() {
            "-".to_string()
        } else {
            markers.join(",")
        },
        format_datetime(row.updated_at),
    )
}

fn show_config(config: Option<PathBuf>) -> Result<ExitCode> {
    let path = config.unwrap_or_else(config::default_config_path);
    let config = if path.exists() {
        Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?
    } else {
        eprintln!("# {} not found; showing defaults", path.display());
        Config::default()
    };
    print!("{}", config.to_toml()?);
    Ok(ExitCode::SUCCESS)
}
