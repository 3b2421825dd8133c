//! LeMMing command-line driver.
//!
//! Runs a local organisation from a workspace directory, or the built-in
//! relay demo in a fresh one.
//!
//! Usage:
//!   cargo run -p lemming-cli -- demo --dir ./lemming-demo
//!   cargo run -p lemming-cli -- run-once --base ./org --script script.toml
//!   cargo run -p lemming-cli -- run --base ./org --max-ticks 20
//!   cargo run -p lemming-cli -- tick --base ./org
//!   cargo run -p lemming-cli -- outbox --base ./org scout writer --limit 5

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lemming_config::{settings::load_or_default, Workspace};
use lemming_contracts::{
    agent::AgentId,
    error::{LemmingError, LemmingResult},
};
use lemming_core::{engine::StopSignal, traits::OutboxStore, TickClock};
use lemming_local::{
    scenarios::relay::{self, print_report},
    LocalRuntime, RetryingGenerator, ScriptedGenerator,
};
use lemming_outbox::{format_outbox_context, FsOutboxStore};

// ── CLI definition ────────────────────────────────────────────────────────────

/// LeMMing: tick-driven agents talking through file-backed outboxes.
#[derive(Parser)]
#[command(
    name = "lemming",
    about = "Run a local LeMMing organisation",
    long_about = "Drives LeMMing agents tick by tick over a workspace directory.\n\
                  Agents are discovered from agents/<name>/agent.toml; responses come\n\
                  from a scripted generator."
)]
struct Cli {
    /// Log engine and agent events at info level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct GeneratorArgs {
    /// TOML script of per-agent responses. Without one every agent idles.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Attempts per generator call, including the first.
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Pause between attempts, in milliseconds.
    #[arg(long, default_value_t = 250)]
    backoff_ms: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Run the three-agent relay demo in a fresh workspace.
    Demo {
        #[arg(long, default_value = "lemming-demo")]
        dir: PathBuf,
        #[arg(long, default_value_t = 6)]
        ticks: u64,
    },
    /// Run the next tick and print its report.
    RunOnce {
        #[arg(long, default_value = ".")]
        base: PathBuf,
        #[command(flatten)]
        generator: GeneratorArgs,
    },
    /// Run ticks until max_ticks is reached.
    Run {
        #[arg(long, default_value = ".")]
        base: PathBuf,
        /// Overrides max_ticks from engine.toml.
        #[arg(long)]
        max_ticks: Option<u64>,
        #[command(flatten)]
        generator: GeneratorArgs,
    },
    /// Print the next tick to run.
    Tick {
        #[arg(long, default_value = ".")]
        base: PathBuf,
    },
    /// Print the newest outbox entries of one or more agents.
    Outbox {
        #[arg(long, default_value = ".")]
        base: PathBuf,
        /// Agents to read; several are merged newest first.
        #[arg(required = true)]
        agents: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Only entries written at or after this tick.
        #[arg(long)]
        since: Option<u64>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let result = match cli.command {
        Command::Demo { dir, ticks } => run_demo(&dir, ticks),
        Command::RunOnce { base, generator } => run_once(base, &generator),
        Command::Run { base, max_ticks, generator } => run(base, max_ticks, &generator),
        Command::Tick { base } => show_tick(base),
        Command::Outbox { base, agents, limit, since } => show_outbox(base, &agents, limit, since),
    };

    if let Err(e) = result {
        eprintln!("lemming error: {}", e);
        std::process::exit(1);
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn build_generator(args: &GeneratorArgs) -> LemmingResult<RetryingGenerator<ScriptedGenerator>> {
    let scripted = match &args.script {
        Some(path) => ScriptedGenerator::from_file(path)?,
        None => ScriptedGenerator::new(),
    };
    Ok(RetryingGenerator::new(scripted, args.retries, Duration::from_millis(args.backoff_ms)))
}

fn run_demo(dir: &Path, ticks: u64) -> LemmingResult<()> {
    let workspace = Workspace::new(dir);
    if workspace.tick_path().exists() {
        return Err(LemmingError::ConfigError {
            reason: format!("'{}' already holds a run; pick another --dir", dir.display()),
        });
    }
    relay::run_scenario(dir, ticks)?;
    Ok(())
}

fn run_once(base: PathBuf, args: &GeneratorArgs) -> LemmingResult<()> {
    let runtime = LocalRuntime::open(base, Box::new(build_generator(args)?))?;
    let report = runtime.run_once()?;
    print_report(&report);
    Ok(())
}

fn run(base: PathBuf, max_ticks: Option<u64>, args: &GeneratorArgs) -> LemmingResult<()> {
    let workspace = Workspace::new(base);
    let mut config = load_or_default(&workspace.engine_config_path())?;
    if max_ticks.is_some() {
        config.max_ticks = max_ticks;
    }
    if config.max_ticks.is_none() {
        info!("no max_ticks set; running until interrupted");
    }

    let runtime = LocalRuntime::with_config(workspace, config, Box::new(build_generator(args)?))?;
    let ran = runtime.run_forever(&StopSignal::new())?;
    println!("Ran {} tick(s); next tick is {}.", ran, runtime.engine().current_tick());
    Ok(())
}

fn show_tick(base: PathBuf) -> LemmingResult<()> {
    let workspace = Workspace::new(base);
    println!("{}", TickClock::new(workspace.tick_path()).load());
    Ok(())
}

fn show_outbox(base: PathBuf, agents: &[String], limit: usize, since: Option<u64>) -> LemmingResult<()> {
    let ids = agents.iter().map(AgentId::parse).collect::<LemmingResult<Vec<_>>>()?;
    let outbox = FsOutboxStore::new(Workspace::new(base).agents_dir());

    let entries = match ids.as_slice() {
        [single] => outbox.read_recent(single, limit, since)?,
        many => outbox.read_recent_merged(many, limit, since)?,
    };
    println!("{}", format_outbox_context(&entries, usize::MAX));
    Ok(())
}
