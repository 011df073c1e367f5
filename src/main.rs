use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use tick_golem::config::{self, TickGolemConfig};
use tick_golem::driver::Driver;
use tick_golem::log::LogLevel;
use tick_golem::plan::{self, ExecutionLog, PlanSource};
use tick_golem::shutdown;
use tick_golem::trace::{TraceEvent, TraceWriter};
use tick_golem::types::{parse_failure_policy, HaltReason, TickOutcome};
use tick_golem::{log_error, log_info, log_warn};

#[derive(Parser)]
#[command(name = "tick-golem", about = "Budgeted cooperative phase scheduler")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (defaults to {root}/tick-golem.toml).
    /// When specified, the plan and trace paths resolve from the config
    /// file's parent directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default tick-golem.toml and plan.toml
    Init,
    /// Validate the config and plan without running anything
    Check,
    /// Drive the plan on a fixed tick period until stopped
    Run {
        /// Override driver.budget
        #[arg(long)]
        budget: Option<u32>,
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// Stop after this many completed cycles (overrides driver.max_cycles)
        #[arg(long)]
        cycles: Option<u64>,
        /// Override driver.on_failure (restart, halt)
        #[arg(long)]
        on_failure: Option<String>,
    },
}

/// Why `run` stopped, for the summary line.
enum StopReason {
    Halted(HaltReason),
    TickLimit,
    ShutdownRequested,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.log_level.parse::<LogLevel>() {
        Ok(level) => tick_golem::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let root = &cli.root;

    let config_base = match &cli.config {
        Some(p) => p.parent().unwrap_or(Path::new(".")).to_path_buf(),
        None => root.to_path_buf(),
    };

    let result = match cli.command {
        Commands::Init => handle_init(root),
        Commands::Check => handle_check(root, cli.config.as_deref(), &config_base),
        Commands::Run {
            budget,
            ticks,
            cycles,
            on_failure,
        } => {
            handle_run(
                root,
                cli.config.as_deref(),
                &config_base,
                RunOverrides {
                    budget,
                    ticks,
                    cycles,
                    on_failure,
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct RunOverrides {
    budget: Option<u32>,
    ticks: Option<u64>,
    cycles: Option<u64>,
    on_failure: Option<String>,
}

fn resolve_plan_path(config_base: &Path, config: &TickGolemConfig) -> PathBuf {
    config_base.join(&config.plan.path)
}

fn handle_init(root: &Path) -> Result<(), String> {
    fs::create_dir_all(root)
        .map_err(|e| format!("Failed to create {}: {}", root.display(), e))?;

    let files = [
        (config::CONFIG_FILE_NAME, config::default_config_toml()),
        ("plan.toml", plan::default_plan_toml()),
    ];

    for (name, contents) in files {
        let path = root.join(name);
        if path.exists() {
            println!("  Kept:    {}", name);
            continue;
        }
        fs::write(&path, contents)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        println!("  Created: {}", name);
    }

    println!("Initialized tick-golem in {}", root.display());
    Ok(())
}

fn handle_check(root: &Path, config_path: Option<&Path>, config_base: &Path) -> Result<(), String> {
    let config = config::load_config_from(config_path, root)?;
    let plan_path = resolve_plan_path(config_base, &config);
    let plan = plan::load_plan(&plan_path)?;

    if let Err(errors) = plan::validate_plan(&plan) {
        log_error!("[check] {} is invalid:", plan_path.display());
        for error in &errors {
            log_error!("  - {}", error);
        }
        return Err(format!("{} plan error(s)", errors.len()));
    }

    println!("{:<16} {:<8} {:>6}", "PHASE", "ENABLED", "ITEMS");
    println!("{}", "-".repeat(32));
    for phase in &plan.phases {
        println!(
            "{:<16} {:<8} {:>6}",
            phase.name,
            if phase.enabled { "yes" } else { "no" },
            phase.labels().len()
        );
    }

    println!();
    println!(
        "Config OK: budget={}, tick_interval={}, tick_ms={}, on_failure={}",
        config.driver.budget,
        config.driver.tick_interval,
        config.driver.tick_ms,
        config.driver.on_failure
    );
    Ok(())
}

async fn handle_run(
    root: &Path,
    config_path: Option<&Path>,
    config_base: &Path,
    overrides: RunOverrides,
) -> Result<(), String> {
    shutdown::install_signal_handlers()?;

    let mut config = config::load_config_from(config_path, root)?;
    if let Some(budget) = overrides.budget {
        config.driver.budget = budget;
    }
    if let Some(cycles) = overrides.cycles {
        config.driver.max_cycles = Some(cycles);
    }
    if let Some(raw) = &overrides.on_failure {
        config.driver.on_failure = parse_failure_policy(raw)?;
    }
    config::validate(&config).map_err(|errors| config::format_validation_errors(&errors))?;

    let plan_path = resolve_plan_path(config_base, &config);
    log_info!("--- tick-golem ---");
    log_info!("[config] Plan: {}", plan_path.display());
    log_info!(
        "[config] Driver: budget={}, tick_interval={}, tick_ms={}, on_failure={}",
        config.driver.budget,
        config.driver.tick_interval,
        config.driver.tick_ms,
        config.driver.on_failure,
    );
    if let Some(max) = config.driver.max_cycles {
        log_info!("[config] Cycle cap: {}", max);
    }

    let mut trace = match &config.trace.path {
        Some(p) => {
            let writer = TraceWriter::open(&config_base.join(p))?;
            log_info!("[config] Trace: {}", writer.path().display());
            Some(writer)
        }
        None => None,
    };

    let source = PlanSource::new(plan_path, ExecutionLog::new(false));
    let mut driver = Driver::new(source, config.driver.clone());

    let cancel = CancellationToken::new();
    let monitor = shutdown::spawn_shutdown_monitor(cancel.clone());

    let mut interval = tokio::time::interval(Duration::from_millis(config.driver.tick_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let stop = loop {
        tokio::select! {
            _ = cancel.cancelled() => break StopReason::ShutdownRequested,
            _ = interval.tick() => {}
        }

        let outcome = driver.tick();
        let items = driver.items_last_tick();

        if let Some(writer) = trace.as_mut() {
            if let Some(event) = TraceEvent::from_outcome(
                driver.stats().ticks,
                driver.cycle_number(),
                &outcome,
                items,
            ) {
                if let Err(e) = writer.write(&event) {
                    log_warn!("Warning: {}", e);
                }
            }
        }

        match outcome {
            TickOutcome::CycleCompleted { cycle } => {
                log_info!(
                    "[cycle {}] Complete ({} items total)",
                    cycle,
                    driver.stats().items_executed
                );
            }
            TickOutcome::CycleFailed { cycle, error } => {
                log_warn!("[cycle {}] Failed, restarting: {}", cycle, error);
            }
            TickOutcome::Halted(reason) => break StopReason::Halted(reason),
            TickOutcome::Skipped | TickOutcome::Suspended(_) => {}
        }

        if let Some(limit) = overrides.ticks {
            if driver.stats().ticks >= limit {
                break StopReason::TickLimit;
            }
        }
    };

    cancel.cancel();
    if let Err(err) = monitor.await {
        log_warn!("Shutdown monitor task panicked: {:?}", err);
    }

    if let Some(writer) = trace.as_mut() {
        if let Err(e) = writer.flush() {
            log_warn!("Warning: {}", e);
        }
    }

    let stats = driver.stats();
    log_info!("");
    log_info!("--- Run Summary ---");
    log_info!(
        "Ticks: {} ({} drives), cycles: {} completed, {} failed",
        stats.ticks,
        stats.drives,
        stats.cycles_completed,
        stats.cycles_failed
    );
    let log = driver.source().log();
    log_info!(
        "Items executed: {} from {}",
        log.total(),
        driver.source().path().display()
    );
    for (phase, count) in log.per_phase() {
        log_info!("  {:<16} {}", phase, count);
    }

    match stop {
        StopReason::TickLimit => {
            log_info!("Stopped: tick limit reached");
            Ok(())
        }
        StopReason::ShutdownRequested => {
            log_info!("Stopped: shutdown requested");
            Ok(())
        }
        StopReason::Halted(HaltReason::CycleCapReached) => {
            log_info!("Stopped: cycle cap reached");
            Ok(())
        }
        StopReason::Halted(reason) => Err(format!("Driver halted: {}", reason)),
    }
}
