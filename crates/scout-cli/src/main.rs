//! `scout` – frontier exploration demo.
//!
//! Explores a simulated floor plan with the full Scout stack:
//!
//! 1. Loads `scout.toml` (path from the first argument, default
//!    `./scout.toml`; a missing file means defaults).
//! 2. Builds a [`SimWorld`] from the configured ASCII map or the built-in
//!    floor plan.
//! 3. Runs the [`ExplorationLoop`] until exploration completes, fails, or
//!    **Ctrl-C** requests shutdown (any in-flight goal is cancelled).
//! 4. Optionally writes one PNG per cycle via the debug image sink.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use scout_middleware::{EventBus, SimWorld};
use scout_perception::transform::grid_to_world;
use scout_runtime::{
    DebugImageSink, ExplorationLoop, ShutdownSignal, init_tracing, shutdown_channel,
};
use scout_types::{
    EventPayload, GoalOutcome, GridMetadata, GridPose, LoopReport, ScoutError, Termination,
};

use config::Config;

/// Used when `[sim] map` is not set.  Start cell (1, 1) is in the top-left room.
const BUILTIN_FLOOR_PLAN: &str = "\
########################################
#..........#...........#...............#
#..........#...........#...............#
#..........#...........................#
#..........#...........#...............#
#......................#...............#
#..........#...........#########.#######
#..........#...........#...............#
######.#####...........#...............#
#..........#...........#...............#
#..........######.######...............#
#......................................#
#..........#...........#...............#
########################################
";

fn main() -> ExitCode {
    let _telemetry = init_tracing("scout");

    print_banner();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let cfg = match config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            return ExitCode::from(2);
        }
    };
    if config_path.exists() {
        println!("  Config loaded from {}", config_path.display().to_string().bold());
    } else {
        println!("  {} Using default configuration.", "No config file found.".dimmed());
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (trigger, signal) = shutdown_channel();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – cancelling exploration …".yellow().bold());
        trigger.trigger();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; exploration can only stop on its own");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(explore(cfg, signal)) {
        Ok(report) => {
            print_report(&report);
            match report.termination {
                Termination::Complete => ExitCode::SUCCESS,
                Termination::Cancelled => ExitCode::from(130),
                Termination::Failed { .. } => ExitCode::FAILURE,
            }
        }
        Err(e) => {
            println!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn explore(cfg: Config, signal: ShutdownSignal) -> Result<LoopReport, ScoutError> {
    let world = Arc::new(build_world(&cfg)?);
    println!(
        "  Exploring a {} map, {} free cell(s) still hidden.\n",
        if cfg.sim.map.is_some() { "custom" } else { "built-in" },
        world.unrevealed_free_cells()
    );

    let bus = EventBus::default();
    let images = cfg
        .debug
        .image_dir
        .as_ref()
        .map(|dir| (dir.clone(), DebugImageSink::spawn(&bus, dir.clone())));
    let progress = spawn_progress(&bus);

    let report = ExplorationLoop::new(
        cfg.loop_config(),
        world.clone(),
        world.clone(),
        world.clone(),
    )
    .with_bus(bus)
    .with_shutdown(signal)
    .run()
    .await;

    if let Err(e) = progress.await {
        warn!(error = %e, "progress printer stopped abnormally");
    }
    if let Some((dir, handle)) = images {
        match handle.await {
            Ok(n) => println!(
                "  {} debug image(s) written to {}",
                n,
                dir.display().to_string().bold()
            ),
            Err(e) => warn!(error = %e, "debug image sink stopped abnormally"),
        }
    }
    println!("  Free cells never observed: {}", world.unrevealed_free_cells());
    Ok(report)
}

fn build_world(cfg: &Config) -> Result<SimWorld, ScoutError> {
    let map = match &cfg.sim.map {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            ScoutError::Config(format!("failed to read map {}: {e}", path.display()))
        })?,
        None => BUILTIN_FLOOR_PLAN.to_string(),
    };

    let rows: Vec<&str> = map.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
    let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
    let metadata = GridMetadata::new(width, rows.len(), cfg.sim.resolution);
    let origin = cfg.grid_origin();
    let start = grid_to_world(
        GridPose::new(cfg.sim.start_col, cfg.sim.start_row, 0.0),
        origin,
        &metadata,
    );

    SimWorld::from_ascii(&map, cfg.sim.resolution, origin, start, cfg.sim_config())
}

/// Print one line per goal and retry until the run finishes.
fn spawn_progress(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let payload = match rx.recv().await {
                Ok(event) => event.payload,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match payload {
                EventPayload::GoalIssued(goal) => print!(
                    "  goal #{:<3} {} ({:>7.2}, {:>7.2}) … ",
                    goal.sequence,
                    goal.cell.to_string().dimmed(),
                    goal.pose.x,
                    goal.pose.y
                ),
                EventPayload::GoalFinished { outcome, .. } => match outcome {
                    GoalOutcome::Succeeded => println!("{}", "reached".green()),
                    GoalOutcome::Aborted => println!("{}", "aborted".yellow()),
                    GoalOutcome::TimedOut => println!("{}", "timed out".yellow()),
                },
                EventPayload::RetryScheduled { stage, attempt } => {
                    println!("  {} {stage} retry #{attempt}", "↻".yellow())
                }
                EventPayload::Finished(_) => break,
                _ => {}
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____                  __ "#.bold().cyan());
    println!("{}", r#"  / ___/_________  __  __/ /_"#.bold().cyan());
    println!("{}", r#"  \__ \/ ___/ __ \/ / / / __/"#.bold().cyan());
    println!("{}", r#" ___/ / /__/ /_/ / /_/ / /_  "#.bold().cyan());
    println!("{}", r#"/____/\___/\____/\__,_/\__/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Scout".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Frontier-based autonomous exploration");
    println!();
}

fn print_report(report: &LoopReport) {
    println!();
    match &report.termination {
        Termination::Complete => println!("  {} Exploration complete.", "✓".green().bold()),
        Termination::Cancelled => println!("  {} Exploration cancelled.", "⚠".yellow().bold()),
        Termination::Failed { reason } => {
            println!("  {} Exploration failed: {}", "✗".red().bold(), reason)
        }
    }
    println!(
        "  cycles: {}  goals: {}  reached: {}",
        report.cycles.to_string().bold(),
        report.goals_issued.to_string().bold(),
        report.goals_succeeded.to_string().bold()
    );
    println!();
}
