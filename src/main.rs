use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tierload::domain::{DeviceClass, NetworkQuality};
use tierload::scheduler::{BatchReport, IdleSignal, LoadFailure, LoadPlan, PhaseReport, Scheduler, TimerIdle, plan};
use tierload::visibility::{ManualIntersectionSource, RegionId, VisibilityTrigger};

mod cli;
mod config;
mod simulate;

use cli::Cli;
use cli::commands::{Commands, TargetArgs};
use config::Config;
use simulate::{SimulatedValue, Simulation};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tierload")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("tierload.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// On-demand load outcome printed by `simulate`
#[derive(Debug, Serialize)]
struct RequestOutcome {
    name: String,
    trigger: &'static str,
    failure: Option<LoadFailure>,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    phase: PhaseReport,
    requests: Vec<RequestOutcome>,
    background: Vec<BatchReport>,
    loaded: Vec<String>,
}

fn target_device(target: &TargetArgs, config: &Config) -> DeviceClass {
    match (target.device, target.width) {
        (Some(device), _) => device,
        (None, Some(width)) => config.breakpoints.classify(width),
        (None, None) => DeviceClass::Desktop,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Plan { target } => handle_plan_command(target, config),
        Commands::Simulate {
            target,
            requests,
            slow_network,
        } => handle_simulate_command(target, requests, *slow_network, config).await,
        Commands::Validate { manifest, json } => handle_validate_command(manifest.as_ref(), *json, config),
    }
}

fn handle_plan_command(target: &TargetArgs, config: &Config) -> Result<()> {
    let path = config.manifest_path(target.manifest.as_ref())?;
    let simulation = Simulation::from_file(&path)?;
    let device = target_device(target, config);
    info!("Planning {} for {}", path.display(), device);

    let load_plan = plan(&simulation.registry, device);
    if target.json {
        return print_json(&load_plan);
    }
    print_plan(&load_plan);
    Ok(())
}

fn print_plan(load_plan: &LoadPlan) {
    println!("{} {}", "Device:".green(), load_plan.device);
    for tier in &load_plan.eager {
        println!("{} {}", format!("{:>8}", tier.priority.as_str()).cyan(), tier.order.join(", "));
    }
    for batch in &load_plan.background {
        println!(
            "{} {} ({})",
            format!("{:>8}", batch.priority.as_str()).blue(),
            batch.root,
            batch.order.join(" -> ")
        );
    }
    for rejected in &load_plan.rejected {
        println!("{} {}: {}", "rejected".red(), rejected.name, rejected.error);
    }
}

async fn handle_simulate_command(
    target: &TargetArgs,
    requests: &[String],
    slow_network: bool,
    config: &Config,
) -> Result<()> {
    let path = config.manifest_path(target.manifest.as_ref())?;
    let simulation = Simulation::from_file(&path)?;
    let device = target_device(target, config);
    let visible_after = simulation.visible_after();
    info!("Simulating {} for {}", path.display(), device);

    let idle = TimerIdle::new(config.scheduler.idle_fallback_delay());
    let scheduler = Scheduler::with_idle_signal(simulation.registry, config.scheduler.clone(), Arc::new(idle));
    if slow_network {
        scheduler.set_network_quality(NetworkQuality::Slow);
    }

    let phase = scheduler.initialize(device).await;
    let mut outcomes = Vec::new();

    for name in requests {
        let failure = scheduler
            .request_now(name)
            .await
            .err()
            .map(|e| LoadFailure::new(name.clone(), e));
        outcomes.push(RequestOutcome {
            name: name.clone(),
            trigger: "request",
            failure,
        });
    }

    let source = ManualIntersectionSource::new();
    let mut watchers = Vec::new();
    for (name, delay) in visible_after {
        let region = RegionId::new(name.clone());
        let handle = VisibilityTrigger::observe(&source, region.clone(), config.visibility);
        let source = source.clone();
        let scheduler = scheduler.clone();
        watchers.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            source.emit(&region, 1.0);
            let outcome = scheduler.request_when_visible(&handle, &name).await;
            RequestOutcome {
                failure: match outcome {
                    Some(Err(e)) => Some(LoadFailure::new(name.clone(), e)),
                    _ => None,
                },
                name,
                trigger: "visible",
            }
        }));
    }
    for watcher in watchers {
        outcomes.push(watcher.await.context("Visibility watcher panicked")?);
    }

    if slow_network {
        scheduler.set_network_quality(NetworkQuality::Fast);
    }

    let mut background = Vec::new();
    loop {
        idle.idle().await;
        match scheduler.process_next_idle_batch().await {
            Some(report) => background.push(report),
            None => break,
        }
    }

    let report = SimulationReport {
        phase,
        requests: outcomes,
        background,
        loaded: scheduler.loaded_names().into_iter().collect(),
    };
    if target.json {
        return print_json(&report);
    }
    print_simulation(&scheduler, &report);
    Ok(())
}

fn print_simulation(scheduler: &Scheduler, report: &SimulationReport) {
    let stamp = |name: &str| {
        scheduler
            .value(name)
            .and_then(|v| {
                v.downcast_ref::<SimulatedValue>()
                    .map(|s| s.loaded_at.format("%H:%M:%S%.3f").to_string())
            })
            .unwrap_or_default()
    };

    println!("{} {}", "Device:".green(), report.phase.device);
    println!("{}", "Eager phase".cyan());
    for name in &report.phase.loaded {
        println!("  {} {} {}", "loaded".green(), name, stamp(name).dimmed());
    }
    for failure in report.phase.failed.iter().chain(&report.phase.rejected) {
        println!("  {} {}: {}", "failed".red(), failure.name, failure.error);
    }

    if !report.requests.is_empty() {
        println!("{}", "On demand".cyan());
        for outcome in &report.requests {
            match &outcome.failure {
                None => println!(
                    "  {} {} [{}] {}",
                    "loaded".green(),
                    outcome.name,
                    outcome.trigger,
                    stamp(&outcome.name).dimmed()
                ),
                Some(f) => println!("  {} {} [{}]: {}", "failed".red(), outcome.name, outcome.trigger, f.error),
            }
        }
    }

    println!("{}", "Background".cyan());
    for batch in &report.background {
        match &batch.failure {
            None => println!("  {} {} {}", "loaded".green(), batch.root, stamp(&batch.root).dimmed()),
            Some(f) => println!("  {} {}: {}", "failed".red(), batch.root, f.error),
        }
    }

    println!("{} {}", "Loaded:".green(), report.loaded.len());
}

fn handle_validate_command(manifest: Option<&PathBuf>, json: bool, config: &Config) -> Result<()> {
    let path = config.manifest_path(manifest)?;
    let simulation = Simulation::from_file(&path)?;
    let problems: Vec<String> = simulation.registry.validate().iter().map(ToString::to_string).collect();
    info!("Validated {}: {} problem(s)", path.display(), problems.len());

    if json {
        print_json(&problems)?;
    } else if problems.is_empty() {
        println!("{} {} ({} resources)", "OK".green(), path.display(), simulation.registry.len());
    } else {
        for problem in &problems {
            println!("{} {}", "error:".red(), problem);
        }
    }

    if !problems.is_empty() {
        eyre::bail!("{} problem(s) found in {}", problems.len(), path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
