// This is the entry point of the headless batch driver.
// The library crate holds the engine; this binary only wires it to the command line.

mod cli;

use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use image_batch_lib::core::{
    ActionQueue, BatchReport, Engine, EngineConfig, JobOutcome, SourceItem, load_preset_file,
};
use cli::{Cli, Commands, PresetCommands};

fn init_logging(verbose: bool) {
    // Respect RUST_LOG if set, otherwise info (debug with --verbose)
    let default = if verbose { "image_batch_lib=debug,image_batch=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { preset, output, files } => {
            run_batch(cli.config.as_deref(), &preset, output, files)
        }
        Commands::Preset { command: PresetCommands::Show { file } } => show_preset(&file),
    }
}

fn run_batch(
    config_path: Option<&Path>,
    preset: &Path,
    output: Option<PathBuf>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let mut config = EngineConfig::load_or_default(config_path).context("Failed to load config")?;
    if let Some(directory) = output {
        config.output.directory = directory;
    }
    let queue = load_preset_file(preset)
        .with_context(|| format!("Failed to load preset {}", preset.display()))?;
    info!(
        "Loaded preset '{}' with {} enabled actions",
        queue.name().unwrap_or("unnamed"),
        queue.enabled_actions().count()
    );

    let engine = Engine::new(config).context("Invalid engine configuration")?;
    let (sources, rejected) = engine.probe_sources(files);
    for (path, error) in &rejected {
        warn!("Skipping {}: {}", path.display(), error);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let report = runtime.block_on(process(&engine, sources, &queue));

    print_summary(&report);
    let cache = engine.cache_stats();
    debug!(
        "Cache: {} hits, {} misses ({:.0}% hit ratio), {} entries",
        cache.hits,
        cache.misses,
        cache.hit_ratio() * 100.0,
        cache.entries
    );

    if report.failed > 0 || !rejected.is_empty() {
        anyhow::bail!("{} of {} files failed", report.failed + rejected.len(), report.total + rejected.len());
    }
    Ok(())
}

async fn process(engine: &Engine, sources: Vec<SourceItem>, queue: &ActionQueue) -> BatchReport {
    let mut events = engine.subscribe();
    let handle = engine.submit_queue(sources, queue);
    let batch_id = handle.id();

    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.batch_id != batch_id => continue,
                Ok(event) => {
                    if event.is_action_completion() {
                        debug!(
                            "{} finished {} ({}%)",
                            event.job_id.map(|id| id.to_string()).unwrap_or_default(),
                            event.action.as_deref().unwrap_or("action"),
                            event.percentage()
                        );
                    } else if event.is_batch_terminal() {
                        break;
                    } else if event.job_id.is_none() {
                        info!("Batch progress: {}%", event.percentage());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Progress logger skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = handle.wait().await;
    if let Err(e) = logger.await {
        warn!("Progress logger stopped: {}", e);
    }
    report
}

fn print_summary(report: &BatchReport) {
    println!("Batch {} ({:?})", report.batch_id, report.state);
    println!("  Total files:     {}", report.total);
    println!("  Processed:       {}", report.completed);
    println!("  Failed:          {}", report.failed);
    println!("  Cancelled:       {}", report.cancelled);
    println!("  Duration:        {:.2}s", report.elapsed.as_secs_f64());
    println!(
        "  Peak reserved:   {:.1} MB of {:.1} MB",
        report.memory.peak_reserved_bytes as f64 / (1024.0 * 1024.0),
        report.memory.budget_bytes as f64 / (1024.0 * 1024.0)
    );
    for job in &report.jobs {
        if let JobOutcome::Completed { outputs } = &job.outcome {
            for output in outputs {
                println!("  {} -> {}", job.source.display(), output.display());
            }
        }
    }
    let mut errors = report.errors().peekable();
    if errors.peek().is_some() {
        println!("Errors:");
        for (source, error) in errors {
            println!("  {}: {}", source.display(), error);
        }
    }
}

fn show_preset(file: &Path) -> Result<()> {
    let queue = load_preset_file(file)
        .with_context(|| format!("Failed to load preset {}", file.display()))?;
    println!("Preset: {}", queue.name().unwrap_or("unnamed"));
    for (index, action) in queue.actions().iter().enumerate() {
        println!("  {}. {}", index + 1, action);
    }
    println!("Fingerprint: {}", queue.snapshot_fingerprint());
    Ok(())
}
