//! Recording Triggers CLI
//!
//! Windows raw sensor recordings and filters model predictions into trigger
//! annotations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use recording_triggers::{
    config::Config,
    core::{
        annotate_recording, process_recording, DuplicateResolver, FilterEvent, TriggerAnnotator,
        TriggerFilter, WindowAssembler,
    },
    logging::init_logging,
    recording::{
        AnnotatedRecordingCollection, Prediction, PredictionStream, RawRecording, RawSample,
        RecordingCollection, SequenceData,
    },
    stats::{create_shared_stats_with_persistence, Counter, SharedStats, StatsSnapshot},
    VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "recording-triggers")]
#[command(version = VERSION)]
#[command(about = "Window sensor recordings and turn model predictions into triggers", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to the per-user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and window a raw recording
    Process {
        /// Raw recording (JSON)
        #[arg(long, short)]
        input: PathBuf,

        /// Output file for the recording collection (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Filter prediction streams into trigger annotations
    Annotate {
        /// Recording collection (JSON)
        #[arg(long)]
        recording: PathBuf,

        /// Prediction streams (JSON array)
        #[arg(long)]
        predictions: PathBuf,

        /// Output file for the annotated collection (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Window JSON-lines samples from stdin
    Window {
        /// Sensor type to look up in the options table
        #[arg(long)]
        sensor_type: String,

        /// Sensor subtype to look up in the options table
        #[arg(long)]
        subtype: String,
    },

    /// Filter JSON-lines predictions from stdin
    Trigger {
        /// Model name recorded in annotation references
        #[arg(long, default_value = "unknown")]
        model: String,
    },

    /// Check the configuration, and optionally a recording collection
    Validate {
        /// Recording collection to validate (JSON)
        #[arg(long)]
        recording: Option<PathBuf>,
    },

    /// Show configuration
    Config,

    /// Show persisted statistics
    Stats {
        /// Reset the persisted counters
        #[arg(long)]
        reset: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Warning: Could not initialize logging: {e}");
    }

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Process { input, output } => cmd_process(&config, &input, output.as_deref()),
        Commands::Annotate {
            recording,
            predictions,
            output,
        } => cmd_annotate(&config, &recording, &predictions, output.as_deref()),
        Commands::Window {
            sensor_type,
            subtype,
        } => cmd_window(&config, &sensor_type, &subtype),
        Commands::Trigger { model } => cmd_trigger(&config, &model),
        Commands::Validate { recording } => cmd_validate(&config, recording.as_deref()),
        Commands::Config => cmd_config(&config, cli.config.as_deref()),
        Commands::Stats { reset } => cmd_stats(&config, reset),
    });

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn open_stats(config: &Config) -> SharedStats {
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create data directory: {e}");
    }
    create_shared_stats_with_persistence(config.stats_path())
}

fn save_stats(stats: &SharedStats) {
    tracing::info!("{}", stats.summary());
    if let Err(e) = stats.save() {
        tracing::warn!("Could not save statistics: {e}");
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_process(config: &Config, input: &Path, output: Option<&Path>) -> Result<()> {
    let raw: RawRecording = read_json(input)?;
    let stats = open_stats(config);

    let result = process_recording(raw, &config.sensor_options, &config.pipeline, stats.clone());
    save_stats(&stats);
    let collection = result?;

    tracing::info!(
        sequences = collection.sequences.len(),
        session = %collection.metadata.session_id,
        "Recording processed"
    );
    write_json(&collection, output)
}

fn cmd_annotate(
    config: &Config,
    recording: &Path,
    predictions: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let recording: RecordingCollection = read_json(recording)?;
    let streams: Vec<PredictionStream> = read_json(predictions)?;
    let stats = open_stats(config);

    let result = annotate_recording(
        recording,
        streams,
        &config.filter,
        &config.pipeline,
        stats.clone(),
    );
    save_stats(&stats);
    let annotated: AnnotatedRecordingCollection = result?;
    write_json(&annotated, output)
}

/// Read JSON lines from stdin on a background thread.
///
/// The channel disconnects at EOF. A line that fails to parse ends the
/// stream with an error carrying its line number.
fn spawn_stdin_reader<T>() -> Receiver<Result<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for (index, line) in stdin.lock().lines().enumerate() {
            let item = line
                .context("reading stdin")
                .and_then(|line| {
                    if line.trim().is_empty() {
                        return Ok(None);
                    }
                    serde_json::from_str(&line)
                        .map(Some)
                        .with_context(|| format!("parsing line {}", index + 1))
                })
                .transpose();
            let failed = matches!(item, Some(Err(_)));
            if let Some(item) = item {
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        }
    });
    rx
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}

/// Pump stdin items into `handle` until EOF or Ctrl+C.
fn pump_stdin<T, F>(mut handle: F) -> Result<()>
where
    T: DeserializeOwned + Send + 'static,
    F: FnMut(T) -> Result<()>,
{
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;
    let receiver = spawn_stdin_reader::<T>();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(item) => handle(item?)?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if !running.load(Ordering::SeqCst) {
        tracing::info!("Interrupted, flushing");
    }
    Ok(())
}

fn emit_line<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn cmd_window(config: &Config, sensor_type: &str, subtype: &str) -> Result<()> {
    config.sensor_options.validate()?;
    let options = config.sensor_options.lookup(sensor_type, subtype)?;
    let stats = open_stats(config);

    let strategy = options.duplicate_strategy(config.pipeline.default_duplicate_strategy);
    let mut resolver = DuplicateResolver::<RawSample>::new(strategy);
    let mut assembler = WindowAssembler::new(options, &config.pipeline, stats.clone());
    let mut out = std::io::stdout().lock();

    let pumped = pump_stdin(|sample: RawSample| {
        if let Some(settled) = resolver.push(sample)? {
            assembler.push(settled)?;
        }
        for window in assembler.take_completed_windows() {
            emit_line(&mut out, &window)?;
        }
        for datapoint in assembler.take_completed_datapoints() {
            emit_line(&mut out, &datapoint)?;
        }
        Ok(())
    });

    let result = pumped.and_then(|()| {
        if let Some(settled) = resolver.finish() {
            assembler.push(settled)?;
        }
        stats.record_many(
            Counter::DuplicatesDropped,
            resolver.duplicates_dropped() as u64,
        );
        let assembled = assembler.finish()?;
        match assembled.data {
            SequenceData::Windows(windows) => {
                for window in windows {
                    emit_line(&mut out, &window)?;
                }
            }
            SequenceData::Datapoints(points) => {
                for datapoint in points {
                    emit_line(&mut out, &datapoint)?;
                }
            }
        }
        if !assembled.pending.is_empty() {
            tracing::warn!(
                pending = assembled.pending.len(),
                "Input ended inside a window; partial window not emitted"
            );
        }
        Ok(())
    });

    save_stats(&stats);
    result
}

fn cmd_trigger(config: &Config, model: &str) -> Result<()> {
    let stats = open_stats(config);
    let mut filter = TriggerFilter::new(
        config.filter.clone(),
        config.pipeline.strictness.malformed_prediction,
        stats.clone(),
    )?;
    let annotator = TriggerAnnotator::new();
    tracing::info!(instance_id = %annotator.instance_id(), "Trigger filter ready");
    let mut out = std::io::stdout().lock();

    let emit = |event: FilterEvent, out: &mut std::io::StdoutLock<'_>| -> Result<()> {
        if let Some(annotation) = annotator.annotation_for(&event, model) {
            emit_line(out, &annotation)?;
        }
        Ok(())
    };

    let pumped = pump_stdin(|prediction: Prediction| {
        if let Some(event) = filter.observe(prediction)? {
            emit(event, &mut out)?;
        }
        Ok(())
    });

    let result = pumped.and_then(|()| {
        if let Some(event) = filter.finish() {
            emit(event, &mut out)?;
        }
        tracing::info!(analyses = filter.analyses_executed(), "Prediction stream ended");
        Ok(())
    });

    save_stats(&stats);
    result
}

fn cmd_validate(config: &Config, recording: Option<&Path>) -> Result<()> {
    config
        .sensor_options
        .validate()
        .context("sensor options")?;
    config.filter.validate().context("filter")?;
    println!(
        "Configuration OK ({} sensor option entries)",
        config.sensor_options.len()
    );

    if let Some(path) = recording {
        let collection: RecordingCollection = read_json(path)?;
        collection
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        println!(
            "Recording OK ({} sequences, session {})",
            collection.sequences.len(),
            collection.metadata.session_id
        );
    }
    Ok(())
}

fn cmd_config(config: &Config, path: Option<&Path>) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    println!("Config file: {path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn cmd_stats(config: &Config, reset: bool) -> Result<()> {
    let stats_path = config.stats_path();

    if reset {
        let stats = create_shared_stats_with_persistence(stats_path.clone());
        stats.reset();
        stats
            .save()
            .with_context(|| format!("writing {}", stats_path.display()))?;
        println!("Statistics reset.");
        return Ok(());
    }

    if !stats_path.exists() {
        println!("No previous run data found.");
        return Ok(());
    }

    let persisted: StatsSnapshot = read_json(&stats_path)?;
    println!(
        "Cumulative Statistics (last updated {}):",
        persisted.last_updated.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Samples seen: {}", persisted.samples_seen);
    println!("  Duplicate timestamps dropped: {}", persisted.duplicates_dropped);
    println!("  Values seeded from defaults: {}", persisted.values_seeded);
    println!("  Missing values skipped: {}", persisted.missing_values_skipped);
    println!(
        "  Dimension mismatches skipped: {}",
        persisted.dimension_mismatches_skipped
    );
    println!("  Windows emitted: {}", persisted.windows_emitted);
    println!("  Predictions seen: {}", persisted.predictions_seen);
    println!(
        "  Malformed predictions skipped: {}",
        persisted.malformed_predictions_skipped
    );
    println!("  Predictions excluded: {}", persisted.predictions_excluded);
    println!(
        "  Predictions below threshold: {}",
        persisted.predictions_below_threshold
    );
    println!(
        "  Predictions suppressed by cooldown: {}",
        persisted.predictions_suppressed
    );
    println!("  Triggers emitted: {}", persisted.triggers_emitted);
    Ok(())
}
