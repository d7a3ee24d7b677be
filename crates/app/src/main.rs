use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use grainscore_core::{trace_grains, Envelope, OnsetSchedule, RecordingDiagnostics, StreamConfig};
use tracing_subscriber::EnvFilter;

fn main() -> grainscore_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Curve {
            envelope,
            from,
            to,
            step,
        } => run_curve(&envelope, from, to, step),
        Commands::Trace {
            config,
            interval,
            grain_duration,
            reverse,
        } => run_trace(&config, interval, grain_duration, reverse),
    }
}

fn run_curve(envelope: &str, from: f64, to: f64, step: f64) -> grainscore_core::Result<()> {
    if !(step > 0.0) {
        return Err(grainscore_core::GrainScoreError::msg("--step must be positive"));
    }
    let text = match Path::new(envelope) {
        path if path.is_file() => std::fs::read_to_string(path)?,
        _ => envelope.to_string(),
    };
    let curve = Envelope::from_json_str(&text)?;
    tracing::info!(
        kind = %curve.kind(),
        breakpoints = curve.breakpoints().len(),
        start = curve.start_time(),
        end = curve.end_time(),
        "evaluating curve"
    );

    println!("t\tvalue\tintegral");
    let steps = ((to - from) / step).floor().max(0.0) as u64;
    for i in 0..=steps {
        let t = from + i as f64 * step;
        println!("{t:.6}\t{:.6}\t{:.6}", curve.evaluate(t), curve.integrate(0.0, t));
    }
    Ok(())
}

fn run_trace(config: &PathBuf, interval: f64, grain_duration: f64, reverse: bool) -> grainscore_core::Result<()> {
    let stream = StreamConfig::from_path(config)?;
    tracing::info!(?config, stream = %stream.stream_id, "tracing pointer positions");

    let diagnostics = RecordingDiagnostics::new().with_tracing();
    let mut pointer = stream.build_pointer_with(Box::new(diagnostics.clone()))?;
    tracing::info!("{pointer}");

    let schedule = OnsetSchedule::new(interval, stream.duration)?;
    for event in trace_grains(&mut pointer, &schedule, grain_duration, reverse) {
        println!("{}", serde_json::to_string(&event)?);
    }

    let summary = diagnostics.summary();
    tracing::info!(
        grains = schedule.len(),
        clamps = summary.clamps,
        drifts = summary.drifts,
        resets = summary.resets,
        dynamic_loops = summary.dynamic_loops,
        in_loop = pointer.in_loop(),
        "trace finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Temporal signal model for granular scores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tabulate a curve and its running integral.
    Curve {
        /// Envelope JSON, inline or as a file path.
        envelope: String,
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        #[arg(long, default_value_t = 1.0)]
        to: f64,
        #[arg(long, default_value_t = 0.1)]
        step: f64,
    },
    /// Print the read position of every grain of a stream as JSON lines.
    Trace {
        /// Path to a stream description.
        config: PathBuf,
        /// Seconds between grain onsets.
        #[arg(short, long, default_value_t = 0.05)]
        interval: f64,
        /// Duration of every grain in seconds.
        #[arg(short, long, default_value_t = 0.05)]
        grain_duration: f64,
        /// Treat grains as reversed.
        #[arg(short, long)]
        reverse: bool,
    },
}
