//! Lock-in Stream - Command-Line Driver
//!
//! Streams from a simulated instrument that produces samples in real time,
//! checks the timeline of every chunk and prints a summary.
//!
//! ```text
//! lockin --decimation 4 --seconds 5 --chunk-samples 2048
//! lockin --config lockin.toml --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use lockin_hw::SimulatedLockin;
use lockin_protocol::layout::{HEADER_SIZE, SAMPLE_SIZE};
use lockin_protocol::{Chunk, TimelineGap, TimelineTracker};
use lockin_stream::{Diagnostics, LockinDevice, StreamConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "lockin", about = "Lock-in amplifier signal streaming", version)]
struct Args {
    /// TOML configuration file (LOCKIN_* environment variables override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Decimation factor: 1, 2, 4, 8 or 16
    #[arg(long, default_value_t = 1)]
    decimation: u32,

    /// How long to stream
    #[arg(long, default_value_t = 2.0)]
    seconds: f64,

    /// Samples requested per read
    #[arg(long, default_value_t = 1024)]
    chunk_samples: usize,

    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log as JSON and print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// Initialize logging
fn init_logging(level: Level, json: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set tracing subscriber")
}

#[derive(Debug, Serialize)]
struct Summary {
    elapsed_s: f64,
    chunks: u64,
    samples: u64,
    sample_rate_hz: f64,
    nominal_rate_hz: f64,
    timeline_gaps: usize,
    first_gap: Option<TimelineGap>,
    desyncs: u64,
    diagnostics: Diagnostics,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level, args.json)?;

    info!("=== Lock-in Stream v{} ===", env!("CARGO_PKG_VERSION"));

    let config = StreamConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let (sim, _handle) = SimulatedLockin::paced();
    let device = LockinDevice::new(sim, config)?;
    device
        .set_decimation_factor(args.decimation)
        .with_context(|| format!("Cannot use decimation factor {}", args.decimation))?;

    info!(
        version = device.hardware_version()?,
        decimation = args.decimation,
        time_step_ns = device.time_step_ns(),
        fir_cycles = device.fir_cycles()?,
        "Instrument configured"
    );

    let summary = stream(&device, &args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn stream(device: &LockinDevice<SimulatedLockin>, args: &Args) -> Result<Summary> {
    let duration = Duration::try_from_secs_f64(args.seconds)
        .with_context(|| format!("Invalid duration: {} s", args.seconds))?;

    let mut session = device.open()?;
    let mut buf = vec![0u8; HEADER_SIZE + args.chunk_samples * SAMPLE_SIZE];
    let mut tracker = TimelineTracker::new();
    let mut first_gap = None;
    let mut chunks = 0u64;

    let started = Instant::now();
    while started.elapsed() < duration {
        let written = session.read(&mut buf)?;
        let chunk = Chunk::parse(&buf[..written])?;
        if chunk.is_empty() {
            thread::sleep(Duration::from_millis(1));
            continue;
        }

        chunks += 1;
        if let Some(gap) = tracker.observe(&chunk.header, chunk.len()) {
            warn!(
                expected = gap.expected_start_ns,
                actual = gap.actual_start_ns,
                "Timeline jumped by {} ns",
                gap.offset_ns()
            );
            first_gap.get_or_insert(gap);
        }
    }
    let elapsed = started.elapsed().as_secs_f64();
    let desyncs = session.desyncs();
    session.close();

    let time_step_ns = device.time_step_ns();
    Ok(Summary {
        elapsed_s: elapsed,
        chunks,
        samples: tracker.samples(),
        sample_rate_hz: tracker.samples() as f64 / elapsed,
        nominal_rate_hz: 1e9 / time_step_ns as f64,
        timeline_gaps: tracker.gaps(),
        first_gap,
        desyncs,
        diagnostics: device.diagnostics(),
    })
}

fn print_summary(summary: &Summary) {
    let acquisition = &summary.diagnostics.acquisition;
    println!("Streamed {:.2} s", summary.elapsed_s);
    println!(
        "  chunks {}  samples {}  rate {:.0} Hz (nominal {:.0} Hz)",
        summary.chunks, summary.samples, summary.sample_rate_hz, summary.nominal_rate_hz
    );
    println!(
        "  timeline gaps {}  desyncs {}",
        summary.timeline_gaps, summary.desyncs
    );
    if let Some(gap) = &summary.first_gap {
        println!("  first gap {:+} ns", gap.offset_ns());
    }
    println!(
        "  acquisition: {} passes, {} hw faults, measured step {} ns",
        acquisition.iterations, acquisition.hw_faults, acquisition.ma_time_step_ns
    );
    println!(
        "  sleep window {:.1}..{:.1} ms, last drain {} us",
        acquisition.sleep_lower_ns as f64 / 1e6,
        acquisition.sleep_upper_ns as f64 / 1e6,
        acquisition.last_drain_ns / 1_000
    );
}
