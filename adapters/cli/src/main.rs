#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a Strange Places level headlessly.

mod level;
mod simulation;

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::simulation::{ObserveMode, Simulation};

/// Command-line arguments accepted by the Strange Places CLI.
#[derive(Debug, Parser)]
#[command(
    name = "strange-places",
    about = "Runs the observer and probe headlessly"
)]
struct CliArgs {
    /// Level file to load instead of the built-in Fermat demo.
    #[arg(long)]
    level: Option<PathBuf>,
    /// Simulated time to run, in seconds.
    #[arg(long, default_value_t = 10.0)]
    seconds: f32,
    /// Length of a single frame, in milliseconds.
    #[arg(long = "dt-ms", default_value_t = 16)]
    dt_ms: u64,
    /// Overrides when the observer is switched on.
    #[arg(long, value_enum, default_value_t = ObserveMode::Scripted)]
    observe: ObserveMode,
}

/// Entry point for the Strange Places command-line interface.
fn main() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse();

    let duration = simulated_duration(args.seconds)?;
    ensure!(args.dt_ms > 0, "--dt-ms must be at least one millisecond");

    let source = match &args.level {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read level {}", path.display()))?,
        None => level::FERMAT_DEMO.to_owned(),
    };
    let level = level::parse(&source).context("invalid level description")?;
    tracing::info!(
        nodes = level.node_names.len(),
        targets = level.target_names.len(),
        observe = ?args.observe,
        "loaded level"
    );

    let mut simulation = Simulation::new(level, args.observe);
    let report = simulation.run(duration, Duration::from_millis(args.dt_ms));
    println!("{report}");
    Ok(())
}

fn simulated_duration(seconds: f32) -> Result<Duration> {
    ensure!(
        seconds.is_finite() && seconds > 0.0,
        "--seconds must be a positive number"
    );
    Duration::try_from_secs_f32(seconds).context("--seconds is out of range")
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strange_places=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_duration_accepts_fractional_seconds() {
        let duration = simulated_duration(2.5).expect("valid duration");
        assert_eq!(duration, Duration::from_millis(2_500));
    }

    #[test]
    fn simulated_duration_rejects_unrepresentable_values() {
        assert!(simulated_duration(1e20).is_err());
        assert!(simulated_duration(f32::INFINITY).is_err());
        assert!(simulated_duration(0.0).is_err());
        assert!(simulated_duration(-3.0).is_err());
    }
}
