// src/main.rs
use std::path::PathBuf;
use anyhow::Context;
use clap::Parser;
use log::info;
use tdms2hdf5::{export, ConverterConfig, Registry};
/// Convert a TDMS, CSV or DAT measurement into HDF5.
#[derive(Parser, Debug)]
#[command(name = "tdms2hdf5", version, about)]
struct Args {
    /// Source file (.tdms, .csv or .dat)
    input: PathBuf,
    /// Target file; .hdf5/.he5/.hdf writes one dataset per channel, .h5 one table per device
    output: PathBuf,
    /// JSON converter configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Derive V, I, R and their lock-in counterparts
    #[arg(long)]
    transport: bool,
    /// Resample the IPS magnet field onto the ADWin time track
    #[arg(long)]
    interpolate_b: bool,
    /// Add the ADWin temperature minus its mode
    #[arg(long)]
    temperature_mode: bool,
}
fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConverterConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ConverterConfig::default(),
    };
    let mut registry = Registry::with_config(config);
    registry
        .load_from_file(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    if args.transport {
        let added = registry.transport_channels()?;
        info!("transport derivations added {} channels", added.len());
    }
    if args.interpolate_b {
        registry.add_interpolated_b()?;
    }
    if args.temperature_mode {
        registry.add_temperature_mode()?;
    }
    let layout = export::write(&registry, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        "registry of {} channels written to {} ({:?} layout)",
        registry.len(),
        args.output.display(),
        layout
    );
    Ok(())
}
