//! vpkg-cli - Command-line tool for building and inspecting Vehicle Packages

mod config;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::DescriptorFile;

#[derive(Parser)]
#[command(name = "vpkg-cli")]
#[command(author, version, about = "Vehicle Package build and inspection CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a Vehicle Package from a descriptor file, or the built-in sample
    Build {
        /// Path to a TOML descriptor file (falls back to the built-in sample)
        #[arg(short, long)]
        descriptor: Option<PathBuf>,

        /// Destination path for the built package
        #[arg(short, long, default_value = "vehicle.vpkg")]
        output: PathBuf,

        /// Vehicle identifier override, exactly 17 characters
        #[arg(long)]
        vin: Option<String>,

        /// Model name override
        #[arg(long)]
        model: Option<String>,

        /// Model year override, 2020-2030
        #[arg(long, value_parser = clap::value_parser!(u16).range(2020..=2030))]
        year: Option<u16>,
    },

    /// Parse a Vehicle Package and print its structure
    Inspect {
        /// Path to a built Vehicle Package
        file: PathBuf,

        /// Maximum accepted package size in bytes
        #[arg(long, default_value_t = vpkg_core::DEFAULT_MAX_ACCEPTED_SIZE)]
        max_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match &cli.command {
        Commands::Build {
            descriptor,
            output,
            vin,
            model,
            year,
        } => build(descriptor.as_deref(), output, vin.as_deref(), model.as_deref(), *year),
        Commands::Inspect { file, max_size } => inspect(file, *max_size),
    }
}

fn build(
    descriptor: Option<&std::path::Path>,
    output: &std::path::Path,
    vin: Option<&str>,
    model: Option<&str>,
    year: Option<u16>,
) -> Result<()> {
    let mut vehicle_descriptor = match descriptor {
        Some(path) => {
            let base_dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            DescriptorFile::load(path)?.into_vehicle_descriptor(base_dir)?
        }
        None => config::sample_vehicle_descriptor(),
    };

    if let Some(vin) = vin {
        vehicle_descriptor.vin = vin.to_string();
    }
    if let Some(model) = model {
        vehicle_descriptor.model = model.to_string();
    }
    if let Some(year) = year {
        vehicle_descriptor.model_year = year;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the Unix epoch")?
        .as_secs() as u32;

    let bytes = vpkg_core::build_vehicle_package(&vehicle_descriptor, timestamp)
        .context("failed to build vehicle package")?;

    std::fs::write(output, &bytes)
        .with_context(|| format!("failed to write output file: {}", output.display()))?;

    println!(
        "built {} ({} bytes, {} zones)",
        output.display(),
        bytes.len(),
        vehicle_descriptor.zones.len()
    );
    Ok(())
}

fn inspect(file: &std::path::Path, max_size: usize) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read package file: {}", file.display()))?;

    let view = vpkg_core::parse_vehicle_package(&bytes, max_size).context("failed to parse vehicle package")?;

    println!("VIN:              {}", view.vin);
    println!("Model:            {}", view.model);
    println!("Model year:       {}", view.model_year);
    println!("Region:           {}", view.region);
    println!("Master SW:        {}", view.master_sw_string);
    println!("Zones:            {}", view.zones.len());
    for zone in &view.zones {
        println!("  {} ({}) - {} ECU(s)", zone.zone_id, zone.zone_name, zone.ecus.len());
        for ecu in &zone.ecus {
            println!(
                "    {} - fw {:?}, priority {}, {} bytes firmware",
                ecu.ecu_id,
                ecu.version_string,
                ecu.priority,
                ecu.firmware.len()
            );
        }
    }
    Ok(())
}
