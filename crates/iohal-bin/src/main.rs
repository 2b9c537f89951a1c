//! CLI entry point for iohal.
//!
//! Provides a command-line interface for:
//! - Listing and describing driver factories
//! - Validating hardware files without touching hardware
//! - Reading and driving individual pins of a configured device
//!
//! # Usage
//!
//! ```bash
//! iohal factories
//! iohal describe ads1115
//! iohal validate hardware.toml
//! iohal --hardware hardware.toml read soil 0
//! iohal --hardware hardware.toml set lights 3 42.5
//! iohal --mock --hardware hardware.toml write pump 0 on
//! ```

mod commands;
mod transports;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "iohal")]
#[command(about = "Capability-based hardware abstraction for I2C and networked devices", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Hardware configuration file (TOML format)
    #[arg(long, global = true, default_value = "hardware.toml")]
    hardware: PathBuf,

    /// Use in-memory buses and sockets instead of real hardware
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered driver factories
    Factories {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a factory's capabilities and parameters
    Describe {
        /// Driver type, e.g. ads1115
        driver: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate every device of a hardware file without opening any transport
    Validate {
        /// Hardware file to check
        file: PathBuf,
    },

    /// Read an analog (calibrated) or digital input pin
    Read {
        /// Device id from the hardware file
        device: String,
        /// Pin number
        pin: usize,
        /// Print the raw reading instead of the calibrated one
        #[arg(long)]
        raw: bool,
    },

    /// Drive a digital output pin
    Write {
        /// Device id from the hardware file
        device: String,
        /// Pin number
        pin: usize,
        /// on/off, true/false or 1/0
        #[arg(value_parser = commands::parse_level, action = clap::ArgAction::Set)]
        state: bool,
    },

    /// Set a PWM pin's duty cycle in percent
    Set {
        /// Device id from the hardware file
        device: String,
        /// Pin number
        pin: usize,
        /// Duty cycle, 0 to 100
        duty: f64,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let registry = commands::registry();
    match cli.command {
        Commands::Factories { json } => commands::factories(&registry, json),
        Commands::Describe { driver, json } => commands::describe(&registry, &driver, json),
        Commands::Validate { file } => commands::validate(&registry, &file),
        Commands::Read { device, pin, raw } => {
            let driver = commands::open_device(&registry, &cli.hardware, cli.mock, &device)?;
            let result = commands::read(driver.as_ref(), pin, raw);
            registry.close_all()?;
            result
        }
        // Outputs keep their state after exit, so the device is not closed.
        Commands::Write { device, pin, state } => {
            let driver = commands::open_device(&registry, &cli.hardware, cli.mock, &device)?;
            commands::write(driver.as_ref(), pin, state)
        }
        Commands::Set { device, pin, duty } => {
            let driver = commands::open_device(&registry, &cli.hardware, cli.mock, &device)?;
            commands::set(driver.as_ref(), pin, duty)
        }
    }
}
