mod calibrate;
mod decode;
mod patterns;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lmr::sync::DetectorVariant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark the sync detector variants and record the fastest.
    ///
    /// All variants are first checked to find identical sync candidates on a synthetic
    /// stream. Use the written record with the calibration_file engine config option.
    Calibrate {
        /// Calibration record output path.
        #[arg(short, long, default_value = "calibration.json", value_name = "path")]
        output: PathBuf,

        /// Only compare these variants.
        #[arg(short, long, value_delimiter = ',', value_name = "csv", value_parser = parse_variant)]
        variants: Vec<DetectorVariant>,

        /// Milliseconds spent timing each variant.
        #[arg(short, long, default_value_t = 250)]
        duration: u64,

        /// Output format for the per-variant scores.
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
    /// Decode messages from a demodulated bit stream.
    Decode {
        /// Input file of ASCII 0/1 characters, or packed bytes with --packed.
        input: PathBuf,

        /// Input is packed bytes, most significant bit first.
        #[arg(long, action)]
        packed: bool,

        /// Engine config (JSON).
        #[arg(short, long, value_name = "path")]
        config: Option<PathBuf>,

        /// Timeslot reported on decoded messages.
        #[arg(short, long, default_value_t = 1)]
        timeslot: u8,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
    /// List the sync patterns and message classes of the standard catalog.
    Patterns {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
}

fn parse_variant(s: &str) -> Result<DetectorVariant, String> {
    s.parse().map_err(|e: lmr::Error| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("LMR_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Calibrate {
            output,
            variants,
            duration,
            format,
        } => calibrate::calibrate(output, variants, *duration, format),
        Commands::Decode {
            input,
            packed,
            config,
            timeslot,
            format,
        } => decode::decode(input, *packed, config.as_deref(), *timeslot, format),
        Commands::Patterns { format } => patterns::patterns(format),
    }
}
