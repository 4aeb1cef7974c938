//! tessitura - composition converter
//!
//! Subcommands:
//! - `tessitura normalize <input>` - Print the canonical form of any input shape
//! - `tessitura validate <input>` - Print the validation report
//! - `tessitura convert <input> --midi a.mid --abc a.abc --sc a.scd` - Run encoders
//! - `tessitura config` - Print the effective configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tessconf::TessConfig;
use tessitura::commands::{self, Targets};
use tessitura::EncoderParams;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tessitura")]
#[command(about = "Convert compositions to MIDI, ABC notation and SuperCollider")]
#[command(version)]
struct Cli {
    /// Config file used in place of ./tessitura.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical JSON form of a composition
    Normalize {
        /// Input JSON file, or - for stdin
        input: PathBuf,
    },

    /// Check a composition; exits non-zero when it has errors
    Validate {
        /// Input JSON file, or - for stdin
        input: PathBuf,
    },

    /// Encode a composition to one or more output formats
    Convert {
        /// Input JSON file, or - for stdin
        input: PathBuf,

        /// Standard MIDI File output path
        #[arg(long)]
        midi: Option<PathBuf>,

        /// ABC notation output path
        #[arg(long)]
        abc: Option<PathBuf>,

        /// SuperCollider script output path
        #[arg(long)]
        sc: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, sources) = TessConfig::load_with_sources_from(cli.config.as_deref())
        .context("loading configuration")?;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    match cli.command {
        Commands::Normalize { input } => {
            let value = commands::read_input(&input)?;
            println!("{}", commands::normalize_value(&value)?);
        }
        Commands::Validate { input } => {
            let value = commands::read_input(&input)?;
            let report = commands::validate_value(&value);
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("serializing report")?
            );
            if !report.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Convert {
            input,
            midi,
            abc,
            sc,
        } => {
            let value = commands::read_input(&input)?;
            let targets = Targets {
                midi,
                abc,
                script: sc,
            };
            let summary = commands::convert(&value, &targets, &EncoderParams::from(&config))?;
            for reported in &summary.diagnostics {
                eprintln!("{}", reported);
            }
            for path in &summary.written {
                println!("wrote {}", path.display());
            }
        }
        Commands::Config => {
            for path in &sources.files {
                println!("# loaded {}", path.display());
            }
            for var in &sources.env_overrides {
                println!("# override {}", var);
            }
            print!("{}", config.to_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}
