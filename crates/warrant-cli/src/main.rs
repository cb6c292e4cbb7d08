//! Warrant command-line interface.
//!
//! Evaluates access requests against JSON fixtures, validates policy sets
//! and prints the effective configuration.
//!
//! # Quick Start
//!
//! ```bash
//! # Check a policy set before deploying it
//! warrant validate alarms.json
//!
//! # Ask for a decision
//! warrant eval --fixture zone.json --zone zone-1 \
//!     --subject bob --action GET --resource /alarms/sites/sanramon
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Warrant - attribute-based access control decisions.
#[derive(Parser)]
#[command(name = "warrant")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Evaluate a request against a fixture and print the result as JSON.
    Eval {
        /// Fixture with policy sets, subjects and resources.
        #[arg(short, long)]
        fixture: PathBuf,

        /// Zone the fixture is loaded into and the request is evaluated in.
        #[arg(short, long, default_value = "default")]
        zone: String,

        /// Subject identifier.
        #[arg(short, long)]
        subject: String,

        /// HTTP verb or MESSAGE.
        #[arg(short, long)]
        action: String,

        /// Resource URI.
        #[arg(short, long)]
        resource: String,

        /// Policy set evaluation order (comma separated).
        #[arg(long, value_delimiter = ',')]
        order: Vec<String>,

        /// Project directory holding warrant.toml.
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },

    /// Validate a policy set file.
    Validate {
        /// Policy set JSON file.
        path: PathBuf,
    },

    /// Print the effective configuration.
    Config {
        /// Project directory holding warrant.toml.
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Toml)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Toml,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Eval {
            fixture,
            zone,
            subject,
            action,
            resource,
            order,
            project,
        } => {
            let config = commands::load_config(&project)?;
            init_logging(&config.logging.filter);
            commands::eval::run(
                config,
                &fixture,
                &zone,
                commands::eval::Request {
                    subject,
                    action,
                    resource,
                    order,
                },
            )
        }
        Commands::Validate { path } => {
            init_logging("warn");
            commands::validate::run(&path)
        }
        Commands::Config { project, format } => {
            let config = commands::load_config(&project)?;
            init_logging(&config.logging.filter);
            match format {
                Format::Toml => commands::config::show_toml(&config),
                Format::Json => commands::config::show_json(&config),
            }
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` wins over
/// the configured filter.
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
