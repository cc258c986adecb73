use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "AqReact Developers",
    version,
    about = "AqReact CLI - Rebuilds geochemical reaction-engine inputs for coupled groundwater flow and transport simulations.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Regenerate reaction-engine inputs from an externally edited working directory.
    Regenerate(RegenerateArgs),
    /// Inspect and validate configuration documents.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for the `regenerate` subcommand.
#[derive(Args, Debug)]
pub struct RegenerateArgs {
    /// Working directory holding the configuration, the recorded command
    /// log, the template script, and the per-layer species files.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Template script name (relative to the working directory).
    #[arg(short, long, value_name = "FILE", default_value = "phinp.dat")]
    pub template: String,

    /// Number of grid layers.
    #[arg(long, value_name = "INT")]
    pub nlay: usize,

    /// Number of grid rows.
    #[arg(long, value_name = "INT")]
    pub nrow: usize,

    /// Number of grid columns.
    #[arg(long, value_name = "INT")]
    pub ncol: usize,

    /// Only validate that all external files exist, then exit.
    #[arg(long)]
    pub check_only: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load and validate a configuration document.
    Validate {
        /// Path to the configuration file.
        #[arg(value_name = "PATH")]
        file: PathBuf,
    },
    /// Load a configuration document and print its normalized form.
    Show {
        /// Path to the configuration file.
        #[arg(value_name = "PATH")]
        file: PathBuf,
    },
}
