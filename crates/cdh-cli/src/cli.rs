//! CLI argument definitions for the harmonizer.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "cdh",
    version,
    about = "Clinical data harmonizer - map source study data into the harmonized data model",
    long_about = "Transform delimited clinical study data into the harmonized JSON data model.\n\n\
                  Mapping rules are resolved from a remote mapping document per study; outputs\n\
                  are validated against the data model's JSON schema, merged across source\n\
                  files with duplicate suppression, and audited for referential integrity."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the harmonization pipeline for every active study configuration.
    Run(RunArgs),

    /// List the node types of the harmonized data model.
    NodeTypes,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Path to the harmonizer configuration file.
    #[arg(value_name = "CONFIG", default_value = "harmonizer.json")]
    pub config: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
