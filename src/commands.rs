//! CLI command definitions
//!
//! Defines the clap commands for the contract harness.

use clap::Subcommand;
use std::path::PathBuf;

use crate::client::ListFilter;
use crate::testing::{ReportFormat, DEFAULT_SUITE};

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scenarios of a suite against the pet service
    Run {
        /// Path to the YAML suite file
        #[arg(default_value = DEFAULT_SUITE)]
        suite: PathBuf,

        /// Scenario scope: 'my_pets' keeps only scenarios that touch your own pets
        #[arg(long, default_value = "all")]
        filter: ListFilter,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        report: ReportFormat,

        /// Configuration file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only run scenarios whose name contains this text
        #[arg(long)]
        name: Option<String>,

        /// Fail the run when a scenario's precondition is missing
        #[arg(long)]
        strict_preconditions: bool,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the scenarios of a suite without running them
    List {
        /// Path to the YAML suite file
        #[arg(default_value = DEFAULT_SUITE)]
        suite: PathBuf,

        /// Scenario scope: 'all' or 'my_pets'
        #[arg(long, default_value = "all")]
        filter: ListFilter,
    },
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Run { verbose: true, .. })
    }
}
