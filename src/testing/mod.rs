//! Contract test runner
//!
//! Reads YAML suites of API scenarios, runs them against the pet service
//! through the transport client and aggregates the outcomes into a report
//! that separates service bugs from ordinary failures.

mod config;
mod report;
mod runner;

pub use config::*;
pub use report::{progress_line, Report, ReportFormat, ScenarioResult, ScenarioStatus, Summary};
pub use runner::{run_scenario, run_suite, Selection};
