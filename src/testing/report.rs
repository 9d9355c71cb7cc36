//! Result aggregation and report rendering

use std::time::Duration;

use colored::Colorize;
use serde::{Serialize, Serializer};

use crate::common::{FailureCause, Result};

use super::config::Expectation;

/// Final state of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Pass,
    Fail,
    /// A negative case was accepted with the invalid value echoed back
    BugDetected,
    /// A dependent step had nothing to work on
    PreconditionMissing,
}

impl ScenarioStatus {
    pub fn label(self) -> &'static str {
        match self {
            ScenarioStatus::Pass => "PASS",
            ScenarioStatus::Fail => "FAIL",
            ScenarioStatus::BugDetected => "BUG_DETECTED",
            ScenarioStatus::PreconditionMissing => "PRECONDITION_MISSING",
        }
    }
}

/// Result of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub expect: Expectation,
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub message: String,
}

fn as_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Output format of the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub bug_detected: usize,
    pub precondition_missing: usize,
    pub duration_ms: u64,
}

/// Results of a suite run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub suite: String,
    pub summary: Summary,
    pub results: Vec<ScenarioResult>,
    #[serde(skip)]
    pub duration: Duration,
}

impl Report {
    pub fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            ..Self::default()
        }
    }

    /// Add a finished scenario
    pub fn record(&mut self, result: ScenarioResult) {
        self.results.push(result);
    }

    pub fn summary(&self) -> Summary {
        let count =
            |status: ScenarioStatus| self.results.iter().filter(|r| r.status == status).count();
        Summary {
            total: self.results.len(),
            passed: count(ScenarioStatus::Pass),
            failed: count(ScenarioStatus::Fail),
            bug_detected: count(ScenarioStatus::BugDetected),
            precondition_missing: count(ScenarioStatus::PreconditionMissing),
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Results that point at a defect in the service
    pub fn bugs(&self) -> Vec<&ScenarioResult> {
        self.results
            .iter()
            .filter(|r| r.status == ScenarioStatus::BugDetected)
            .collect()
    }

    /// Whether the run counts as failed
    pub fn is_failure(&self, fail_on_precondition_missing: bool) -> bool {
        let summary = self.summary();
        summary.failed > 0
            || summary.bug_detected > 0
            || (fail_on_precondition_missing && summary.precondition_missing > 0)
    }

    /// Process exit code: 0 when the run passed, 1 otherwise
    pub fn exit_code(&self, fail_on_precondition_missing: bool) -> i32 {
        if self.is_failure(fail_on_precondition_missing) {
            1
        } else {
            0
        }
    }

    /// Render the report as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        let mut snapshot = self.clone();
        snapshot.summary = self.summary();
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Render the closing text summary
    pub fn to_text(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        let bugs = self.bugs();
        if !bugs.is_empty() {
            out.push_str(&format!(
                "\n{}\n",
                "BUGS DETECTED IN THE SERVICE".on_red().white().bold()
            ));
            for bug in bugs {
                out.push_str(&format!("  {} {}\n", "‼".red().bold(), bug.name.bold()));
                out.push_str(&format!("    {}\n", bug.message));
            }
        }

        let failures: Vec<&ScenarioResult> = self
            .results
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    ScenarioStatus::Fail | ScenarioStatus::PreconditionMissing
                )
            })
            .collect();
        if !failures.is_empty() {
            out.push_str(&format!("\n{}\n", "Failures:".yellow().bold()));
            for failure in failures {
                let cause = failure.cause.map(FailureCause::code).unwrap_or("-");
                out.push_str(&format!(
                    "  {} {} [{}]\n    {}\n",
                    "✗".red(),
                    failure.name,
                    cause,
                    failure.message
                ));
            }
        }

        let line = format!(
            "{} scenarios: {} passed, {} failed, {} bug detected, {} precondition missing ({} ms)",
            summary.total,
            summary.passed,
            summary.failed,
            summary.bug_detected,
            summary.precondition_missing,
            summary.duration_ms
        );
        let line = if summary.failed > 0 || summary.bug_detected > 0 {
            line.red().bold()
        } else {
            line.green().bold()
        };
        out.push_str(&format!("\n{}\n", line));
        out
    }
}

/// One line per finished scenario for text output
pub fn progress_line(result: &ScenarioResult) -> String {
    let marker = match result.status {
        ScenarioStatus::Pass => "✓".green(),
        ScenarioStatus::Fail => "✗".red(),
        ScenarioStatus::BugDetected => "‼".red().bold(),
        ScenarioStatus::PreconditionMissing => "?".yellow(),
    };
    let detail = match (result.status, result.cause) {
        (ScenarioStatus::Pass, None) => String::new(),
        (ScenarioStatus::Pass, Some(cause)) => format!(" ({})", cause.code().to_lowercase()),
        (status, _) => format!(" {}", status.label()),
    };
    format!(
        "  {} {} [{}]{} {}",
        marker,
        result.name,
        result.expect,
        detail,
        format!("{} ms", result.elapsed.as_millis()).dimmed()
    )
}
