//! CLI command handling
//!
//! Loads configuration and suites, runs them, and prints the report.

use colored::Colorize;
use tracing::info;

use crate::client::PetFriendsClient;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::testing::{self, progress_line, ReportFormat, Selection, TestSuite};

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            suite,
            filter,
            report,
            config,
            name,
            strict_preconditions,
            verbose: _,
        } => {
            let config = Config::load(config.as_deref())?;
            config.validate()?;
            let suite = TestSuite::load(&suite)?;
            let client = PetFriendsClient::from_config(&config)?;
            let selection = Selection {
                scope: filter,
                name,
            };

            info!(suite = %suite.name, base_url = client.base_url(), "starting run");

            if report == ReportFormat::Text {
                println!(
                    "\n{} {}",
                    "Running Suite:".blue().bold(),
                    suite.name.white().bold()
                );
                if let Some(desc) = &suite.description {
                    println!("  {}", desc.dimmed());
                }
                println!();
            }

            let outcome = testing::run_suite(&client, &config, &suite, &selection, |result| {
                if report == ReportFormat::Text {
                    println!("{}", progress_line(result));
                }
            })
            .await;

            match report {
                ReportFormat::Text => print!("{}", outcome.to_text()),
                ReportFormat::Json => println!("{}", outcome.to_json()?),
            }

            let strict = strict_preconditions || config.report.fail_on_precondition_missing;
            Ok(outcome.exit_code(strict))
        }

        Commands::List { suite, filter } => {
            let suite = TestSuite::load(&suite)?;
            let selection = Selection {
                scope: filter,
                name: None,
            };

            println!("{}", suite.name.bold());
            for scenario in suite.scenarios.iter().filter(|s| selection.includes(s)) {
                println!(
                    "  {:8} {}",
                    scenario.expect.to_string().cyan(),
                    scenario.name
                );
                if let Some(desc) = &scenario.description {
                    println!("           {}", desc.dimmed());
                }
            }
            Ok(0)
        }
    }
}
