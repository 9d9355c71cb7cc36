//! PetFriends contract harness CLI
//!
//! Runs declarative API scenarios against the PetFriends service and
//! exits non-zero when the service misbehaves.

use clap::Parser;
use petcheck::{cli, commands, common::logging};
use commands::Commands;

#[derive(Parser)]
#[command(name = "petcheck", about = "Contract test harness for the PetFriends API")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    logging::init_cli(cli.command.verbose());

    match cli::dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
