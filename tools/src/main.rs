//! `agency-tools`: operator bootstrap commands (spec §6), grounded on
//! `original_source/cc-agency/cc_agency/tools/main.py`'s subcommand
//! dispatch. Unlike the broker/controller binaries, each subcommand opens
//! its own short-lived store connection and exits; there is no long-running
//! service here.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use common::logger::init_tracing;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    let cli = Cli::parse();

    let result = match cli.command {
        Command::CreateDbUser { config } => commands::create_db_user::run(config).await,
        Command::CreateBrokerUser { config } => commands::create_broker_user::run(config).await,
        Command::DropDbCollections { config, collections } => {
            commands::drop_db_collections::run(config, collections).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "agency-tools command failed");
            ExitCode::from(2)
        }
    }
}
