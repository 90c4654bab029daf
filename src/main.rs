mod assembler;
mod chart;
mod cli;
mod db;
mod error;
mod fmt;
mod models;
mod prefilter;
mod registry;
mod report;
mod settings;
mod sql;
mod statistics;
mod window;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ReportCommands};
use report::EntitySelection;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            data_dir,
            fiscal_year_start,
            currency,
        } => cli::init::run(data_dir, fiscal_year_start, currency),
        Commands::Demo => cli::demo::run(),
        Commands::Status => cli::status::run(),
        Commands::Report { command } => match command {
            ReportCommands::Lapsed { args } => cli::report::run(args, EntitySelection::Lapsed),
            ReportCommands::Donors { args, window } => {
                cli::report::run(args, EntitySelection::ActiveIn(window.into()))
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
