pub mod aggregate;
pub mod cli;
pub mod config;
pub mod emission;
pub mod error;
pub mod export;
pub mod fields;
pub mod io_utils;
pub mod mapping;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod preview;
pub mod report;
pub mod source;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, CoefficientsArgs, Commands},
    config::Config,
    export::format_quantity,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("co2e_survey", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;
    debug!(
        "Active config: keywords '{}', coefficients '{}', defaulting {:?}, duplicates {:?}",
        config.keywords.version,
        config.coefficients.version,
        config.defaulting,
        config.duplicates
    );
    match cli.command {
        Commands::Report(args) => report::execute(&args, &config),
        Commands::Compute(args) => export::execute(&args, &config),
        Commands::Mapping(args) => mapping::execute(&args, &config),
        Commands::Preview(args) => preview::execute(&args),
        Commands::Coefficients(args) => handle_coefficients(&args, &config),
    }
}

fn handle_coefficients(args: &CoefficientsArgs, config: &Config) -> Result<()> {
    if let Some(path) = &args.output {
        config
            .save(path)
            .with_context(|| format!("Writing config to {path:?}"))?;
        info!(
            "Config with coefficient set '{}' written to {path:?}",
            config.coefficients.version
        );
        return Ok(());
    }

    let headers = vec!["coefficient".to_string(), "kg_co2e".to_string()];
    let rows = config
        .coefficients
        .entries()
        .into_iter()
        .map(|(name, value)| vec![name.to_string(), format_quantity(value)])
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!(
        "Coefficient set '{}'; delivery counts for answers: {}",
        config.coefficients.version,
        config.coefficients.consumption.delivery_yes.join(", ")
    );
    Ok(())
}
