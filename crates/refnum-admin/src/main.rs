#![doc = include_str!("../README.md")]

mod admin;

use admin::{
    commands,
    config::{AdminConfig, CliArgs},
    telemetry::init_telemetry,
};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AdminConfig::try_from(args)?;

    let providers = init_telemetry(config.log_format)?;

    if cfg!(debug_assertions) {
        tracing::debug!("Running with full config: {:#?}", config);
    } else {
        tracing::debug!(database = %config.database.display(), "Running");
    }

    let result = commands::run(&config, &mut std::io::stdout().lock());

    providers.shutdown();
    result
}
