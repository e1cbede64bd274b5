use clap::Parser;
use std::process;

use slack_export::{cli, services, settings};

async fn try_main(args: cli::Args) -> anyhow::Result<()> {
    let settings = settings::load_settings()?;
    let config = settings::merge_settings_with_args(&args, settings)?;
    services::run(config).await
}

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(args.log_level.into())
        .format_timestamp_secs()
        .init();

    if let Err(e) = try_main(args).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
