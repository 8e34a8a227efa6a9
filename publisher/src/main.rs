use std::sync::Arc;

use clap::Parser as _;
use dotenvy::dotenv;
use publisher::cli::{Cli, Commands, RunCmd};
use publisher::config::load_config_from_run_cmd;
use publisher::core::config::Config;
use publisher::setup::setup;
use publisher::utils::logging::init_logging;
use publisher::worker::initialize_worker;
use publisher::PublisherResult;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    info!("Starting publisher");
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { run_command } => {
            info!("Executing run command with args: {:?}", run_command);
            if let Err(e) = run_publisher(run_command).await {
                error!(error = %e, error_chain = ?e, "Failed to run publisher service");
                panic!("Failed to run publisher service: {}", e);
            }
            info!("Publisher service stopped");
        }
        Commands::Setup { setup_command } => {
            info!("Executing setup command with args: {:?}", setup_command);
            match setup(setup_command).await {
                Ok(_) => info!("Publisher setup completed successfully"),
                Err(e) => {
                    error!(error = %e, error_chain = ?e, "Failed to setup publisher");
                    panic!("Failed to setup publisher: {}", e);
                }
            }
        }
    }
}

async fn run_publisher(run_cmd: &RunCmd) -> PublisherResult<()> {
    let settings = load_config_from_run_cmd(run_cmd)?;
    let config = Arc::new(Config::from_settings(settings).await?);
    debug!(provider_id = config.provider_id(), "Configuration initialized");

    let worker_controller = initialize_worker(config).await?;

    tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");

    worker_controller.shutdown().await?;
    info!("Publisher service shutting down");
    Ok(())
}
