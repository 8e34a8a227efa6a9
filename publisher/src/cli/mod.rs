use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "publisher",
    about = "Content publisher - batches announcements and publishes them on chain with capacity",
    after_help = "Examples:\n  \
    publisher run --config /path/to/config.yaml\n  \
    publisher setup --mongodb-uri mongodb://localhost:27017"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the publishing pipeline
    Run {
        #[command(flatten)]
        run_command: Box<RunCmd>,
    },
    /// Create the indexes the MongoDB state store and job queue rely on
    Setup {
        #[command(flatten)]
        setup_command: Box<SetupCmd>,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct RunCmd {
    /// Path to the YAML configuration file
    #[arg(env = "PUBLISHER_CONFIG", long = "config", value_name = "PATH")]
    pub config_file: PathBuf,

    /// MSA id of the capacity paying provider
    #[arg(env = "PUBLISHER_PROVIDER_ID", long)]
    pub provider_id: Option<u64>,

    #[arg(env = "PUBLISHER_CHAIN_GATEWAY_URL", long)]
    pub chain_gateway_url: Option<Url>,

    #[arg(env = "PUBLISHER_BLOCK_TIME_MS", long)]
    pub block_time_ms: Option<u64>,

    #[arg(env = "PUBLISHER_IPFS_API_URL", long)]
    pub ipfs_api_url: Option<Url>,

    /// Switches the state store to MongoDB
    #[arg(env = "PUBLISHER_MONGODB_URI", long)]
    pub mongodb_uri: Option<String>,

    #[arg(env = "PUBLISHER_MONGODB_DATABASE_NAME", long, default_value = "publisher")]
    pub mongodb_database_name: String,

    #[arg(env = "PUBLISHER_BATCH_INTERVAL_SECONDS", long)]
    pub batch_interval_seconds: Option<u64>,

    #[arg(env = "PUBLISHER_BATCH_MAX_COUNT", long)]
    pub batch_max_count: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct SetupCmd {
    #[arg(env = "PUBLISHER_MONGODB_URI", long)]
    pub mongodb_uri: String,

    #[arg(env = "PUBLISHER_MONGODB_DATABASE_NAME", long, default_value = "publisher")]
    pub mongodb_database_name: String,
}
