use clap::Parser;
use tracing_subscriber::EnvFilter;

use ethicore::cli::{self, Cli};
use ethicore::config::{default_log_filter, PipelineConfig};

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli::run(args, config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}
