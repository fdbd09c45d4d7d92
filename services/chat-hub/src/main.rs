use chat_hub::Config;
use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "chat hub starting");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("FATAL: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = chat_hub::run(config).await {
        error!(error = %err, "chat hub failed");
        std::process::exit(1);
    }
}
