use canteen_guard::{config::GuardConfig, init_guard, init_tracing};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    init_tracing();

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/guard.yaml".to_string());

    let config = match GuardConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: canteen-guard [config_file]");
            process::exit(1);
        }
    };

    if let Err(e) = init_guard(config).await {
        eprintln!("Defense pipeline error: {}", e);
        process::exit(1);
    }
}
