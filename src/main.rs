use tracing::{error, info};

use mailbag::{Config, Mailer};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = mailbag::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        mailbag::logging::init_console_only(&config.logging.level);
    }

    info!("mailbag - player mail");
    info!("Storage directory: {}", config.storage.path);

    let mailer = match Mailer::open(config) {
        Ok(mailer) => mailer,
        Err(e) => {
            error!("Failed to open mail storage: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Ready: {} mail(s), {} group(s), next index {}",
        mailer.store().count().await,
        mailer.groups().count().await,
        mailer.store().next_index().await
    );
}
