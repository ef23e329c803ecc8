//! Appointment scheduling chat widget host
//!
//! Entry point serving the chat widget and bridging it to the scheduling backend.

use std::sync::Arc;

use appointment_chat::config::AppConfig;
use appointment_chat::{server, telemetry};
use dotenvy::dotenv;
use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing (M-LOG-STRUCTURED)
    telemetry::init(&config.logging)?;

    server::start_server(Arc::new(config)).await
}
