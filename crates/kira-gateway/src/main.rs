//! kira-gateway: WhatsApp pairing bot
//!
//! Usage:
//!   kira-gateway           - Connect to WhatsApp and serve the control API
//!   kira-gateway --help    - Show help

use std::sync::Arc;

use kira_core::{Config, FirebaseStore, VerificationRecorder};
use kira_whatsapp::{
    BridgeSocketFactory, CommandDispatcher, ConnectorOptions, DispatcherConfig, SessionManager,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Buffered message batches between the session and the dispatcher
const INBOUND_BUFFER: usize = 100;

enum RunMode {
    Server,
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("kira-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting kira-gateway...");
    run_server(config).await
}

fn parse_args() -> RunMode {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

fn print_help() {
    println!("kira-gateway - WhatsApp pairing bot");
    println!();
    println!("Usage:");
    println!("  kira-gateway           Connect and serve the control API");
    println!("  kira-gateway --help    Show this help message");
    println!("  kira-gateway --version Show version");
    println!();
    println!("Configuration is read from kira-gateway.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  PORT                   Control API port (default: 3000)");
    println!("  AUTH_DIR               Credential directory (default: ./auth_info)");
    println!("  BRIDGE_URL             Socket bridge URL (default: http://127.0.0.1:8090)");
    println!("  WA_VERSION_URL         Latest version document, empty to skip");
    println!("  WA_BROWSER             Browser name announced to WhatsApp (default: Firefox)");
    println!("  FIREBASE_DATABASE_URL  Verification database root URL");
    println!("  FIREBASE_AUTH_TOKEN    Verification database token (optional)");
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = FirebaseStore::new(&config.firebase)
        .map_err(|e| anyhow::anyhow!("Failed to create verification store: {}", e))?;
    let recorder = VerificationRecorder::new(Arc::new(store));

    let factory = BridgeSocketFactory::from_config(&config.whatsapp)
        .map_err(|e| anyhow::anyhow!("Failed to create bridge client: {}", e))?;

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let sessions = SessionManager::new(
        Arc::new(factory),
        ConnectorOptions::from(&config.whatsapp),
        inbound_tx,
    );

    let dispatcher = Arc::new(CommandDispatcher::new(
        sessions.clone(),
        recorder,
        DispatcherConfig::from(&config.pairing),
    ));

    let mut handles = Vec::new();

    handles.push(tokio::spawn(dispatcher.clone().run(inbound_rx)));

    let api_config = config.api.clone();
    let api_sessions = sessions.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = kira_api::start_server(&api_config, api_sessions).await {
            tracing::error!("HTTP API server error: {}", e);
        }
    }));

    let port = config.api.port;
    tracing::info!("Pairing endpoint: http://localhost:{}/pair?code=YOUR_PHONE_NUMBER", port);
    tracing::info!("Logout endpoint: http://localhost:{}/logout?code=YOUR_PHONE_NUMBER", port);

    sessions.start().await;

    tracing::info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    sessions.shutdown().await;
    dispatcher.cancel_pending();
    for handle in handles {
        handle.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
