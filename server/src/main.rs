use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::Args;
use server::{start, LogFacade, ServerConfig, StopReason};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main-method of the dedicated server.
/// Parses command-line arguments, hosts a session and stops it on Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    let config = ServerConfig::from(&args);
    let token = CancellationToken::new();
    let handle = start(&config, &token, Arc::new(LogFacade)).await?;
    info!("Hosting session on {}", handle.local_addr());

    // Handle shutdown gracefully
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
            token.cancel();
        }
        reason = handle.stopped() => {
            info!("Session ended on its own: {:?}", reason);
        }
    }

    match handle.join().await {
        StopReason::NormalShutdown => {
            info!("Server shutdown complete");
            Ok(())
        }
        StopReason::Error(what) => Err(what.into()),
    }
}
