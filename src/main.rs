use log::{error, info};
use std::sync::Arc;

use proactive_agent::core::agent::ProactiveCore;
use proactive_agent::core::config::AgentConfig;
use proactive_agent::core::error::AgentResult;
use proactive_agent::executor::{BuiltinExecutor, CommandWorker, FsProfileSource};
use proactive_agent::storage::SqliteStore;
use proactive_agent::web::server::start_web_server;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting proactive agent...");

    if let Err(e) = run().await {
        error!("Proactive agent failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> AgentResult<()> {
    let config = AgentConfig::from_env()?;
    let store = SqliteStore::open(&config.database_path)?;
    let profile = Arc::new(FsProfileSource::new(config.profile_dir.clone()));

    let worker = config.worker_command.clone().map(CommandWorker::new);
    if worker.is_none() {
        info!("No worker command configured; only health_check and cleanup tasks can succeed");
    }
    let executor = Arc::new(BuiltinExecutor::new(worker));

    let core = ProactiveCore::new(config.clone(), Box::new(store), executor, profile)?;
    info!("Agent core initialized");

    if config.auto_start {
        core.start().await;
    }

    // Start the web interface
    let web_server_handle = tokio::spawn(start_web_server(core.clone(), config.bind_address.clone()));

    info!("Proactive agent is now running. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
        result = web_server_handle => {
            match result {
                Ok(Ok(())) => info!("Web server stopped"),
                Ok(Err(e)) => error!("Web server failed: {}", e),
                Err(e) => error!("Web server task panicked: {}", e),
            }
        }
    }

    info!("Shutting down proactive agent...");
    core.shutdown().await;
    info!("Proactive agent shutdown complete");
    Ok(())
}
