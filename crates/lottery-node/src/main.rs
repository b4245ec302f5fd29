//! # Lottery Node
//!
//! Entry point of the round server.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize logging
//! 3. Probe the ledger; without one the node accepts simulated bets only
//! 4. Start the round service and its scheduler
//! 5. Serve the WebSocket gateway until Ctrl+C

mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use lottery_core::{LedgerClient, RoundScheduler, ServiceDeps};
use lottery_gateway::{AppState, WsBroadcaster};
use lottery_ledger::{LedgerConfig, SolanaRpcClient};

use crate::config::NodeConfig;

/// Connect to the ledger, or fall back to simulation-only mode.
async fn connect_ledger(rpc_url: Option<&str>) -> Option<Arc<dyn LedgerClient>> {
    let Some(rpc_url) = rpc_url else {
        warn!("LOTTERY_RPC_URL not set, only simulated bets will be accepted");
        return None;
    };

    let client = match SolanaRpcClient::new(LedgerConfig::new(rpc_url)) {
        Ok(client) => client,
        Err(e) => {
            error!(rpc_url, error = %e, "Failed to build ledger client");
            return None;
        }
    };

    match client.health().await {
        Ok(()) => {
            info!(rpc_url, "Ledger connected");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(rpc_url, error = %e, "Ledger probe failed, only simulated bets will be accepted");
            None
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("failed to load configuration")?;
    telemetry::init(&config.telemetry)?;

    info!(
        bind_addr = %config.gateway.bind_addr,
        round_secs = config.lottery.round_duration.as_secs(),
        platform_address = %config.lottery.platform_address,
        "Starting lottery node"
    );

    let ledger = connect_ledger(config.rpc_url.as_deref()).await;
    let broadcaster = WsBroadcaster::new(config.gateway.channel_capacity);
    let deps = ServiceDeps::new(ledger, Arc::new(broadcaster.clone()));
    let (service, scheduler) = RoundScheduler::launch(config.lottery.clone(), deps);

    let state = AppState {
        api: service,
        broadcaster,
        config: config.gateway.clone(),
    };
    let served = lottery_gateway::serve(state, shutdown_signal())
        .await
        .context("gateway failed");

    scheduler.abort();
    info!("Lottery node stopped");
    served
}
