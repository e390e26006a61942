//! ICY Swap service
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌──────────┐    ┌──────────────┐
//! │ Webhook  │───▶│ Dispatcher │───▶│   Gate   │───▶│ Coordinator  │
//! │ (axum)   │    │ (bounded)  │    │ (admit)  │    │ (saga)       │
//! └──────────┘    └────────────┘    └──────────┘    └──────────────┘
//!                                                      │ vault, swap,
//!                                                      ▼ profile, DM
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use icy_swap::config::AppConfig;
use icy_swap::db::Database;
use icy_swap::gateway::{self, state::AppState};
use icy_swap::swap::adapters::{DiscordSink, IcyBackendClient, MochiPayVault, MochiProfileClient};
use icy_swap::swap::{
    DispatcherConfig, MemoryRequestLimitStore, MemorySwapRequestStore, Notifier,
    PgSwapRequestStore, Reconciler, SwapCoordinator, SwapDispatcher, SwapGate, SwapRequestStore,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SwapRequestStore>> {
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            let store = PgSwapRequestStore::new(db.pool().clone());
            store
                .init_schema()
                .await
                .context("Failed to initialize swap request schema")?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No postgres_url configured, swap requests are kept in memory only");
            println!("⚠️  In-memory swap request store (data lost on restart)");
            Ok(Arc::new(MemorySwapRequestStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = icy_swap::logging::init_logging(&app_config.log);

    tracing::info!("Starting ICY swap service in {} mode", env);
    println!("=== ICY Swap ({}) ===", env);

    let store = open_store(&app_config).await?;
    let swap_config = &app_config.swap;

    // External collaborators
    let icy_backend = Arc::new(IcyBackendClient::new(&app_config.icy_backend)?);
    let vault = Arc::new(MochiPayVault::new(
        app_config.mochi_pay.clone(),
        icy_backend.clone(),
    )?);
    let notifier = Arc::new(Notifier::new(
        Arc::new(MochiProfileClient::new(&app_config.mochi_profile)?),
        Arc::new(DiscordSink::new(&app_config.discord)?),
        swap_config.explorer_base_url.clone(),
        swap_config.token_symbol.clone(),
    ));

    let coordinator = Arc::new(SwapCoordinator::new(
        store.clone(),
        vault,
        icy_backend,
        notifier,
        swap_config.token_decimals,
    ));

    let mut gate = SwapGate::new(store.clone(), swap_config.token_decimals);
    if swap_config.max_requests_per_profile_per_day > 0 {
        let limits = Arc::new(MemoryRequestLimitStore::new());
        gate = gate.with_daily_limit(limits.clone(), swap_config.max_requests_per_profile_per_day);

        // Drop counters from previous days
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                limits.prune_before(chrono::Utc::now().date_naive());
            }
        });
        println!(
            "🚦 Daily limit: {} swap requests per profile",
            swap_config.max_requests_per_profile_per_day
        );
    }
    let gate = Arc::new(gate);

    let (dispatcher, _workers) = SwapDispatcher::start(
        gate.clone(),
        coordinator.clone(),
        DispatcherConfig {
            workers: swap_config.workers,
            queue_size: swap_config.queue_size,
        },
    );
    println!(
        "🔄 Swap workers started ({} workers, queue {})",
        swap_config.workers, swap_config.queue_size
    );

    if app_config.gateway.internal_secret.is_empty() {
        tracing::warn!("gateway.internal_secret is empty, /internal routes are disabled");
    }

    let state = Arc::new(AppState::new(
        dispatcher,
        gate,
        store,
        Arc::new(Reconciler::new(coordinator)),
        app_config.gateway.internal_secret.clone(),
    ));

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(&app_config.gateway.host, port, state)
        .await
        .context("Gateway server error")?;
    Ok(())
}
