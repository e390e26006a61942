//! ICY Swap - ICY -> BTC swap settlement service
//!
//! # Modules
//!
//! - [`config`] - YAML application config with env overrides for secrets
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL pool
//! - [`money`] - amount parsing, base-unit scaling and satoshi math
//! - [`swap`] - the settlement saga: gate, coordinator, compensation, workers
//! - [`gateway`] - HTTP webhook, audit and operator endpoints

pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod money;
pub mod swap;

pub use config::AppConfig;
pub use swap::{
    SagaReport, SagaState, SwapCoordinator, SwapDispatcher, SwapError, SwapGate, SwapRequest,
    TransactionRequestEvent,
};
