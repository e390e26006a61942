//! ICY -> BTC Swap Settlement
//!
//! An approved transfer-request event moves a user's custodial ICY through a
//! vault withdrawal and an on-chain swap to BTC. Any failure after funds
//! move triggers compensation that returns them to the user.
//!
//! ```text
//! webhook ─▶ SwapDispatcher ─▶ SwapGate ─▶ SwapCoordinator
//!              (bounded)       (admit)      withdraw ─▶ swap ─▶ notify
//!                                              │          │
//!                                              ▼          ▼
//!                                         refund     deposit ─▶ refund ─▶ notify
//! ```
//!
//! Every step is persisted to the `SwapRequestStore` before the next one
//! starts. See `state::SagaState` for the derived state diagram.

pub mod adapters;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod limiter;
pub mod notify;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod types;
pub mod worker;

#[cfg(test)]
mod integration_tests;

pub use coordinator::{SagaReport, SwapCoordinator};
pub use error::{
    AdapterError, CompensationStage, DispatchError, ReconcileError, Rejection, StoreError, SwapError,
};
pub use gate::SwapGate;
pub use limiter::{MemoryRequestLimitStore, RequestLimitStore};
pub use notify::{Embed, Notifier};
pub use reconcile::{ReconcileSummary, Reconciler};
pub use state::{SagaState, StepStatus, SwapStatus};
pub use store::{InsertOutcome, MemorySwapRequestStore, PgSwapRequestStore, SwapRequestStore};
pub use types::{SortOrder, SwapRequest, SwapRequestQuery, TransactionRequestEvent};
pub use worker::{DispatcherConfig, SwapDispatcher};
