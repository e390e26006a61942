use std::sync::Arc;

use crate::swap::{Reconciler, SwapDispatcher, SwapGate, SwapRequestStore};

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    /// Queue into the swap workers
    pub dispatcher: SwapDispatcher,
    /// Shape checks before enqueueing
    pub gate: Arc<SwapGate>,
    /// Read side for the audit API
    pub store: Arc<dyn SwapRequestStore>,
    pub reconciler: Arc<Reconciler>,
    /// Required in `X-Internal-Secret`. Empty disables `/internal` routes.
    pub internal_secret: String,
}

impl AppState {
    pub fn new(
        dispatcher: SwapDispatcher,
        gate: Arc<SwapGate>,
        store: Arc<dyn SwapRequestStore>,
        reconciler: Arc<Reconciler>,
        internal_secret: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            gate,
            store,
            reconciler,
            internal_secret: internal_secret.into(),
        }
    }

    pub fn is_internal_secret(&self, provided: Option<&str>) -> bool {
        provided.is_some_and(|p| secret_matches(&self.internal_secret, p))
    }
}

/// Constant-time comparison. An empty expected secret never matches.
fn secret_matches(expected: &str, provided: &str) -> bool {
    let (expected, provided) = (expected.as_bytes(), provided.as_bytes());
    if expected.is_empty() || provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
