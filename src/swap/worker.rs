//! Swap Worker Pool
//!
//! Inbound events are queued on a bounded channel and drained by a fixed set
//! of workers. Submission never blocks: a full queue is reported back so the
//! webhook can ask the upstream to redeliver. A request code is processed by
//! at most one task at a time.

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::coordinator::SwapCoordinator;
use super::error::DispatchError;
use super::gate::SwapGate;
use super::types::TransactionRequestEvent;

/// Worker pool sizing
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_size: 256,
        }
    }
}

/// Releases the in-flight slot when the job is dropped, even on panic
struct InFlightGuard {
    codes: Arc<DashSet<String>>,
    request_code: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.codes.remove(&self.request_code);
    }
}

/// Cloneable submission handle
#[derive(Clone)]
pub struct SwapDispatcher {
    tx: mpsc::Sender<TransactionRequestEvent>,
    in_flight: Arc<DashSet<String>>,
}

impl SwapDispatcher {
    /// Spawn `config.workers` workers and return the submission handle.
    pub fn start(
        gate: Arc<SwapGate>,
        coordinator: Arc<SwapCoordinator>,
        config: DispatcherConfig,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(DashSet::new());

        let workers = config.workers.max(1);
        info!(workers, queue_size = config.queue_size, "Starting swap workers");

        let handles = (0..workers)
            .map(|worker_id| {
                let rx = rx.clone();
                let gate = gate.clone();
                let coordinator = coordinator.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    run_worker(worker_id, rx, gate, coordinator, in_flight).await;
                })
            })
            .collect();

        (Self { tx, in_flight }, handles)
    }

    /// Queue `event` without waiting.
    pub fn submit(&self, event: TransactionRequestEvent) -> Result<(), DispatchError> {
        let request_code = event.request_code.clone();
        if !self.in_flight.insert(request_code.clone()) {
            debug!(request_code = %request_code, "Request already in flight");
            return Err(DispatchError::AlreadyInFlight(request_code));
        }

        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.in_flight.remove(&request_code);
                warn!(request_code = %request_code, "Swap queue full");
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.in_flight.remove(&request_code);
                Err(DispatchError::Closed)
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Free queue slots
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<TransactionRequestEvent>>>,
    gate: Arc<SwapGate>,
    coordinator: Arc<SwapCoordinator>,
    in_flight: Arc<DashSet<String>>,
) {
    loop {
        let event = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(event) = event else {
            debug!(worker_id, "Swap queue closed, worker exiting");
            return;
        };

        let _guard = InFlightGuard {
            codes: in_flight.clone(),
            request_code: event.request_code.clone(),
        };

        // Rejections are logged by the gate
        let Ok(record) = gate.admit(&event).await else {
            continue;
        };

        let report = coordinator.execute(record).await;
        debug!(
            worker_id,
            request_code = %report.request_code,
            state = %report.state,
            "Worker finished swap request"
        );
    }
}
