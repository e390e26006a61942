//! Manual Reconciliation
//!
//! Operator-triggered replay of failed refunds. Never scheduled: the saga
//! itself does not retry, this only runs when someone asks for it.
//!
//! Per record with `revert_status = failed`:
//! - withdraw failed: transfer back only
//! - no confirmed deposit yet: deposit back, then transfer back
//! - deposit confirmed: transfer back only
//!
//! One pass runs at a time per process, and each row is claimed
//! (`failed -> reconciling`) in the store before any funds move. A row whose
//! outcome could not be written stays `reconciling` and is never replayed
//! automatically.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::coordinator::SwapCoordinator;
use super::error::{AdapterError, CompensationStage, ReconcileError, SwapError};
use super::state::StepStatus;
use super::types::{SwapRequest, SwapRequestQuery};
use crate::money;

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub reverted: Vec<String>,
    pub still_failed: Vec<String>,
    /// Rows claimed by another pass between listing and claiming
    pub skipped: Vec<String>,
}

pub struct Reconciler {
    coordinator: Arc<SwapCoordinator>,
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(coordinator: Arc<SwapCoordinator>) -> Self {
        Self {
            coordinator,
            running: Mutex::new(()),
        }
    }

    /// Replay compensation once for every failed refund.
    ///
    /// Fails with `Busy` instead of waiting when a pass is already running.
    pub async fn run_once(&self) -> Result<ReconcileSummary, ReconcileError> {
        let _pass = self.running.try_lock().map_err(|_| {
            warn!("Reconciliation requested while a pass is running");
            ReconcileError::Busy
        })?;

        let store = self.coordinator.store();
        let pending = store.list(&SwapRequestQuery::revert_failed()).await?;

        let mut summary = ReconcileSummary {
            scanned: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            info!("No failed refunds to reconcile");
            return Ok(summary);
        }
        info!(count = pending.len(), "Reconciling failed refunds");

        for record in pending {
            let code = record.request_code.clone();
            match store.claim_for_reconciliation(&code).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(request_code = %code, "Record already claimed, skipping");
                    summary.skipped.push(code);
                    continue;
                }
                Err(e) => {
                    warn!(request_code = %code, error = %e, "Could not claim record");
                    summary.still_failed.push(code);
                    continue;
                }
            }

            match self.reconcile(record).await {
                Ok(()) => summary.reverted.push(code),
                Err(e) => {
                    warn!(request_code = %code, error = %e, error_code = e.code(), "Record not reconciled");
                    summary.still_failed.push(code);
                }
            }
        }

        info!(
            reverted = summary.reverted.len(),
            still_failed = summary.still_failed.len(),
            skipped = summary.skipped.len(),
            "Reconciliation pass finished"
        );
        Ok(summary)
    }

    async fn reconcile(&self, mut record: SwapRequest) -> Result<(), SwapError> {
        let coordinator = &self.coordinator;
        let mut errors = Vec::new();

        // tx_deposit is only set once a deposit back was confirmed
        let needs_deposit =
            record.withdraw_status != StepStatus::Failed && record.tx_deposit.is_none();
        if needs_deposit {
            let base_amount =
                match money::to_base_units(&record.amount, coordinator.token_decimals()) {
                    Ok(amount) => amount,
                    Err(e) => {
                        // release the claim
                        record.mark_revert_failed(&e.to_string());
                        coordinator.persist(&record, &mut errors).await;
                        return Err(SwapError::CompensationFailed {
                            request_code: record.request_code.clone(),
                            stage: CompensationStage::DepositBack,
                            source: AdapterError::new("money", e.to_string()),
                        });
                    }
                };
            if let Err(e) = coordinator.deposit_back(&mut record, &base_amount).await {
                coordinator.persist(&record, &mut errors).await;
                return Err(e);
            }
        }

        let outcome = coordinator.transfer_back(&mut record).await;
        coordinator.persist(&record, &mut errors).await;
        let tx_id = outcome?;

        let embed = coordinator.notifier().revert_embed(&tx_id, &record.amount);
        if let Err(e) = coordinator
            .notifier()
            .notify(&record.request_code, &record.profile_id, &embed)
            .await
        {
            warn!(request_code = %record.request_code, error = %e, "User not notified of refund");
        }

        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
