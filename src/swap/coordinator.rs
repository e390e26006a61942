//! Swap Coordinator
//!
//! Drives one admitted swap request through the saga:
//!
//! 1. Withdraw from the vault. On failure, attempt a precautionary refund
//!    to the user and stop.
//! 2. Swap (fetch rate, sign, execute). On success, notify and stop.
//! 3. On swap failure, deposit back into the vault, then transfer back to
//!    the user. A failed deposit-back stops the saga for manual work.
//!
//! The record is persisted after every step. Steps are never retried here.
//! Store errors are logged and reported but never change a decision that
//! was already taken.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::adapters::{SignatureRequest, SwapExecutor, VaultClient};
use super::error::{AdapterError, CompensationStage, SwapError};
use super::notify::{Embed, Notifier};
use super::state::SagaState;
use super::store::SwapRequestStore;
use super::types::{REVERT_NOTE, SwapRequest};
use crate::money;

/// Log target for outcomes an operator has to reconcile by hand
pub const RECONCILIATION_TARGET: &str = "icy_swap::reconciliation";

/// Final position of one saga run plus every error met on the way
#[derive(Debug, Clone)]
pub struct SagaReport {
    pub request_code: String,
    pub state: SagaState,
    pub errors: Vec<SwapError>,
}

impl SagaReport {
    pub fn is_success(&self) -> bool {
        self.state == SagaState::SwapOk
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code() == code)
    }
}

struct SwapReceipt {
    tx_hash: String,
    btc_amount: String,
    min_satoshi_fee: String,
}

pub struct SwapCoordinator {
    store: Arc<dyn SwapRequestStore>,
    vault: Arc<dyn VaultClient>,
    executor: Arc<dyn SwapExecutor>,
    notifier: Arc<Notifier>,
    token_decimals: u32,
}

impl SwapCoordinator {
    pub fn new(
        store: Arc<dyn SwapRequestStore>,
        vault: Arc<dyn VaultClient>,
        executor: Arc<dyn SwapExecutor>,
        notifier: Arc<Notifier>,
        token_decimals: u32,
    ) -> Self {
        Self {
            store,
            vault,
            executor,
            notifier,
            token_decimals,
        }
    }

    /// Run the saga for a freshly admitted, pending record.
    pub async fn execute(&self, mut record: SwapRequest) -> SagaReport {
        let mut errors = Vec::new();

        let base_amount = match money::to_base_units(&record.amount, self.token_decimals) {
            Ok(amount) => amount,
            Err(e) => {
                // Admission rejects these; nothing has left the vault yet.
                let source = AdapterError::new("money", e.to_string());
                if let Err(t) = record.mark_withdraw_failed(&source.to_string()) {
                    errors.push(t);
                }
                errors.push(SwapError::WithdrawFailed {
                    request_code: record.request_code.clone(),
                    source,
                });
                self.persist(&record, &mut errors).await;
                return Self::report(record, errors);
            }
        };

        // Step 1: withdraw
        info!(
            request_code = %record.request_code,
            profile_id = %record.profile_id,
            amount = %record.amount,
            vault = self.vault.name(),
            "Withdrawing from vault"
        );
        if let Err(source) = self.vault.withdraw(&base_amount, &record.token_id).await {
            return self.on_withdraw_failed(record, source, errors).await;
        }
        record.mark_withdraw_success();
        self.persist(&record, &mut errors).await;

        // Step 2: swap
        match self.run_swap(&record, &base_amount).await {
            Ok(receipt) => self.on_swap_success(record, receipt, errors).await,
            Err(source) => self.on_swap_failed(record, &base_amount, source, errors).await,
        }
    }

    async fn run_swap(
        &self,
        record: &SwapRequest,
        base_amount: &str,
    ) -> Result<SwapReceipt, AdapterError> {
        let service = self.executor.name();
        let info = self.executor.icy_info().await?;

        let rate = Decimal::from_str(info.icy_satoshi_rate.trim()).map_err(|e| {
            AdapterError::new(
                service,
                format!("invalid icy_satoshi_rate {:?}: {}", info.icy_satoshi_rate, e),
            )
        })?;
        let btc_amount = money::satoshi_for(&record.amount, rate)
            .map_err(|e| AdapterError::new(service, e.to_string()))?;

        let signature = self
            .executor
            .get_signature(&SignatureRequest {
                icy_amount: base_amount.to_string(),
                btc_address: record.btc_address.clone(),
                btc_amount: btc_amount.to_string(),
            })
            .await?;
        debug!(
            request_code = %record.request_code,
            btc_amount = %signature.btc_amount,
            nonce = %signature.nonce,
            "Swap signature obtained"
        );

        let tx_hash = self.executor.swap(&signature, &record.btc_address).await?;

        Ok(SwapReceipt {
            tx_hash,
            btc_amount: signature.btc_amount,
            min_satoshi_fee: info.min_satoshi_fee,
        })
    }

    async fn on_withdraw_failed(
        &self,
        mut record: SwapRequest,
        source: AdapterError,
        mut errors: Vec<SwapError>,
    ) -> SagaReport {
        warn!(
            request_code = %record.request_code,
            profile_id = %record.profile_id,
            amount = %record.amount,
            error = %source,
            precautionary_refund = true,
            "Vault withdraw failed"
        );
        if let Err(e) = record.mark_withdraw_failed(&source.to_string()) {
            errors.push(e);
        }
        errors.push(SwapError::WithdrawFailed {
            request_code: record.request_code.clone(),
            source,
        });

        // Precautionary refund even though the withdrawal may have been a no-op.
        let embed = self.transfer_back_embed(&mut record, &mut errors).await;
        self.persist(&record, &mut errors).await;
        self.notify(&record, &embed, &mut errors).await;
        Self::report(record, errors)
    }

    async fn on_swap_success(
        &self,
        mut record: SwapRequest,
        receipt: SwapReceipt,
        mut errors: Vec<SwapError>,
    ) -> SagaReport {
        if let Err(e) = record.mark_swap_success(&receipt.tx_hash) {
            errors.push(e);
        }
        self.persist(&record, &mut errors).await;

        let delivered = money::delivered_satoshi(&receipt.btc_amount, &receipt.min_satoshi_fee);
        info!(
            request_code = %record.request_code,
            tx_swap = %receipt.tx_hash,
            satoshi = %delivered,
            "Swap completed"
        );

        let embed = self
            .notifier
            .success_embed(&receipt.tx_hash, &record.amount, &delivered);
        self.notify(&record, &embed, &mut errors).await;
        Self::report(record, errors)
    }

    async fn on_swap_failed(
        &self,
        mut record: SwapRequest,
        base_amount: &str,
        source: AdapterError,
        mut errors: Vec<SwapError>,
    ) -> SagaReport {
        warn!(
            request_code = %record.request_code,
            profile_id = %record.profile_id,
            amount = %record.amount,
            error = %source,
            "Swap failed, compensating"
        );
        if let Err(e) = record.mark_swap_failed(&source.to_string()) {
            errors.push(e);
        }
        errors.push(SwapError::SwapFailed {
            request_code: record.request_code.clone(),
            source,
        });
        self.persist(&record, &mut errors).await;

        // Step 2a: deposit back. Failure here is terminal and silent to the user.
        if let Err(e) = self.deposit_back(&mut record, base_amount).await {
            errors.push(e);
            self.persist(&record, &mut errors).await;
            return Self::report(record, errors);
        }

        // Step 2b: transfer back
        let embed = self.transfer_back_embed(&mut record, &mut errors).await;
        self.persist(&record, &mut errors).await;
        self.notify(&record, &embed, &mut errors).await;
        Self::report(record, errors)
    }

    /// Deposit `base_amount` back into the application vault and record the
    /// outcome on `record`. Does not persist.
    pub(crate) async fn deposit_back(
        &self,
        record: &mut SwapRequest,
        base_amount: &str,
    ) -> Result<String, SwapError> {
        match self
            .vault
            .deposit_to_vault(base_amount, &record.token_id)
            .await
        {
            Ok(reference) => {
                record.set_tx_deposit(Some(&reference));
                info!(
                    request_code = %record.request_code,
                    tx_deposit = %reference,
                    "Deposited back to vault"
                );
                Ok(reference)
            }
            Err(source) => {
                // tx_deposit only ever holds a confirmed deposit; an
                // unconfirmed hash goes into the error text for the operator
                let message = match &source.reference {
                    Some(reference) => format!("{} (unconfirmed tx {})", source, reference),
                    None => source.to_string(),
                };
                record.mark_revert_failed(&message);
                error!(
                    target: RECONCILIATION_TARGET,
                    request_code = %record.request_code,
                    profile_id = %record.profile_id,
                    amount = %record.amount,
                    token_id = %record.token_id,
                    unconfirmed_tx = ?source.reference,
                    error = %source,
                    "Deposit back to vault failed: funds withdrawn but neither swapped nor returned"
                );
                Err(SwapError::CompensationFailed {
                    request_code: record.request_code.clone(),
                    stage: CompensationStage::DepositBack,
                    source,
                })
            }
        }
    }

    /// Credit the user from the vault and record the outcome on `record`.
    /// Does not persist. Returns the vault tx id.
    pub(crate) async fn transfer_back(&self, record: &mut SwapRequest) -> Result<String, SwapError> {
        match self
            .vault
            .transfer_to_user(
                &record.profile_id,
                &record.amount,
                &record.token_id,
                REVERT_NOTE,
            )
            .await
        {
            Ok(tx_id) => {
                record.mark_revert_success();
                info!(
                    request_code = %record.request_code,
                    vault_tx_id = %tx_id,
                    "Refunded user"
                );
                Ok(tx_id)
            }
            Err(source) => {
                record.mark_revert_failed(&source.to_string());
                error!(
                    target: RECONCILIATION_TARGET,
                    request_code = %record.request_code,
                    profile_id = %record.profile_id,
                    amount = %record.amount,
                    token_id = %record.token_id,
                    error = %source,
                    "Transfer back to user failed"
                );
                Err(SwapError::CompensationFailed {
                    request_code: record.request_code.clone(),
                    stage: CompensationStage::TransferBack,
                    source,
                })
            }
        }
    }

    /// Transfer back, then pick the DM that matches the outcome
    async fn transfer_back_embed(
        &self,
        record: &mut SwapRequest,
        errors: &mut Vec<SwapError>,
    ) -> Embed {
        match self.transfer_back(record).await {
            Ok(tx_id) => self.notifier.revert_embed(&tx_id, &record.amount),
            Err(e) => {
                errors.push(e);
                self.notifier.incomplete_revert_embed(&record.amount)
            }
        }
    }

    pub(crate) async fn persist(&self, record: &SwapRequest, errors: &mut Vec<SwapError>) {
        match self.store.update(record).await {
            Ok(true) => debug!(
                request_code = %record.request_code,
                state = %record.saga_state(),
                "Swap request persisted"
            ),
            Ok(false) => {
                let from = match self.store.get(&record.request_code).await {
                    Ok(Some(stored)) => stored.swap_request_status,
                    _ => record.swap_request_status,
                };
                let e = SwapError::InvalidTransition {
                    request_code: record.request_code.clone(),
                    from,
                    to: record.swap_request_status,
                };
                error!(request_code = %record.request_code, error = %e, "Swap request update refused");
                errors.push(e);
            }
            Err(e) => {
                error!(
                    request_code = %record.request_code,
                    state = %record.saga_state(),
                    error = %e,
                    "Failed to persist swap request"
                );
                errors.push(SwapError::Store(e));
            }
        }
    }

    async fn notify(&self, record: &SwapRequest, embed: &Embed, errors: &mut Vec<SwapError>) {
        if let Err(e) = self
            .notifier
            .notify(&record.request_code, &record.profile_id, embed)
            .await
        {
            warn!(request_code = %record.request_code, error = %e, "User not notified");
            errors.push(e);
        }
    }

    fn report(record: SwapRequest, errors: Vec<SwapError>) -> SagaReport {
        let state = record.saga_state();
        info!(
            request_code = %record.request_code,
            state = %state,
            errors = errors.len(),
            "Swap saga finished"
        );
        SagaReport {
            request_code: record.request_code,
            state,
            errors,
        }
    }

    pub fn store(&self) -> &Arc<dyn SwapRequestStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn token_decimals(&self) -> u32 {
        self.token_decimals
    }
}
