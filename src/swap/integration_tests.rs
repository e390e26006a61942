//! Saga scenarios against mock collaborators and the in-memory store

use std::sync::Arc;

use async_trait::async_trait;

use super::adapters::IcyInfo;
use super::adapters::mock::{CallLog, MockIdentity, MockSink, MockSwapExecutor, MockVault};
use super::coordinator::{SagaReport, SwapCoordinator};
use super::error::{ReconcileError, Rejection, StoreError};
use super::gate::SwapGate;
use super::limiter::MemoryRequestLimitStore;
use super::notify::Notifier;
use super::reconcile::Reconciler;
use super::state::{SagaState, StepStatus, SwapStatus};
use super::store::{InsertOutcome, MemorySwapRequestStore, SwapRequestStore};
use super::types::{SwapRequest, SwapRequestQuery, TransactionRequestEvent, sample_event};

/// Memory store that logs every successful write into the call log
struct RecordingStore {
    inner: MemorySwapRequestStore,
    log: CallLog,
}

#[async_trait]
impl SwapRequestStore for RecordingStore {
    async fn exists(&self, request_code: &str) -> Result<bool, StoreError> {
        self.inner.exists(request_code).await
    }

    async fn insert(&self, record: &SwapRequest) -> Result<InsertOutcome, StoreError> {
        let outcome = self.inner.insert(record).await?;
        if outcome == InsertOutcome::Inserted {
            self.log.push("persist:insert");
        }
        Ok(outcome)
    }

    async fn update(&self, record: &SwapRequest) -> Result<bool, StoreError> {
        let applied = self.inner.update(record).await?;
        if applied {
            self.log.push(format!(
                "persist:withdraw={}:swap={}",
                record.withdraw_status, record.swap_request_status
            ));
        }
        Ok(applied)
    }

    async fn claim_for_reconciliation(&self, request_code: &str) -> Result<bool, StoreError> {
        self.inner.claim_for_reconciliation(request_code).await
    }

    async fn get(&self, request_code: &str) -> Result<Option<SwapRequest>, StoreError> {
        self.inner.get(request_code).await
    }

    async fn list(&self, query: &SwapRequestQuery) -> Result<Vec<SwapRequest>, StoreError> {
        self.inner.list(query).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct Harness {
    log: CallLog,
    store: Arc<RecordingStore>,
    vault: Arc<MockVault>,
    executor: Arc<MockSwapExecutor>,
    sink: Arc<MockSink>,
    gate: SwapGate,
    coordinator: Arc<SwapCoordinator>,
}

impl Harness {
    fn new() -> Self {
        Self::with_identity(Some("discord-42"))
    }

    fn with_identity(target: Option<&str>) -> Self {
        let log = CallLog::default();
        let store = Arc::new(RecordingStore {
            inner: MemorySwapRequestStore::new(),
            log: log.clone(),
        });
        let vault = Arc::new(MockVault::new(log.clone()));
        let executor = Arc::new(MockSwapExecutor::new(log.clone()));
        let sink = Arc::new(MockSink::new());
        let notifier = Arc::new(Notifier::new(
            Arc::new(MockIdentity::new(target)),
            sink.clone(),
            "https://basescan.org",
            "ICY",
        ));
        let coordinator = Arc::new(SwapCoordinator::new(
            store.clone(),
            vault.clone(),
            executor.clone(),
            notifier,
            18,
        ));
        let gate = SwapGate::new(store.clone(), 18);

        Self {
            log,
            store,
            vault,
            executor,
            sink,
            gate,
            coordinator,
        }
    }

    async fn process(&self, event: &TransactionRequestEvent) -> Result<SagaReport, Rejection> {
        let record = self.gate.admit(event).await?;
        Ok(self.coordinator.execute(record).await)
    }

    async fn record(&self, code: &str) -> SwapRequest {
        self.store.get(code).await.unwrap().unwrap()
    }

    fn external_calls(&self) -> usize {
        self.vault.withdraw_count()
            + self.vault.deposit_count()
            + self.vault.transfer_count()
            + self.executor.signature_count()
            + self.executor.swap_count()
    }
}

#[tokio::test]
async fn test_happy_path_swaps_and_notifies() {
    let h = Harness::new();
    let report = h.process(&sample_event("R1")).await.unwrap();

    assert!(report.is_success());
    assert!(report.errors.is_empty());

    let r = h.record("R1").await;
    assert_eq!(r.withdraw_status, StepStatus::Success);
    assert_eq!(r.swap_request_status, SwapStatus::Success);
    assert_eq!(
        r.tx_swap.as_deref(),
        Some("0x7dff46370e9ea5f0bad3c4e29711ad50062ea7a4")
    );
    assert_eq!(r.revert_status, StepStatus::Unset);
    assert!(r.tx_deposit.is_none());

    // 100 ICY at 12.5 sat/ICY, 250 sat fee
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "discord-42");
    assert_eq!(sent[0].1.title, "Successful swap");
    assert!(sent[0].1.description.contains("**1000 SAT**"));
    assert!(sent[0].1.description.contains("**100 ICY**"));
}

#[tokio::test]
async fn test_amounts_are_scaled_for_vault_and_signature() {
    let h = Harness::new();
    let mut event = sample_event("R1");
    event.amount = "12.5".into();
    h.process(&event).await.unwrap();

    assert_eq!(
        h.vault.last_withdraw_amount().as_deref(),
        Some("12500000000000000000")
    );
    let sig = h.executor.last_signature_request().unwrap();
    assert_eq!(sig.icy_amount, "12500000000000000000");
    // 12.5 * 12.5 = 156.25 -> 156
    assert_eq!(sig.btc_amount, "156");
    assert_eq!(sig.btc_address, "bc1qtestaddress");
    // persisted verbatim
    assert_eq!(h.record("R1").await.amount, "12.5");
}

#[tokio::test]
async fn test_redelivery_is_ignored() {
    let h = Harness::new();
    h.process(&sample_event("R1")).await.unwrap();

    let err = h.process(&sample_event("R1")).await.unwrap_err();
    assert_eq!(err, Rejection::Duplicate("R1".into()));
    assert_eq!(h.store.inner.len(), 1);
    assert_eq!(h.vault.withdraw_count(), 1);
    assert_eq!(h.sink.sent().len(), 1);
}

#[tokio::test]
async fn test_withdraw_failure_refunds_without_swapping() {
    let h = Harness::new();
    h.vault.set_fail_withdraw(true);

    let report = h.process(&sample_event("R2")).await.unwrap();
    assert_eq!(report.state, SagaState::Reverted);
    assert!(report.has_error("WITHDRAW_FAILED"));

    let r = h.record("R2").await;
    assert_eq!(r.withdraw_status, StepStatus::Failed);
    assert_eq!(r.swap_request_status, SwapStatus::Failed);
    assert_eq!(r.revert_status, StepStatus::Success);
    assert!(r.withdraw_error.as_deref().unwrap().contains("Mock withdraw failure"));
    assert!(r.tx_swap.is_none());

    assert_eq!(h.executor.signature_count(), 0);
    assert_eq!(h.executor.swap_count(), 0);
    assert_eq!(h.vault.deposit_count(), 0);
    assert_eq!(h.vault.transfer_count(), 1);
    // refund uses the display amount
    assert_eq!(h.vault.last_transfer_amount().as_deref(), Some("100"));
    assert_eq!(h.sink.titles(), vec!["Successful revert icy"]);
}

#[tokio::test]
async fn test_withdraw_failure_with_failed_refund() {
    let h = Harness::new();
    h.vault.set_fail_withdraw(true);
    h.vault.set_fail_transfer(true);

    let report = h.process(&sample_event("R2")).await.unwrap();
    assert_eq!(report.state, SagaState::RevertFailed);
    assert!(report.has_error("TRANSFER_BACK_FAILED"));

    let r = h.record("R2").await;
    assert_eq!(r.revert_status, StepStatus::Failed);
    assert!(r.revert_error.is_some());
    assert_eq!(h.sink.titles(), vec!["Swap not completed"]);
}

#[tokio::test]
async fn test_swap_failure_compensates() {
    let h = Harness::new();
    h.executor.set_fail_swap(true);

    let report = h.process(&sample_event("R3")).await.unwrap();
    assert_eq!(report.state, SagaState::Reverted);
    assert!(report.has_error("SWAP_FAILED"));

    let r = h.record("R3").await;
    assert_eq!(r.withdraw_status, StepStatus::Success);
    assert_eq!(r.swap_request_status, SwapStatus::Failed);
    assert_eq!(r.revert_status, StepStatus::Success);
    assert_eq!(r.tx_deposit.as_deref(), Some("0xdeposit1"));
    assert!(r.tx_swap.is_none());

    let deposit = h.log.position("deposit").unwrap();
    let transfer = h.log.position("transfer_to_user").unwrap();
    assert!(deposit < transfer);
    assert_eq!(h.sink.titles(), vec!["Successful revert icy"]);
}

#[tokio::test]
async fn test_deposit_failure_stops_for_manual_reconciliation() {
    let h = Harness::new();
    h.executor.set_fail_swap(true);
    h.vault.set_fail_deposit(true, None);

    let report = h.process(&sample_event("R4")).await.unwrap();
    assert_eq!(report.state, SagaState::DepositFailed);
    assert!(report.state.needs_reconciliation());
    assert!(report.has_error("DEPOSIT_BACK_FAILED"));

    let r = h.record("R4").await;
    assert_eq!(r.swap_request_status, SwapStatus::Failed);
    assert_eq!(r.revert_status, StepStatus::Failed);
    assert!(r.revert_error.as_deref().unwrap().contains("Mock deposit failure"));

    assert_eq!(h.vault.transfer_count(), 0);
    assert!(h.sink.sent().is_empty());
}

#[tokio::test]
async fn test_unconfirmed_deposit_is_not_recorded_as_deposited() {
    let h = Harness::new();
    h.executor.set_fail_swap(true);
    h.vault.set_fail_deposit(true, Some("0xunconfirmed"));

    let report = h.process(&sample_event("R4")).await.unwrap();
    assert_eq!(report.state, SagaState::DepositFailed);

    let r = h.record("R4").await;
    assert!(r.tx_deposit.is_none());
    assert_eq!(r.revert_status, StepStatus::Failed);
    assert!(r.revert_error.as_deref().unwrap().contains("0xunconfirmed"));
    assert_eq!(r.saga_state(), SagaState::DepositFailed);
    assert_eq!(h.vault.transfer_count(), 0);
}

#[tokio::test]
async fn test_reconcile_retries_unconfirmed_deposit_before_refund() {
    let h = Harness::new();
    h.executor.set_fail_swap(true);
    h.vault.set_fail_deposit(true, Some("0xreverted"));
    h.process(&sample_event("R4B")).await.unwrap();

    h.vault.set_fail_deposit(false, None);
    let summary = Reconciler::new(h.coordinator.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.reverted, vec!["R4B".to_string()]);

    // funds go back into the vault before the user is credited
    assert_eq!(h.vault.deposit_count(), 2);
    assert_eq!(h.vault.transfer_count(), 1);
    let entries = h.log.entries();
    let last_deposit = entries.iter().rposition(|e| e == "deposit").unwrap();
    let transfer = entries.iter().position(|e| e == "transfer_to_user").unwrap();
    assert!(last_deposit < transfer);

    let r = h.record("R4B").await;
    assert_eq!(r.tx_deposit.as_deref(), Some("0xdeposit2"));
    assert_eq!(r.saga_state(), SagaState::Reverted);
}

#[tokio::test]
async fn test_swap_info_failure_is_a_swap_failure() {
    let h = Harness::new();
    h.executor.set_fail_info(true);

    let report = h.process(&sample_event("R5")).await.unwrap();
    assert!(report.has_error("SWAP_FAILED"));
    assert_eq!(h.executor.signature_count(), 0);
    assert_eq!(h.vault.deposit_count(), 1);
    assert_eq!(h.record("R5").await.revert_status, StepStatus::Success);
}

#[tokio::test]
async fn test_swap_never_runs_before_withdraw_is_recorded() {
    let h = Harness::new();
    h.process(&sample_event("R1")).await.unwrap();

    let recorded = h
        .log
        .position("persist:withdraw=success:swap=pending")
        .unwrap();
    let signed = h.log.position("get_signature").unwrap();
    let swapped = h.log.position("swap").unwrap();
    assert!(h.log.position("withdraw").unwrap() < recorded);
    assert!(recorded < signed);
    assert!(signed < swapped);
}

#[tokio::test]
async fn test_failed_swap_after_withdraw_always_sets_revert() {
    for (fail_deposit, fail_transfer) in [(false, false), (true, false), (false, true)] {
        let h = Harness::new();
        h.executor.set_fail_swap(true);
        h.vault.set_fail_deposit(fail_deposit, None);
        h.vault.set_fail_transfer(fail_transfer);

        h.process(&sample_event("RC")).await.unwrap();
        let r = h.record("RC").await;
        assert_eq!(r.withdraw_status, StepStatus::Success);
        assert_eq!(r.swap_request_status, SwapStatus::Failed);
        assert!(r.revert_status.is_set());
    }
}

#[tokio::test]
async fn test_unapproved_event_has_no_side_effects() {
    let h = Harness::new();
    let mut event = sample_event("R6");
    event.status = "failed".into();

    assert!(matches!(
        h.process(&event).await,
        Err(Rejection::StatusNotApproved(_))
    ));
    assert!(h.store.inner.is_empty());
    assert_eq!(h.external_calls(), 0);
    assert!(h.log.entries().is_empty());
}

#[tokio::test]
async fn test_rate_limited_profile_has_no_side_effects() {
    let h = Harness::new();
    let limits = Arc::new(MemoryRequestLimitStore::new());
    let gate = SwapGate::new(h.store.clone(), 18).with_daily_limit(limits, 1);

    let first = gate.admit(&sample_event("L1")).await.unwrap();
    h.coordinator.execute(first).await;
    let calls = h.external_calls();

    let err = gate.admit(&sample_event("L2")).await.unwrap_err();
    assert_eq!(err.code(), "RATE_LIMITED");
    assert!(h.store.get("L2").await.unwrap().is_none());
    assert_eq!(h.external_calls(), calls);
}

#[tokio::test]
async fn test_notification_failure_does_not_change_outcome() {
    let h = Harness::with_identity(None);
    let report = h.process(&sample_event("R7")).await.unwrap();

    assert!(report.is_success());
    assert!(report.has_error("NOTIFICATION_FAILED"));
    assert_eq!(
        h.record("R7").await.swap_request_status,
        SwapStatus::Success
    );

    let h = Harness::new();
    h.sink.set_fail(true);
    let report = h.process(&sample_event("R8")).await.unwrap();
    assert!(report.is_success());
    assert!(report.has_error("NOTIFICATION_FAILED"));
}

#[tokio::test]
async fn test_unparsable_fee_still_completes() {
    let h = Harness::new();
    h.executor.set_info(IcyInfo {
        icy_satoshi_rate: "12.5".into(),
        min_satoshi_fee: "n/a".into(),
        ..Default::default()
    });

    let report = h.process(&sample_event("R9")).await.unwrap();
    assert!(report.is_success());
    assert!(h.sink.sent()[0].1.description.contains("**1250 SAT**"));
}

#[tokio::test]
async fn test_terminal_status_is_never_reopened() {
    let h = Harness::new();
    h.process(&sample_event("R1")).await.unwrap();

    let mut stale = h.record("R1").await;
    stale.swap_request_status = SwapStatus::Pending;
    stale.tx_swap = None;
    assert!(!h.store.update(&stale).await.unwrap());

    let mut errors = Vec::new();
    h.coordinator.persist(&stale, &mut errors).await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), "INVALID_TRANSITION");
    assert_eq!(
        h.record("R1").await.swap_request_status,
        SwapStatus::Success
    );
}

#[tokio::test]
async fn test_reconcile_withdraw_failed_only_transfers_back() {
    let h = Harness::new();
    h.vault.set_fail_withdraw(true);
    h.vault.set_fail_transfer(true);
    h.process(&sample_event("X1")).await.unwrap();
    assert_eq!(h.vault.transfer_count(), 1);

    h.vault.set_fail_transfer(false);
    let summary = Reconciler::new(h.coordinator.clone())
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.reverted, vec!["X1".to_string()]);
    assert_eq!(h.vault.deposit_count(), 0);
    assert_eq!(h.vault.transfer_count(), 2);

    let r = h.record("X1").await;
    assert_eq!(r.revert_status, StepStatus::Success);
    assert!(r.revert_error.is_none());
    assert_eq!(
        h.sink.titles(),
        vec!["Swap not completed", "Successful revert icy"]
    );
}

#[tokio::test]
async fn test_reconcile_deposit_failed_deposits_then_transfers() {
    let h = Harness::new();
    h.executor.set_fail_swap(true);
    h.vault.set_fail_deposit(true, None);
    h.process(&sample_event("X2")).await.unwrap();
    assert_eq!(h.vault.transfer_count(), 0);

    h.vault.set_fail_deposit(false, None);
    let summary = Reconciler::new(h.coordinator.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.reverted, vec!["X2".to_string()]);
    assert_eq!(h.vault.deposit_count(), 2);
    assert_eq!(h.vault.transfer_count(), 1);

    let entries = h.log.entries();
    let last_deposit = entries.iter().rposition(|e| e == "deposit").unwrap();
    let transfer = entries.iter().position(|e| e == "transfer_to_user").unwrap();
    assert!(last_deposit < transfer);

    let r = h.record("X2").await;
    assert_eq!(r.revert_status, StepStatus::Success);
    assert_eq!(r.tx_deposit.as_deref(), Some("0xdeposit2"));
    assert_eq!(r.saga_state(), SagaState::Reverted);
}

#[tokio::test]
async fn test_reconcile_with_deposit_reference_skips_deposit() {
    let h = Harness::new();
    h.executor.set_fail_swap(true);
    h.vault.set_fail_transfer(true);
    h.process(&sample_event("X3")).await.unwrap();
    assert_eq!(h.vault.deposit_count(), 1);

    h.vault.set_fail_transfer(false);
    Reconciler::new(h.coordinator.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(h.vault.deposit_count(), 1);
    assert_eq!(h.vault.transfer_count(), 2);
}

#[tokio::test]
async fn test_reconcile_reports_still_failing() {
    let h = Harness::new();
    h.executor.set_fail_swap(true);
    h.vault.set_fail_deposit(true, None);
    h.process(&sample_event("X4")).await.unwrap();

    let summary = Reconciler::new(h.coordinator.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.still_failed, vec!["X4".to_string()]);
    assert_eq!(h.vault.transfer_count(), 0);
    assert_eq!(h.record("X4").await.revert_status, StepStatus::Failed);

    // a reconciled record is not picked up again
    h.vault.set_fail_deposit(false, None);
    Reconciler::new(h.coordinator.clone()).run_once().await.unwrap();
    let summary = Reconciler::new(h.coordinator.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.scanned, 0);
}

#[tokio::test]
async fn test_overlapping_reconcile_passes_refund_once() {
    let h = Harness::new();
    h.vault.set_fail_withdraw(true);
    h.vault.set_fail_transfer(true);
    h.process(&sample_event("X5")).await.unwrap();
    assert_eq!(h.vault.transfer_count(), 1);

    h.vault.set_fail_transfer(false);
    h.vault.set_transfer_delay(std::time::Duration::from_millis(20));
    let reconciler = Reconciler::new(h.coordinator.clone());
    let (first, second) = tokio::join!(reconciler.run_once(), reconciler.run_once());

    assert_eq!(first.unwrap().reverted, vec!["X5".to_string()]);
    assert_eq!(second.unwrap_err(), ReconcileError::Busy);
    assert_eq!(h.vault.transfer_count(), 2);
    assert_eq!(h.record("X5").await.revert_status, StepStatus::Success);
}

#[tokio::test]
async fn test_separate_reconcilers_claim_each_row_once() {
    let h = Harness::new();
    h.vault.set_fail_withdraw(true);
    h.vault.set_fail_transfer(true);
    h.process(&sample_event("X6")).await.unwrap();

    h.vault.set_fail_transfer(false);
    h.vault.set_transfer_delay(std::time::Duration::from_millis(20));
    // two service instances sharing one store
    let a = Reconciler::new(h.coordinator.clone());
    let b = Reconciler::new(h.coordinator.clone());
    let (first, second) = tokio::join!(a.run_once(), b.run_once());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.reverted.len() + second.reverted.len(), 1);
    assert_eq!(h.vault.transfer_count(), 2);
    assert_eq!(h.sink.titles(), vec!["Swap not completed", "Successful revert icy"]);
    assert_eq!(h.record("X6").await.saga_state(), SagaState::Reverted);
}
