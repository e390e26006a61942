//! Swap Saga State Definitions
//!
//! A swap request row carries three independent status columns. The saga
//! position is derived from them instead of being stored separately, so the
//! persisted row is always the single source of truth.

use std::fmt;

/// Outcome of one saga step (withdraw, revert).
///
/// `Unset` means the step was never attempted and is stored as NULL.
/// `Reconciling` is only used on the revert step, while an operator pass
/// holds the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepStatus {
    #[default]
    Unset,
    Success,
    Failed,
    Reconciling,
}

impl StepStatus {
    /// Column value, `None` for `Unset`
    pub fn as_db(&self) -> Option<&'static str> {
        match self {
            StepStatus::Unset => None,
            StepStatus::Success => Some("success"),
            StepStatus::Failed => Some("failed"),
            StepStatus::Reconciling => Some("reconciling"),
        }
    }

    pub fn from_db(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("") => Some(StepStatus::Unset),
            Some("success") => Some(StepStatus::Success),
            Some("failed") => Some(StepStatus::Failed),
            Some("reconciling") => Some(StepStatus::Reconciling),
            Some(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.as_db().unwrap_or("unset")
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, StepStatus::Unset)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall swap outcome.
///
/// Transitions only forward: `Pending -> Success | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwapStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl SwapStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SwapStatus::Pending)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Re-writing the same value is allowed so that repeated persists of a
    /// terminal record stay idempotent.
    pub fn can_transition_to(&self, next: SwapStatus) -> bool {
        match (self, next) {
            (SwapStatus::Pending, _) => true,
            (current, next) => *current == next,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Success => "success",
            SwapStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SwapStatus::Pending),
            "success" => Some(SwapStatus::Success),
            "failed" => Some(SwapStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Saga position derived from a record's status columns.
///
/// ```text
/// Pending ─▶ WithdrawOk ─▶ SwapOk                              (success)
///    │            └──────▶ SwapFailed ─▶ Reverted | RevertFailed
///    │                          └──────▶ DepositFailed         (manual)
///    └─────▶ WithdrawFailed ─▶ Reverted | RevertFailed
///
/// DepositFailed | RevertFailed ─▶ Reconciling ─▶ Reverted | (back to failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaState {
    /// Row created, nothing attempted
    Pending,
    /// Funds left the user's balance, swap not yet decided
    WithdrawOk,
    /// Withdraw failed, precautionary refund not yet recorded
    WithdrawFailed,
    /// Terminal success
    SwapOk,
    /// Swap failed after withdrawal; funds are in flight
    SwapFailed,
    /// Terminal: deposit-back failed, funds stranded outside vault and user
    DepositFailed,
    /// Terminal: refund reached the user
    Reverted,
    /// Terminal: refund attempted and failed
    RevertFailed,
    /// Claimed by a reconciliation pass
    Reconciling,
}

impl SagaState {
    /// Derive the saga position from the three status columns.
    ///
    /// `has_tx_deposit` means the deposit back to the vault was confirmed.
    pub fn derive(
        withdraw: StepStatus,
        swap: SwapStatus,
        revert: StepStatus,
        has_tx_deposit: bool,
    ) -> Self {
        match (withdraw, swap, revert) {
            (_, _, StepStatus::Success) => SagaState::Reverted,
            (_, _, StepStatus::Reconciling) => SagaState::Reconciling,
            (StepStatus::Success, SwapStatus::Failed, StepStatus::Failed) if !has_tx_deposit => {
                SagaState::DepositFailed
            }
            (_, _, StepStatus::Failed) => SagaState::RevertFailed,
            (StepStatus::Success, SwapStatus::Success, _) => SagaState::SwapOk,
            (StepStatus::Success, SwapStatus::Failed, _) => SagaState::SwapFailed,
            (StepStatus::Success, SwapStatus::Pending, _) => SagaState::WithdrawOk,
            (StepStatus::Failed, _, _) => SagaState::WithdrawFailed,
            (StepStatus::Unset, _, _) => SagaState::Pending,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::SwapOk
                | SagaState::DepositFailed
                | SagaState::Reverted
                | SagaState::RevertFailed
        )
    }

    /// Terminal states an operator has to look at
    #[inline]
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            SagaState::DepositFailed | SagaState::RevertFailed | SagaState::Reconciling
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Pending => "PENDING",
            SagaState::WithdrawOk => "WITHDRAW_OK",
            SagaState::WithdrawFailed => "WITHDRAW_FAILED",
            SagaState::SwapOk => "SWAP_OK",
            SagaState::SwapFailed => "SWAP_FAILED",
            SagaState::DepositFailed => "DEPOSIT_FAILED",
            SagaState::Reverted => "REVERTED",
            SagaState::RevertFailed => "REVERT_FAILED",
            SagaState::Reconciling => "RECONCILING",
        }
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_status_monotonic() {
        assert!(SwapStatus::Pending.can_transition_to(SwapStatus::Success));
        assert!(SwapStatus::Pending.can_transition_to(SwapStatus::Failed));
        assert!(SwapStatus::Pending.can_transition_to(SwapStatus::Pending));
        assert!(SwapStatus::Success.can_transition_to(SwapStatus::Success));

        assert!(!SwapStatus::Success.can_transition_to(SwapStatus::Pending));
        assert!(!SwapStatus::Failed.can_transition_to(SwapStatus::Pending));
        assert!(!SwapStatus::Failed.can_transition_to(SwapStatus::Success));
        assert!(!SwapStatus::Success.can_transition_to(SwapStatus::Failed));
    }

    #[test]
    fn test_step_status_db_mapping() {
        assert_eq!(StepStatus::Unset.as_db(), None);
        assert_eq!(StepStatus::from_db(None), Some(StepStatus::Unset));
        assert_eq!(StepStatus::from_db(Some("failed")), Some(StepStatus::Failed));
        assert_eq!(
            StepStatus::from_db(Some("reconciling")),
            Some(StepStatus::Reconciling)
        );
        assert_eq!(StepStatus::from_db(Some("bogus")), None);
        assert_eq!(SwapStatus::parse("pending"), Some(SwapStatus::Pending));
        assert_eq!(SwapStatus::parse("PENDING"), None);
    }

    #[test]
    fn test_derive_saga_state() {
        use StepStatus::*;
        let derive = SagaState::derive;

        assert_eq!(derive(Unset, SwapStatus::Pending, Unset, false), SagaState::Pending);
        assert_eq!(derive(Success, SwapStatus::Pending, Unset, false), SagaState::WithdrawOk);
        assert_eq!(derive(Success, SwapStatus::Success, Unset, false), SagaState::SwapOk);
        assert_eq!(derive(Success, SwapStatus::Failed, Unset, false), SagaState::SwapFailed);
        assert_eq!(derive(Success, SwapStatus::Failed, Failed, false), SagaState::DepositFailed);
        assert_eq!(derive(Success, SwapStatus::Failed, Failed, true), SagaState::RevertFailed);
        assert_eq!(derive(Success, SwapStatus::Failed, Success, true), SagaState::Reverted);
        assert_eq!(derive(Failed, SwapStatus::Failed, Unset, false), SagaState::WithdrawFailed);
        assert_eq!(derive(Failed, SwapStatus::Failed, Failed, false), SagaState::RevertFailed);
        assert_eq!(derive(Failed, SwapStatus::Failed, Success, false), SagaState::Reverted);
        assert_eq!(
            derive(Success, SwapStatus::Failed, Reconciling, false),
            SagaState::Reconciling
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(SagaState::SwapOk.is_terminal());
        assert!(SagaState::DepositFailed.is_terminal());
        assert!(SagaState::Reverted.is_terminal());
        assert!(SagaState::RevertFailed.is_terminal());

        assert!(!SagaState::Pending.is_terminal());
        assert!(!SagaState::WithdrawOk.is_terminal());
        assert!(!SagaState::WithdrawFailed.is_terminal());
        assert!(!SagaState::SwapFailed.is_terminal());

        assert!(SagaState::DepositFailed.needs_reconciliation());
        assert!(!SagaState::Reverted.needs_reconciliation());
        assert!(!SagaState::Reconciling.is_terminal());
        assert!(SagaState::Reconciling.needs_reconciliation());
    }
}
