//! Validation & Idempotency Gate
//!
//! Decides whether an inbound event becomes a swap request. Only an admitted
//! event produces a row, and no external call happens here.

use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use super::error::Rejection;
use super::limiter::{RequestLimitStore, today_key};
use super::store::{InsertOutcome, SwapRequestStore};
use super::types::{SwapRequest, TransactionRequestEvent};
use crate::money;

struct DailyLimit {
    store: Arc<dyn RequestLimitStore>,
    max_per_day: u64,
}

pub struct SwapGate {
    store: Arc<dyn SwapRequestStore>,
    limit: Option<DailyLimit>,
    token_decimals: u32,
}

impl SwapGate {
    pub fn new(store: Arc<dyn SwapRequestStore>, token_decimals: u32) -> Self {
        Self {
            store,
            limit: None,
            token_decimals,
        }
    }

    /// Cap admitted requests per profile per UTC day. `0` disables the cap.
    pub fn with_daily_limit(mut self, limits: Arc<dyn RequestLimitStore>, max_per_day: u64) -> Self {
        self.limit = (max_per_day > 0).then_some(DailyLimit {
            store: limits,
            max_per_day,
        });
        self
    }

    /// Shape-only checks, also used by the webhook before enqueueing
    pub fn validate_shape(&self, event: &TransactionRequestEvent) -> Result<(), Rejection> {
        event
            .validate()
            .map_err(|e| Rejection::InvalidEvent(e.to_string()))?;
        let bad_amount =
            |e: money::MoneyError| Rejection::InvalidEvent(format!("amount {:?}: {}", event.amount, e));
        money::to_base_units(&event.amount, self.token_decimals).map_err(bad_amount)?;
        // the swap quote is computed in Decimal, so it must fit there too
        money::parse_display(&event.amount).map_err(bad_amount)?;
        Ok(())
    }

    /// Admit `event` and create its pending record.
    pub async fn admit(&self, event: &TransactionRequestEvent) -> Result<SwapRequest, Rejection> {
        let result = self.try_admit(event).await;
        if let Err(rejection) = &result {
            warn!(
                request_code = %event.request_code,
                profile_id = %event.profile_id,
                status = %event.status,
                reason = rejection.code(),
                error = %rejection,
                "Swap request rejected"
            );
        }
        result
    }

    async fn try_admit(&self, event: &TransactionRequestEvent) -> Result<SwapRequest, Rejection> {
        if !event.is_approved() {
            return Err(Rejection::StatusNotApproved(event.status.clone()));
        }

        self.validate_shape(event)?;

        if self.store.exists(&event.request_code).await? {
            return Err(Rejection::Duplicate(event.request_code.clone()));
        }

        let limit_key = today_key(&event.profile_id);
        if let Some(limit) = &self.limit
            && !limit.store.try_acquire(&limit_key, limit.max_per_day).await?
        {
            return Err(Rejection::RateLimited {
                profile_id: event.profile_id.clone(),
                limit: limit.max_per_day,
            });
        }

        let record = SwapRequest::from_event(event);
        let inserted = self.store.insert(&record).await;
        if !matches!(inserted, Ok(InsertOutcome::Inserted)) {
            self.release_slot(&limit_key).await;
        }
        if inserted? == InsertOutcome::Duplicate {
            return Err(Rejection::Duplicate(event.request_code.clone()));
        }

        info!(
            request_code = %record.request_code,
            profile_id = %record.profile_id,
            amount = %record.amount,
            btc_address = %record.btc_address,
            "Swap request admitted"
        );
        Ok(record)
    }

    /// Undo a slot reservation for a request that produced no record
    async fn release_slot(&self, limit_key: &str) {
        if let Some(limit) = &self.limit
            && let Err(e) = limit.store.release(limit_key).await
        {
            warn!(key = %limit_key, error = %e, "Failed to release request slot");
        }
    }
}
