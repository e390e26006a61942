//! Swap Request Store
//!
//! One row per `request_code`. The UNIQUE constraint on `request_code` is the
//! race-free idempotency guarantee; `exists` is only a fast path.
//!
//! Updates are guarded: `swap_request_status` never returns to `pending`
//! and one terminal value is never replaced by the other, and a successful
//! revert is never overwritten by a failed one.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sqlx::{PgPool, Row};

use super::error::StoreError;
use super::state::{StepStatus, SwapStatus};
use super::types::{SwapRequest, SwapRequestQuery};

/// Result of inserting a new swap request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same `request_code` already exists
    Duplicate,
}

/// Durable swap request persistence
#[async_trait]
pub trait SwapRequestStore: Send + Sync {
    async fn exists(&self, request_code: &str) -> Result<bool, StoreError>;

    async fn insert(&self, record: &SwapRequest) -> Result<InsertOutcome, StoreError>;

    /// Guarded write of all mutable columns.
    ///
    /// Returns `false` when the stored row forbids the transition.
    async fn update(&self, record: &SwapRequest) -> Result<bool, StoreError>;

    /// Move `revert_status` from `failed` to `reconciling`.
    ///
    /// Returns `false` when the row is not in `failed` any more, i.e. another
    /// pass already holds it or finished it.
    async fn claim_for_reconciliation(&self, request_code: &str) -> Result<bool, StoreError>;

    async fn get(&self, request_code: &str) -> Result<Option<SwapRequest>, StoreError>;

    async fn list(&self, query: &SwapRequestQuery) -> Result<Vec<SwapRequest>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

fn update_allowed(stored: &SwapRequest, next: &SwapRequest) -> bool {
    stored
        .swap_request_status
        .can_transition_to(next.swap_request_status)
        && !(stored.revert_status == StepStatus::Success
            && next.revert_status != StepStatus::Success)
}

// ============================================================================
// PostgreSQL
// ============================================================================

const SELECT_COLUMNS: &str = r#"
    id, profile_id, request_code, tx_status, tx_id, btc_address, event_timestamp,
    amount, token_name, token_id, withdraw_status, withdraw_error,
    swap_request_status, swap_request_error, tx_swap, revert_status,
    revert_error, tx_deposit, created_at, updated_at
"#;

/// PostgreSQL-backed store
pub struct PgSwapRequestStore {
    pool: PgPool,
}

impl PgSwapRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create table and indexes if missing
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS icy_swap_btc_requests (
                id                  UUID PRIMARY KEY,
                profile_id          TEXT NOT NULL,
                request_code        TEXT NOT NULL,
                tx_status           TEXT NOT NULL,
                tx_id               BIGINT NOT NULL DEFAULT 0,
                btc_address         TEXT NOT NULL,
                event_timestamp     BIGINT NOT NULL DEFAULT 0,
                amount              TEXT NOT NULL,
                token_name          TEXT NOT NULL,
                token_id            TEXT NOT NULL,
                withdraw_status     TEXT,
                withdraw_error      TEXT,
                swap_request_status TEXT NOT NULL DEFAULT 'pending',
                swap_request_error  TEXT,
                tx_swap             TEXT,
                revert_status       TEXT,
                revert_error        TEXT,
                tx_deposit          TEXT,
                created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT icy_swap_btc_requests_request_code_key UNIQUE (request_code)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_icy_swap_btc_requests_revert_status \
             ON icy_swap_btc_requests (revert_status)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_icy_swap_btc_requests_profile_id \
             ON icy_swap_btc_requests (profile_id)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("icy_swap_btc_requests schema ready");
        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<SwapRequest, StoreError> {
        let corrupt = |col: &str, e: sqlx::Error| StoreError::Corrupt(format!("{}: {}", col, e));
        macro_rules! col {
            ($name:literal) => {
                row.try_get($name).map_err(|e| corrupt($name, e))?
            };
        }

        let request_code: String = col!("request_code");

        let withdraw_raw: Option<String> = col!("withdraw_status");
        let withdraw_status = StepStatus::from_db(withdraw_raw.as_deref()).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "{}: withdraw_status {:?}",
                request_code, withdraw_raw
            ))
        })?;

        let revert_raw: Option<String> = col!("revert_status");
        let revert_status = StepStatus::from_db(revert_raw.as_deref()).ok_or_else(|| {
            StoreError::Corrupt(format!("{}: revert_status {:?}", request_code, revert_raw))
        })?;

        let swap_raw: String = col!("swap_request_status");
        let swap_request_status = SwapStatus::parse(&swap_raw).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "{}: swap_request_status {:?}",
                request_code, swap_raw
            ))
        })?;

        Ok(SwapRequest {
            id: col!("id"),
            profile_id: col!("profile_id"),
            tx_status: col!("tx_status"),
            tx_id: col!("tx_id"),
            btc_address: col!("btc_address"),
            timestamp: col!("event_timestamp"),
            amount: col!("amount"),
            token_name: col!("token_name"),
            token_id: col!("token_id"),
            withdraw_status,
            withdraw_error: col!("withdraw_error"),
            swap_request_status,
            swap_request_error: col!("swap_request_error"),
            tx_swap: col!("tx_swap"),
            revert_status,
            revert_error: col!("revert_error"),
            tx_deposit: col!("tx_deposit"),
            created_at: col!("created_at"),
            updated_at: col!("updated_at"),
            request_code,
        })
    }
}

#[async_trait]
impl SwapRequestStore for PgSwapRequestStore {
    async fn exists(&self, request_code: &str) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM icy_swap_btc_requests WHERE request_code = $1)",
        )
        .bind(request_code)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn insert(&self, record: &SwapRequest) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO icy_swap_btc_requests
                (id, profile_id, request_code, tx_status, tx_id, btc_address, event_timestamp,
                 amount, token_name, token_id, swap_request_status, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            "#,
        )
        .bind(record.id)
        .bind(&record.profile_id)
        .bind(&record.request_code)
        .bind(&record.tx_status)
        .bind(record.tx_id)
        .bind(&record.btc_address)
        .bind(record.timestamp)
        .bind(&record.amount)
        .bind(&record.token_name)
        .bind(&record.token_id)
        .bind(record.swap_request_status.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            // 23505 unique_violation on request_code
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &SwapRequest) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE icy_swap_btc_requests
            SET withdraw_status = $2,
                withdraw_error = $3,
                swap_request_status = $4,
                swap_request_error = $5,
                tx_swap = $6,
                revert_status = $7,
                revert_error = $8,
                tx_deposit = $9,
                updated_at = NOW()
            WHERE request_code = $1
              AND (swap_request_status = 'pending' OR swap_request_status = $4)
              AND (revert_status IS DISTINCT FROM 'success' OR $7 = 'success')
            "#,
        )
        .bind(&record.request_code)
        .bind(record.withdraw_status.as_db())
        .bind(&record.withdraw_error)
        .bind(record.swap_request_status.as_str())
        .bind(&record.swap_request_error)
        .bind(&record.tx_swap)
        .bind(record.revert_status.as_db())
        .bind(&record.revert_error)
        .bind(&record.tx_deposit)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.exists(&record.request_code).await? {
            return Err(StoreError::NotFound(record.request_code.clone()));
        }
        Ok(false)
    }

    async fn claim_for_reconciliation(&self, request_code: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE icy_swap_btc_requests
            SET revert_status = 'reconciling',
                updated_at = NOW()
            WHERE request_code = $1
              AND revert_status = 'failed'
            "#,
        )
        .bind(request_code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, request_code: &str) -> Result<Option<SwapRequest>, StoreError> {
        let sql = format!(
            "SELECT {} FROM icy_swap_btc_requests WHERE request_code = $1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request_code)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self, query: &SwapRequestQuery) -> Result<Vec<SwapRequest>, StoreError> {
        // Unset is stored as NULL, so it needs its own predicate
        let revert_clause = match query.revert_status {
            Some(StepStatus::Unset) => "($2::TEXT IS NULL AND revert_status IS NULL)",
            Some(_) => "revert_status = $2::TEXT",
            None => "$2::TEXT IS NULL",
        };
        let sql = format!(
            r#"
            SELECT {}
            FROM icy_swap_btc_requests
            WHERE ($1::TEXT IS NULL OR swap_request_status = $1::TEXT)
              AND {}
            ORDER BY created_at {}
            "#,
            SELECT_COLUMNS,
            revert_clause,
            query.order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(query.swap_request_status.map(|s| s.as_str()))
            .bind(query.revert_status.and_then(|s| s.as_db()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory store with the same uniqueness and transition rules
#[derive(Default)]
pub struct MemorySwapRequestStore {
    records: DashMap<String, SwapRequest>,
}

impl MemorySwapRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SwapRequestStore for MemorySwapRequestStore {
    async fn exists(&self, request_code: &str) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(request_code))
    }

    async fn insert(&self, record: &SwapRequest) -> Result<InsertOutcome, StoreError> {
        match self.records.entry(record.request_code.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn update(&self, record: &SwapRequest) -> Result<bool, StoreError> {
        let mut stored = self
            .records
            .get_mut(&record.request_code)
            .ok_or_else(|| StoreError::NotFound(record.request_code.clone()))?;

        if !update_allowed(&stored, record) {
            return Ok(false);
        }

        let created_at = stored.created_at;
        *stored = record.clone();
        stored.created_at = created_at;
        stored.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn claim_for_reconciliation(&self, request_code: &str) -> Result<bool, StoreError> {
        let mut stored = self
            .records
            .get_mut(request_code)
            .ok_or_else(|| StoreError::NotFound(request_code.to_string()))?;

        if stored.revert_status != StepStatus::Failed {
            return Ok(false);
        }
        stored.revert_status = StepStatus::Reconciling;
        stored.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn get(&self, request_code: &str) -> Result<Option<SwapRequest>, StoreError> {
        Ok(self.records.get(request_code).map(|r| r.clone()))
    }

    async fn list(&self, query: &SwapRequestQuery) -> Result<Vec<SwapRequest>, StoreError> {
        let mut records: Vec<SwapRequest> = self
            .records
            .iter()
            .filter(|r| query.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();

        records.sort_by_key(|r| r.created_at);
        if query.order == super::types::SortOrder::Desc {
            records.reverse();
        }
        Ok(records)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
