use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::database::error::{DatabaseError, DbResult};
use crate::model::{CreatedRow, ProcessingRow, WithdrawalRequest, WithdrawalStatus, WithdrawalUpsert};

const ROW_COLUMNS: &str = "id, withdraw_request_id, beneficiary_name, account_number, ifsc_code, \
     amount, status, order_id, payment_method, created_at, updated_at";

// ---------------------------------------------------------------------------
// Store Contract
// ---------------------------------------------------------------------------

/// Durable store of withdrawal requests keyed by business id.
///
/// `transition_to_processing` writes status and both correlation fields as
/// one statement: a row must never hold an order id while still Created.
/// Batch workers only report an item done after the corresponding write has
/// committed.
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Insert-or-update keyed on `withdraw_request_id`, overwriting every
    /// field and refreshing `updated_at`.
    async fn upsert(&self, record: &WithdrawalUpsert) -> DbResult<WithdrawalRequest>;

    /// Ingestion upsert: refreshes beneficiary fields and amount, but keeps
    /// the lifecycle fields (status, order id, payment method) of any row
    /// that has already left Created, so re-downloading a CSV cannot regress
    /// an in-flight or terminal row.
    async fn upsert_ingested(&self, record: &WithdrawalUpsert) -> DbResult<WithdrawalRequest>;

    async fn find_by_business_id(&self, id: &str) -> DbResult<Option<WithdrawalRequest>>;

    async fn find_by_ids(&self, ids: &[String]) -> DbResult<Vec<WithdrawalRequest>>;

    /// Created rows in reverse ingestion order (most recently stored first),
    /// as consumed by amount-bounded selection.
    async fn scan_created(&self) -> DbResult<Vec<CreatedRow>>;

    /// Processing rows in reverse ingestion order, as consumed by the poller.
    async fn scan_processing(&self) -> DbResult<Vec<ProcessingRow>>;

    async fn set_status(&self, id: &str, status: WithdrawalStatus) -> DbResult<()>;

    /// Atomically sets status=Processing together with the gateway
    /// correlation id and label.
    async fn transition_to_processing(
        &self,
        id: &str,
        order_id: &str,
        payment_method: &str,
    ) -> DbResult<()>;
}

// ---------------------------------------------------------------------------
// Postgres Implementation
// ---------------------------------------------------------------------------

pub struct WithdrawalRepository {
    pool: PgPool,
}

impl WithdrawalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WithdrawalStore for WithdrawalRepository {
    async fn upsert(&self, record: &WithdrawalUpsert) -> DbResult<WithdrawalRequest> {
        let sql = format!(
            "INSERT INTO withdraw_requests
                 (withdraw_request_id, beneficiary_name, account_number, ifsc_code,
                  amount, status, order_id, payment_method, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
             ON CONFLICT (withdraw_request_id) DO UPDATE SET
                 beneficiary_name = EXCLUDED.beneficiary_name,
                 account_number = EXCLUDED.account_number,
                 ifsc_code = EXCLUDED.ifsc_code,
                 amount = EXCLUDED.amount,
                 status = EXCLUDED.status,
                 order_id = EXCLUDED.order_id,
                 payment_method = EXCLUDED.payment_method,
                 updated_at = NOW()
             RETURNING {ROW_COLUMNS}"
        );
        sqlx::query_as::<_, WithdrawalRequest>(&sql)
            .bind(&record.withdraw_request_id)
            .bind(&record.beneficiary_name)
            .bind(&record.account_number)
            .bind(&record.ifsc_code)
            .bind(record.amount)
            .bind(record.status)
            .bind(&record.order_id)
            .bind(&record.payment_method)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn upsert_ingested(&self, record: &WithdrawalUpsert) -> DbResult<WithdrawalRequest> {
        let sql = format!(
            "INSERT INTO withdraw_requests
                 (withdraw_request_id, beneficiary_name, account_number, ifsc_code,
                  amount, status, order_id, payment_method, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
             ON CONFLICT (withdraw_request_id) DO UPDATE SET
                 beneficiary_name = EXCLUDED.beneficiary_name,
                 account_number = EXCLUDED.account_number,
                 ifsc_code = EXCLUDED.ifsc_code,
                 amount = EXCLUDED.amount,
                 status = CASE WHEN withdraw_requests.status = $9
                               THEN EXCLUDED.status
                               ELSE withdraw_requests.status END,
                 order_id = CASE WHEN withdraw_requests.status = $9
                                 THEN EXCLUDED.order_id
                                 ELSE withdraw_requests.order_id END,
                 payment_method = CASE WHEN withdraw_requests.status = $9
                                       THEN EXCLUDED.payment_method
                                       ELSE withdraw_requests.payment_method END,
                 updated_at = NOW()
             RETURNING {ROW_COLUMNS}"
        );
        sqlx::query_as::<_, WithdrawalRequest>(&sql)
            .bind(&record.withdraw_request_id)
            .bind(&record.beneficiary_name)
            .bind(&record.account_number)
            .bind(&record.ifsc_code)
            .bind(record.amount)
            .bind(record.status)
            .bind(&record.order_id)
            .bind(&record.payment_method)
            .bind(WithdrawalStatus::Created)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_business_id(&self, id: &str) -> DbResult<Option<WithdrawalRequest>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS} FROM withdraw_requests WHERE withdraw_request_id = $1"
        );
        sqlx::query_as::<_, WithdrawalRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_ids(&self, ids: &[String]) -> DbResult<Vec<WithdrawalRequest>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS} FROM withdraw_requests
             WHERE withdraw_request_id = ANY($1)
             ORDER BY id DESC"
        );
        sqlx::query_as::<_, WithdrawalRequest>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn scan_created(&self) -> DbResult<Vec<CreatedRow>> {
        sqlx::query_as::<_, CreatedRow>(
            "SELECT withdraw_request_id, amount, payment_method
             FROM withdraw_requests WHERE status = $1
             ORDER BY id DESC",
        )
        .bind(WithdrawalStatus::Created)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn scan_processing(&self) -> DbResult<Vec<ProcessingRow>> {
        sqlx::query_as::<_, ProcessingRow>(
            "SELECT withdraw_request_id, order_id, payment_method
             FROM withdraw_requests WHERE status = $1
             ORDER BY id DESC",
        )
        .bind(WithdrawalStatus::Processing)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_status(&self, id: &str, status: WithdrawalStatus) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE withdraw_requests SET status = $1, updated_at = NOW()
             WHERE withdraw_request_id = $2",
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("withdrawal", id).with_context("set_status"));
        }
        debug!(withdrawal_id = %id, status = status.as_str(), "status updated");
        Ok(())
    }

    async fn transition_to_processing(
        &self,
        id: &str,
        order_id: &str,
        payment_method: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE withdraw_requests
             SET status = $1, order_id = $2, payment_method = $3, updated_at = NOW()
             WHERE withdraw_request_id = $4",
        )
        .bind(WithdrawalStatus::Processing)
        .bind(order_id)
        .bind(payment_method)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(
                DatabaseError::not_found("withdrawal", id).with_context("transition_to_processing")
            );
        }
        debug!(
            withdrawal_id = %id,
            order_id = %order_id,
            payment_method = %payment_method,
            "transitioned to processing"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
