//! Shared fakes for the integration tests: an in-memory withdrawal store,
//! scripted gateways, and canned bank directories.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use payoutdesk::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use payoutdesk::database::withdrawal_repository::WithdrawalStore;
use payoutdesk::gateways::types::{GatewayReply, PayoutCreation, PayoutOrder};
use payoutdesk::gateways::{GatewayKind, PayoutGateway};
use payoutdesk::model::{
    CreatedRow, ProcessingRow, WithdrawalRequest, WithdrawalStatus, WithdrawalUpsert,
};
use payoutdesk::services::bank_directory::{BankDirectory, LookupError};
use payoutdesk::services::contact_pool::ContactPool;

// ---------------------------------------------------------------------------
// In-Memory Store
// ---------------------------------------------------------------------------

/// In-memory `WithdrawalStore` mirroring the repository semantics, with
/// injectable write and scan failures.
pub struct MemoryStore {
    rows: Mutex<Vec<WithdrawalRequest>>,
    next_id: AtomicI64,
    failing_writes: Mutex<HashSet<String>>,
    fail_scans: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            failing_writes: Mutex::new(HashSet::new()),
            fail_scans: AtomicBool::new(false),
        }
    }

    /// Seeds a Created row, in ingestion order.
    pub fn seed_created(&self, id: &str, amount: f64) {
        self.insert_row(WithdrawalUpsert::ingested(
            id.to_string(),
            format!("Payee {id}"),
            "001100220033".to_string(),
            "HDFC0000123".to_string(),
            amount,
        ));
    }

    /// Seeds a Processing row carrying its gateway correlation.
    pub fn seed_processing(&self, id: &str, order_id: &str, payment_method: &str) {
        let mut upsert = WithdrawalUpsert::ingested(
            id.to_string(),
            format!("Payee {id}"),
            "001100220033".to_string(),
            "HDFC0000123".to_string(),
            500.0,
        );
        upsert.status = WithdrawalStatus::Processing;
        upsert.order_id = order_id.to_string();
        upsert.payment_method = payment_method.to_string();
        self.insert_row(upsert);
    }

    /// Seeds a row already in the given terminal state.
    pub fn seed_with_status(&self, id: &str, amount: f64, status: WithdrawalStatus) {
        let mut upsert = WithdrawalUpsert::ingested(
            id.to_string(),
            format!("Payee {id}"),
            "001100220033".to_string(),
            "HDFC0000123".to_string(),
            amount,
        );
        upsert.status = status;
        self.insert_row(upsert);
    }

    /// Every subsequent write touching this business id fails.
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_writes.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_scans(&self) {
        self.fail_scans.store(true, Ordering::SeqCst);
    }

    pub fn row(&self, id: &str) -> Option<WithdrawalRequest> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.withdraw_request_id == id)
            .cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn insert_row(&self, upsert: WithdrawalUpsert) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        self.rows.lock().unwrap().push(WithdrawalRequest {
            id,
            withdraw_request_id: upsert.withdraw_request_id,
            beneficiary_name: upsert.beneficiary_name,
            account_number: upsert.account_number,
            ifsc_code: upsert.ifsc_code,
            amount: upsert.amount,
            status: upsert.status,
            order_id: upsert.order_id,
            payment_method: upsert.payment_method,
            created_at: now,
            updated_at: now,
        });
    }

    fn write_guard(&self, id: &str) -> DbResult<()> {
        if self.failing_writes.lock().unwrap().contains(id) {
            return Err(DatabaseError::new(DatabaseErrorKind::QueryError {
                message: format!("injected write failure for {id}"),
            }));
        }
        Ok(())
    }

    fn scan_guard(&self) -> DbResult<()> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConnectionTimeout));
        }
        Ok(())
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn upsert(&self, record: &WithdrawalUpsert) -> DbResult<WithdrawalRequest> {
        self.write_guard(&record.withdraw_request_id)?;
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.withdraw_request_id == record.withdraw_request_id)
        {
            row.beneficiary_name = record.beneficiary_name.clone();
            row.account_number = record.account_number.clone();
            row.ifsc_code = record.ifsc_code.clone();
            row.amount = record.amount;
            row.status = record.status;
            row.order_id = record.order_id.clone();
            row.payment_method = record.payment_method.clone();
            row.updated_at = Utc::now();
            return Ok(row.clone());
        }
        drop(rows);
        self.insert_row(record.clone());
        Ok(self.row(&record.withdraw_request_id).unwrap())
    }

    async fn upsert_ingested(&self, record: &WithdrawalUpsert) -> DbResult<WithdrawalRequest> {
        self.write_guard(&record.withdraw_request_id)?;
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.withdraw_request_id == record.withdraw_request_id)
        {
            row.beneficiary_name = record.beneficiary_name.clone();
            row.account_number = record.account_number.clone();
            row.ifsc_code = record.ifsc_code.clone();
            row.amount = record.amount;
            // Lifecycle fields survive re-ingestion once a row has left
            // Created.
            if row.status == WithdrawalStatus::Created {
                row.status = record.status;
                row.order_id = record.order_id.clone();
                row.payment_method = record.payment_method.clone();
            }
            row.updated_at = Utc::now();
            return Ok(row.clone());
        }
        drop(rows);
        self.insert_row(record.clone());
        Ok(self.row(&record.withdraw_request_id).unwrap())
    }

    async fn find_by_business_id(&self, id: &str) -> DbResult<Option<WithdrawalRequest>> {
        Ok(self.row(id))
    }

    async fn find_by_ids(&self, ids: &[String]) -> DbResult<Vec<WithdrawalRequest>> {
        let mut found: Vec<WithdrawalRequest> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| ids.contains(&row.withdraw_request_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(found)
    }

    async fn scan_created(&self) -> DbResult<Vec<CreatedRow>> {
        self.scan_guard()?;
        let mut rows: Vec<&WithdrawalRequest> = Vec::new();
        let guard = self.rows.lock().unwrap();
        for row in guard.iter() {
            if row.status == WithdrawalStatus::Created {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows
            .into_iter()
            .map(|row| CreatedRow {
                withdraw_request_id: row.withdraw_request_id.clone(),
                amount: row.amount,
                payment_method: row.payment_method.clone(),
            })
            .collect())
    }

    async fn scan_processing(&self) -> DbResult<Vec<ProcessingRow>> {
        self.scan_guard()?;
        let mut rows: Vec<&WithdrawalRequest> = Vec::new();
        let guard = self.rows.lock().unwrap();
        for row in guard.iter() {
            if row.status == WithdrawalStatus::Processing {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows
            .into_iter()
            .map(|row| ProcessingRow {
                withdraw_request_id: row.withdraw_request_id.clone(),
                order_id: row.order_id.clone(),
                payment_method: row.payment_method.clone(),
            })
            .collect())
    }

    async fn set_status(&self, id: &str, status: WithdrawalStatus) -> DbResult<()> {
        self.write_guard(id)?;
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|row| row.withdraw_request_id == id) {
            Some(row) => {
                row.status = status;
                row.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DatabaseError::not_found("withdrawal", id)),
        }
    }

    async fn transition_to_processing(
        &self,
        id: &str,
        order_id: &str,
        payment_method: &str,
    ) -> DbResult<()> {
        self.write_guard(id)?;
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|row| row.withdraw_request_id == id) {
            Some(row) => {
                row.status = WithdrawalStatus::Processing;
                row.order_id = order_id.to_string();
                row.payment_method = payment_method.to_string();
                row.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DatabaseError::not_found("withdrawal", id)),
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted Gateway
// ---------------------------------------------------------------------------

/// `PayoutGateway` fake answering from scripted outcomes and recording every
/// call it receives.
pub struct ScriptedGateway {
    kind: GatewayKind,
    creations: Mutex<HashMap<String, PayoutCreation>>,
    statuses: Mutex<HashMap<String, GatewayReply>>,
    orders: Mutex<Vec<PayoutOrder>>,
    status_calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(kind: GatewayKind) -> Self {
        Self {
            kind,
            creations: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn accepts(&self, business_id: &str, order_id: &str) {
        self.creations.lock().unwrap().insert(
            business_id.to_string(),
            PayoutCreation::Accepted {
                order_id: order_id.to_string(),
                raw: json!({"msg": {"status": "1", "orderid": order_id}}),
            },
        );
    }

    pub fn rejects(&self, business_id: &str, reason: &str) {
        self.creations.lock().unwrap().insert(
            business_id.to_string(),
            PayoutCreation::Rejected {
                reason: reason.to_string(),
                raw: json!({"status": "400", "error": reason}),
            },
        );
    }

    /// Scripts the payout-status reply for one order id.
    pub fn payout_status(&self, order_id: &str, reply: GatewayReply) {
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), reply);
    }

    /// Business ids dispatched for creation, in call order.
    pub fn dispatched(&self) -> Vec<String> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .map(|order| order.business_id.clone())
            .collect()
    }

    /// Full creation orders, in call order.
    pub fn recorded_orders(&self) -> Vec<PayoutOrder> {
        self.orders.lock().unwrap().clone()
    }

    /// Order ids whose payout status was checked, in call order.
    pub fn status_checks(&self) -> Vec<String> {
        self.status_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PayoutGateway for ScriptedGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    async fn create_payout(&self, order: &PayoutOrder) -> PayoutCreation {
        self.orders.lock().unwrap().push(order.clone());
        self.creations
            .lock()
            .unwrap()
            .get(&order.business_id)
            .cloned()
            .unwrap_or(PayoutCreation::Rejected {
                reason: "unscripted order".to_string(),
                raw: json!({}),
            })
    }

    async fn check_payout_status(&self, order_id: &str) -> GatewayReply {
        self.status_calls.lock().unwrap().push(order_id.to_string());
        self.statuses
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .unwrap_or(GatewayReply::Body(json!({})))
    }

    async fn check_payin_status(&self, order_id: &str) -> GatewayReply {
        self.status_calls.lock().unwrap().push(order_id.to_string());
        self.statuses
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .unwrap_or(GatewayReply::Body(json!({})))
    }
}

// ---------------------------------------------------------------------------
// Bank Directories
// ---------------------------------------------------------------------------

/// Resolves every IFSC code to the same bank name.
pub struct StaticBankDirectory {
    pub bank: String,
}

impl StaticBankDirectory {
    pub fn new(bank: &str) -> Self {
        Self {
            bank: bank.to_string(),
        }
    }
}

#[async_trait]
impl BankDirectory for StaticBankDirectory {
    async fn lookup(&self, _ifsc_code: &str) -> Result<String, LookupError> {
        Ok(self.bank.clone())
    }
}

/// Fails every lookup, for items that must fall back or fail.
pub struct MissingBankDirectory;

#[async_trait]
impl BankDirectory for MissingBankDirectory {
    async fn lookup(&self, ifsc_code: &str) -> Result<String, LookupError> {
        Err(LookupError::NotFound(ifsc_code.to_string()))
    }
}

/// A pool of `n` distinct phone/email pairs.
pub fn pool_of(n: usize) -> ContactPool {
    let phones = (0..n).map(|i| format!("98765000{i:02}")).collect();
    let emails = (0..n).map(|i| format!("payee{i}@example.com")).collect();
    ContactPool::from_lines(phones, emails)
}
