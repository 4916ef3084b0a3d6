//! Payout Batch Runner
//!
//! The background worker that turns withdrawal rows into gateway payouts:
//! - Selects candidates under an amount ceiling, or takes explicit ids, or
//!   takes full direct rows that bypass the store read
//! - Draws one phone and one email per item from the batch-owned pools
//! - Resolves bank names, dispatches creations one at a time with pacing
//! - Moves the row to Processing before the item counts as a success
//!
//! An item failure is recorded with its reason and never aborts the run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::database::withdrawal_repository::WithdrawalStore;
use crate::gateways::types::{BankDetails, PayoutCreation, PayoutOrder};
use crate::gateways::{GatewayKind, GatewayRouter, PayoutGateway};
use crate::logging::mask_account_number;
use crate::model::{CreatedRow, WithdrawalStatus, WithdrawalUpsert};
use crate::services::bank_directory::BankDirectory;
use crate::services::contact_pool::ContactPool;
use crate::workers::pacing::Pacer;
use crate::workers::{publish, RunPhase, RunProgress};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Gap enforced between consecutive gateway dispatches.
    pub item_delay: Duration,
    pub phones_path: PathBuf,
    pub emails_path: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            item_delay: Duration::from_secs(5),
            phones_path: PathBuf::from("phones.txt"),
            emails_path: PathBuf::from("emails.txt"),
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.item_delay = Duration::from_secs(
            std::env::var("BATCH_ITEM_DELAY_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.item_delay.as_secs()),
        );

        if let Ok(path) = std::env::var("POOL_PHONES_PATH") {
            cfg.phones_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("POOL_EMAILS_PATH") {
            cfg.emails_path = PathBuf::from(path);
        }

        cfg
    }
}

// ---------------------------------------------------------------------------
// Batch Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionLimits {
    /// Cumulative amount cap over the whole selection.
    pub ceiling: f64,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
}

/// A row supplied directly by the operator, dispatched without having been
/// ingested first.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectPayoutRow {
    pub withdraw_request_id: String,
    pub beneficiary_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    #[serde(default)]
    pub bank_name: Option<String>,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub enum BatchItems {
    /// Explicit business ids, processed in the given order.
    Explicit(Vec<String>),
    /// Amount-bounded selection over stored Created rows.
    Selection(SelectionLimits),
    /// Create-now rows carrying full beneficiary details.
    Direct(Vec<DirectPayoutRow>),
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub target: GatewayKind,
    pub items: BatchItems,
}

// ---------------------------------------------------------------------------
// Amount-Bounded Selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SelectedItem {
    pub withdraw_request_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub selected: Vec<SelectedItem>,
    pub total_amount: f64,
    pub candidates: usize,
    pub skipped: usize,
}

/// Greedy knapsack-by-arrival-order over candidates already sorted
/// most-recent first. A row that would breach the ceiling is skipped but the
/// scan continues: smaller rows further down may still fit. Intentionally not
/// optimal packing; operators audit the selection and need it predictable.
pub fn select_candidates(candidates: &[CreatedRow], limits: &SelectionLimits) -> SelectionReport {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut selected = Vec::new();
    let mut total_amount = 0.0_f64;
    let mut skipped = 0_usize;

    for row in candidates {
        if !seen.insert(row.withdraw_request_id.as_str()) {
            skipped += 1;
            continue;
        }
        if limits.min_amount.is_some_and(|min| row.amount < min)
            || limits.max_amount.is_some_and(|max| row.amount > max)
        {
            skipped += 1;
            continue;
        }
        if total_amount + row.amount > limits.ceiling {
            skipped += 1;
            continue;
        }
        total_amount += row.amount;
        selected.push(SelectedItem {
            withdraw_request_id: row.withdraw_request_id.clone(),
            amount: row.amount,
        });
    }

    SelectionReport {
        selected,
        total_amount,
        candidates: candidates.len(),
        skipped,
    }
}

// ---------------------------------------------------------------------------
// Batch Runner
// ---------------------------------------------------------------------------

enum WorkItem {
    Stored(String),
    Direct(DirectPayoutRow),
}

impl WorkItem {
    fn business_id(&self) -> &str {
        match self {
            WorkItem::Stored(id) => id,
            WorkItem::Direct(row) => &row.withdraw_request_id,
        }
    }
}

/// Sequential payout-creation orchestrator. Items never abort the batch:
/// every per-item error is caught, recorded against that item, and the loop
/// moves on. An item counts as succeeded only after its store write has
/// committed.
pub struct PayoutBatchRunner {
    store: Arc<dyn WithdrawalStore>,
    router: Arc<GatewayRouter>,
    bank_directory: Arc<dyn BankDirectory>,
    config: BatchConfig,
}

impl PayoutBatchRunner {
    pub fn new(
        store: Arc<dyn WithdrawalStore>,
        router: Arc<GatewayRouter>,
        bank_directory: Arc<dyn BankDirectory>,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            router,
            bank_directory,
            config,
        }
    }

    /// Loads the contact pools, then runs the batch. Pool-load failures are
    /// reported through the run snapshot so the spawning side never blocks
    /// on setup.
    pub async fn launch(
        self,
        request: BatchRequest,
        progress_tx: watch::Sender<RunProgress>,
        cancel_rx: watch::Receiver<bool>,
    ) -> RunProgress {
        let pool =
            match ContactPool::load(&self.config.phones_path, &self.config.emails_path).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!(error = %e, "contact pools failed to load");
                    let mut progress = progress_tx.borrow().clone();
                    progress.fail_setup(format!("contact pools failed to load: {e}"));
                    publish(&progress_tx, &progress);
                    return progress;
                }
            };
        self.run_with_pool(request, pool, progress_tx, cancel_rx).await
    }

    /// Runs the batch against an already-loaded pool. The pool is owned by
    /// this one run; draws are never shared with another batch.
    pub async fn run_with_pool(
        self,
        request: BatchRequest,
        mut pool: ContactPool,
        progress_tx: watch::Sender<RunProgress>,
        cancel_rx: watch::Receiver<bool>,
    ) -> RunProgress {
        let mut progress = progress_tx.borrow().clone();

        let gateway = match self.router.get(request.target) {
            Ok(gateway) => gateway,
            Err(e) => {
                progress.fail_setup(e.to_string());
                publish(&progress_tx, &progress);
                return progress;
            }
        };

        let worklist: Vec<WorkItem> = match request.items {
            BatchItems::Explicit(ids) => ids.into_iter().map(WorkItem::Stored).collect(),
            BatchItems::Selection(limits) => {
                let candidates = match self.store.scan_created().await {
                    Ok(rows) => rows,
                    Err(e) => {
                        error!(error = %e, "candidate scan failed");
                        progress.fail_setup(format!("candidate scan failed: {e}"));
                        publish(&progress_tx, &progress);
                        return progress;
                    }
                };
                let report = select_candidates(&candidates, &limits);
                info!(
                    selected = report.selected.len(),
                    total_amount = report.total_amount,
                    skipped = report.skipped,
                    "amount-bounded selection done"
                );
                report
                    .selected
                    .into_iter()
                    .map(|item| WorkItem::Stored(item.withdraw_request_id))
                    .collect()
            }
            BatchItems::Direct(rows) => rows.into_iter().map(WorkItem::Direct).collect(),
        };

        progress.total = worklist.len();
        progress.phase = RunPhase::Running;
        publish(&progress_tx, &progress);
        info!(
            run_id = %progress.run_id,
            total = progress.total,
            gateway = gateway.kind().label(),
            "payout batch started"
        );

        let mut pacer = Pacer::new(self.config.item_delay);
        for item in worklist {
            // Cancellation lands between items, never mid-gateway-call.
            // Rows already moved to Processing stay Processing.
            if *cancel_rx.borrow() {
                info!(run_id = %progress.run_id, processed = progress.processed, "payout batch cancelled");
                progress.finish(RunPhase::Cancelled);
                publish(&progress_tx, &progress);
                return progress;
            }
            pacer.wait().await;
            if *cancel_rx.borrow() {
                info!(run_id = %progress.run_id, processed = progress.processed, "payout batch cancelled");
                progress.finish(RunPhase::Cancelled);
                publish(&progress_tx, &progress);
                return progress;
            }

            let business_id = item.business_id().to_string();
            let outcome = match item {
                WorkItem::Stored(id) => {
                    self.process_stored(&id, gateway.as_ref(), &mut pool).await
                }
                WorkItem::Direct(row) => {
                    self.process_direct(row, gateway.as_ref(), &mut pool).await
                }
            };
            match outcome {
                Ok(order_id) => {
                    info!(
                        withdrawal_id = %business_id,
                        order_id = %order_id,
                        gateway = gateway.kind().label(),
                        "payout created"
                    );
                    progress.record_success(&business_id, &order_id, gateway.kind().label());
                }
                Err(reason) => {
                    warn!(withdrawal_id = %business_id, reason = %reason, "payout item failed");
                    progress.record_failure(&business_id, reason);
                }
            }
            publish(&progress_tx, &progress);
        }

        progress.finish(RunPhase::Finished);
        publish(&progress_tx, &progress);
        info!(
            run_id = %progress.run_id,
            succeeded = progress.succeeded,
            failed = progress.failed,
            "payout batch finished"
        );
        progress
    }

    async fn process_stored(
        &self,
        id: &str,
        gateway: &dyn PayoutGateway,
        pool: &mut ContactPool,
    ) -> Result<String, String> {
        let row = self
            .store
            .find_by_business_id(id)
            .await
            .map_err(|e| format!("store read failed: {e}"))?
            .ok_or_else(|| "not found".to_string())?;

        if !row.status.allows_creation() {
            return Err(format!("status {}, skipped", row.status.as_str()));
        }

        let bank_name = self
            .bank_directory
            .lookup(&row.ifsc_code)
            .await
            .map_err(|e| format!("bank lookup failed: {e}"))?;

        let contact = pool.draw().ok_or_else(|| "contact pool exhausted".to_string())?;

        info!(
            withdrawal_id = %id,
            account = %mask_account_number(&row.account_number),
            bank = %bank_name,
            "dispatching payout creation"
        );
        let order = PayoutOrder {
            business_id: row.withdraw_request_id.clone(),
            bank: BankDetails {
                beneficiary_name: row.beneficiary_name.clone(),
                account_number: row.account_number.clone(),
                ifsc_code: row.ifsc_code.clone(),
                bank_name,
            },
            amount: row.amount,
            contact,
        };

        match gateway.create_payout(&order).await {
            PayoutCreation::Accepted { order_id, .. } => {
                self.store
                    .transition_to_processing(id, &order_id, gateway.kind().label())
                    .await
                    .map_err(|e| {
                        error!(
                            withdrawal_id = %id,
                            order_id = %order_id,
                            error = %e,
                            "payout accepted but the transition write failed"
                        );
                        format!("accepted as {order_id} but the store write failed: {e}")
                    })?;
                Ok(order_id)
            }
            other => Err(other
                .failure_reason()
                .unwrap_or_else(|| "rejected".to_string())),
        }
    }

    /// Create-now path: the row has never been ingested, so acceptance writes
    /// it straight in as Processing with its correlation id in one upsert.
    async fn process_direct(
        &self,
        row: DirectPayoutRow,
        gateway: &dyn PayoutGateway,
        pool: &mut ContactPool,
    ) -> Result<String, String> {
        let bank_name = match row.bank_name.as_deref().filter(|name| !name.trim().is_empty()) {
            Some(name) => name.to_string(),
            None => self
                .bank_directory
                .lookup(&row.ifsc_code)
                .await
                .map_err(|e| format!("bank lookup failed: {e}"))?,
        };

        let contact = pool.draw().ok_or_else(|| "contact pool exhausted".to_string())?;

        info!(
            withdrawal_id = %row.withdraw_request_id,
            account = %mask_account_number(&row.account_number),
            bank = %bank_name,
            "dispatching create-now payout"
        );
        let order = PayoutOrder {
            business_id: row.withdraw_request_id.clone(),
            bank: BankDetails {
                beneficiary_name: row.beneficiary_name.clone(),
                account_number: row.account_number.clone(),
                ifsc_code: row.ifsc_code.clone(),
                bank_name,
            },
            amount: row.amount,
            contact,
        };

        match gateway.create_payout(&order).await {
            PayoutCreation::Accepted { order_id, .. } => {
                let record = WithdrawalUpsert {
                    withdraw_request_id: row.withdraw_request_id.clone(),
                    beneficiary_name: row.beneficiary_name,
                    account_number: row.account_number,
                    ifsc_code: row.ifsc_code,
                    amount: row.amount,
                    status: WithdrawalStatus::Processing,
                    order_id: order_id.clone(),
                    payment_method: gateway.kind().label().to_string(),
                };
                self.store.upsert(&record).await.map_err(|e| {
                    error!(
                        withdrawal_id = %row.withdraw_request_id,
                        order_id = %order_id,
                        error = %e,
                        "payout accepted but the upsert failed"
                    );
                    format!("accepted as {order_id} but the store write failed: {e}")
                })?;
                Ok(order_id)
            }
            other => Err(other
                .failure_reason()
                .unwrap_or_else(|| "rejected".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
