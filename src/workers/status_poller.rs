use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::database::withdrawal_repository::WithdrawalStore;
use crate::gateways::status::GatewayStatus;
use crate::gateways::GatewayRouter;
use crate::logging::redact_sensitive_data;
use crate::model::{ProcessingRow, WithdrawalStatus};
use crate::workers::pacing::Pacer;
use crate::workers::{publish, RunPhase, RunProgress};

// ---------------------------------------------------------------------------
// Status Poll Runner
// ---------------------------------------------------------------------------

/// Walks every Processing row, asks its gateway for the payout status, and
/// settles rows whose status normalized to a terminal outcome. Anything short
/// of a terminal answer leaves the row untouched for the next poll; a poll
/// can only ever move rows forward.
pub struct StatusPollRunner {
    store: Arc<dyn WithdrawalStore>,
    router: Arc<GatewayRouter>,
    item_delay: Duration,
}

impl StatusPollRunner {
    pub fn new(
        store: Arc<dyn WithdrawalStore>,
        router: Arc<GatewayRouter>,
        item_delay: Duration,
    ) -> Self {
        Self {
            store,
            router,
            item_delay,
        }
    }

    pub async fn run(
        self,
        progress_tx: watch::Sender<RunProgress>,
        cancel_rx: watch::Receiver<bool>,
    ) -> RunProgress {
        let mut progress = progress_tx.borrow().clone();

        let rows = match self.store.scan_processing().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "processing scan failed");
                progress.fail_setup(format!("processing scan failed: {e}"));
                publish(&progress_tx, &progress);
                return progress;
            }
        };

        progress.total = rows.len();
        progress.phase = RunPhase::Running;
        publish(&progress_tx, &progress);
        info!(run_id = %progress.run_id, total = progress.total, "status poll started");

        let mut pacer = Pacer::new(self.item_delay);
        for row in rows {
            if *cancel_rx.borrow() {
                info!(run_id = %progress.run_id, processed = progress.processed, "status poll cancelled");
                progress.finish(RunPhase::Cancelled);
                publish(&progress_tx, &progress);
                return progress;
            }
            pacer.wait().await;
            if *cancel_rx.borrow() {
                info!(run_id = %progress.run_id, processed = progress.processed, "status poll cancelled");
                progress.finish(RunPhase::Cancelled);
                publish(&progress_tx, &progress);
                return progress;
            }

            self.poll_row(&row, &mut progress).await;
            publish(&progress_tx, &progress);
        }

        progress.finish(RunPhase::Finished);
        publish(&progress_tx, &progress);
        info!(
            run_id = %progress.run_id,
            succeeded = progress.succeeded,
            failed = progress.failed,
            pending = progress.pending,
            "status poll finished"
        );
        progress
    }

    /// One row. Every non-terminal outcome, including store and dispatch
    /// errors, counts as pending and leaves the stored status alone.
    async fn poll_row(&self, row: &ProcessingRow, progress: &mut RunProgress) {
        let id = row.withdraw_request_id.as_str();

        let gateway = match self.router.for_label(&row.payment_method) {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!(withdrawal_id = %id, error = %e, "row has no usable gateway, left processing");
                progress.record_pending();
                progress.tally_for(&row.payment_method).pending += 1;
                return;
            }
        };
        let label = gateway.kind().label();

        let reply = gateway.check_payout_status(&row.order_id).await;
        debug!(
            withdrawal_id = %id,
            order_id = %row.order_id,
            reply = %redact_sensitive_data(&reply.to_value().to_string()),
            "gateway status reply"
        );

        match gateway.kind().normalize_payout(&reply) {
            GatewayStatus::Success => {
                match self
                    .store
                    .set_status(id, WithdrawalStatus::Success)
                    .await
                {
                    Ok(()) => {
                        info!(withdrawal_id = %id, order_id = %row.order_id, "payout settled successful");
                        progress.record_success(id, &row.order_id, label);
                        progress.tally_for(label).succeeded.push(id.to_string());
                    }
                    Err(e) => {
                        warn!(withdrawal_id = %id, error = %e, "settlement write failed, left processing");
                        progress.record_pending();
                        progress.tally_for(label).pending += 1;
                    }
                }
            }
            GatewayStatus::Failed => {
                match self.store.set_status(id, WithdrawalStatus::Failed).await {
                    Ok(()) => {
                        info!(withdrawal_id = %id, order_id = %row.order_id, "payout settled failed");
                        progress.record_failure(id, "gateway reported failure".to_string());
                        progress.tally_for(label).failed.push(id.to_string());
                    }
                    Err(e) => {
                        warn!(withdrawal_id = %id, error = %e, "settlement write failed, left processing");
                        progress.record_pending();
                        progress.tally_for(label).pending += 1;
                    }
                }
            }
            GatewayStatus::Pending => {
                debug!(withdrawal_id = %id, order_id = %row.order_id, "payout still pending");
                progress.record_pending();
                progress.tally_for(label).pending += 1;
            }
        }
    }
}
