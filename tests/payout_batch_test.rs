//! Integration tests for the payout batch runner
//!
//! Tests cover:
//! - Per-item failure isolation
//! - Success recorded only after the store write commits
//! - Amount-bounded selection driving dispatch
//! - Contact pool consumption without reuse
//! - Cancellation between items

mod common;

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;
    use uuid::Uuid;

    use payoutdesk::gateways::{GatewayKind, GatewayRouter};
    use payoutdesk::model::WithdrawalStatus;
    use payoutdesk::services::bank_directory::BankDirectory;
    use payoutdesk::workers::payout_batch::{
        BatchConfig, BatchItems, BatchRequest, DirectPayoutRow, PayoutBatchRunner,
        SelectionLimits,
    };
    use payoutdesk::workers::{RunKind, RunPhase, RunProgress};

    use crate::common::{
        pool_of, MemoryStore, MissingBankDirectory, ScriptedGateway, StaticBankDirectory,
    };

    fn channels() -> (
        watch::Sender<RunProgress>,
        watch::Receiver<RunProgress>,
        watch::Sender<bool>,
        watch::Receiver<bool>,
    ) {
        let (progress_tx, progress_rx) =
            watch::channel(RunProgress::new(Uuid::new_v4(), RunKind::PayoutBatch));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (progress_tx, progress_rx, cancel_tx, cancel_rx)
    }

    fn runner_with_directory(
        store: Arc<MemoryStore>,
        gateway: Arc<ScriptedGateway>,
        directory: Arc<dyn BankDirectory>,
    ) -> PayoutBatchRunner {
        let mut router = GatewayRouter::new();
        router.register(gateway);
        PayoutBatchRunner::new(
            store,
            Arc::new(router),
            directory,
            BatchConfig {
                item_delay: Duration::ZERO,
                ..BatchConfig::default()
            },
        )
    }

    fn runner(store: Arc<MemoryStore>, gateway: Arc<ScriptedGateway>) -> PayoutBatchRunner {
        runner_with_directory(store, gateway, Arc::new(StaticBankDirectory::new("HDFC Bank")))
    }

    fn explicit(target: GatewayKind, ids: &[&str]) -> BatchRequest {
        BatchRequest {
            target,
            items: BatchItems::Explicit(ids.iter().map(|id| id.to_string()).collect()),
        }
    }

    #[tokio::test]
    async fn test_batch_isolates_item_failures() {
        let store = Arc::new(MemoryStore::new());
        store.seed_created("WD-1", 500.0);
        store.seed_created("WD-2", 200.0);
        store.seed_created("WD-3", 300.0);

        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::BappaVenture));
        gateway.accepts("WD-1", "IND-1");
        gateway.rejects("WD-2", "insufficient balance");
        gateway.accepts("WD-3", "IND-3");

        // WD-MISSING was never ingested; it must fail without a dispatch.
        let request = explicit(
            GatewayKind::BappaVenture,
            &["WD-1", "WD-2", "WD-MISSING", "WD-3"],
        );
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner(store.clone(), gateway.clone())
            .run_with_pool(request, pool_of(4), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.phase, RunPhase::Finished);
        assert_eq!(report.total, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);

        // Gateway saw the dispatchable items in request order, nothing else.
        assert_eq!(gateway.dispatched(), vec!["WD-1", "WD-2", "WD-3"]);

        // Accepted rows carry their correlation; the rejected one is intact.
        let done = store.row("WD-1").unwrap();
        assert_eq!(done.status, WithdrawalStatus::Processing);
        assert_eq!(done.order_id, "IND-1");
        assert_eq!(done.payment_method, "BappaVenture");
        assert_eq!(store.row("WD-2").unwrap().status, WithdrawalStatus::Created);
        assert_eq!(store.row("WD-3").unwrap().order_id, "IND-3");

        let reasons: Vec<&str> = report.failures.iter().map(|f| f.reason.as_str()).collect();
        assert!(reasons.contains(&"insufficient balance"));
        assert!(reasons.contains(&"not found"));
    }

    #[tokio::test]
    async fn test_success_recorded_only_after_store_write() {
        let store = Arc::new(MemoryStore::new());
        store.seed_created("WD-1", 500.0);
        store.fail_writes_for("WD-1");

        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::BappaVenture));
        gateway.accepts("WD-1", "IND-1");

        let request = explicit(GatewayKind::BappaVenture, &["WD-1"]);
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner(store.clone(), gateway)
            .run_with_pool(request, pool_of(1), progress_tx, cancel_rx)
            .await;

        // The gateway said yes, but without a committed write the item is a
        // failure carrying the order id for manual follow-up.
        assert_eq!(report.phase, RunPhase::Finished);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 1);
        let reason = &report.failures[0].reason;
        assert!(reason.contains("IND-1"), "reason: {reason}");
        assert!(reason.contains("store write failed"), "reason: {reason}");

        // Status and order id move together or not at all.
        let row = store.row("WD-1").unwrap();
        assert_eq!(row.status, WithdrawalStatus::Created);
        assert!(row.order_id.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_rows_never_dispatch() {
        let store = Arc::new(MemoryStore::new());
        store.seed_with_status("WD-1", 500.0, WithdrawalStatus::Success);
        store.seed_with_status("WD-2", 200.0, WithdrawalStatus::Failed);

        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::BappaVenture));
        gateway.accepts("WD-1", "IND-1");
        gateway.accepts("WD-2", "IND-2");

        let request = explicit(GatewayKind::BappaVenture, &["WD-1", "WD-2"]);
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner(store.clone(), gateway.clone())
            .run_with_pool(request, pool_of(2), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.failed, 2);
        assert!(gateway.dispatched().is_empty());
        assert!(report.failures[0].reason.contains("skipped"));
        assert_eq!(store.row("WD-1").unwrap().status, WithdrawalStatus::Success);
    }

    #[tokio::test]
    async fn test_selection_batch_dispatches_greedy_selection() {
        let store = Arc::new(MemoryStore::new());
        // Seeded oldest first; the scan returns most recent first, so the
        // walk order is 500, 100, 9999, 50.
        store.seed_created("WD-50", 50.0);
        store.seed_created("WD-9999", 9999.0);
        store.seed_created("WD-100", 100.0);
        store.seed_created("WD-500", 500.0);

        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::BappaVenture));
        gateway.accepts("WD-500", "IND-500");
        gateway.accepts("WD-100", "IND-100");

        let request = BatchRequest {
            target: GatewayKind::BappaVenture,
            items: BatchItems::Selection(SelectionLimits {
                ceiling: 600.0,
                min_amount: None,
                max_amount: None,
            }),
        };
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner(store.clone(), gateway.clone())
            .run_with_pool(request, pool_of(4), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.phase, RunPhase::Finished);
        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(gateway.dispatched(), vec!["WD-500", "WD-100"]);

        // Unselected rows are untouched Created rows.
        assert_eq!(store.row("WD-9999").unwrap().status, WithdrawalStatus::Created);
        assert_eq!(store.row("WD-50").unwrap().status, WithdrawalStatus::Created);
    }

    #[tokio::test]
    async fn test_contact_identities_never_repeat_within_a_batch() {
        let store = Arc::new(MemoryStore::new());
        for id in ["WD-1", "WD-2", "WD-3", "WD-4"] {
            store.seed_created(id, 100.0);
        }

        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::Wellness));
        for id in ["WD-1", "WD-2", "WD-3", "WD-4"] {
            gateway.accepts(id, &format!("PORD_{id}"));
        }

        // Only three identities for four items.
        let request = explicit(GatewayKind::Wellness, &["WD-1", "WD-2", "WD-3", "WD-4"]);
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner(store, gateway.clone())
            .run_with_pool(request, pool_of(3), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert!(report.failures[0].reason.contains("contact pool exhausted"));

        let orders = gateway.recorded_orders();
        assert_eq!(orders.len(), 3);
        let phones: HashSet<&str> = orders.iter().map(|o| o.contact.phone.as_str()).collect();
        let emails: HashSet<&str> = orders.iter().map(|o| o.contact.email.as_str()).collect();
        assert_eq!(phones.len(), 3, "a phone was reused within the batch");
        assert_eq!(emails.len(), 3, "an email was reused within the batch");
    }

    #[tokio::test]
    async fn test_cancellation_before_first_item() {
        let store = Arc::new(MemoryStore::new());
        store.seed_created("WD-1", 100.0);
        store.seed_created("WD-2", 100.0);

        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::BappaVenture));
        gateway.accepts("WD-1", "IND-1");
        gateway.accepts("WD-2", "IND-2");

        let request = explicit(GatewayKind::BappaVenture, &["WD-1", "WD-2"]);
        let (progress_tx, _progress_rx, cancel_tx, cancel_rx) = channels();
        cancel_tx.send(true).unwrap();

        let report = runner(store.clone(), gateway.clone())
            .run_with_pool(request, pool_of(2), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.phase, RunPhase::Cancelled);
        assert_eq!(report.processed, 0);
        assert!(gateway.dispatched().is_empty());
        assert_eq!(store.row("WD-1").unwrap().status, WithdrawalStatus::Created);
    }

    #[tokio::test]
    async fn test_unregistered_target_fails_setup() {
        let store = Arc::new(MemoryStore::new());
        let empty_router = Arc::new(GatewayRouter::new());
        let runner = PayoutBatchRunner::new(
            store,
            empty_router,
            Arc::new(StaticBankDirectory::new("HDFC Bank")),
            BatchConfig {
                item_delay: Duration::ZERO,
                ..BatchConfig::default()
            },
        );

        let request = explicit(GatewayKind::Wellness, &["WD-1"]);
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner
            .run_with_pool(request, pool_of(1), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.phase, RunPhase::Failed);
        assert!(report.error.as_deref().unwrap().contains("not configured"));
        assert_eq!(report.processed, 0);
    }

    #[tokio::test]
    async fn test_direct_rows_upsert_processing_on_acceptance() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::Wellness));
        gateway.accepts("WD-NEW", "PORD_771");

        let request = BatchRequest {
            target: GatewayKind::Wellness,
            items: BatchItems::Direct(vec![DirectPayoutRow {
                withdraw_request_id: "WD-NEW".to_string(),
                beneficiary_name: "Asha Rao".to_string(),
                account_number: "001100220033".to_string(),
                ifsc_code: "HDFC0000123".to_string(),
                bank_name: None,
                amount: 750.0,
            }]),
        };
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner(store.clone(), gateway.clone())
            .run_with_pool(request, pool_of(1), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.succeeded, 1);

        // Acceptance writes the never-ingested row straight in as Processing.
        let row = store.row("WD-NEW").unwrap();
        assert_eq!(row.status, WithdrawalStatus::Processing);
        assert_eq!(row.order_id, "PORD_771");
        assert_eq!(row.payment_method, "Wellness");
        assert_eq!(row.amount, 750.0);

        // The bank name came from the directory.
        assert_eq!(gateway.recorded_orders()[0].bank.bank_name, "HDFC Bank");
    }

    #[tokio::test]
    async fn test_direct_rows_with_bank_name_skip_lookup() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::Wellness));
        gateway.accepts("WD-NEW", "PORD_772");

        // The directory fails every lookup; a supplied bank name must not
        // consult it.
        let runner = runner_with_directory(
            store.clone(),
            gateway.clone(),
            Arc::new(MissingBankDirectory),
        );
        let request = BatchRequest {
            target: GatewayKind::Wellness,
            items: BatchItems::Direct(vec![DirectPayoutRow {
                withdraw_request_id: "WD-NEW".to_string(),
                beneficiary_name: "Asha Rao".to_string(),
                account_number: "001100220033".to_string(),
                ifsc_code: "HDFC0000123".to_string(),
                bank_name: Some("Axis Bank".to_string()),
                amount: 300.0,
            }]),
        };
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner
            .run_with_pool(request, pool_of(1), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(gateway.recorded_orders()[0].bank.bank_name, "Axis Bank");
    }

    #[tokio::test]
    async fn test_bank_lookup_failure_fails_the_item_only() {
        let store = Arc::new(MemoryStore::new());
        store.seed_created("WD-1", 100.0);
        store.seed_created("WD-2", 100.0);

        let gateway = Arc::new(ScriptedGateway::new(GatewayKind::BappaVenture));
        gateway.accepts("WD-2", "IND-2");

        // Every lookup fails; stored rows cannot build their bank details.
        let runner = runner_with_directory(
            store.clone(),
            gateway.clone(),
            Arc::new(MissingBankDirectory),
        );
        let request = explicit(GatewayKind::BappaVenture, &["WD-1", "WD-2"]);
        let (progress_tx, _progress_rx, _cancel_tx, cancel_rx) = channels();
        let report = runner
            .run_with_pool(request, pool_of(2), progress_tx, cancel_rx)
            .await;

        assert_eq!(report.phase, RunPhase::Finished);
        assert_eq!(report.failed, 2);
        assert!(report.failures[0].reason.contains("bank lookup failed"));
        assert!(gateway.dispatched().is_empty());
    }
}
