//! Background run orchestration
//!
//! Run progress snapshots, the run registry, and the single-active-batch
//! slot live here; the runners themselves are in the submodules.

pub mod pacing;
pub mod payout_batch;
pub mod status_poller;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Run Progress Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    PayoutBatch,
    StatusPoll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Setup: loading pools, reading candidate rows.
    Loading,
    /// The per-item loop is underway.
    Running,
    Finished,
    Cancelled,
    /// A setup error stopped the run before any item was processed.
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Finished | RunPhase::Cancelled | RunPhase::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSuccess {
    pub withdraw_request_id: String,
    pub order_id: String,
    pub gateway: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    pub withdraw_request_id: String,
    pub reason: String,
}

/// Per-gateway tallies reported by the status poller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayTally {
    pub gateway: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub pending: usize,
}

/// One observable snapshot of a batch or poll run. Workers publish a fresh
/// snapshot after every item so operators see liveness, not just a final
/// report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub phase: RunPhase,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
    pub successes: Vec<ItemSuccess>,
    pub failures: Vec<ItemFailure>,
    pub gateway_tallies: Vec<GatewayTally>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunProgress {
    pub fn new(run_id: Uuid, kind: RunKind) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            kind,
            phase: RunPhase::Loading,
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            pending: 0,
            successes: Vec::new(),
            failures: Vec::new(),
            gateway_tallies: Vec::new(),
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn record_success(&mut self, id: &str, order_id: &str, gateway: &str) {
        self.processed += 1;
        self.succeeded += 1;
        self.successes.push(ItemSuccess {
            withdraw_request_id: id.to_string(),
            order_id: order_id.to_string(),
            gateway: gateway.to_string(),
        });
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, id: &str, reason: String) {
        self.processed += 1;
        self.failed += 1;
        self.failures.push(ItemFailure {
            withdraw_request_id: id.to_string(),
            reason,
        });
        self.updated_at = Utc::now();
    }

    pub fn record_pending(&mut self) {
        self.processed += 1;
        self.pending += 1;
        self.updated_at = Utc::now();
    }

    pub fn tally_for(&mut self, gateway: &str) -> &mut GatewayTally {
        if let Some(index) = self
            .gateway_tallies
            .iter()
            .position(|t| t.gateway == gateway)
        {
            return &mut self.gateway_tallies[index];
        }
        self.gateway_tallies.push(GatewayTally {
            gateway: gateway.to_string(),
            ..GatewayTally::default()
        });
        self.gateway_tallies.last_mut().unwrap()
    }

    pub fn finish(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    pub fn fail_setup(&mut self, error: String) {
        self.phase = RunPhase::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Run Registry
// ---------------------------------------------------------------------------

struct RunEntry {
    progress: watch::Receiver<RunProgress>,
    cancel: watch::Sender<bool>,
}

/// Tracks background runs by id: the latest progress snapshot of each, and a
/// cancel flag the worker checks between items. Finished runs are retained so
/// a final report stays fetchable after completion.
///
/// Also owns the single active-batch slot: creation batches draw contact
/// identities from exclusive pools, so at most one may run at a time.
pub struct RunRegistry {
    runs: Mutex<HashMap<Uuid, RunEntry>>,
    batch_slot: Arc<Mutex<()>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            batch_slot: Arc::new(Mutex::new(())),
        }
    }

    /// Creates the channels for a new run and registers it. Returns the
    /// progress sender and cancel receiver for the worker side.
    pub async fn open(
        &self,
        run_id: Uuid,
        kind: RunKind,
    ) -> (watch::Sender<RunProgress>, watch::Receiver<bool>) {
        let (progress_tx, progress_rx) = watch::channel(RunProgress::new(run_id, kind));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.runs.lock().await.insert(
            run_id,
            RunEntry {
                progress: progress_rx,
                cancel: cancel_tx,
            },
        );
        (progress_tx, cancel_rx)
    }

    pub async fn progress(&self, run_id: Uuid) -> Option<RunProgress> {
        self.runs
            .lock()
            .await
            .get(&run_id)
            .map(|entry| entry.progress.borrow().clone())
    }

    /// Requests cancellation between items. Returns false for unknown runs.
    pub async fn cancel(&self, run_id: Uuid) -> bool {
        match self.runs.lock().await.get(&run_id) {
            Some(entry) => entry.cancel.send(true).is_ok(),
            None => false,
        }
    }

    /// Claims the single creation-batch slot, or returns None while another
    /// batch holds it. The guard lives as long as the spawned run.
    pub fn try_claim_batch_slot(&self) -> Option<OwnedMutexGuard<()>> {
        self.batch_slot.clone().try_lock_owned().ok()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes a snapshot, ignoring the send error after every watcher is gone
/// (the run still completes for the store's sake).
pub(crate) fn publish(progress_tx: &watch::Sender<RunProgress>, progress: &RunProgress) {
    let _ = progress_tx.send(progress.clone());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
