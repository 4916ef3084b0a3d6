//! CSV ingestion of withdrawal requests
//!
//! Unparsable rows are skipped with a warning and counted; a store failure
//! aborts the whole ingestion.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::database::error::DatabaseError;
use crate::database::WithdrawalStore;
use crate::model::WithdrawalUpsert;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// CSV Format
// ---------------------------------------------------------------------------

// Column headers exactly as the admin console exports them, spelling included.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Withdraw Request Id")]
    withdraw_request_id: String,
    #[serde(rename = "Benificiary Name")]
    beneficiary_name: String,
    #[serde(rename = "Benificiary Account number")]
    account_number: String,
    #[serde(rename = "IFSC Code")]
    ifsc_code: String,
    #[serde(rename = "Amount")]
    amount: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub stored: usize,
    pub skipped: usize,
}

/// Parses withdrawal rows out of a CSV stream. Rows that fail to deserialize,
/// carry a blank id, or carry a non-numeric amount are counted and skipped;
/// they never fail the file.
fn parse_rows<R: Read>(reader: R) -> Result<(Vec<WithdrawalUpsert>, usize), IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (index, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = match record {
            Ok(row) => row,
            Err(err) => {
                warn!(row = index + 1, error = %err, "skipping malformed csv row");
                skipped += 1;
                continue;
            }
        };
        if row.withdraw_request_id.is_empty() {
            warn!(row = index + 1, "skipping csv row without a withdraw request id");
            skipped += 1;
            continue;
        }
        let amount: f64 = match row.amount.replace(',', "").parse() {
            Ok(amount) => amount,
            Err(_) => {
                warn!(
                    row = index + 1,
                    withdrawal_id = %row.withdraw_request_id,
                    amount = %row.amount,
                    "skipping csv row with non-numeric amount"
                );
                skipped += 1;
                continue;
            }
        };
        rows.push(WithdrawalUpsert::ingested(
            row.withdraw_request_id,
            row.beneficiary_name,
            row.account_number,
            row.ifsc_code,
            amount,
        ));
    }

    Ok((rows, skipped))
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Ingests a CSV stream: every well-formed row is upserted keyed on its
/// business id. Store failures abort the ingestion; row-level parse problems
/// do not.
pub async fn ingest_reader<R: Read>(
    store: &dyn WithdrawalStore,
    reader: R,
) -> Result<IngestReport, IngestError> {
    let (rows, skipped) = parse_rows(reader)?;

    let mut stored = 0usize;
    for row in &rows {
        store.upsert_ingested(row).await?;
        stored += 1;
    }

    Ok(IngestReport { stored, skipped })
}

/// Ingests a CSV file from disk.
pub async fn ingest_csv(
    store: &dyn WithdrawalStore,
    path: &Path,
) -> Result<IngestReport, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| csv::Error::from(e))?;
    let report = ingest_reader(store, file).await?;
    info!(
        path = %path.display(),
        stored = report.stored,
        skipped = report.skipped,
        "csv ingested"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
