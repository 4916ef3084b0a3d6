//! Shared gateway wire types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Raw response bodies kept for audit are capped at this many characters.
const RAW_BODY_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Gateway Reply Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    RequestException,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::RequestException => "request_exception",
        }
    }
}

/// Every gateway call resolves to one of these; transport and parse failures
/// are captured as values so no call site ever sees a raised network error.
#[derive(Debug, Clone)]
pub enum GatewayReply {
    /// Parsed JSON body from the gateway.
    Body(Value),
    /// The gateway was never definitively reached. Retryable, never terminal.
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    /// The gateway answered with something that is not usable JSON, or with
    /// an error HTTP status. The raw body is preserved for audit.
    Malformed { http_status: u16, raw: String },
}

impl GatewayReply {
    pub fn from_transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else {
            TransportErrorKind::RequestException
        };
        GatewayReply::Transport {
            kind,
            message: err.to_string(),
        }
    }

    /// Consumes an HTTP response, parsing the body as JSON. A body that fails
    /// to read is a transport error; a body that fails to parse is preserved
    /// raw.
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let http_status = resp.status().as_u16();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(err) => return GatewayReply::from_transport(err),
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => GatewayReply::Body(body),
            Err(_) => GatewayReply::Malformed {
                http_status,
                raw: truncate_raw(&text),
            },
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            GatewayReply::Body(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, GatewayReply::Transport { .. })
    }

    /// Uniform JSON rendering for API responses and audit logs. Errors take
    /// the `{status: "error", error_type, error}` shape.
    pub fn to_value(&self) -> Value {
        match self {
            GatewayReply::Body(v) => v.clone(),
            GatewayReply::Transport { kind, message } => json!({
                "status": "error",
                "error_type": kind.as_str(),
                "error": message,
            }),
            GatewayReply::Malformed { http_status, raw } => json!({
                "status": http_status,
                "error": "invalid JSON",
                "raw": raw,
            }),
        }
    }
}

pub fn truncate_raw(text: &str) -> String {
    text.chars().take(RAW_BODY_LIMIT).collect()
}

// ---------------------------------------------------------------------------
// Payout Creation Types
// ---------------------------------------------------------------------------

/// Beneficiary bank details, with the bank name already resolved from the
/// IFSC code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankDetails {
    pub beneficiary_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
}

/// Contact identity drawn from the batch-scoped pools; each creation call
/// gets its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactIdentity {
    pub phone: String,
    pub email: String,
}

/// Input to a payout creation call.
#[derive(Debug, Clone)]
pub struct PayoutOrder {
    pub business_id: String,
    pub bank: BankDetails,
    pub amount: f64,
    pub contact: ContactIdentity,
}

/// Outcome of a payout creation call after gateway-specific acceptance rules
/// have been applied.
#[derive(Debug, Clone)]
pub enum PayoutCreation {
    /// The gateway accepted the order and a correlation id was produced.
    Accepted { order_id: String, raw: Value },
    /// The gateway answered and said no, or answered in a shape no order id
    /// can be drawn from.
    Rejected { reason: String, raw: Value },
    /// Transport failure; whether the gateway saw the order is unknown.
    Unreachable {
        kind: TransportErrorKind,
        message: String,
    },
}

impl PayoutCreation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PayoutCreation::Accepted { .. })
    }

    /// Human-readable failure text recorded against the batch item.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            PayoutCreation::Accepted { .. } => None,
            PayoutCreation::Rejected { reason, .. } => Some(reason.clone()),
            PayoutCreation::Unreachable { kind, message } => {
                Some(format!("{}: {}", kind.as_str(), message))
            }
        }
    }
}
