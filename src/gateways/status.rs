//! Gateway status normalization
//!
//! Both gateways' status replies funnel through shared token tables into
//! `Success`, `Failed`, or `Pending`. Unrecognized tokens and unexpected
//! reply shapes always degrade to `Pending`, never to a terminal state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Normalized Status
// ---------------------------------------------------------------------------

/// Uniform status vocabulary every gateway response is reduced to.
///
/// Unknown or missing tokens degrade to `Pending` rather than erroring, so an
/// unexpected gateway response can never push a row into a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
}

impl GatewayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayStatus::Success => "success",
            GatewayStatus::Failed => "failed",
            GatewayStatus::Pending => "pending",
        }
    }
}

// Both gateways' numeric codes and word vocabularies funnel through one shared
// token table; the union is deliberate.
const SUCCESS_TOKENS: &[&str] = &[
    "1", "2", "success", "completed", "approved", "done", "paid", "true",
];

const FAILED_TOKENS: &[&str] = &[
    "3", "4", "failed", "failure", "rejected", "cancelled", "canceled", "declined", "false",
];

/// Maps one raw status token onto the shared vocabulary. Total: any input,
/// including empty or unrecognized, yields exactly one variant.
pub fn classify_token(raw: &str) -> GatewayStatus {
    let token = raw.trim().to_lowercase();
    if SUCCESS_TOKENS.contains(&token.as_str()) {
        GatewayStatus::Success
    } else if FAILED_TOKENS.contains(&token.as_str()) {
        GatewayStatus::Failed
    } else {
        GatewayStatus::Pending
    }
}

/// Renders a JSON scalar as a status token. Gateways interchange strings,
/// numbers, and booleans in the same fields. Empty strings count as absent so
/// fallback probing can continue past them.
pub fn token_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Per-Gateway Probe Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct BappaStatusEnvelope {
    #[serde(default)]
    msg: Option<BappaStatusMsg>,
    #[serde(default)]
    status: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct BappaStatusMsg {
    #[serde(default)]
    status: Option<Value>,
}

/// BappaVenture payout status: `msg.status` wins, top-level `status` is the
/// fallback.
pub fn bappa_payout_status(body: &Value) -> GatewayStatus {
    let envelope: BappaStatusEnvelope =
        serde_json::from_value(body.clone()).unwrap_or_default();
    let token = envelope
        .msg
        .and_then(|m| m.status.as_ref().and_then(token_of))
        .or_else(|| envelope.status.as_ref().and_then(token_of));
    match token {
        Some(t) => classify_token(&t),
        None => GatewayStatus::Pending,
    }
}

/// BappaVenture payin status lives in the top-level `status` field.
pub fn bappa_payin_status(body: &Value) -> GatewayStatus {
    let envelope: BappaStatusEnvelope =
        serde_json::from_value(body.clone()).unwrap_or_default();
    match envelope.status.as_ref().and_then(token_of) {
        Some(t) => classify_token(&t),
        None => GatewayStatus::Pending,
    }
}

#[derive(Debug, Default, Deserialize)]
struct WellnessStatusEnvelope {
    #[serde(default)]
    data: Option<WellnessStatusData>,
    #[serde(default)]
    status_code: Option<Value>,
    #[serde(default)]
    gateway: Option<WellnessGatewayBlock>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WellnessStatusData {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    payout_status: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WellnessGatewayBlock {
    #[serde(default)]
    gateway_status: Option<Value>,
}

/// Wellness status: the response shape varies across the gateway's own status
/// codes, so probe `data.status`, `status_code`, `data.payout_status`,
/// `gateway.gateway_status`, `status`, `message` in order and classify the
/// first non-empty value.
pub fn wellness_status(body: &Value) -> GatewayStatus {
    let envelope: WellnessStatusEnvelope =
        serde_json::from_value(body.clone()).unwrap_or_default();
    let data = envelope.data.unwrap_or_default();
    let gateway = envelope.gateway.unwrap_or_default();

    let token = data
        .status
        .as_ref()
        .and_then(token_of)
        .or_else(|| envelope.status_code.as_ref().and_then(token_of))
        .or_else(|| data.payout_status.as_ref().and_then(token_of))
        .or_else(|| gateway.gateway_status.as_ref().and_then(token_of))
        .or_else(|| envelope.status.as_ref().and_then(token_of))
        .or_else(|| envelope.message.as_ref().and_then(token_of));

    match token {
        Some(t) => classify_token(&t),
        None => GatewayStatus::Pending,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_tokens() {
        for token in ["1", "2", "success", "COMPLETED", "Approved", "done", "paid", "true"] {
            assert_eq!(classify_token(token), GatewayStatus::Success, "token {token}");
        }
    }

    #[test]
    fn test_failed_tokens() {
        for token in [
            "3", "4", "failed", "FAILURE", "rejected", "cancelled", "canceled", "Declined",
            "false",
        ] {
            assert_eq!(classify_token(token), GatewayStatus::Failed, "token {token}");
        }
    }

    #[test]
    fn test_unknown_tokens_degrade_to_pending() {
        for token in ["", "  ", "0", "unknown", "INITIATED", "5", "queued", "??"] {
            assert_eq!(classify_token(token), GatewayStatus::Pending, "token {token:?}");
        }
    }

    #[test]
    fn test_token_of_scalars() {
        assert_eq!(token_of(&json!("ok")), Some("ok".to_string()));
        assert_eq!(token_of(&json!(2)), Some("2".to_string()));
        assert_eq!(token_of(&json!(true)), Some("true".to_string()));
        assert_eq!(token_of(&json!("")), None);
        assert_eq!(token_of(&json!("   ")), None);
        assert_eq!(token_of(&json!(null)), None);
        assert_eq!(token_of(&json!({"k": 1})), None);
    }

    #[test]
    fn test_bappa_payout_prefers_msg_status() {
        let body = json!({"msg": {"status": "1"}, "status": "3"});
        assert_eq!(bappa_payout_status(&body), GatewayStatus::Success);
    }

    #[test]
    fn test_bappa_payout_falls_back_to_top_level() {
        let body = json!({"status": "3"});
        assert_eq!(bappa_payout_status(&body), GatewayStatus::Failed);

        let body = json!({"msg": {"orderid": "X"}, "status": 2});
        assert_eq!(bappa_payout_status(&body), GatewayStatus::Success);
    }

    #[test]
    fn test_bappa_payout_empty_body_is_pending() {
        assert_eq!(bappa_payout_status(&json!({})), GatewayStatus::Pending);
        assert_eq!(bappa_payout_status(&json!("not an object")), GatewayStatus::Pending);
    }

    #[test]
    fn test_bappa_payin_reads_top_level_status() {
        let body = json!({"status": "success", "transactionid": "T1", "utr": "U1"});
        assert_eq!(bappa_payin_status(&body), GatewayStatus::Success);
    }

    #[test]
    fn test_wellness_probe_order() {
        // data.status outranks everything else.
        let body = json!({
            "data": {"status": "failed", "payout_status": "success"},
            "status": true
        });
        assert_eq!(wellness_status(&body), GatewayStatus::Failed);

        // status_code outranks data.payout_status.
        let body = json!({
            "status_code": 2,
            "data": {"payout_status": "failed"}
        });
        assert_eq!(wellness_status(&body), GatewayStatus::Success);

        // gateway.gateway_status is probed before top-level status.
        let body = json!({
            "gateway": {"gateway_status": "Completed"},
            "status": false
        });
        assert_eq!(wellness_status(&body), GatewayStatus::Success);

        // message is the last resort.
        let body = json!({"message": "rejected"});
        assert_eq!(wellness_status(&body), GatewayStatus::Failed);
    }

    #[test]
    fn test_wellness_skips_empty_values() {
        let body = json!({
            "data": {"status": ""},
            "status_code": null,
            "status": "paid"
        });
        assert_eq!(wellness_status(&body), GatewayStatus::Success);
    }

    #[test]
    fn test_wellness_unknown_shape_is_pending() {
        assert_eq!(wellness_status(&json!({})), GatewayStatus::Pending);
        assert_eq!(wellness_status(&json!({"data": "oops"})), GatewayStatus::Pending);
        assert_eq!(wellness_status(&json!(42)), GatewayStatus::Pending);
    }
}
