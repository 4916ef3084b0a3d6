//! BappaVenture payout gateway implementation
//!
//! Creations go out as flat GET queries or as a base64 salt envelope over
//! POST depending on deployment configuration. Replies wrap their payload
//! in a `msg` object, with a bare top-level fallback shape.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

use super::status::token_of;
use super::types::{GatewayReply, PayoutCreation, PayoutOrder};
use super::{GatewayError, GatewayKind, PayoutGateway};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Wire encoding for payout creation. The gateway has switched between a flat
/// query-parameter request and a base64 "salt"-wrapped POST body across
/// deployments, so both stay supported and the active one is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutEncoding {
    Plain,
    Salted,
}

impl PayoutEncoding {
    fn parse(raw: &str) -> Result<Self, GatewayError> {
        match raw.trim().to_lowercase().as_str() {
            "plain" | "flat" => Ok(PayoutEncoding::Plain),
            "salt" | "salted" => Ok(PayoutEncoding::Salted),
            other => Err(GatewayError::Config(format!(
                "BAPPA_PAYOUT_ENCODING must be plain or salt, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BappaVentureConfig {
    pub merchant_id: String,
    pub merchant_token: String,
    pub payout_create_url: String,
    pub payout_status_url: String,
    pub payin_status_url: String,
    pub encoding: PayoutEncoding,
    pub timeout_secs: u64,
}

impl Default for BappaVentureConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::new(),
            merchant_token: String::new(),
            payout_create_url: String::new(),
            payout_status_url: String::new(),
            payin_status_url: String::new(),
            encoding: PayoutEncoding::Plain,
            timeout_secs: 30,
        }
    }
}

impl BappaVentureConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let require = |key: &str| {
            env::var(key).map_err(|_| GatewayError::Config(format!("{key} not set")))
        };
        let encoding = match env::var("BAPPA_PAYOUT_ENCODING") {
            Ok(raw) => PayoutEncoding::parse(&raw)?,
            Err(_) => PayoutEncoding::Plain,
        };
        Ok(Self {
            merchant_id: require("BAPPA_MERCHANT_ID")?,
            merchant_token: require("BAPPA_MERCHANT_TOKEN")?,
            payout_create_url: require("BAPPA_PAYOUT_CREATE_URL")?,
            payout_status_url: require("BAPPA_PAYOUT_STATUS_URL")?,
            payin_status_url: require("BAPPA_PAYIN_STATUS_URL")?,
            encoding,
            timeout_secs: env::var("BAPPA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BappaVentureClient {
    config: BappaVentureConfig,
    http: reqwest::Client,
}

impl BappaVentureClient {
    pub fn new(config: BappaVentureConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::HttpClient(e.to_string()))?;
        Ok(Self { config, http })
    }

    fn creation_params(&self, order: &PayoutOrder, order_id: &str) -> Vec<(&'static str, String)> {
        // Amount must reach the gateway as an integral value.
        let amount = order.amount.trunc() as i64;
        vec![
            ("merchant_id", self.config.merchant_id.clone()),
            ("merchant_token", self.config.merchant_token.clone()),
            ("account_no", order.bank.account_number.clone()),
            ("ifsccode", order.bank.ifsc_code.clone()),
            ("amount", amount.to_string()),
            ("bankname", order.bank.bank_name.clone()),
            ("remark", "Payment".to_string()),
            ("orderid", order_id.to_string()),
            ("name", order.bank.beneficiary_name.clone()),
            ("contact", order.contact.phone.clone()),
            ("email", order.contact.email.clone()),
        ]
    }

    async fn dispatch_creation(&self, params: &[(&'static str, String)]) -> GatewayReply {
        let sent = match self.config.encoding {
            PayoutEncoding::Plain => {
                self.http
                    .get(&self.config.payout_create_url)
                    .query(params)
                    .send()
                    .await
            }
            PayoutEncoding::Salted => {
                let body = salt_envelope(params);
                self.http
                    .post(&self.config.payout_create_url)
                    .json(&body)
                    .send()
                    .await
            }
        };
        match sent {
            Ok(resp) => GatewayReply::from_response(resp).await,
            Err(err) => GatewayReply::from_transport(err),
        }
    }
}

/// Wraps flat creation params in the gateway's alternate POST encoding:
/// the JSON object serialized, base64 encoded, and carried under `salt`.
pub fn salt_envelope(params: &[(&'static str, String)]) -> Value {
    let mut object = serde_json::Map::new();
    for (key, value) in params {
        object.insert((*key).to_string(), Value::String(value.clone()));
    }
    let encoded = BASE64.encode(Value::Object(object).to_string());
    json!({ "salt": encoded })
}

#[async_trait]
impl PayoutGateway for BappaVentureClient {
    fn kind(&self) -> GatewayKind {
        GatewayKind::BappaVenture
    }

    async fn create_payout(&self, order: &PayoutOrder) -> PayoutCreation {
        let order_id = self.kind().tagged_order_id(&order.business_id);
        let params = self.creation_params(order, &order_id);
        debug!(order_id = %order_id, amount = order.amount, "dispatching payout creation");
        let reply = self.dispatch_creation(&params).await;
        let outcome = evaluate_creation(reply, &order_id);
        if let Some(reason) = outcome.failure_reason() {
            warn!(order_id = %order_id, reason = %reason, "payout creation not accepted");
        }
        outcome
    }

    async fn check_payout_status(&self, order_id: &str) -> GatewayReply {
        let sent = self
            .http
            .get(&self.config.payout_status_url)
            .query(&[
                ("merchantid", self.config.merchant_id.as_str()),
                ("token", self.config.merchant_token.as_str()),
                ("orderid", order_id),
                ("limit", "1"),
            ])
            .send()
            .await;
        match sent {
            Ok(resp) => GatewayReply::from_response(resp).await,
            Err(err) => GatewayReply::from_transport(err),
        }
    }

    async fn check_payin_status(&self, order_id: &str) -> GatewayReply {
        let sent = self
            .http
            .get(&self.config.payin_status_url)
            .query(&[("order_id", order_id)])
            .send()
            .await;
        match sent {
            Ok(resp) => GatewayReply::from_response(resp).await,
            Err(err) => GatewayReply::from_transport(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Acceptance Rules
// ---------------------------------------------------------------------------

const CREATE_ACCEPT_TOKENS: &[&str] = &["0", "1", "success", "pending", "processing", "true"];
const CREATE_REJECT_TOKENS: &[&str] = &["3", "failed", "false", "rejected", "error", "declined"];
const ACCEPTED_ERROR_TEXTS: &[&str] = &[
    "",
    "request accepted successfully",
    "accepted",
    "success",
    "ok",
];

#[derive(Debug, Default, Deserialize)]
struct CreateTopLevel {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    orderid: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateMsgLevel {
    #[serde(default)]
    msg: Option<CreateMsg>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateMsg {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    orderid: Option<Value>,
}

/// Decides whether a creation response means the order was accepted.
///
/// A top-level status of "400" always rejects. When `msg.status` is present
/// it is authoritative; tokens outside both the accept and reject sets are
/// rejected as unknown rather than optimistically accepted. Without `msg`,
/// only a "200" status with a blank or known-benign error text accepts. The
/// order id is taken from `msg.orderid`, then top-level `orderid`, then the
/// id this request was submitted under.
pub fn evaluate_creation(reply: GatewayReply, request_order_id: &str) -> PayoutCreation {
    let body = match reply {
        GatewayReply::Transport { kind, message } => {
            return PayoutCreation::Unreachable { kind, message }
        }
        GatewayReply::Malformed { http_status, .. } => {
            let raw = reply.to_value();
            return PayoutCreation::Rejected {
                reason: format!("unusable gateway response (http {http_status})"),
                raw,
            };
        }
        GatewayReply::Body(v) => v,
    };

    // The two levels deserialize separately so a malformed `msg` (the gateway
    // sometimes sends a bare string there) cannot mask the top-level fields.
    let top: CreateTopLevel = serde_json::from_value(body.clone()).unwrap_or_default();
    let msg = serde_json::from_value::<CreateMsgLevel>(body.clone())
        .unwrap_or_default()
        .msg;

    let status_token = top.status.as_ref().and_then(token_of);
    if status_token.as_deref() == Some("400") {
        let detail = top
            .error
            .as_ref()
            .and_then(token_of)
            .unwrap_or_else(|| "status 400".to_string());
        return PayoutCreation::Rejected {
            reason: format!("gateway rejected order: {detail}"),
            raw: body,
        };
    }

    if let Some(token) = msg.as_ref().and_then(|m| m.status.as_ref()).and_then(token_of) {
        let token = token.to_lowercase();
        if CREATE_ACCEPT_TOKENS.contains(&token.as_str()) {
            let order_id = msg
                .as_ref()
                .and_then(|m| m.orderid.as_ref())
                .and_then(token_of)
                .or_else(|| top.orderid.as_ref().and_then(token_of))
                .unwrap_or_else(|| request_order_id.to_string());
            return PayoutCreation::Accepted { order_id, raw: body };
        }
        if CREATE_REJECT_TOKENS.contains(&token.as_str()) {
            return PayoutCreation::Rejected {
                reason: format!("gateway rejected order: msg.status {token}"),
                raw: body,
            };
        }
        return PayoutCreation::Rejected {
            reason: format!("unknown msg.status {token}"),
            raw: body,
        };
    }

    let error_text = top
        .error
        .as_ref()
        .and_then(token_of)
        .unwrap_or_default()
        .to_lowercase();
    if status_token.as_deref() == Some("200")
        && ACCEPTED_ERROR_TEXTS.contains(&error_text.as_str())
    {
        let order_id = top
            .orderid
            .as_ref()
            .and_then(token_of)
            .unwrap_or_else(|| request_order_id.to_string());
        return PayoutCreation::Accepted { order_id, raw: body };
    }

    PayoutCreation::Rejected {
        reason: format!(
            "not accepted: status {}, error {:?}",
            status_token.as_deref().unwrap_or("missing"),
            error_text
        ),
        raw: body,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
