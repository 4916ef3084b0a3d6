//! Wellness payout gateway implementation
//!
//! Every call is a JSON POST carrying the merchant credentials in the body.
//! Payout correlation ids are generated locally with the `PORD_` prefix so
//! status checks can be routed back here without a lookup.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

use super::status::token_of;
use super::types::{truncate_raw, GatewayReply, PayoutCreation, PayoutOrder, TransportErrorKind};
use super::{GatewayError, GatewayKind, PayoutGateway};

/// Prefix for generated payout correlation ids.
pub const PAYOUT_ID_PREFIX: &str = "PORD_";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WellnessConfig {
    pub merchant_id: String,
    pub api_key: String,
    pub secret_key: String,
    pub payin_status_url: String,
    pub payout_status_url: String,
    pub payout_create_url: String,
    pub timeout_secs: u64,
}

impl Default for WellnessConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::new(),
            api_key: String::new(),
            secret_key: String::new(),
            payin_status_url: String::new(),
            payout_status_url: String::new(),
            payout_create_url: String::new(),
            timeout_secs: 30,
        }
    }
}

impl WellnessConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let require = |key: &str| {
            env::var(key).map_err(|_| GatewayError::Config(format!("{key} not set")))
        };
        Ok(Self {
            merchant_id: require("WELLNESS_MERCHANT_ID")?,
            api_key: require("WELLNESS_API_KEY")?,
            secret_key: require("WELLNESS_SECRET_KEY")?,
            payin_status_url: require("WELLNESS_PAYIN_STATUS_URL")?,
            payout_status_url: require("WELLNESS_PAYOUT_STATUS_URL")?,
            payout_create_url: require("WELLNESS_PAYOUT_CREATE_URL")?,
            timeout_secs: env::var("WELLNESS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct WellnessClient {
    config: WellnessConfig,
    http: reqwest::Client,
}

impl WellnessClient {
    pub fn new(config: WellnessConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::HttpClient(e.to_string()))?;
        Ok(Self { config, http })
    }

    fn credentials(&self) -> Value {
        json!({
            "merchant_id": self.config.merchant_id,
            "api_key": self.config.api_key,
            "secret_key": self.config.secret_key,
        })
    }

    /// Status-check POST. The gateway signals its own API errors with a
    /// non-200 status or a `status: false` body; both become structured error
    /// replies so they normalize to Pending instead of a terminal state.
    async fn post_status(&self, url: &str, body: Value) -> GatewayReply {
        let resp = match self.http.post(url).json(&body).send().await {
            Ok(resp) => resp,
            Err(err) => return GatewayReply::from_transport(err),
        };
        let http_status = resp.status().as_u16();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(err) => return GatewayReply::from_transport(err),
        };
        if !(200..300).contains(&(http_status as i32)) {
            return GatewayReply::Malformed {
                http_status,
                raw: truncate_raw(&text),
            };
        }
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => {
                return GatewayReply::Malformed {
                    http_status,
                    raw: truncate_raw(&text),
                }
            }
        };
        if value.get("status").and_then(Value::as_bool) == Some(false) {
            let message = value
                .get("message")
                .and_then(token_of)
                .unwrap_or_else(|| truncate_raw(&text));
            return GatewayReply::Transport {
                kind: TransportErrorKind::RequestException,
                message: format!("gateway error: {message}"),
            };
        }
        GatewayReply::Body(value)
    }

    async fn post_create(&self, body: Value) -> GatewayReply {
        let resp = match self
            .http
            .post(&self.config.payout_create_url)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => return GatewayReply::from_transport(err),
        };
        let http_status = resp.status().as_u16();
        if !(200..300).contains(&(http_status as i32)) {
            let text = resp.text().await.unwrap_or_default();
            return GatewayReply::Malformed {
                http_status,
                raw: truncate_raw(&text),
            };
        }
        GatewayReply::from_response(resp).await
    }
}

#[async_trait]
impl PayoutGateway for WellnessClient {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Wellness
    }

    async fn create_payout(&self, order: &PayoutOrder) -> PayoutCreation {
        let order_id = self.kind().tagged_order_id(&order.business_id);
        let payout_id = format!("{PAYOUT_ID_PREFIX}{}", Utc::now().timestamp_millis());
        let mut body = self.credentials();
        if let Some(map) = body.as_object_mut() {
            map.insert("order_id".to_string(), json!(order_id));
            map.insert("payout_id".to_string(), json!(payout_id));
            map.insert("amount".to_string(), json!(order.amount));
            map.insert(
                "account_number".to_string(),
                json!(order.bank.account_number),
            );
            map.insert("ifsc_code".to_string(), json!(order.bank.ifsc_code));
            map.insert("bank_name".to_string(), json!(order.bank.bank_name));
            map.insert("bene_name".to_string(), json!(order.bank.beneficiary_name));
            map.insert("email".to_string(), json!(order.contact.email));
        }
        debug!(order_id = %order_id, amount = order.amount, "dispatching payout creation");
        let reply = self.post_create(body).await;
        let outcome = evaluate_creation(reply);
        if let Some(reason) = outcome.failure_reason() {
            warn!(order_id = %order_id, reason = %reason, "payout creation not accepted");
        }
        outcome
    }

    async fn check_payout_status(&self, order_id: &str) -> GatewayReply {
        let mut body = self.credentials();
        if let Some(map) = body.as_object_mut() {
            map.insert("payout_id".to_string(), json!(order_id));
        }
        self.post_status(&self.config.payout_status_url, body).await
    }

    async fn check_payin_status(&self, order_id: &str) -> GatewayReply {
        let mut body = self.credentials();
        if let Some(map) = body.as_object_mut() {
            map.insert("order_id".to_string(), json!(order_id));
        }
        self.post_status(&self.config.payin_status_url, body).await
    }
}

// ---------------------------------------------------------------------------
// Acceptance Rules
// ---------------------------------------------------------------------------

const ACCEPTED_GATEWAY_STATUSES: &[&str] = &["Completed", "Pending"];

#[derive(Debug, Default, Deserialize)]
struct CreateTopLevel {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    payout_id: Option<Value>,
    #[serde(default)]
    order_id: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateGatewayLevel {
    #[serde(default)]
    gateway: Option<CreateGatewayBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateGatewayBlock {
    #[serde(default)]
    gateway_status: Option<Value>,
}

/// Decides whether a creation response means the order was accepted.
///
/// Any `error` field rejects outright. Otherwise `gateway.gateway_status`
/// must be exactly "Completed" or "Pending". The correlation id is
/// `payout_id` first, `order_id` second; an accepted response without either
/// is still a failure because the row cannot be marked Processing without a
/// correlation id.
pub fn evaluate_creation(reply: GatewayReply) -> PayoutCreation {
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

    let top: CreateTopLevel = serde_json::from_value(body.clone()).unwrap_or_default();
    let gateway = serde_json::from_value::<CreateGatewayLevel>(body.clone())
        .unwrap_or_default()
        .gateway;

    if let Some(error) = top.error.as_ref() {
        let detail = token_of(error).unwrap_or_else(|| "gateway error".to_string());
        return PayoutCreation::Rejected {
            reason: format!("gateway rejected order: {detail}"),
            raw: body,
        };
    }

    let gateway_status = gateway
        .as_ref()
        .and_then(|g| g.gateway_status.as_ref())
        .and_then(token_of);
    match gateway_status.as_deref() {
        Some(status) if ACCEPTED_GATEWAY_STATUSES.contains(&status) => {}
        Some(status) => {
            return PayoutCreation::Rejected {
                reason: format!("gateway_status {status} not accepted"),
                raw: body,
            }
        }
        None => {
            let detail = top
                .message
                .as_ref()
                .and_then(token_of)
                .unwrap_or_else(|| "gateway_status missing".to_string());
            return PayoutCreation::Rejected {
                reason: format!("not accepted: {detail}"),
                raw: body,
            };
        }
    }

    let order_id = top
        .payout_id
        .as_ref()
        .and_then(token_of)
        .or_else(|| top.order_id.as_ref().and_then(token_of));
    match order_id {
        Some(order_id) => PayoutCreation::Accepted { order_id, raw: body },
        None => PayoutCreation::Rejected {
            reason: "accepted without an order id".to_string(),
            raw: body,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
