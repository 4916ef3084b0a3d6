//! Payment gateway integration module
//!
//! Unifies the payout gateways behind one trait and routes order ids back
//! to the gateway that issued them, so callers never inspect id prefixes
//! themselves.

pub mod bappa_venture;
pub mod status;
pub mod types;
pub mod wellness;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use status::GatewayStatus;
use types::{GatewayReply, PayoutCreation, PayoutOrder};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway {0} is not configured")]
    NotConfigured(&'static str),

    #[error("unknown payment method {0:?}")]
    UnknownMethod(String),

    #[error("gateway configuration error: {0}")]
    Config(String),

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

// ---------------------------------------------------------------------------
// Gateway Kind + Order-Id Classification
// ---------------------------------------------------------------------------

/// Wellness order ids carry this marker.
pub const WELLNESS_ORDER_MARKER: &str = "WLN-";
/// Wellness payout correlation ids begin with this.
pub const WELLNESS_PAYOUT_MARKER: &str = "PORD";
/// BappaVenture payout order ids are tagged with this.
pub const BAPPA_ORDER_TAG: &str = "IND-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayKind {
    BappaVenture,
    Wellness,
}

impl GatewayKind {
    /// The label stored in `payment_method` and shown to operators.
    pub fn label(&self) -> &'static str {
        match self {
            GatewayKind::BappaVenture => "BappaVenture",
            GatewayKind::Wellness => "Wellness",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "bappaventure" => Some(GatewayKind::BappaVenture),
            "wellness" => Some(GatewayKind::Wellness),
            _ => None,
        }
    }

    /// Prefixes the business id with this gateway's tag unless already
    /// present, producing the order id submitted on creation.
    pub fn tagged_order_id(&self, business_id: &str) -> String {
        let tag = match self {
            GatewayKind::BappaVenture => BAPPA_ORDER_TAG,
            GatewayKind::Wellness => WELLNESS_ORDER_MARKER,
        };
        if business_id.starts_with(tag) {
            business_id.to_string()
        } else {
            format!("{tag}{business_id}")
        }
    }

    pub fn normalize_payout(&self, reply: &GatewayReply) -> GatewayStatus {
        match reply.body() {
            Some(body) => match self {
                GatewayKind::BappaVenture => status::bappa_payout_status(body),
                GatewayKind::Wellness => status::wellness_status(body),
            },
            None => GatewayStatus::Pending,
        }
    }

    pub fn normalize_payin(&self, reply: &GatewayReply) -> GatewayStatus {
        match reply.body() {
            Some(body) => match self {
                GatewayKind::BappaVenture => status::bappa_payin_status(body),
                GatewayKind::Wellness => status::wellness_status(body),
            },
            None => GatewayStatus::Pending,
        }
    }
}

/// Classifies a pay-in order id by its marker prefix.
pub fn classify_payin_id(order_id: &str) -> GatewayKind {
    if order_id.starts_with(WELLNESS_ORDER_MARKER) {
        GatewayKind::Wellness
    } else {
        GatewayKind::BappaVenture
    }
}

/// Classifies a payout order id. Payout checks recognize the generated
/// payout-id prefix in addition to the order marker.
pub fn classify_payout_id(order_id: &str) -> GatewayKind {
    if order_id.starts_with(WELLNESS_ORDER_MARKER) || order_id.starts_with(WELLNESS_PAYOUT_MARKER)
    {
        GatewayKind::Wellness
    } else {
        GatewayKind::BappaVenture
    }
}

// ---------------------------------------------------------------------------
// Gateway Trait + Router
// ---------------------------------------------------------------------------

/// One concrete payment gateway. Status checks always resolve to a
/// `GatewayReply`; creation resolves to a `PayoutCreation` after the
/// gateway's own acceptance rules run.
#[async_trait]
pub trait PayoutGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn create_payout(&self, order: &PayoutOrder) -> PayoutCreation;

    async fn check_payout_status(&self, order_id: &str) -> GatewayReply;

    async fn check_payin_status(&self, order_id: &str) -> GatewayReply;
}

/// Uniform call surface over the registered gateways, dispatching status
/// checks by order-id classification and creation by explicit target.
pub struct GatewayRouter {
    gateways: HashMap<GatewayKind, Arc<dyn PayoutGateway>>,
}

impl GatewayRouter {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    pub fn register(&mut self, gateway: Arc<dyn PayoutGateway>) {
        self.gateways.insert(gateway.kind(), gateway);
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn PayoutGateway>, GatewayError> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or(GatewayError::NotConfigured(kind.label()))
    }

    /// Resolves a stored `payment_method` label to its gateway.
    pub fn for_label(&self, label: &str) -> Result<Arc<dyn PayoutGateway>, GatewayError> {
        let kind = GatewayKind::from_label(label)
            .ok_or_else(|| GatewayError::UnknownMethod(label.to_string()))?;
        self.get(kind)
    }

    pub async fn check_payin_status(
        &self,
        order_id: &str,
    ) -> Result<(GatewayKind, GatewayReply), GatewayError> {
        let kind = classify_payin_id(order_id);
        let gateway = self.get(kind)?;
        Ok((kind, gateway.check_payin_status(order_id).await))
    }

    pub async fn check_payout_status(
        &self,
        order_id: &str,
    ) -> Result<(GatewayKind, GatewayReply), GatewayError> {
        let kind = classify_payout_id(order_id);
        let gateway = self.get(kind)?;
        Ok((kind, gateway.check_payout_status(order_id).await))
    }
}

impl Default for GatewayRouter {
    fn default() -> Self {
        Self::new()
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
    fn test_payin_classification() {
        assert_eq!(classify_payin_id("WLN-WD-34498"), GatewayKind::Wellness);
        assert_eq!(classify_payin_id("IND-4481"), GatewayKind::BappaVenture);
        assert_eq!(classify_payin_id("4481"), GatewayKind::BappaVenture);
        // The payout-id prefix does not route pay-in checks.
        assert_eq!(classify_payin_id("PORD_177"), GatewayKind::BappaVenture);
    }

    #[test]
    fn test_payout_classification() {
        assert_eq!(classify_payout_id("WLN-WD-34498"), GatewayKind::Wellness);
        assert_eq!(classify_payout_id("PORD_1771505679478"), GatewayKind::Wellness);
        assert_eq!(classify_payout_id("IND-4481"), GatewayKind::BappaVenture);
        assert_eq!(classify_payout_id("4481"), GatewayKind::BappaVenture);
    }

    #[test]
    fn test_order_id_tagging_is_idempotent() {
        assert_eq!(
            GatewayKind::BappaVenture.tagged_order_id("4481"),
            "IND-4481"
        );
        assert_eq!(
            GatewayKind::BappaVenture.tagged_order_id("IND-4481"),
            "IND-4481"
        );
        assert_eq!(GatewayKind::Wellness.tagged_order_id("WD-1"), "WLN-WD-1");
        assert_eq!(GatewayKind::Wellness.tagged_order_id("WLN-WD-1"), "WLN-WD-1");
    }

    #[test]
    fn test_labels_round_trip() {
        for kind in [GatewayKind::BappaVenture, GatewayKind::Wellness] {
            assert_eq!(GatewayKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(GatewayKind::from_label("wellness"), Some(GatewayKind::Wellness));
        assert_eq!(GatewayKind::from_label(""), None);
        assert_eq!(GatewayKind::from_label("paytm"), None);
    }

    #[test]
    fn test_normalization_of_error_replies_is_pending() {
        let transport = GatewayReply::Transport {
            kind: types::TransportErrorKind::Timeout,
            message: "deadline elapsed".to_string(),
        };
        let malformed = GatewayReply::Malformed {
            http_status: 502,
            raw: "<html>".to_string(),
        };
        for kind in [GatewayKind::BappaVenture, GatewayKind::Wellness] {
            assert_eq!(kind.normalize_payout(&transport), GatewayStatus::Pending);
            assert_eq!(kind.normalize_payout(&malformed), GatewayStatus::Pending);
            assert_eq!(kind.normalize_payin(&transport), GatewayStatus::Pending);
        }
    }

    #[test]
    fn test_per_kind_normalization_probes() {
        let bappa_body = GatewayReply::Body(json!({"msg": {"status": "1"}}));
        assert_eq!(
            GatewayKind::BappaVenture.normalize_payout(&bappa_body),
            GatewayStatus::Success
        );

        let wellness_body = GatewayReply::Body(json!({"data": {"status": "rejected"}}));
        assert_eq!(
            GatewayKind::Wellness.normalize_payout(&wellness_body),
            GatewayStatus::Failed
        );
    }

    #[test]
    fn test_router_reports_unregistered_gateway() {
        let router = GatewayRouter::new();
        assert!(matches!(
            router.get(GatewayKind::Wellness),
            Err(GatewayError::NotConfigured("Wellness"))
        ));
        assert!(matches!(
            router.for_label("BappaVenture"),
            Err(GatewayError::NotConfigured("BappaVenture"))
        ));
        assert!(matches!(
            router.for_label("upi"),
            Err(GatewayError::UnknownMethod(_))
        ));
    }
}
