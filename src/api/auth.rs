//! Bearer-token authentication mapped through operator capability sets.
//!
//! Tokens are opaque strings configured at startup; each carries the set of
//! capabilities its holder may exercise. There are no implied grants: a
//! payout token cannot ingest unless the capability is listed.

use anyhow::{anyhow, Result};
use axum::http::{header, HeaderMap};
use std::collections::{HashMap, HashSet};

use crate::api::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    View,
    Ingest,
    Payout,
    Status,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Ingest => "ingest",
            Capability::Payout => "payout",
            Capability::Status => "status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "view" => Some(Capability::View),
            "ingest" => Some(Capability::Ingest),
            "payout" => Some(Capability::Payout),
            "status" => Some(Capability::Status),
            _ => None,
        }
    }
}

/// Read-only token-to-capability map, parsed once at startup from
/// `token:cap1|cap2;token2:cap…`.
pub struct OperatorDirectory {
    tokens: HashMap<String, HashSet<Capability>>,
}

impl OperatorDirectory {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut tokens: HashMap<String, HashSet<Capability>> = HashMap::new();

        for entry in spec.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (token, caps) = entry
                .split_once(':')
                .ok_or_else(|| anyhow!("operator entry {entry:?} is missing ':'"))?;
            let token = token.trim();
            if token.is_empty() {
                return Err(anyhow!("operator entry {entry:?} has an empty token"));
            }

            let mut set = HashSet::new();
            for cap in caps.split('|') {
                let parsed = Capability::parse(cap)
                    .ok_or_else(|| anyhow!("unknown capability {:?} for token entry", cap.trim()))?;
                set.insert(parsed);
            }
            if set.is_empty() {
                return Err(anyhow!("operator entry {entry:?} grants no capabilities"));
            }
            if tokens.insert(token.to_string(), set).is_some() {
                return Err(anyhow!("duplicate operator token in OPERATOR_TOKENS"));
            }
        }

        if tokens.is_empty() {
            return Err(anyhow!("OPERATOR_TOKENS defines no operators"));
        }
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Checks the bearer token against the required capability. Unknown
    /// tokens are indistinguishable from absent ones to the caller side
    /// except for the message; both map to 401.
    pub fn authorize(&self, headers: &HeaderMap, needed: Capability) -> Result<(), ApiError> {
        let token = bearer_token(headers).ok_or(ApiError::MissingToken)?;
        let caps = self.tokens.get(token).ok_or(ApiError::UnknownToken)?;
        if caps.contains(&needed) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(needed.as_str()))
        }
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
