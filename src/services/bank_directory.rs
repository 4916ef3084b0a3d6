use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("bank lookup request failed: {0}")]
    Request(String),

    #[error("ifsc code {0} not found")]
    NotFound(String),

    #[error("bank lookup returned invalid JSON for {0}")]
    InvalidJson(String),

    #[error("bank lookup response for {0} is missing the bank name")]
    MissingBank(String),
}

// ---------------------------------------------------------------------------
// Directory Contract
// ---------------------------------------------------------------------------

/// Resolves an IFSC routing code to its bank name before payout creation.
#[async_trait]
pub trait BankDirectory: Send + Sync {
    async fn lookup(&self, ifsc_code: &str) -> Result<String, LookupError>;
}

// ---------------------------------------------------------------------------
// IFSC HTTP Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BankDirectoryConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BankDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ifsc.razorpay.com".to_string(),
            timeout_secs: 15,
        }
    }
}

impl BankDirectoryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("IFSC_LOOKUP_URL").unwrap_or(defaults.base_url),
            timeout_secs: env::var("IFSC_LOOKUP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IfscRecord {
    #[serde(rename = "BANK")]
    bank: Option<String>,
}

pub struct IfscClient {
    config: BankDirectoryConfig,
    http: reqwest::Client,
}

impl IfscClient {
    pub fn new(config: BankDirectoryConfig) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LookupError::Request(e.to_string()))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl BankDirectory for IfscClient {
    async fn lookup(&self, ifsc_code: &str) -> Result<String, LookupError> {
        let code = ifsc_code.trim().to_uppercase();
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), code);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(code));
        }
        if !resp.status().is_success() {
            return Err(LookupError::Request(format!(
                "http {} from bank directory",
                resp.status().as_u16()
            )));
        }

        let record: IfscRecord = resp
            .json()
            .await
            .map_err(|_| LookupError::InvalidJson(code.clone()))?;

        let bank = record
            .bank
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .ok_or(LookupError::MissingBank(code.clone()))?;

        debug!(ifsc = %code, bank = %bank, "resolved bank name");
        Ok(bank)
    }
}
