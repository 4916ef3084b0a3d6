use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("console login failed: {0}")]
    Login(String),

    #[error("csv export not found")]
    NotFound,

    #[error("csv download timed out after {0} attempts")]
    Timeout(u32),

    #[error("could not write csv: {0}")]
    Io(#[from] std::io::Error),

    #[error("downloader configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Source Contract
// ---------------------------------------------------------------------------

/// Produces a local CSV file of pending withdrawal requests, or fails after
/// its internal retries. Callers treat any failure as a fatal abort of the
/// ingestion step only.
#[async_trait]
pub trait WithdrawCsvSource: Send + Sync {
    async fn download(&self) -> Result<PathBuf, DownloadError>;
}

// ---------------------------------------------------------------------------
// Admin Console Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub login_url: String,
    pub export_url: String,
    pub email: String,
    pub password: String,
    pub download_dir: PathBuf,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            export_url: String::new(),
            email: String::new(),
            password: String::new(),
            download_dir: PathBuf::from("downloads"),
            max_attempts: 3,
            retry_delay_secs: 5,
            timeout_secs: 60,
        }
    }
}

impl ConsoleConfig {
    pub fn from_env() -> Result<Self, DownloadError> {
        let require = |key: &str| {
            env::var(key).map_err(|_| DownloadError::Config(format!("{key} not set")))
        };
        let defaults = Self::default();
        Ok(Self {
            login_url: require("CONSOLE_LOGIN_URL")?,
            export_url: require("CONSOLE_EXPORT_URL")?,
            email: require("CONSOLE_EMAIL")?,
            password: require("CONSOLE_PASSWORD")?,
            download_dir: env::var("CONSOLE_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            max_attempts: env::var("CONSOLE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            retry_delay_secs: env::var("CONSOLE_RETRY_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_delay_secs),
            timeout_secs: env::var("CONSOLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    token: String,
}

pub struct ConsoleDownloader {
    config: ConsoleConfig,
    http: reqwest::Client,
}

impl ConsoleDownloader {
    pub fn new(config: ConsoleConfig) -> Result<Self, DownloadError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DownloadError::Config(e.to_string()))?;
        Ok(Self { config, http })
    }

    async fn login(&self) -> Result<String, DownloadError> {
        let resp = self
            .http
            .post(&self.config.login_url)
            .json(&json!({
                "email": self.config.email,
                "password": self.config.password,
            }))
            .send()
            .await
            .map_err(|e| DownloadError::Login(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DownloadError::Login(format!(
                "http {}",
                resp.status().as_u16()
            )));
        }
        let reply: LoginReply = resp
            .json()
            .await
            .map_err(|e| DownloadError::Login(format!("bad login response: {e}")))?;
        Ok(reply.token)
    }

    async fn fetch_export(&self, token: &str) -> Result<PathBuf, DownloadError> {
        let resp = self
            .http
            .get(&self.config.export_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DownloadError::Login(format!("export request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(DownloadError::Login(format!(
                "export returned http {}",
                resp.status().as_u16()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DownloadError::Login(format!("export body failed: {e}")))?;

        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let filename = format!("withdraw_requests_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.config.download_dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

#[async_trait]
impl WithdrawCsvSource for ConsoleDownloader {
    /// Logs into the admin console and pulls the manual-withdraw CSV export,
    /// retrying transient failures. A missing export fails immediately; other
    /// failures retry up to `max_attempts` times.
    async fn download(&self) -> Result<PathBuf, DownloadError> {
        let mut last_error = None;
        for attempt in 1..=self.config.max_attempts {
            let result = async {
                let token = self.login().await?;
                self.fetch_export(&token).await
            }
            .await;

            match result {
                Ok(path) => {
                    info!(path = %path.display(), attempt, "withdraw csv downloaded");
                    return Ok(path);
                }
                Err(DownloadError::NotFound) => return Err(DownloadError::NotFound),
                Err(err) => {
                    warn!(attempt, error = %err, "csv download attempt failed");
                    last_error = Some(err);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(Duration::from_secs(self.config.retry_delay_secs))
                            .await;
                    }
                }
            }
        }
        match last_error {
            Some(DownloadError::Io(err)) => Err(DownloadError::Io(err)),
            _ => Err(DownloadError::Timeout(self.config.max_attempts)),
        }
    }
}
