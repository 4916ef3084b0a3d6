use std::collections::VecDeque;
use std::path::Path;
use tracing::info;

use crate::gateways::types::ContactIdentity;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("contact pool file {path} is unreadable: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("contact pool file {0} is empty")]
    Empty(String),
}

// ---------------------------------------------------------------------------
// Contact Pool
// ---------------------------------------------------------------------------

/// Batch-scoped pools of phone numbers and email addresses, consumed without
/// replacement: one batch run owns one pool instance, so no contact identity
/// is shared between two payouts of the same run.
///
/// An empty or missing pool file fails loading (a setup error, before any
/// item runs); running out mid-batch is signalled per-draw.
#[derive(Debug)]
pub struct ContactPool {
    phones: VecDeque<String>,
    emails: VecDeque<String>,
}

impl ContactPool {
    /// Loads both pools from newline-delimited files.
    pub async fn load(phones_path: &Path, emails_path: &Path) -> Result<Self, PoolError> {
        let phones = read_lines(phones_path).await?;
        let emails = read_lines(emails_path).await?;
        info!(
            phones = phones.len(),
            emails = emails.len(),
            "contact pools loaded"
        );
        Ok(Self::from_lines(phones, emails))
    }

    pub fn from_lines(phones: Vec<String>, emails: Vec<String>) -> Self {
        Self {
            phones: phones.into(),
            emails: emails.into(),
        }
    }

    /// Draws one unused phone and one unused email. Nothing is consumed when
    /// either pool is already empty.
    pub fn draw(&mut self) -> Option<ContactIdentity> {
        if self.phones.is_empty() || self.emails.is_empty() {
            return None;
        }
        let phone = self.phones.pop_front()?;
        let email = self.emails.pop_front()?;
        Some(ContactIdentity { phone, email })
    }

    pub fn remaining(&self) -> (usize, usize) {
        (self.phones.len(), self.emails.len())
    }
}

async fn read_lines(path: &Path) -> Result<Vec<String>, PoolError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PoolError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;

    let lines: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        return Err(PoolError::Empty(path.display().to_string()));
    }
    Ok(lines)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
