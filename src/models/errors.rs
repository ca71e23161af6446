// Error types for ledger postings
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::transaction::{EntryId, IssuerId, ShareholderId, TransactionKind};

/// Which of the securities a posting needed could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SecurityRole {
    /// Security named directly by a single posting
    Posting,
    /// Security being converted by a split
    Base,
    /// First derivative of a split
    ClassA,
    /// Right or Warrant leg of a split
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance as of {as_of}: have {current}, requested {requested}")]
    InsufficientBalance { current: i64, requested: u64, as_of: NaiveDate },

    #[error("Security not found ({role}): {search}")]
    SecurityNotFound { role: SecurityRole, search: String },

    #[error("No split configuration for issuer {issuer} and trigger {kind}")]
    ConfigurationMissing { issuer: IssuerId, kind: TransactionKind },

    #[error("Shareholder {shareholder} not found for issuer {issuer}")]
    ShareholderNotFound { issuer: IssuerId, shareholder: ShareholderId },

    #[error("Entry {0} not found")]
    EntryNotFound(EntryId),

    #[error("Posting failed: {0}")]
    PostingFailure(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

// Error code mapping for API responses
impl LedgerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::SecurityNotFound { .. } => "SECURITY_NOT_FOUND",
            Self::ConfigurationMissing { .. } => "CONFIGURATION_MISSING",
            Self::ShareholderNotFound { .. } => "SHAREHOLDER_NOT_FOUND",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::PostingFailure(_) => "POSTING_FAILURE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PostingFailure(_) | Self::StoreUnavailable(_))
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InsufficientBalance { .. }
                | Self::SecurityNotFound { .. }
                | Self::ShareholderNotFound { .. }
                | Self::EntryNotFound(_)
        )
    }

    /// Storage failure while writing
    pub fn posting(err: anyhow::Error) -> Self {
        Self::PostingFailure(format!("{:#}", err))
    }

    /// Storage failure while reading
    pub fn store(err: anyhow::Error) -> Self {
        Self::StoreUnavailable(format!("{:#}", err))
    }
}

/// Snapshot refresh that failed after the ledger already committed.
///
/// Never returned as an `Err`: the posting stands and a later refresh or
/// read-side replay heals the cache.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cache refresh failed for shareholder {shareholder_id} / {security_id}: {reason}")]
pub struct CacheRefreshFailure {
    pub shareholder_id: ShareholderId,
    pub security_id: String,
    pub reason: String,
}
