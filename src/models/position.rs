use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::transaction::{IssuerId, SecurityId, ShareholderId};

/// Cache key: a holder may own different amounts as of different dates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub issuer_id: IssuerId,
    pub shareholder_id: ShareholderId,
    pub security_id: SecurityId,
    pub as_of_date: NaiveDate,
}

impl PositionKey {
    pub fn new(
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of_date: NaiveDate,
    ) -> Self {
        Self {
            issuer_id,
            shareholder_id,
            security_id: security_id.to_string(),
            as_of_date,
        }
    }
}

/// Denormalized holding as of a date. Derived from the ledger, never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub key: PositionKey,
    pub shares_owned: i64,
    /// ms since epoch
    pub updated_at: i64,
}
