//! Transaction entries - the immutable rows of the share ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::common_utils::get_current_timestamp_ms;
use crate::models::errors::LedgerError;

pub type IssuerId = u64;
pub type ShareholderId = u64;
/// Security-type code (CUSIP-equivalent)
pub type SecurityId = String;
pub type EntryId = Uuid;

/// Longest security id accepted, in bytes
pub const MAX_SECURITY_ID_LEN: usize = 255;

/// Closed set of share movements.
///
/// Uses strum for String conversion:
/// - `kind.as_ref()` -> "transfer_in"
/// - `TransactionKind::from_str("transfer_in")`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionKind {
    OriginalIssuance,
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    SplitDebit,
    SplitCredit,
}

impl TransactionKind {
    /// +1 for credits, -1 for debits. The only place sign is derived.
    pub fn sign(&self) -> i64 {
        match self {
            TransactionKind::OriginalIssuance
            | TransactionKind::Deposit
            | TransactionKind::TransferIn
            | TransactionKind::SplitCredit => 1,
            TransactionKind::Withdrawal
            | TransactionKind::TransferOut
            | TransactionKind::SplitDebit => -1,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.sign() < 0
    }

    /// Parse a kind at the API boundary
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        TransactionKind::from_str(s.trim())
            .map_err(|_| LedgerError::Validation(format!("unknown transaction kind: {}", s)))
    }

    /// Signed quantity for a positive magnitude
    pub fn signed(&self, magnitude: u64) -> Result<i64, LedgerError> {
        if magnitude == 0 {
            return Err(LedgerError::Validation("quantity must be greater than 0".to_string()));
        }
        let magnitude = i64::try_from(magnitude).map_err(|_| {
            LedgerError::Validation(format!("quantity {} exceeds the ledger range", magnitude))
        })?;
        Ok(magnitude * self.sign())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryStatus {
    Active,
    /// Voided; kept for history, excluded from balances
    Inactive,
}

/// One signed share movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub entry_id: EntryId,
    pub issuer_id: IssuerId,
    pub security_id: SecurityId,
    pub shareholder_id: ShareholderId,
    pub kind: TransactionKind,
    /// Credits positive, debits negative
    pub signed_quantity: i64,
    pub transaction_date: NaiveDate,
    pub status: EntryStatus,
    pub restriction_id: Option<String>,
    pub note: String,
    /// Shared by every leg of one multi-leg posting
    pub correlation_id: Option<Uuid>,
    pub actor: Option<String>,
    /// Audit only (ms)
    pub created_at: i64,
}

impl TransactionEntry {
    /// Build an Active entry, deriving the sign from the kind.
    pub fn new(
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        kind: TransactionKind,
        magnitude: u64,
        transaction_date: NaiveDate,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            entry_id: Uuid::new_v4(),
            issuer_id,
            security_id: security_id.to_string(),
            shareholder_id,
            kind,
            signed_quantity: kind.signed(magnitude)?,
            transaction_date,
            status: EntryStatus::Active,
            restriction_id: None,
            note: String::new(),
            correlation_id: None,
            actor: None,
            created_at: get_current_timestamp_ms(),
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_restriction(mut self, restriction_id: Option<String>) -> Self {
        self.restriction_id = restriction_id;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor = actor;
        self
    }

    pub fn magnitude(&self) -> u64 {
        self.signed_quantity.unsigned_abs()
    }

    pub fn is_active(&self) -> bool {
        self.status == EntryStatus::Active
    }

    /// Shape check run before any entry reaches storage
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.signed_quantity == 0 {
            return Err(LedgerError::Validation(format!(
                "entry {}: quantity must not be zero",
                self.entry_id
            )));
        }
        if self.signed_quantity.signum() != self.kind.sign() {
            return Err(LedgerError::Validation(format!(
                "entry {}: {} requires a {} quantity, got {}",
                self.entry_id,
                self.kind,
                if self.kind.is_debit() { "negative" } else { "positive" },
                self.signed_quantity
            )));
        }
        if self.security_id.trim().is_empty() {
            return Err(LedgerError::Validation(format!(
                "entry {}: security id is empty",
                self.entry_id
            )));
        }
        if self.security_id.len() > MAX_SECURITY_ID_LEN {
            return Err(LedgerError::Validation(format!(
                "entry {}: security id is longer than {} bytes",
                self.entry_id, MAX_SECURITY_ID_LEN
            )));
        }
        if self.status != EntryStatus::Active {
            return Err(LedgerError::Validation(format!(
                "entry {}: new entries must be active",
                self.entry_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_every_kind_has_one_sign() {
        let credits: Vec<_> = TransactionKind::iter().filter(|k| !k.is_debit()).collect();
        let debits: Vec<_> = TransactionKind::iter().filter(|k| k.is_debit()).collect();
        assert_eq!(credits.len(), 4);
        assert_eq!(debits.len(), 3);
        assert!(debits.contains(&TransactionKind::SplitDebit));
        assert!(credits.contains(&TransactionKind::OriginalIssuance));
    }

    #[test]
    fn test_kind_string_boundary() {
        assert_eq!(TransactionKind::Withdrawal.as_ref(), "withdrawal");
        assert_eq!(TransactionKind::parse("transfer_out").unwrap(), TransactionKind::TransferOut);
        assert!(matches!(
            TransactionKind::parse("partial withdrawal"),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_new_entry_bakes_sign() {
        let debit = TransactionEntry::new(1, 10, "UNITS", TransactionKind::Withdrawal, 150, date())
            .unwrap();
        assert_eq!(debit.signed_quantity, -150);
        assert_eq!(debit.magnitude(), 150);

        let credit =
            TransactionEntry::new(1, 10, "UNITS", TransactionKind::Deposit, 500, date()).unwrap();
        assert_eq!(credit.signed_quantity, 500);
        assert!(credit.validate().is_ok());
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let result = TransactionEntry::new(1, 10, "UNITS", TransactionKind::Deposit, 0, date());
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_sign_mismatch_rejected() {
        let mut entry =
            TransactionEntry::new(1, 10, "UNITS", TransactionKind::Deposit, 10, date()).unwrap();
        entry.signed_quantity = -10;
        let err = entry.validate().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_oversized_security_id_rejected() {
        let long_id = "S".repeat(MAX_SECURITY_ID_LEN + 1);
        let entry =
            TransactionEntry::new(1, 10, &long_id, TransactionKind::Deposit, 10, date()).unwrap();
        assert!(matches!(entry.validate(), Err(LedgerError::Validation(_))));

        let entry = TransactionEntry::new(
            1,
            10,
            &long_id[..MAX_SECURITY_ID_LEN],
            TransactionKind::Deposit,
            10,
            date(),
        )
        .unwrap();
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(EntryStatus::Inactive.as_ref(), "inactive");
        assert_eq!("active".parse::<EntryStatus>().unwrap(), EntryStatus::Active);
        let json = serde_json::to_string(&TransactionKind::SplitCredit).unwrap();
        assert_eq!(json, "\"split_credit\"");
    }
}
