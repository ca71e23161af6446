//! Balance Invariant Validator
//!
//! No committed debit may leave a holding negative, neither on its own date
//! nor on any later date that already has entries. No committed credit may
//! push a holding past the `i64` range. Checks always run against a fresh
//! replay; callers re-run them immediately before appending.

use chrono::NaiveDate;

use super::replay::PositionEngine;
use crate::models::{IssuerId, LedgerError, ShareholderId, TransactionEntry};

#[derive(Clone)]
pub struct BalanceValidator {
    engine: PositionEngine,
}

impl BalanceValidator {
    pub fn new(engine: PositionEngine) -> Self {
        Self { engine }
    }

    /// Check that debiting `magnitude` on `as_of` keeps every balance non-negative.
    ///
    /// Returns the balance on `as_of` after the debit.
    pub async fn assert_sufficient(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
        magnitude: u64,
    ) -> Result<i64, LedgerError> {
        let debit = i64::try_from(magnitude).map_err(|_| {
            LedgerError::Validation(format!("quantity {} exceeds the ledger range", magnitude))
        })?;

        let current = self
            .engine
            .balance_as_of(issuer_id, shareholder_id, security_id, as_of)
            .await?;
        if i128::from(current) < i128::from(debit) {
            return Err(LedgerError::InsufficientBalance {
                current,
                requested: magnitude,
                as_of,
            });
        }

        // Later running balances all shrink by the same debit
        let timeline = self
            .engine
            .timeline(issuer_id, shareholder_id, security_id)
            .await?;
        let lowest_later = timeline
            .into_iter()
            .filter(|(date, _)| *date > as_of)
            .min_by_key(|(_, balance)| *balance);
        if let Some((date, balance)) = lowest_later {
            if i128::from(balance) < i128::from(debit) {
                log::info!(
                    "Debit of {} on {} would overdraw {}/{}/{} on {}",
                    magnitude,
                    as_of,
                    issuer_id,
                    shareholder_id,
                    security_id,
                    date
                );
                return Err(LedgerError::InsufficientBalance {
                    current: balance,
                    requested: magnitude,
                    as_of: date,
                });
            }
        }

        Ok(current - debit)
    }

    /// Check that crediting `magnitude` on `as_of` keeps every balance from
    /// that date on within the ledger range.
    ///
    /// Returns the balance on `as_of` after the credit.
    pub async fn assert_credit_fits(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
        magnitude: u64,
    ) -> Result<i64, LedgerError> {
        let timeline = self
            .engine
            .timeline(issuer_id, shareholder_id, security_id)
            .await?;
        let current = timeline
            .iter()
            .take_while(|(date, _)| *date <= as_of)
            .last()
            .map_or(0, |(_, balance)| *balance);
        let highest = timeline
            .iter()
            .filter(|(date, _)| *date > as_of)
            .map(|(_, balance)| *balance)
            .fold(current, i64::max);

        let after = i64::try_from(i128::from(highest) + i128::from(magnitude));
        if after.is_err() {
            log::info!(
                "Credit of {} on {} would overflow {}/{}/{} (highest balance {})",
                magnitude,
                as_of,
                issuer_id,
                shareholder_id,
                security_id,
                highest
            );
            return Err(LedgerError::Validation(format!(
                "crediting {} on {} would push the balance of {} past the ledger range",
                magnitude, as_of, security_id
            )));
        }
        // highest >= current, so this cannot overflow once the check passed
        Ok(current + magnitude as i64)
    }

    /// Voiding a credit removes shares retroactively, so it is checked like a
    /// debit of the same size on the entry's date. Voiding a debit is checked
    /// like a credit.
    pub async fn assert_void_allowed(&self, entry: &TransactionEntry) -> Result<(), LedgerError> {
        if !entry.is_active() {
            return Err(LedgerError::Validation(format!(
                "entry {} is already inactive",
                entry.entry_id
            )));
        }
        let checked = if entry.kind.is_debit() {
            self.assert_credit_fits(
                entry.issuer_id,
                entry.shareholder_id,
                &entry.security_id,
                entry.transaction_date,
                entry.magnitude(),
            )
            .await
        } else {
            self.assert_sufficient(
                entry.issuer_id,
                entry.shareholder_id,
                &entry.security_id,
                entry.transaction_date,
                entry.magnitude(),
            )
            .await
        };
        checked.map(|_| ())
    }
}
