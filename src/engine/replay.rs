//! Position Reconstruction Engine
//!
//! A holding is never stored authoritatively anywhere: it is the signed sum of
//! the Active entries dated on or before the requested date. Every call
//! replays the ledger in full.

use chrono::NaiveDate;

use crate::ledger_store::LedgerStore;
use crate::models::{IssuerId, LedgerError, ShareholderId, TransactionEntry};

fn to_balance(total: i128) -> Result<i64, LedgerError> {
    i64::try_from(total).map_err(|_| {
        LedgerError::Validation(format!("balance {} exceeds the ledger range", total))
    })
}

/// Signed sum of the Active entries. Order does not matter.
///
/// Summed wide so no ordering of entries can overflow midway; only a total
/// outside the `i64` range is an error.
pub fn replay(entries: &[TransactionEntry]) -> Result<i64, LedgerError> {
    let total: i128 = entries
        .iter()
        .filter(|e| e.is_active())
        .map(|e| i128::from(e.signed_quantity))
        .sum();
    to_balance(total)
}

/// Running balance after each distinct transaction date, date ascending.
pub fn running_balances(
    entries: &[TransactionEntry],
) -> Result<Vec<(NaiveDate, i64)>, LedgerError> {
    let mut active: Vec<&TransactionEntry> = entries.iter().filter(|e| e.is_active()).collect();
    active.sort_by_key(|e| e.transaction_date);

    let mut points: Vec<(NaiveDate, i128)> = Vec::new();
    let mut balance = 0i128;
    for entry in active {
        balance += i128::from(entry.signed_quantity);
        match points.last_mut() {
            Some((date, running)) if *date == entry.transaction_date => *running = balance,
            _ => points.push((entry.transaction_date, balance)),
        }
    }
    points
        .into_iter()
        .map(|(date, running)| Ok((date, to_balance(running)?)))
        .collect()
}

#[derive(Clone)]
pub struct PositionEngine {
    ledger: LedgerStore,
}

impl PositionEngine {
    pub fn new(ledger: LedgerStore) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    /// Shares held at the end of `as_of` (inclusive). 0 when nothing was ever posted.
    pub async fn balance_as_of(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
    ) -> Result<i64, LedgerError> {
        let entries = self
            .ledger
            .query(issuer_id, shareholder_id, security_id, as_of)
            .await?;
        let balance = replay(&entries)?;
        log::debug!(
            "Replayed {} entries for {}/{}/{} as of {}: {}",
            entries.len(),
            issuer_id,
            shareholder_id,
            security_id,
            as_of,
            balance
        );
        Ok(balance)
    }

    pub async fn timeline(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<(NaiveDate, i64)>, LedgerError> {
        let entries = self.ledger.history(issuer_id, shareholder_id, security_id).await?;
        running_balances(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLedgerDb;
    use crate::models::{EntryStatus, TransactionKind};
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(kind: TransactionKind, qty: u64, on: NaiveDate) -> TransactionEntry {
        TransactionEntry::new(1, 10, "UNITS", kind, qty, on).unwrap()
    }

    #[test]
    fn test_replay_ignores_inactive() {
        let mut voided = entry(TransactionKind::Deposit, 1000, date(2024, 1, 2));
        voided.status = EntryStatus::Inactive;
        let entries = vec![
            entry(TransactionKind::OriginalIssuance, 100, date(2024, 1, 1)),
            voided,
            entry(TransactionKind::TransferOut, 30, date(2024, 1, 3)),
        ];
        assert_eq!(replay(&entries).unwrap(), 70);
        assert_eq!(replay(&[]).unwrap(), 0);
    }

    #[test]
    fn test_running_balances_merge_same_date() {
        let entries = vec![
            entry(TransactionKind::Withdrawal, 40, date(2024, 6, 1)),
            entry(TransactionKind::Deposit, 100, date(2024, 1, 1)),
            entry(TransactionKind::Deposit, 5, date(2024, 6, 1)),
        ];
        assert_eq!(
            running_balances(&entries).unwrap(),
            vec![(date(2024, 1, 1), 100), (date(2024, 6, 1), 65)]
        );
    }

    #[test]
    fn test_out_of_range_total_is_an_error() {
        let half = (i64::MAX / 2 + 1) as u64;
        let entries = vec![
            entry(TransactionKind::Deposit, half, date(2024, 1, 1)),
            entry(TransactionKind::Deposit, half, date(2024, 1, 2)),
        ];
        assert!(matches!(replay(&entries), Err(LedgerError::Validation(_))));
        assert!(matches!(running_balances(&entries), Err(LedgerError::Validation(_))));

        // Order never matters while the total fits
        let entries = vec![
            entry(TransactionKind::Deposit, half, date(2024, 1, 1)),
            entry(TransactionKind::Deposit, half, date(2024, 1, 1)),
            entry(TransactionKind::Withdrawal, half, date(2024, 1, 1)),
        ];
        assert_eq!(replay(&entries).unwrap(), half as i64);
    }

    #[tokio::test]
    async fn test_point_in_time() {
        let ledger = LedgerStore::new(Arc::new(MemoryLedgerDb::new()));
        ledger.append(entry(TransactionKind::Deposit, 100, date(2024, 1, 1))).await.unwrap();
        ledger.append(entry(TransactionKind::Withdrawal, 40, date(2024, 6, 1))).await.unwrap();

        let engine = PositionEngine::new(ledger);
        assert_eq!(engine.balance_as_of(1, 10, "UNITS", date(2023, 12, 31)).await.unwrap(), 0);
        assert_eq!(engine.balance_as_of(1, 10, "UNITS", date(2024, 3, 1)).await.unwrap(), 100);
        assert_eq!(engine.balance_as_of(1, 10, "UNITS", date(2024, 6, 1)).await.unwrap(), 60);
        assert_eq!(engine.balance_as_of(1, 10, "UNITS", date(2024, 12, 1)).await.unwrap(), 60);
        assert_eq!(engine.balance_as_of(1, 11, "UNITS", date(2024, 12, 1)).await.unwrap(), 0);
    }
}
