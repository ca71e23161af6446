//! Transaction Ledger Store
//!
//! Append-only front of a [`LedgerDb`] backend. Every entry is shape-checked
//! here before it reaches storage; rows are never deleted, only voided.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::db::LedgerDb;
use crate::models::{
    EntryId, EntryStatus, IssuerId, LedgerError, ShareholderId, TransactionEntry,
};

#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<dyn LedgerDb>,
}

impl LedgerStore {
    pub fn new(db: Arc<dyn LedgerDb>) -> Self {
        Self { db }
    }

    pub fn backend_name(&self) -> &str {
        self.db.name()
    }

    pub async fn append(&self, entry: TransactionEntry) -> Result<EntryId, LedgerError> {
        let ids = self.append_batch(vec![entry]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| LedgerError::PostingFailure("empty append result".to_string()))
    }

    /// Validate every entry, then write them in one atomic batch
    pub async fn append_batch(
        &self,
        entries: Vec<TransactionEntry>,
    ) -> Result<Vec<EntryId>, LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::Validation("batch has no entries".to_string()));
        }
        for entry in &entries {
            entry.validate()?;
        }

        self.db.insert_batch(&entries).await.map_err(LedgerError::posting)?;

        log::debug!(
            "Appended {} entries to {} ledger",
            entries.len(),
            self.db.name()
        );
        Ok(entries.iter().map(|e| e.entry_id).collect())
    }

    /// Active entries of one holding dated on or before `as_of`, oldest first
    pub async fn query(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<TransactionEntry>, LedgerError> {
        self.db
            .query_active(issuer_id, shareholder_id, security_id, as_of)
            .await
            .map_err(LedgerError::store)
    }

    pub async fn history(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<TransactionEntry>, LedgerError> {
        self.db
            .history(issuer_id, shareholder_id, security_id)
            .await
            .map_err(LedgerError::store)
    }

    pub async fn get(&self, entry_id: EntryId) -> Result<Option<TransactionEntry>, LedgerError> {
        self.db.get(entry_id).await.map_err(LedgerError::store)
    }

    /// Flip an Active entry to Inactive. Returns the voided row.
    pub async fn void(&self, entry_id: EntryId) -> Result<TransactionEntry, LedgerError> {
        let mut entry = self
            .get(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;

        if !entry.is_active() {
            return Err(LedgerError::Validation(format!(
                "entry {} is already inactive",
                entry_id
            )));
        }

        let applied = self
            .db
            .update_status_if(entry_id, EntryStatus::Active, EntryStatus::Inactive)
            .await
            .map_err(LedgerError::posting)?;
        if !applied {
            // Lost a race with another void
            return Err(LedgerError::Validation(format!(
                "entry {} is already inactive",
                entry_id
            )));
        }

        log::info!("Voided entry {} ({} {})", entry_id, entry.kind, entry.signed_quantity);
        entry.status = EntryStatus::Inactive;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLedgerDb;
    use crate::models::TransactionKind;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> (LedgerStore, Arc<MemoryLedgerDb>) {
        let db = Arc::new(MemoryLedgerDb::new());
        (LedgerStore::new(db.clone()), db)
    }

    fn entry(kind: TransactionKind, qty: u64, on: NaiveDate) -> TransactionEntry {
        TransactionEntry::new(1, 10, "UNITS", kind, qty, on).unwrap()
    }

    #[tokio::test]
    async fn test_append_and_query_bounds() {
        let (store, _) = store();
        store.append(entry(TransactionKind::Deposit, 100, date(2024, 1, 1))).await.unwrap();
        store.append(entry(TransactionKind::Withdrawal, 40, date(2024, 6, 1))).await.unwrap();

        let rows = store.query(1, 10, "UNITS", date(2024, 6, 1)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transaction_date, date(2024, 1, 1));

        let rows = store.query(1, 10, "UNITS", date(2024, 5, 31)).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_entry_blocks_whole_batch() {
        let (store, db) = store();
        let good = entry(TransactionKind::Deposit, 10, date(2024, 1, 1));
        let mut bad = entry(TransactionKind::Deposit, 10, date(2024, 1, 1));
        bad.signed_quantity = -10;

        let err = store.append_batch(vec![good, bad]).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(db.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_posting_failure() {
        let (store, db) = store();
        db.reject_security("UNITS");
        let err = store
            .append(entry(TransactionKind::Deposit, 10, date(2024, 1, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PostingFailure(_)));
        assert!(err.is_retryable());

        db.clear_failures();
        db.set_unavailable(true);
        let err = store.query(1, 10, "UNITS", date(2024, 1, 1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_void_transitions_once() {
        let (store, db) = store();
        let id = store
            .append(entry(TransactionKind::Deposit, 10, date(2024, 1, 1)))
            .await
            .unwrap();

        let voided = store.void(id).await.unwrap();
        assert_eq!(voided.status, EntryStatus::Inactive);
        assert!(store.query(1, 10, "UNITS", date(2024, 1, 1)).await.unwrap().is_empty());
        assert_eq!(db.len(), 1);
        assert_eq!(store.history(1, 10, "UNITS").await.unwrap().len(), 1);

        let err = store.void(id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let unknown = Uuid::new_v4();
        assert_eq!(store.void(unknown).await.unwrap_err(), LedgerError::EntryNotFound(unknown));
    }
}
