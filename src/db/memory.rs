//! In-process stores
//!
//! Used as the default backend and by tests. Both stores can be told to fail
//! so the posting paths can be exercised against a misbehaving store.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::db::traits::{LedgerDb, SnapshotDb};
use crate::models::{
    EntryId, EntryStatus, IssuerId, PositionKey, PositionSnapshot, ShareholderId,
    TransactionEntry,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory ledger
pub struct MemoryLedgerDb {
    entries: Mutex<Vec<TransactionEntry>>,
    /// Batches touching one of these securities are rejected whole
    rejected_securities: Mutex<HashSet<String>>,
    unavailable: Mutex<bool>,
}

impl Default for MemoryLedgerDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerDb {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            rejected_securities: Mutex::new(HashSet::new()),
            unavailable: Mutex::new(false),
        }
    }

    /// Reject any batch that contains an entry for `security_id`
    pub fn reject_security(&self, security_id: &str) {
        lock(&self.rejected_securities).insert(security_id.to_string());
    }

    /// Fail every call until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    pub fn clear_failures(&self) {
        lock(&self.rejected_securities).clear();
        self.set_unavailable(false);
    }

    /// Number of stored rows, any status
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if *lock(&self.unavailable) {
            bail!("memory ledger marked unavailable");
        }
        Ok(())
    }

    fn holding(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Vec<TransactionEntry> {
        let mut rows: Vec<TransactionEntry> = lock(&self.entries)
            .iter()
            .filter(|e| {
                e.issuer_id == issuer_id
                    && e.shareholder_id == shareholder_id
                    && e.security_id == security_id
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.transaction_date);
        rows
    }
}

#[async_trait]
impl LedgerDb for MemoryLedgerDb {
    async fn insert_batch(&self, entries: &[TransactionEntry]) -> Result<()> {
        self.check_available()?;
        {
            let rejected = lock(&self.rejected_securities);
            if let Some(entry) = entries.iter().find(|e| rejected.contains(&e.security_id)) {
                bail!("batch rejected: writes to {} are refused", entry.security_id);
            }
        }

        let mut stored = lock(&self.entries);
        for entry in entries {
            if stored.iter().any(|e| e.entry_id == entry.entry_id) {
                bail!("batch rejected: duplicate entry id {}", entry.entry_id);
            }
        }
        stored.extend(entries.iter().cloned());
        Ok(())
    }

    async fn query_active(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<TransactionEntry>> {
        self.check_available()?;
        Ok(self
            .holding(issuer_id, shareholder_id, security_id)
            .into_iter()
            .filter(|e| e.is_active() && e.transaction_date <= as_of)
            .collect())
    }

    async fn history(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<TransactionEntry>> {
        self.check_available()?;
        Ok(self.holding(issuer_id, shareholder_id, security_id))
    }

    async fn get(&self, entry_id: EntryId) -> Result<Option<TransactionEntry>> {
        self.check_available()?;
        Ok(lock(&self.entries).iter().find(|e| e.entry_id == entry_id).cloned())
    }

    async fn update_status_if(
        &self,
        entry_id: EntryId,
        expected: EntryStatus,
        new_status: EntryStatus,
    ) -> Result<bool> {
        self.check_available()?;
        let mut stored = lock(&self.entries);
        match stored.iter_mut().find(|e| e.entry_id == entry_id) {
            Some(entry) if entry.status == expected => {
                entry.status = new_status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// In-memory snapshot cache rows
pub struct MemorySnapshotDb {
    rows: Mutex<BTreeMap<PositionKey, PositionSnapshot>>,
    /// Upserts for these securities fail
    failing_securities: Mutex<HashSet<String>>,
}

impl Default for MemorySnapshotDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshotDb {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            failing_securities: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_upserts_for(&self, security_id: &str) {
        lock(&self.failing_securities).insert(security_id.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.failing_securities).clear();
    }

    /// Overwrite a row directly, bypassing replay (simulates a stale cache)
    pub fn force(&self, snapshot: PositionSnapshot) {
        lock(&self.rows).insert(snapshot.key.clone(), snapshot);
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotDb for MemorySnapshotDb {
    async fn upsert(&self, snapshot: &PositionSnapshot) -> Result<()> {
        if lock(&self.failing_securities).contains(&snapshot.key.security_id) {
            bail!("snapshot write refused for {}", snapshot.key.security_id);
        }
        lock(&self.rows).insert(snapshot.key.clone(), snapshot.clone());
        Ok(())
    }

    async fn get(&self, key: &PositionKey) -> Result<Option<PositionSnapshot>> {
        Ok(lock(&self.rows).get(key).cloned())
    }

    async fn list(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<PositionSnapshot>> {
        // BTreeMap order puts as_of_date last in the key, so rows come out date ascending
        Ok(lock(&self.rows)
            .values()
            .filter(|s| {
                s.key.issuer_id == issuer_id
                    && s.key.shareholder_id == shareholder_id
                    && s.key.security_id == security_id
            })
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(security: &str, kind: TransactionKind, qty: u64, on: NaiveDate) -> TransactionEntry {
        TransactionEntry::new(1, 10, security, kind, qty, on).unwrap()
    }

    #[tokio::test]
    async fn test_query_is_inclusive_and_sorted() {
        let db = MemoryLedgerDb::new();
        let late = entry("S", TransactionKind::Withdrawal, 40, date(2024, 6, 1));
        let early = entry("S", TransactionKind::Deposit, 100, date(2024, 1, 1));
        db.insert_batch(&[late.clone(), early.clone()]).await.unwrap();

        let rows = db.query_active(1, 10, "S", date(2024, 6, 1)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entry_id, early.entry_id);

        let rows = db.query_active(1, 10, "S", date(2024, 5, 31)).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_batch_writes_nothing() {
        let db = MemoryLedgerDb::new();
        db.reject_security("WARRANT");
        let batch = vec![
            entry("UNITS", TransactionKind::SplitDebit, 10, date(2024, 1, 1)),
            entry("WARRANT", TransactionKind::SplitCredit, 5, date(2024, 1, 1)),
        ];
        assert!(db.insert_batch(&batch).await.is_err());
        assert!(db.is_empty());
    }

    #[tokio::test]
    async fn test_update_status_if() {
        let db = MemoryLedgerDb::new();
        let e = entry("S", TransactionKind::Deposit, 5, date(2024, 1, 1));
        db.insert_batch(&[e.clone()]).await.unwrap();

        assert!(db
            .update_status_if(e.entry_id, EntryStatus::Active, EntryStatus::Inactive)
            .await
            .unwrap());
        assert!(!db
            .update_status_if(e.entry_id, EntryStatus::Active, EntryStatus::Inactive)
            .await
            .unwrap());
        assert!(db.query_active(1, 10, "S", date(2030, 1, 1)).await.unwrap().is_empty());
        assert_eq!(db.history(1, 10, "S").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_list_by_pair() {
        let db = MemorySnapshotDb::new();
        for (day, shares) in [(3, 30), (1, 10), (2, 20)] {
            db.upsert(&PositionSnapshot {
                key: PositionKey::new(1, 10, "S", date(2024, 1, day)),
                shares_owned: shares,
                updated_at: 0,
            })
            .await
            .unwrap();
        }
        db.upsert(&PositionSnapshot {
            key: PositionKey::new(1, 11, "S", date(2024, 1, 1)),
            shares_owned: 99,
            updated_at: 0,
        })
        .await
        .unwrap();

        let rows = db.list(1, 10, "S").await.unwrap();
        let shares: Vec<i64> = rows.iter().map(|r| r.shares_owned).collect();
        assert_eq!(shares, vec![10, 20, 30]);
    }
}
