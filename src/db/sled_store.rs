//! Embedded durable stores backed by sled
//!
//! Ledger tree layout:
//! - `e | issuer | shareholder | security | date | entry_id` -> entry (JSON)
//! - `i | entry_id` -> row key of the entry
//!
//! Dates are encoded order-preserving so a prefix scan returns a holding in
//! date order and can stop at the as-of date.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sled::{Batch, Db, IVec, Tree};

use crate::common_utils::{date_from_sort_key, date_sort_key};
use crate::db::traits::{LedgerDb, SnapshotDb};
use crate::models::{
    EntryId, EntryStatus, IssuerId, PositionKey, PositionSnapshot, ShareholderId,
    TransactionEntry,
};

const ENTRY_PREFIX: u8 = b'e';
const INDEX_PREFIX: u8 = b'i';
const POSITION_PREFIX: u8 = b'p';

const LEDGER_TREE: &str = "ledger";
const POSITIONS_TREE: &str = "positions";

/// `issuer | shareholder | len(security) | security`
fn holding_prefix(
    tag: u8,
    issuer_id: IssuerId,
    shareholder_id: ShareholderId,
    security_id: &str,
) -> Result<Vec<u8>> {
    let len = u16::try_from(security_id.len())
        .with_context(|| format!("Security id of {} bytes is too long", security_id.len()))?;
    let mut key = Vec::with_capacity(1 + 8 + 8 + 2 + security_id.len() + 4 + 16);
    key.push(tag);
    key.extend_from_slice(&issuer_id.to_be_bytes());
    key.extend_from_slice(&shareholder_id.to_be_bytes());
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(security_id.as_bytes());
    Ok(key)
}

fn entry_key(entry: &TransactionEntry) -> Result<Vec<u8>> {
    let mut key =
        holding_prefix(ENTRY_PREFIX, entry.issuer_id, entry.shareholder_id, &entry.security_id)?;
    key.extend_from_slice(&date_sort_key(entry.transaction_date));
    key.extend_from_slice(entry.entry_id.as_bytes());
    Ok(key)
}

fn index_key(entry_id: EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(INDEX_PREFIX);
    key.extend_from_slice(entry_id.as_bytes());
    key
}

fn position_key(key: &PositionKey) -> Result<Vec<u8>> {
    let mut bytes =
        holding_prefix(POSITION_PREFIX, key.issuer_id, key.shareholder_id, &key.security_id)?;
    bytes.extend_from_slice(&date_sort_key(key.as_of_date));
    Ok(bytes)
}

/// Date stored right after the holding prefix
fn date_at(key: &[u8], offset: usize) -> Option<NaiveDate> {
    let bytes: [u8; 4] = key.get(offset..offset + 4)?.try_into().ok()?;
    date_from_sort_key(bytes)
}

fn decode_entry(bytes: &IVec) -> Result<TransactionEntry> {
    serde_json::from_slice(bytes).context("Failed to decode ledger entry")
}

/// Open (or create) a sled database
pub fn open_db(path: &str) -> Result<Db> {
    sled::open(path).with_context(|| format!("Failed to open sled database at {}", path))
}

/// Throwaway database removed on drop
pub fn temporary_db() -> Result<Db> {
    sled::Config::new()
        .temporary(true)
        .open()
        .context("Failed to open temporary sled database")
}

pub struct SledLedgerDb {
    tree: Tree,
}

impl SledLedgerDb {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(LEDGER_TREE).context("Failed to open ledger tree")?,
        })
    }

    fn scan_holding(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        until: Option<NaiveDate>,
    ) -> Result<Vec<TransactionEntry>> {
        let prefix = holding_prefix(ENTRY_PREFIX, issuer_id, shareholder_id, security_id)?;
        let mut entries = Vec::new();
        for item in self.tree.scan_prefix(&prefix) {
            let (key, value) = item.context("Failed to scan ledger tree")?;
            if let Some(until) = until {
                match date_at(&key, prefix.len()) {
                    Some(date) if date > until => break,
                    Some(_) => {}
                    None => anyhow::bail!("Corrupt ledger key for {}", security_id),
                }
            }
            entries.push(decode_entry(&value)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl LedgerDb for SledLedgerDb {
    async fn insert_batch(&self, entries: &[TransactionEntry]) -> Result<()> {
        let mut batch = Batch::default();
        for entry in entries {
            let row_key = entry_key(entry)?;
            let value = serde_json::to_vec(entry).context("Failed to encode ledger entry")?;
            batch.insert(index_key(entry.entry_id), row_key.clone());
            batch.insert(row_key, value);
        }
        // apply_batch is atomic: either every row lands or none do
        self.tree.apply_batch(batch).context("Failed to apply ledger batch")?;
        self.tree.flush().context("Failed to flush ledger tree")?;
        Ok(())
    }

    async fn query_active(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<TransactionEntry>> {
        let rows = self.scan_holding(issuer_id, shareholder_id, security_id, Some(as_of))?;
        Ok(rows.into_iter().filter(|e| e.is_active()).collect())
    }

    async fn history(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<TransactionEntry>> {
        self.scan_holding(issuer_id, shareholder_id, security_id, None)
    }

    async fn get(&self, entry_id: EntryId) -> Result<Option<TransactionEntry>> {
        let Some(row_key) = self.tree.get(index_key(entry_id))? else {
            return Ok(None);
        };
        match self.tree.get(row_key)? {
            Some(value) => Ok(Some(decode_entry(&value)?)),
            None => Ok(None),
        }
    }

    async fn update_status_if(
        &self,
        entry_id: EntryId,
        expected: EntryStatus,
        new_status: EntryStatus,
    ) -> Result<bool> {
        let Some(row_key) = self.tree.get(index_key(entry_id))? else {
            return Ok(false);
        };
        let Some(current) = self.tree.get(&row_key)? else {
            return Ok(false);
        };
        let mut entry = decode_entry(&current)?;
        if entry.status != expected {
            return Ok(false);
        }
        entry.status = new_status;
        let updated = serde_json::to_vec(&entry).context("Failed to encode ledger entry")?;

        // CAS on the whole row: a concurrent status change makes this a no-op
        let swapped = self
            .tree
            .compare_and_swap(&row_key, Some(current), Some(updated))
            .context("Failed to update entry status")?;
        if swapped.is_err() {
            log::warn!("Status update for {} lost a race (treating as not applied)", entry_id);
            return Ok(false);
        }
        self.tree.flush().context("Failed to flush ledger tree")?;
        Ok(true)
    }

    fn name(&self) -> &str {
        "sled"
    }
}

pub struct SledSnapshotDb {
    tree: Tree,
}

impl SledSnapshotDb {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(POSITIONS_TREE).context("Failed to open positions tree")?,
        })
    }
}

#[async_trait]
impl SnapshotDb for SledSnapshotDb {
    async fn upsert(&self, snapshot: &PositionSnapshot) -> Result<()> {
        let value = serde_json::to_vec(snapshot).context("Failed to encode snapshot")?;
        self.tree
            .insert(position_key(&snapshot.key)?, value)
            .context("Failed to upsert snapshot")?;
        Ok(())
    }

    async fn get(&self, key: &PositionKey) -> Result<Option<PositionSnapshot>> {
        match self.tree.get(position_key(key)?)? {
            Some(value) => Ok(Some(
                serde_json::from_slice(&value).context("Failed to decode snapshot")?,
            )),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<PositionSnapshot>> {
        let prefix = holding_prefix(POSITION_PREFIX, issuer_id, shareholder_id, security_id)?;
        let mut rows = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (_, value) = item.context("Failed to scan positions tree")?;
            rows.push(serde_json::from_slice(&value).context("Failed to decode snapshot")?);
        }
        Ok(rows)
    }

    fn name(&self) -> &str {
        "sled"
    }
}
