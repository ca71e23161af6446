//! Storage traits
//!
//! Every call is a potential round trip to a remote store, so all of them are
//! async and fallible. Validation happens above this layer; implementations
//! store what they are given.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    EntryId, EntryStatus, IssuerId, PositionKey, PositionSnapshot, ShareholderId,
    TransactionEntry,
};

/// Append-only storage of transaction entries
#[async_trait]
pub trait LedgerDb: Send + Sync {
    /// Insert all entries or none of them
    async fn insert_batch(&self, entries: &[TransactionEntry]) -> Result<()>;

    /// Active entries of one holding dated on or before `as_of`, date ascending
    async fn query_active(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<TransactionEntry>>;

    /// Every entry of one holding regardless of status, date ascending
    async fn history(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<TransactionEntry>>;

    async fn get(&self, entry_id: EntryId) -> Result<Option<TransactionEntry>>;

    /// Conditional status update (returns true if applied)
    async fn update_status_if(
        &self,
        entry_id: EntryId,
        expected: EntryStatus,
        new_status: EntryStatus,
    ) -> Result<bool>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Upsertable position snapshot rows
#[async_trait]
pub trait SnapshotDb: Send + Sync {
    /// Insert or overwrite the row at `snapshot.key`
    async fn upsert(&self, snapshot: &PositionSnapshot) -> Result<()>;

    async fn get(&self, key: &PositionKey) -> Result<Option<PositionSnapshot>>;

    /// All cached rows of one holding, as-of date ascending
    async fn list(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<PositionSnapshot>>;

    fn name(&self) -> &str;
}
