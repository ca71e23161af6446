//! ScyllaDB-backed stores
//!
//! Multi-leg postings are written with one LOGGED batch so a reader never sees
//! part of a split. Voiding uses LWT (`IF status = ?`) on the entry row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use scylla::batch::{Batch, BatchType};
use scylla::{Session, SessionBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::common_utils::{date_to_days, days_to_date, get_current_timestamp_ms};
use crate::configure::ScyllaDbConfig;
use crate::db::traits::{LedgerDb, SnapshotDb};
use crate::models::{
    EntryId, EntryStatus, IssuerId, PositionKey, PositionSnapshot, ShareholderId,
    TransactionEntry, TransactionKind,
};

// Retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 50;
const SLOW_QUERY_THRESHOLD_MS: u128 = 100;

const CREATE_KEYSPACE_CQL: &str = "
    CREATE KEYSPACE IF NOT EXISTS {keyspace}
    WITH replication = {'class': 'SimpleStrategy', 'replication_factor': {rf}}
";

const CREATE_ENTRIES_TABLE_CQL: &str = "
    CREATE TABLE IF NOT EXISTS ledger_entries (
        issuer_id bigint,
        shareholder_id bigint,
        security_id text,
        transaction_date int,
        entry_id uuid,
        kind text,
        signed_quantity bigint,
        status text,
        restriction_id text,
        note text,
        correlation_id uuid,
        actor text,
        created_at bigint,
        PRIMARY KEY ((issuer_id, shareholder_id, security_id), transaction_date, entry_id)
    ) WITH CLUSTERING ORDER BY (transaction_date ASC, entry_id ASC)
";

const CREATE_ENTRIES_BY_ID_TABLE_CQL: &str = "
    CREATE TABLE IF NOT EXISTS ledger_entries_by_id (
        entry_id uuid PRIMARY KEY,
        issuer_id bigint,
        shareholder_id bigint,
        security_id text,
        transaction_date int,
        kind text,
        signed_quantity bigint,
        status text,
        restriction_id text,
        note text,
        correlation_id uuid,
        actor text,
        created_at bigint
    )
";

const CREATE_SNAPSHOTS_TABLE_CQL: &str = "
    CREATE TABLE IF NOT EXISTS position_snapshots (
        issuer_id bigint,
        shareholder_id bigint,
        security_id text,
        as_of_date int,
        shares_owned bigint,
        updated_at bigint,
        PRIMARY KEY ((issuer_id, shareholder_id, security_id), as_of_date)
    )
";

// Both inserts bind the same column order so one row tuple serves both
const INSERT_ENTRY_CQL: &str = "
    INSERT INTO ledger_entries (
        entry_id, issuer_id, shareholder_id, security_id, transaction_date,
        kind, signed_quantity, status, restriction_id, note,
        correlation_id, actor, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const INSERT_ENTRY_BY_ID_CQL: &str = "
    INSERT INTO ledger_entries_by_id (
        entry_id, issuer_id, shareholder_id, security_id, transaction_date,
        kind, signed_quantity, status, restriction_id, note,
        correlation_id, actor, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const SELECT_HOLDING_CQL: &str = "
    SELECT entry_id, issuer_id, shareholder_id, security_id, transaction_date,
           kind, signed_quantity, status, restriction_id, note,
           correlation_id, actor, created_at
    FROM ledger_entries
    WHERE issuer_id = ? AND shareholder_id = ? AND security_id = ?
";

const SELECT_HOLDING_AS_OF_CQL: &str = "
    SELECT entry_id, issuer_id, shareholder_id, security_id, transaction_date,
           kind, signed_quantity, status, restriction_id, note,
           correlation_id, actor, created_at
    FROM ledger_entries
    WHERE issuer_id = ? AND shareholder_id = ? AND security_id = ?
      AND transaction_date <= ?
";

const SELECT_ENTRY_LOCATOR_CQL: &str = "
    SELECT issuer_id, shareholder_id, security_id, transaction_date
    FROM ledger_entries_by_id
    WHERE entry_id = ?
";

const SELECT_ENTRY_CQL: &str = "
    SELECT entry_id, issuer_id, shareholder_id, security_id, transaction_date,
           kind, signed_quantity, status, restriction_id, note,
           correlation_id, actor, created_at
    FROM ledger_entries
    WHERE issuer_id = ? AND shareholder_id = ? AND security_id = ?
      AND transaction_date = ? AND entry_id = ?
";

const UPDATE_STATUS_IF_CQL: &str = "
    UPDATE ledger_entries
    SET status = ?
    WHERE issuer_id = ? AND shareholder_id = ? AND security_id = ?
      AND transaction_date = ? AND entry_id = ?
    IF status = ?
";

const UPDATE_STATUS_BY_ID_CQL: &str = "
    UPDATE ledger_entries_by_id SET status = ? WHERE entry_id = ?
";

const UPSERT_SNAPSHOT_CQL: &str = "
    INSERT INTO position_snapshots (
        issuer_id, shareholder_id, security_id, as_of_date, shares_owned, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?)
";

const SELECT_SNAPSHOT_CQL: &str = "
    SELECT issuer_id, shareholder_id, security_id, as_of_date, shares_owned, updated_at
    FROM position_snapshots
    WHERE issuer_id = ? AND shareholder_id = ? AND security_id = ? AND as_of_date = ?
";

const SELECT_SNAPSHOTS_CQL: &str = "
    SELECT issuer_id, shareholder_id, security_id, as_of_date, shares_owned, updated_at
    FROM position_snapshots
    WHERE issuer_id = ? AND shareholder_id = ? AND security_id = ?
";

type EntryRow = (
    Uuid,
    i64,
    i64,
    String,
    i32,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<Uuid>,
    Option<String>,
    i64,
);

type SnapshotRow = (i64, i64, String, i32, i64, i64);

fn to_row(entry: &TransactionEntry) -> EntryRow {
    (
        entry.entry_id,
        entry.issuer_id as i64,
        entry.shareholder_id as i64,
        entry.security_id.clone(),
        date_to_days(entry.transaction_date),
        entry.kind.as_ref().to_string(),
        entry.signed_quantity,
        entry.status.as_ref().to_string(),
        entry.restriction_id.clone(),
        Some(entry.note.clone()),
        entry.correlation_id,
        entry.actor.clone(),
        entry.created_at,
    )
}

fn from_row(row: EntryRow) -> Result<TransactionEntry> {
    let (
        entry_id,
        issuer_id,
        shareholder_id,
        security_id,
        transaction_date,
        kind,
        signed_quantity,
        status,
        restriction_id,
        note,
        correlation_id,
        actor,
        created_at,
    ) = row;

    Ok(TransactionEntry {
        entry_id,
        issuer_id: issuer_id as u64,
        security_id,
        shareholder_id: shareholder_id as u64,
        kind: kind
            .parse::<TransactionKind>()
            .with_context(|| format!("Unknown kind '{}' on entry {}", kind, entry_id))?,
        signed_quantity,
        transaction_date: days_to_date(transaction_date)
            .with_context(|| format!("Bad date {} on entry {}", transaction_date, entry_id))?,
        status: status
            .parse::<EntryStatus>()
            .with_context(|| format!("Unknown status '{}' on entry {}", status, entry_id))?,
        restriction_id,
        note: note.unwrap_or_default(),
        correlation_id,
        actor,
        created_at,
    })
}

fn snapshot_from_row(row: SnapshotRow) -> Result<PositionSnapshot> {
    let (issuer_id, shareholder_id, security_id, as_of_date, shares_owned, updated_at) = row;
    let as_of_date = days_to_date(as_of_date)
        .with_context(|| format!("Bad snapshot date {} for {}", as_of_date, security_id))?;
    Ok(PositionSnapshot {
        key: PositionKey {
            issuer_id: issuer_id as u64,
            shareholder_id: shareholder_id as u64,
            security_id,
            as_of_date,
        },
        shares_owned,
        updated_at,
    })
}

/// Connect and select the keyspace, creating schema when asked to
pub async fn connect(config: &ScyllaDbConfig) -> Result<Arc<Session>> {
    let session: Session = SessionBuilder::new()
        .known_nodes(&config.hosts)
        .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
        .build()
        .await
        .context("Failed to connect to ScyllaDB")?;

    if config.create_schema {
        let create_keyspace = CREATE_KEYSPACE_CQL
            .replace("{keyspace}", &config.keyspace)
            .replace("{rf}", &config.replication_factor.to_string());
        session
            .query(create_keyspace, ())
            .await
            .context("Failed to create keyspace")?;
    }

    session
        .query(format!("USE {}", config.keyspace), ())
        .await
        .context("Failed to use ledger keyspace")?;

    if config.create_schema {
        for cql in [
            CREATE_ENTRIES_TABLE_CQL,
            CREATE_ENTRIES_BY_ID_TABLE_CQL,
            CREATE_SNAPSHOTS_TABLE_CQL,
        ] {
            session.query(cql, ()).await.context("Failed to create ledger table")?;
        }
    }

    Ok(Arc::new(session))
}

/// Execute an async operation with exponential backoff retry
async fn retry_with_backoff<F, Fut, T, E>(operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut attempt = 0;
    let mut delay = INITIAL_RETRY_DELAY_MS;

    loop {
        attempt += 1;
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if attempt > MAX_RETRIES {
                    return Err(anyhow::Error::new(e))
                        .context(format!("Operation failed after {} attempts", MAX_RETRIES));
                }
                sleep(Duration::from_millis(delay)).await;
                delay *= 2;
            }
        }
    }
}

pub struct ScyllaLedgerDb {
    session: Arc<Session>,
}

impl ScyllaLedgerDb {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn select_entries(
        &self,
        cql: &str,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> Result<Vec<TransactionEntry>> {
        let result = self
            .session
            .query(cql, values)
            .await
            .context("Failed to query ledger entries")?;

        let mut entries = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let row: EntryRow = row.into_typed().context("Failed to parse ledger entry row")?;
                entries.push(from_row(row)?);
            }
        }
        Ok(entries)
    }

    async fn locate(&self, entry_id: EntryId) -> Result<Option<(i64, i64, String, i32)>> {
        let result = self
            .session
            .query(SELECT_ENTRY_LOCATOR_CQL, (entry_id,))
            .await
            .context("Failed to look up entry by id")?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let located: (i64, i64, String, i32) =
                    row.into_typed().context("Failed to parse entry locator")?;
                return Ok(Some(located));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl LedgerDb for ScyllaLedgerDb {
    async fn insert_batch(&self, entries: &[TransactionEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let start = std::time::Instant::now();

        let mut batch = Batch::new(BatchType::Logged);
        let mut values: Vec<EntryRow> = Vec::with_capacity(entries.len() * 2);
        for entry in entries {
            let row = to_row(entry);
            batch.append_statement(INSERT_ENTRY_CQL);
            values.push(row.clone());
            batch.append_statement(INSERT_ENTRY_BY_ID_CQL);
            values.push(row);
        }

        // Inserts are keyed by entry_id, so replaying the batch is harmless
        retry_with_backoff(|| self.session.batch(&batch, &values))
            .await
            .context("Failed to execute ledger batch")?;

        let duration_ms = start.elapsed().as_millis();
        if duration_ms > SLOW_QUERY_THRESHOLD_MS {
            log::warn!("Slow ledger insert_batch ({} entries): {}ms", entries.len(), duration_ms);
        }
        log::debug!("[METRIC] ledger_db_batch_insert_latency_ms={}", duration_ms);
        Ok(())
    }

    async fn query_active(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<TransactionEntry>> {
        let rows = self
            .select_entries(
                SELECT_HOLDING_AS_OF_CQL,
                (issuer_id as i64, shareholder_id as i64, security_id, date_to_days(as_of)),
            )
            .await?;
        Ok(rows.into_iter().filter(|e| e.is_active()).collect())
    }

    async fn history(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<TransactionEntry>> {
        self.select_entries(
            SELECT_HOLDING_CQL,
            (issuer_id as i64, shareholder_id as i64, security_id),
        )
        .await
    }

    async fn get(&self, entry_id: EntryId) -> Result<Option<TransactionEntry>> {
        let Some((issuer_id, shareholder_id, security_id, date)) = self.locate(entry_id).await?
        else {
            return Ok(None);
        };
        let mut rows = self
            .select_entries(
                SELECT_ENTRY_CQL,
                (issuer_id, shareholder_id, security_id, date, entry_id),
            )
            .await?;
        Ok(rows.pop())
    }

    async fn update_status_if(
        &self,
        entry_id: EntryId,
        expected: EntryStatus,
        new_status: EntryStatus,
    ) -> Result<bool> {
        let Some((issuer_id, shareholder_id, security_id, date)) = self.locate(entry_id).await?
        else {
            return Ok(false);
        };

        let result = self
            .session
            .query(
                UPDATE_STATUS_IF_CQL,
                (
                    new_status.as_ref(),
                    issuer_id,
                    shareholder_id,
                    security_id,
                    date,
                    entry_id,
                    expected.as_ref(),
                ),
            )
            .await
            .context("Failed to update entry status")?;

        // Check [applied] column from LWT result
        let applied = match result.first_row_typed::<(bool,)>() {
            Ok(row) => row.0,
            Err(e) => {
                log::warn!(
                    "Failed to parse LWT result for {}: {} (treating as not applied)",
                    entry_id,
                    e
                );
                false
            }
        };

        if applied {
            // The lookup copy is informational; the LWT row stays authoritative
            if let Err(e) = self
                .session
                .query(UPDATE_STATUS_BY_ID_CQL, (new_status.as_ref(), entry_id))
                .await
            {
                log::warn!("Failed to mirror status of {} to lookup table: {}", entry_id, e);
            }
        }
        Ok(applied)
    }

    fn name(&self) -> &str {
        "scylla"
    }
}

pub struct ScyllaSnapshotDb {
    session: Arc<Session>,
}

impl ScyllaSnapshotDb {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl SnapshotDb for ScyllaSnapshotDb {
    async fn upsert(&self, snapshot: &PositionSnapshot) -> Result<()> {
        let key = &snapshot.key;
        let updated_at = if snapshot.updated_at > 0 {
            snapshot.updated_at
        } else {
            get_current_timestamp_ms()
        };
        // CQL INSERT overwrites an existing row with the same key
        self.session
            .query(
                UPSERT_SNAPSHOT_CQL,
                (
                    key.issuer_id as i64,
                    key.shareholder_id as i64,
                    key.security_id.as_str(),
                    date_to_days(key.as_of_date),
                    snapshot.shares_owned,
                    updated_at,
                ),
            )
            .await
            .context("Failed to upsert position snapshot")?;
        Ok(())
    }

    async fn get(&self, key: &PositionKey) -> Result<Option<PositionSnapshot>> {
        let result = self
            .session
            .query(
                SELECT_SNAPSHOT_CQL,
                (
                    key.issuer_id as i64,
                    key.shareholder_id as i64,
                    key.security_id.as_str(),
                    date_to_days(key.as_of_date),
                ),
            )
            .await
            .context("Failed to query position snapshot")?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let row: SnapshotRow = row.into_typed().context("Failed to parse snapshot row")?;
                return Ok(Some(snapshot_from_row(row)?));
            }
        }
        Ok(None)
    }

    async fn list(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<PositionSnapshot>> {
        let result = self
            .session
            .query(SELECT_SNAPSHOTS_CQL, (issuer_id as i64, shareholder_id as i64, security_id))
            .await
            .context("Failed to query position snapshots")?;

        let mut snapshots = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let row: SnapshotRow = row.into_typed().context("Failed to parse snapshot row")?;
                snapshots.push(snapshot_from_row(row)?);
            }
        }
        Ok(snapshots)
    }

    fn name(&self) -> &str {
        "scylla"
    }
}
