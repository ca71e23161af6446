//! Position Snapshot Cache
//!
//! Write-through cache of replayed balances keyed by
//! (issuer, shareholder, security, as-of date). Rows are always recomputed
//! from a full replay and overwritten, never adjusted in place.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use super::replay::PositionEngine;
use crate::common_utils::get_current_timestamp_ms;
use crate::db::SnapshotDb;
use crate::logging::LogEvent;
use crate::models::{
    CacheRefreshFailure, IssuerId, LedgerError, PositionKey, PositionSnapshot, ShareholderId,
};

/// A cached row that disagreed with the ledger and was overwritten
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotDivergence {
    pub key: PositionKey,
    pub cached: i64,
    pub replayed: i64,
}

#[derive(Clone)]
pub struct SnapshotCache {
    engine: PositionEngine,
    db: Arc<dyn SnapshotDb>,
}

impl SnapshotCache {
    pub fn new(engine: PositionEngine, db: Arc<dyn SnapshotDb>) -> Self {
        Self { engine, db }
    }

    /// Replay and overwrite the row at this key
    pub async fn refresh(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        as_of: NaiveDate,
    ) -> Result<PositionSnapshot, LedgerError> {
        let shares_owned = self
            .engine
            .balance_as_of(issuer_id, shareholder_id, security_id, as_of)
            .await?;
        let snapshot = PositionSnapshot {
            key: PositionKey::new(issuer_id, shareholder_id, security_id, as_of),
            shares_owned,
            updated_at: get_current_timestamp_ms(),
        };
        self.db.upsert(&snapshot).await.map_err(LedgerError::store)?;
        Ok(snapshot)
    }

    /// Refresh `from` and every cached row of the pair dated after it.
    ///
    /// A posting dated `from` changes every later balance too.
    pub async fn refresh_from(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        from: NaiveDate,
    ) -> Result<Vec<PositionSnapshot>, LedgerError> {
        let mut dates = vec![from];
        let cached = self
            .db
            .list(issuer_id, shareholder_id, security_id)
            .await
            .map_err(LedgerError::store)?;
        dates.extend(
            cached
                .into_iter()
                .map(|s| s.key.as_of_date)
                .filter(|date| *date > from),
        );

        let mut refreshed = Vec::with_capacity(dates.len());
        for date in dates {
            refreshed.push(self.refresh(issuer_id, shareholder_id, security_id, date).await?);
        }
        Ok(refreshed)
    }

    /// `refresh_from` for the post-commit path: failures become warnings.
    pub async fn refresh_after_posting(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        from: NaiveDate,
    ) -> Result<Vec<PositionSnapshot>, CacheRefreshFailure> {
        self.refresh_from(issuer_id, shareholder_id, security_id, from)
            .await
            .map_err(|err| {
                crate::log_cache_degraded!(issuer_id, shareholder_id, security_id, err.to_string());
                CacheRefreshFailure {
                    shareholder_id,
                    security_id: security_id.to_string(),
                    reason: err.to_string(),
                }
            })
    }

    pub async fn get(&self, key: &PositionKey) -> Result<Option<PositionSnapshot>, LedgerError> {
        self.db.get(key).await.map_err(LedgerError::store)
    }

    pub async fn list(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<PositionSnapshot>, LedgerError> {
        self.db
            .list(issuer_id, shareholder_id, security_id)
            .await
            .map_err(LedgerError::store)
    }

    /// Compare every cached row of the pair with a fresh replay and overwrite
    /// the ones that drifted.
    pub async fn reconcile(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> Result<Vec<SnapshotDivergence>, LedgerError> {
        let cached = self.list(issuer_id, shareholder_id, security_id).await?;
        let mut diverged = Vec::new();

        for row in cached {
            let replayed = self
                .engine
                .balance_as_of(issuer_id, shareholder_id, security_id, row.key.as_of_date)
                .await?;
            if replayed == row.shares_owned {
                continue;
            }

            log::warn!(
                "{}",
                LogEvent::new("SNAPSHOT_DIVERGED")
                    .field("issuer_id", issuer_id)
                    .field("shareholder_id", shareholder_id)
                    .field("security_id", security_id)
                    .field("as_of_date", row.key.as_of_date.to_string())
                    .field("cached", row.shares_owned)
                    .field("replayed", replayed)
                    .service("ledger")
                    .build()
            );
            self.refresh(issuer_id, shareholder_id, security_id, row.key.as_of_date)
                .await?;
            diverged.push(SnapshotDivergence {
                key: row.key,
                cached: row.shares_owned,
                replayed,
            });
        }

        if diverged.is_empty() {
            log::debug!("Snapshots of {}/{}/{} match the ledger", issuer_id, shareholder_id, security_id);
        }
        Ok(diverged)
    }
}
