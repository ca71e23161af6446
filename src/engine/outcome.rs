use serde::Serialize;

use crate::models::{
    CacheRefreshFailure, EntryId, PositionSnapshot, PostingKind, TransactionEntry,
};

/// Result of a committed posting.
///
/// The entries are in the ledger whatever `warnings` says; a warning only
/// means some snapshot rows are stale until the next refresh.
#[derive(Debug, Clone)]
pub struct PostingOutcome {
    pub posting: PostingKind,
    pub entries: Vec<TransactionEntry>,
    pub snapshots: Vec<PositionSnapshot>,
    pub warnings: Vec<CacheRefreshFailure>,
}

impl PostingOutcome {
    pub fn new(posting: PostingKind, entries: Vec<TransactionEntry>) -> Self {
        Self {
            posting,
            entries,
            snapshots: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Fold one pair's refresh result into the outcome
    pub fn record_refresh(&mut self, result: Result<Vec<PositionSnapshot>, CacheRefreshFailure>) {
        match result {
            Ok(snapshots) => self.snapshots.extend(snapshots),
            Err(warning) => self.warnings.push(warning),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.entries.iter().map(|e| e.entry_id).collect()
    }

    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            posting: self.posting,
            entries: self
                .entries
                .iter()
                .map(|e| LegSummary {
                    entry_id: e.entry_id,
                    shareholder_id: e.shareholder_id,
                    security_id: e.security_id.clone(),
                    kind: e.kind.to_string(),
                    signed_quantity: e.signed_quantity,
                    transaction_date: e.transaction_date.to_string(),
                })
                .collect(),
            snapshots: self.snapshots.clone(),
            warnings: self.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// Printable form of an outcome (CLI output)
#[derive(Debug, Serialize)]
pub struct OutcomeSummary {
    pub posting: PostingKind,
    pub entries: Vec<LegSummary>,
    pub snapshots: Vec<PositionSnapshot>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LegSummary {
    pub entry_id: EntryId,
    pub shareholder_id: u64,
    pub security_id: String,
    pub kind: String,
    pub signed_quantity: i64,
    pub transaction_date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_marks_degraded() {
        let mut outcome = PostingOutcome::new(PostingKind::Single, Vec::new());
        outcome.record_refresh(Ok(Vec::new()));
        assert!(!outcome.is_degraded());

        outcome.record_refresh(Err(CacheRefreshFailure {
            shareholder_id: 10,
            security_id: "UNITS".to_string(),
            reason: "snapshot write refused".to_string(),
        }));
        assert!(outcome.is_degraded());
        let summary = outcome.summary();
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("UNITS"));
    }
}
