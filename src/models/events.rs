use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common_utils::get_current_timestamp_ms;
use crate::models::transaction::{IssuerId, TransactionEntry, TransactionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PostingKind {
    Single,
    Transfer,
    Split,
    Void,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLeg {
    pub entry_id: Uuid,
    pub shareholder_id: u64,
    pub security_id: String,
    pub kind: TransactionKind,
    pub signed_quantity: i64,
}

impl From<&TransactionEntry> for EventLeg {
    fn from(entry: &TransactionEntry) -> Self {
        Self {
            entry_id: entry.entry_id,
            shareholder_id: entry.shareholder_id,
            security_id: entry.security_id.clone(),
            kind: entry.kind,
            signed_quantity: entry.signed_quantity,
        }
    }
}

/// Emitted after every committed posting for audit/notification collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingEvent {
    pub event_id: Uuid,
    pub posting: PostingKind,
    pub issuer_id: IssuerId,
    pub transaction_date: NaiveDate,
    pub legs: Vec<EventLeg>,
    pub actor: Option<String>,
    pub timestamp_ms: i64,
}

impl PostingEvent {
    pub fn new(
        posting: PostingKind,
        issuer_id: IssuerId,
        transaction_date: NaiveDate,
        entries: &[TransactionEntry],
        actor: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            posting,
            issuer_id,
            transaction_date,
            legs: entries.iter().map(EventLeg::from).collect(),
            actor,
            timestamp_ms: get_current_timestamp_ms(),
        }
    }
}
