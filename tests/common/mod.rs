// Shared fixture for the integration tests
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use captable::adapters::{ChannelEventSink, StaticDirectory};
use captable::configure::SplitNamingConfig;
use captable::db::{LedgerDb, MemoryLedgerDb, MemorySnapshotDb, SnapshotDb};
use captable::engine::PostingRequest;
use captable::models::{
    PostingEvent, SecondaryLabel, SecurityInfo, SplitConfig, TransactionKind,
};
use captable::{CapTable, Collaborators};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::mpsc::Receiver;

pub const ISSUER: u64 = 1;
pub const ALICE: u64 = 10;
pub const BOB: u64 = 11;
pub const UNITS: &str = "ACME-U";
pub const CLASS_A: &str = "ACME-A";
pub const WARRANT: &str = "ACME-W";
pub const RIGHT: &str = "ACME-R";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn split_config(class_a: &str, secondary: &str, label: SecondaryLabel) -> SplitConfig {
    SplitConfig {
        issuer_id: ISSUER,
        triggering_kind: TransactionKind::Withdrawal,
        class_a_ratio: Decimal::from_str(class_a).unwrap(),
        secondary_ratio: Decimal::from_str(secondary).unwrap(),
        secondary_label: label,
    }
}

/// Issuer 1 with Units, Class A, Warrants and Rights; holders 10 and 11;
/// split rates 1 / 0.5 into Warrants.
pub fn directory() -> StaticDirectory {
    let directory = StaticDirectory::new();
    for (id, name) in [
        (UNITS, "Units"),
        (CLASS_A, "Class A Ordinary Shares"),
        (WARRANT, "Redeemable Warrants"),
        (RIGHT, "Rights"),
    ] {
        directory.add_security(SecurityInfo {
            issuer_id: ISSUER,
            security_id: id.to_string(),
            name: name.to_string(),
            authorized_shares: None,
        });
    }
    directory.add_shareholder(ISSUER, ALICE);
    directory.add_shareholder(ISSUER, BOB);
    directory.set_split_config(split_config("1", "0.5", SecondaryLabel::Warrant));
    directory
}

pub struct Harness {
    pub cap_table: CapTable,
    pub directory: Arc<StaticDirectory>,
    pub events: Receiver<PostingEvent>,
}

pub struct MemoryHarness {
    pub harness: Harness,
    pub ledger_db: Arc<MemoryLedgerDb>,
    pub snapshot_db: Arc<MemorySnapshotDb>,
}

pub fn harness_over(ledger_db: Arc<dyn LedgerDb>, snapshot_db: Arc<dyn SnapshotDb>) -> Harness {
    let directory = Arc::new(directory());
    let (sink, events) = ChannelEventSink::new(64);
    let cap_table = CapTable::new(
        ledger_db,
        snapshot_db,
        Collaborators {
            securities: directory.clone(),
            shareholders: directory.clone(),
            split_configs: directory.clone(),
            events: Arc::new(sink),
        },
        SplitNamingConfig::default(),
    );
    Harness {
        cap_table,
        directory,
        events,
    }
}

pub fn memory_harness() -> MemoryHarness {
    let ledger_db = Arc::new(MemoryLedgerDb::new());
    let snapshot_db = Arc::new(MemorySnapshotDb::new());
    MemoryHarness {
        harness: harness_over(ledger_db.clone(), snapshot_db.clone()),
        ledger_db,
        snapshot_db,
    }
}

pub fn request(
    shareholder: u64,
    security: &str,
    kind: TransactionKind,
    quantity: u64,
    on: NaiveDate,
) -> PostingRequest {
    PostingRequest::new(ISSUER, shareholder, security, kind, quantity, on)
}

pub async fn balance(cap_table: &CapTable, shareholder: u64, security: &str, on: NaiveDate) -> i64 {
    cap_table
        .engine
        .balance_as_of(ISSUER, shareholder, security, on)
        .await
        .unwrap()
}
