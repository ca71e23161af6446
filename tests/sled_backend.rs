// End-to-end flows against an embedded sled database
mod common;

use std::sync::Arc;

use captable::db::sled_store::temporary_db;
use captable::db::{SledLedgerDb, SledSnapshotDb};
use captable::engine::SplitRequest;
use captable::models::{EntryStatus, LedgerError, PositionKey, TransactionKind};
use common::*;

fn sled_harness() -> Harness {
    let db = temporary_db().unwrap();
    harness_over(
        Arc::new(SledLedgerDb::new(&db).unwrap()),
        Arc::new(SledSnapshotDb::new(&db).unwrap()),
    )
}

#[tokio::test]
async fn test_sled_posting_and_split() {
    let harness = sled_harness();
    let cap_table = &harness.cap_table;

    cap_table
        .postings
        .post(request(ALICE, UNITS, TransactionKind::OriginalIssuance, 1000, date(2024, 1, 1)))
        .await
        .unwrap();
    cap_table
        .postings
        .post(request(ALICE, UNITS, TransactionKind::Withdrawal, 400, date(2024, 3, 1)))
        .await
        .unwrap();

    let err = cap_table
        .postings
        .post(request(ALICE, UNITS, TransactionKind::Withdrawal, 700, date(2024, 4, 1)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientBalance { current: 600, requested: 700, as_of: date(2024, 4, 1) }
    );

    let outcome = cap_table
        .splits
        .execute(SplitRequest::new(ISSUER, ALICE, 600, date(2024, 5, 1)))
        .await
        .unwrap();
    assert_eq!(outcome.entries.len(), 3);

    assert_eq!(balance(cap_table, ALICE, UNITS, date(2024, 2, 1)).await, 1000);
    assert_eq!(balance(cap_table, ALICE, UNITS, date(2024, 5, 1)).await, 0);
    assert_eq!(balance(cap_table, ALICE, CLASS_A, date(2024, 5, 1)).await, 600);
    assert_eq!(balance(cap_table, ALICE, WARRANT, date(2024, 5, 1)).await, 300);

    let key = PositionKey::new(ISSUER, ALICE, WARRANT, date(2024, 5, 1));
    assert_eq!(cap_table.snapshots.get(&key).await.unwrap().unwrap().shares_owned, 300);
}

#[tokio::test]
async fn test_sled_void_and_history() {
    let harness = sled_harness();
    let cap_table = &harness.cap_table;

    let deposit = cap_table
        .postings
        .post(request(ALICE, UNITS, TransactionKind::Deposit, 50, date(2024, 1, 1)))
        .await
        .unwrap();
    let id = deposit.entry_ids()[0];

    cap_table.postings.void(id, Some("ops".to_string())).await.unwrap();
    assert_eq!(balance(cap_table, ALICE, UNITS, date(2024, 1, 1)).await, 0);

    let history = cap_table.ledger.history(ISSUER, ALICE, UNITS).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, EntryStatus::Inactive);

    let snapshot = cap_table
        .snapshots
        .get(&PositionKey::new(ISSUER, ALICE, UNITS, date(2024, 1, 1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.shares_owned, 0);
}

#[tokio::test]
async fn test_sled_reconcile_after_stale_rows() {
    let harness = sled_harness();
    let cap_table = &harness.cap_table;

    cap_table
        .postings
        .post(request(BOB, UNITS, TransactionKind::Deposit, 80, date(2024, 1, 1)))
        .await
        .unwrap();
    cap_table
        .snapshots
        .refresh(ISSUER, BOB, UNITS, date(2024, 12, 31))
        .await
        .unwrap();
    assert!(cap_table.snapshots.reconcile(ISSUER, BOB, UNITS).await.unwrap().is_empty());

    // Written straight to the ledger, bypassing the posting flow and its refresh
    let entry = captable::models::TransactionEntry::new(
        ISSUER,
        BOB,
        UNITS,
        TransactionKind::Deposit,
        20,
        date(2024, 6, 1),
    )
    .unwrap();
    cap_table.ledger.append(entry).await.unwrap();

    let diverged = cap_table.snapshots.reconcile(ISSUER, BOB, UNITS).await.unwrap();
    assert_eq!(diverged.len(), 1);
    assert_eq!(diverged[0].key.as_of_date, date(2024, 12, 31));
    assert_eq!((diverged[0].cached, diverged[0].replayed), (80, 100));
}
