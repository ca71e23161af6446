//! Single-transaction postings: one entry, a two-leg transfer, or a void

use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use super::locks::PairLocks;
use super::outcome::PostingOutcome;
use super::resolver::SecurityResolver;
use super::snapshot::SnapshotCache;
use super::validator::BalanceValidator;
use crate::adapters::{EventSink, ShareholderDirectory};
use crate::ledger_store::LedgerStore;
use crate::models::{
    EntryId, IssuerId, LedgerError, PostingEvent, PostingKind, SecurityId, ShareholderId,
    TransactionEntry, TransactionKind,
};

#[derive(Debug, Clone)]
pub struct PostingRequest {
    pub issuer_id: IssuerId,
    pub shareholder_id: ShareholderId,
    pub security_id: SecurityId,
    pub kind: TransactionKind,
    /// Magnitude; the sign comes from `kind`
    pub quantity: u64,
    pub transaction_date: NaiveDate,
    pub restriction_id: Option<String>,
    pub note: String,
    pub actor: Option<String>,
}

impl PostingRequest {
    pub fn new(
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
        kind: TransactionKind,
        quantity: u64,
        transaction_date: NaiveDate,
    ) -> Self {
        Self {
            issuer_id,
            shareholder_id,
            security_id: security_id.to_string(),
            kind,
            quantity,
            transaction_date,
            restriction_id: None,
            note: String::new(),
            actor: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub issuer_id: IssuerId,
    pub from_shareholder: ShareholderId,
    pub to_shareholder: ShareholderId,
    pub security_id: SecurityId,
    pub quantity: u64,
    pub transaction_date: NaiveDate,
    pub restriction_id: Option<String>,
    pub note: String,
    pub actor: Option<String>,
}

#[derive(Clone)]
pub struct PostingService {
    ledger: LedgerStore,
    validator: BalanceValidator,
    snapshots: SnapshotCache,
    resolver: SecurityResolver,
    shareholders: Arc<dyn ShareholderDirectory>,
    locks: PairLocks,
    events: Arc<dyn EventSink>,
}

impl PostingService {
    pub fn new(
        ledger: LedgerStore,
        validator: BalanceValidator,
        snapshots: SnapshotCache,
        resolver: SecurityResolver,
        shareholders: Arc<dyn ShareholderDirectory>,
        locks: PairLocks,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            ledger,
            validator,
            snapshots,
            resolver,
            shareholders,
            locks,
            events,
        }
    }

    pub async fn post(&self, request: PostingRequest) -> Result<PostingOutcome, LedgerError> {
        match self.post_inner(&request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                crate::log_posting_rejected!(PostingKind::Single.as_ref(), request.issuer_id, err);
                Err(err)
            }
        }
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<PostingOutcome, LedgerError> {
        match self.transfer_inner(&request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                crate::log_posting_rejected!(
                    PostingKind::Transfer.as_ref(),
                    request.issuer_id,
                    err
                );
                Err(err)
            }
        }
    }

    /// Void one entry. Sibling legs of a split or transfer are voided separately.
    pub async fn void(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
    ) -> Result<PostingOutcome, LedgerError> {
        let entry = self
            .ledger
            .get(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;

        let voided = {
            let _guard = self
                .locks
                .acquire(entry.issuer_id, entry.shareholder_id, &entry.security_id)
                .await;
            if let Err(err) = self.validator.assert_void_allowed(&entry).await {
                crate::log_posting_rejected!(PostingKind::Void.as_ref(), entry.issuer_id, err);
                return Err(err);
            }
            self.ledger.void(entry_id).await?
        };

        let mut outcome = PostingOutcome::new(PostingKind::Void, vec![voided]);
        outcome.record_refresh(
            self.snapshots
                .refresh_after_posting(
                    entry.issuer_id,
                    entry.shareholder_id,
                    &entry.security_id,
                    entry.transaction_date,
                )
                .await,
        );
        self.events.publish(PostingEvent::new(
            PostingKind::Void,
            entry.issuer_id,
            entry.transaction_date,
            &outcome.entries,
            actor,
        ));
        Ok(outcome)
    }

    async fn ensure_shareholder(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
    ) -> Result<(), LedgerError> {
        let exists = self
            .shareholders
            .exists(issuer_id, shareholder_id)
            .await
            .map_err(LedgerError::store)?;
        if !exists {
            return Err(LedgerError::ShareholderNotFound {
                issuer: issuer_id,
                shareholder: shareholder_id,
            });
        }
        Ok(())
    }

    async fn post_inner(&self, request: &PostingRequest) -> Result<PostingOutcome, LedgerError> {
        if matches!(request.kind, TransactionKind::SplitDebit | TransactionKind::SplitCredit) {
            return Err(LedgerError::Validation(format!(
                "{} entries are only posted as part of a split",
                request.kind
            )));
        }
        self.ensure_shareholder(request.issuer_id, request.shareholder_id).await?;
        self.resolver.resolve_id(request.issuer_id, &request.security_id).await?;

        let entry = TransactionEntry::new(
            request.issuer_id,
            request.shareholder_id,
            &request.security_id,
            request.kind,
            request.quantity,
            request.transaction_date,
        )?
        .with_note(request.note.clone())
        .with_restriction(request.restriction_id.clone())
        .with_actor(request.actor.clone());

        {
            let _guard = self
                .locks
                .acquire(request.issuer_id, request.shareholder_id, &request.security_id)
                .await;
            if request.kind.is_debit() {
                self.validator
                    .assert_sufficient(
                        request.issuer_id,
                        request.shareholder_id,
                        &request.security_id,
                        request.transaction_date,
                        request.quantity,
                    )
                    .await?;
            } else {
                self.validator
                    .assert_credit_fits(
                        request.issuer_id,
                        request.shareholder_id,
                        &request.security_id,
                        request.transaction_date,
                        request.quantity,
                    )
                    .await?;
            }
            self.ledger.append(entry.clone()).await?;
        }

        log::info!(
            "Posted {} {} of {} for shareholder {} on {}",
            request.kind,
            request.quantity,
            request.security_id,
            request.shareholder_id,
            request.transaction_date
        );

        let mut outcome = PostingOutcome::new(PostingKind::Single, vec![entry]);
        outcome.record_refresh(
            self.snapshots
                .refresh_after_posting(
                    request.issuer_id,
                    request.shareholder_id,
                    &request.security_id,
                    request.transaction_date,
                )
                .await,
        );
        self.events.publish(PostingEvent::new(
            PostingKind::Single,
            request.issuer_id,
            request.transaction_date,
            &outcome.entries,
            request.actor.clone(),
        ));
        Ok(outcome)
    }

    async fn transfer_inner(
        &self,
        request: &TransferRequest,
    ) -> Result<PostingOutcome, LedgerError> {
        if request.from_shareholder == request.to_shareholder {
            return Err(LedgerError::Validation(format!(
                "transfer from shareholder {} to itself",
                request.from_shareholder
            )));
        }
        self.ensure_shareholder(request.issuer_id, request.from_shareholder).await?;
        self.ensure_shareholder(request.issuer_id, request.to_shareholder).await?;
        self.resolver.resolve_id(request.issuer_id, &request.security_id).await?;

        let correlation_id = Uuid::new_v4();
        let leg = |shareholder_id, kind| -> Result<TransactionEntry, LedgerError> {
            Ok(TransactionEntry::new(
                request.issuer_id,
                shareholder_id,
                &request.security_id,
                kind,
                request.quantity,
                request.transaction_date,
            )?
            .with_note(request.note.clone())
            .with_restriction(request.restriction_id.clone())
            .with_correlation(correlation_id)
            .with_actor(request.actor.clone()))
        };
        let legs = vec![
            leg(request.from_shareholder, TransactionKind::TransferOut)?,
            leg(request.to_shareholder, TransactionKind::TransferIn)?,
        ];

        {
            let _guards = self
                .locks
                .acquire_all(
                    request.issuer_id,
                    &[
                        (request.from_shareholder, request.security_id.as_str()),
                        (request.to_shareholder, request.security_id.as_str()),
                    ],
                )
                .await;
            self.validator
                .assert_sufficient(
                    request.issuer_id,
                    request.from_shareholder,
                    &request.security_id,
                    request.transaction_date,
                    request.quantity,
                )
                .await?;
            self.validator
                .assert_credit_fits(
                    request.issuer_id,
                    request.to_shareholder,
                    &request.security_id,
                    request.transaction_date,
                    request.quantity,
                )
                .await?;
            self.ledger.append_batch(legs.clone()).await?;
        }

        log::info!(
            "Transfer {} committed: {} {} from {} to {}",
            correlation_id,
            request.quantity,
            request.security_id,
            request.from_shareholder,
            request.to_shareholder
        );

        let mut outcome = PostingOutcome::new(PostingKind::Transfer, legs);
        let (from_refresh, to_refresh) = tokio::join!(
            self.snapshots.refresh_after_posting(
                request.issuer_id,
                request.from_shareholder,
                &request.security_id,
                request.transaction_date,
            ),
            self.snapshots.refresh_after_posting(
                request.issuer_id,
                request.to_shareholder,
                &request.security_id,
                request.transaction_date,
            ),
        );
        outcome.record_refresh(from_refresh);
        outcome.record_refresh(to_refresh);

        self.events.publish(PostingEvent::new(
            PostingKind::Transfer,
            request.issuer_id,
            request.transaction_date,
            &outcome.entries,
            request.actor.clone(),
        ));
        Ok(outcome)
    }
}
