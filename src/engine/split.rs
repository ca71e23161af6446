//! Split Transaction Orchestrator
//!
//! Converts N units of the base security into floor(N x ratio) units of a
//! Class A security and of a Right/Warrant security. The debit and both
//! credits are written as one batch: either every leg is visible or none is.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::locks::PairLocks;
use super::outcome::PostingOutcome;
use super::resolver::{SecurityResolver, SplitSecurities};
use super::snapshot::SnapshotCache;
use super::validator::BalanceValidator;
use crate::adapters::{EventSink, ShareholderDirectory, SplitConfigSource};
use crate::ledger_store::LedgerStore;
use crate::models::{
    IssuerId, LedgerError, PostingEvent, PostingKind, ShareholderId, SplitConfig,
    TransactionEntry, TransactionKind,
};

#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub issuer_id: IssuerId,
    pub shareholder_id: ShareholderId,
    /// Units of the base security to convert
    pub units: u64,
    pub transaction_date: NaiveDate,
    /// Rate table row to apply
    pub triggering_kind: TransactionKind,
    pub note: Option<String>,
    pub actor: Option<String>,
}

impl SplitRequest {
    pub fn new(
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        units: u64,
        transaction_date: NaiveDate,
    ) -> Self {
        Self {
            issuer_id,
            shareholder_id,
            units,
            transaction_date,
            triggering_kind: TransactionKind::Withdrawal,
            note: None,
            actor: None,
        }
    }
}

/// Resolved securities and quantities of a split, before anything is posted
#[derive(Debug, Clone, Serialize)]
pub struct SplitPlan {
    pub securities: SplitSecurities,
    pub config: SplitConfig,
    pub units: u64,
    pub class_a_quantity: u64,
    pub secondary_quantity: u64,
}

impl SplitPlan {
    /// Ledger rows for this plan, sharing one correlation id and note.
    ///
    /// A derivative whose floored quantity is zero gets no row.
    pub fn legs(
        &self,
        request: &SplitRequest,
        correlation_id: Uuid,
    ) -> Result<Vec<TransactionEntry>, LedgerError> {
        let note = match &request.note {
            Some(note) => format!("{} [split {}]", note, correlation_id),
            None => format!(
                "split {}: {} {} -> {} {} + {} {}",
                correlation_id,
                self.units,
                self.securities.base.security_id,
                self.class_a_quantity,
                self.securities.class_a.security_id,
                self.secondary_quantity,
                self.securities.secondary.security_id
            ),
        };

        let legs = [
            (&self.securities.base, TransactionKind::SplitDebit, self.units),
            (&self.securities.class_a, TransactionKind::SplitCredit, self.class_a_quantity),
            (&self.securities.secondary, TransactionKind::SplitCredit, self.secondary_quantity),
        ];

        let mut entries = Vec::with_capacity(legs.len());
        for (security, kind, quantity) in legs {
            if quantity == 0 {
                log::info!(
                    "Split {} issues no {} (ratio floors to zero)",
                    correlation_id,
                    security.security_id
                );
                continue;
            }
            let entry = TransactionEntry::new(
                request.issuer_id,
                request.shareholder_id,
                &security.security_id,
                kind,
                quantity,
                request.transaction_date,
            )?
            .with_note(note.clone())
            .with_correlation(correlation_id)
            .with_actor(request.actor.clone());
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[derive(Clone)]
pub struct SplitOrchestrator {
    ledger: LedgerStore,
    validator: BalanceValidator,
    snapshots: SnapshotCache,
    resolver: SecurityResolver,
    configs: Arc<dyn SplitConfigSource>,
    shareholders: Arc<dyn ShareholderDirectory>,
    locks: PairLocks,
    events: Arc<dyn EventSink>,
}

impl SplitOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: LedgerStore,
        validator: BalanceValidator,
        snapshots: SnapshotCache,
        resolver: SecurityResolver,
        configs: Arc<dyn SplitConfigSource>,
        shareholders: Arc<dyn ShareholderDirectory>,
        locks: PairLocks,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            ledger,
            validator,
            snapshots,
            resolver,
            configs,
            shareholders,
            locks,
            events,
        }
    }

    /// Resolve the securities and compute the quantities without posting
    pub async fn plan(&self, request: &SplitRequest) -> Result<SplitPlan, LedgerError> {
        if request.units == 0 {
            return Err(LedgerError::Validation("split units must be greater than 0".to_string()));
        }

        let config = self
            .configs
            .get(request.issuer_id, request.triggering_kind)
            .await
            .map_err(LedgerError::store)?
            .ok_or(LedgerError::ConfigurationMissing {
                issuer: request.issuer_id,
                kind: request.triggering_kind,
            })?;

        let securities = self
            .resolver
            .resolve_split(request.issuer_id, config.secondary_label)
            .await?;
        let (class_a_quantity, secondary_quantity) = config.derive_quantities(request.units)?;
        if class_a_quantity == 0 && secondary_quantity == 0 {
            return Err(LedgerError::Validation(format!(
                "splitting {} units issues no Class A or {} shares",
                request.units, config.secondary_label
            )));
        }

        Ok(SplitPlan {
            securities,
            config,
            units: request.units,
            class_a_quantity,
            secondary_quantity,
        })
    }

    pub async fn execute(&self, request: SplitRequest) -> Result<PostingOutcome, LedgerError> {
        match self.execute_inner(&request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                crate::log_posting_rejected!(PostingKind::Split.as_ref(), request.issuer_id, err);
                Err(err)
            }
        }
    }

    async fn execute_inner(&self, request: &SplitRequest) -> Result<PostingOutcome, LedgerError> {
        let exists = self
            .shareholders
            .exists(request.issuer_id, request.shareholder_id)
            .await
            .map_err(LedgerError::store)?;
        if !exists {
            return Err(LedgerError::ShareholderNotFound {
                issuer: request.issuer_id,
                shareholder: request.shareholder_id,
            });
        }

        let plan = self.plan(request).await?;
        let base = plan.securities.base.security_id.clone();
        let correlation_id = Uuid::new_v4();
        let legs = plan.legs(request, correlation_id)?;

        {
            let holdings: Vec<(ShareholderId, &str)> = legs
                .iter()
                .map(|leg| (request.shareholder_id, leg.security_id.as_str()))
                .collect();
            let _guards = self.locks.acquire_all(request.issuer_id, &holdings).await;
            // Only the base debit can overdraw
            self.validator
                .assert_sufficient(
                    request.issuer_id,
                    request.shareholder_id,
                    &base,
                    request.transaction_date,
                    plan.units,
                )
                .await?;
            for credit in legs.iter().filter(|leg| !leg.kind.is_debit()) {
                self.validator
                    .assert_credit_fits(
                        request.issuer_id,
                        request.shareholder_id,
                        &credit.security_id,
                        request.transaction_date,
                        credit.magnitude(),
                    )
                    .await?;
            }
            self.ledger.append_batch(legs.clone()).await?;
        }

        log::info!(
            "Split {} committed for shareholder {}: {} {} -> {} {} + {} {}",
            correlation_id,
            request.shareholder_id,
            plan.units,
            base,
            plan.class_a_quantity,
            plan.securities.class_a.security_id,
            plan.secondary_quantity,
            plan.securities.secondary.security_id
        );

        let mut outcome = PostingOutcome::new(PostingKind::Split, legs);
        let (base_refresh, class_a_refresh, secondary_refresh) = tokio::join!(
            self.snapshots.refresh_after_posting(
                request.issuer_id,
                request.shareholder_id,
                &base,
                request.transaction_date,
            ),
            self.snapshots.refresh_after_posting(
                request.issuer_id,
                request.shareholder_id,
                &plan.securities.class_a.security_id,
                request.transaction_date,
            ),
            self.snapshots.refresh_after_posting(
                request.issuer_id,
                request.shareholder_id,
                &plan.securities.secondary.security_id,
                request.transaction_date,
            ),
        );
        outcome.record_refresh(base_refresh);
        outcome.record_refresh(class_a_refresh);
        outcome.record_refresh(secondary_refresh);

        self.events.publish(PostingEvent::new(
            PostingKind::Split,
            request.issuer_id,
            request.transaction_date,
            &outcome.entries,
            request.actor.clone(),
        ));
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SecondaryLabel, SecurityInfo};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn security(id: &str, name: &str) -> SecurityInfo {
        SecurityInfo {
            issuer_id: 1,
            security_id: id.to_string(),
            name: name.to_string(),
            authorized_shares: None,
        }
    }

    fn plan(units: u64, secondary_ratio: &str) -> SplitPlan {
        let config = SplitConfig {
            issuer_id: 1,
            triggering_kind: TransactionKind::Withdrawal,
            class_a_ratio: Decimal::ONE,
            secondary_ratio: Decimal::from_str(secondary_ratio).unwrap(),
            secondary_label: SecondaryLabel::Warrant,
        };
        let (class_a_quantity, secondary_quantity) = config.derive_quantities(units).unwrap();
        SplitPlan {
            securities: SplitSecurities {
                base: security("U", "Units"),
                class_a: security("A", "Class A Ordinary"),
                secondary: security("W", "Warrants"),
            },
            config,
            units,
            class_a_quantity,
            secondary_quantity,
        }
    }

    #[test]
    fn test_legs_share_date_and_correlation() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let request = SplitRequest::new(1, 10, 200, date);
        let correlation_id = Uuid::new_v4();

        let legs = plan(200, "0.5").legs(&request, correlation_id).unwrap();
        let signed: Vec<_> =
            legs.iter().map(|e| (e.security_id.as_str(), e.signed_quantity)).collect();
        assert_eq!(signed, vec![("U", -200), ("A", 200), ("W", 100)]);
        assert!(legs.iter().all(|e| e.transaction_date == date));
        assert!(legs.iter().all(|e| e.correlation_id == Some(correlation_id)));
        assert!(legs.iter().all(|e| e.note == legs[0].note));
        assert_eq!(legs[0].kind, TransactionKind::SplitDebit);
    }

    #[test]
    fn test_zero_derivative_leg_omitted() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let request = SplitRequest::new(1, 10, 1, date);
        let legs = plan(1, "0.5").legs(&request, Uuid::new_v4()).unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs.iter().all(|e| e.security_id != "W"));
    }
}
