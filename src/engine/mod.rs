pub mod locks;
pub mod outcome;
pub mod posting;
pub mod replay;
pub mod resolver;
pub mod snapshot;
pub mod split;
pub mod validator;

use std::sync::Arc;

pub use locks::PairLocks;
pub use outcome::{OutcomeSummary, PostingOutcome};
pub use posting::{PostingRequest, PostingService, TransferRequest};
pub use replay::{replay, running_balances, PositionEngine};
pub use resolver::{SecurityResolver, SplitSecurities};
pub use snapshot::{SnapshotCache, SnapshotDivergence};
pub use split::{SplitOrchestrator, SplitPlan, SplitRequest};
pub use validator::BalanceValidator;

use crate::adapters::{EventSink, SecurityDirectory, ShareholderDirectory, SplitConfigSource};
use crate::configure::SplitNamingConfig;
use crate::db::{LedgerDb, SnapshotDb};
use crate::ledger_store::LedgerStore;

/// Collaborators the engine reads from or hands events to
pub struct Collaborators {
    pub securities: Arc<dyn SecurityDirectory>,
    pub shareholders: Arc<dyn ShareholderDirectory>,
    pub split_configs: Arc<dyn SplitConfigSource>,
    pub events: Arc<dyn EventSink>,
}

/// Every component wired over one ledger and one snapshot store.
///
/// Posting and split flows share the same validator, cache and pair locks.
#[derive(Clone)]
pub struct CapTable {
    pub ledger: LedgerStore,
    pub engine: PositionEngine,
    pub validator: BalanceValidator,
    pub snapshots: SnapshotCache,
    pub postings: PostingService,
    pub splits: SplitOrchestrator,
}

impl CapTable {
    pub fn new(
        ledger_db: Arc<dyn LedgerDb>,
        snapshot_db: Arc<dyn SnapshotDb>,
        collaborators: Collaborators,
        naming: SplitNamingConfig,
    ) -> Self {
        log::info!(
            "Cap table over {} ledger, {} snapshots, {} events",
            ledger_db.name(),
            snapshot_db.name(),
            collaborators.events.name()
        );

        let ledger = LedgerStore::new(ledger_db);
        let engine = PositionEngine::new(ledger.clone());
        let validator = BalanceValidator::new(engine.clone());
        let snapshots = SnapshotCache::new(engine.clone(), snapshot_db);
        let resolver = SecurityResolver::new(collaborators.securities, naming);
        let locks = PairLocks::new();

        let postings = PostingService::new(
            ledger.clone(),
            validator.clone(),
            snapshots.clone(),
            resolver.clone(),
            collaborators.shareholders.clone(),
            locks.clone(),
            collaborators.events.clone(),
        );
        let splits = SplitOrchestrator::new(
            ledger.clone(),
            validator.clone(),
            snapshots.clone(),
            resolver,
            collaborators.split_configs,
            collaborators.shareholders,
            locks,
            collaborators.events,
        );

        Self {
            ledger,
            engine,
            validator,
            snapshots,
            postings,
            splits,
        }
    }
}
