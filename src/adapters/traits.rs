//! Collaborator traits
//!
//! The ledger core only consumes these; owning and editing the data behind
//! them happens elsewhere.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    IssuerId, PostingEvent, SecurityInfo, ShareholderId, SplitConfig, TransactionKind,
};

/// Security metadata lookup
#[async_trait]
pub trait SecurityDirectory: Send + Sync {
    async fn get(&self, issuer_id: IssuerId, security_id: &str) -> Result<Option<SecurityInfo>>;

    /// Every security of an issuer, in directory order
    async fn list(&self, issuer_id: IssuerId) -> Result<Vec<SecurityInfo>>;
}

#[async_trait]
pub trait ShareholderDirectory: Send + Sync {
    async fn exists(&self, issuer_id: IssuerId, shareholder_id: ShareholderId) -> Result<bool>;
}

/// Split rate table, read-only from the engine's side
#[async_trait]
pub trait SplitConfigSource: Send + Sync {
    async fn get(
        &self,
        issuer_id: IssuerId,
        triggering_kind: TransactionKind,
    ) -> Result<Option<SplitConfig>>;
}

/// Audit/notification hand-off.
///
/// Fire-and-forget: implementations must not block and must not fail the
/// posting that produced the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: PostingEvent);

    /// Get sink name for logging
    fn name(&self) -> &str;
}
