pub mod errors;
pub mod events;
pub mod position;
pub mod security;
pub mod split;
pub mod transaction;

pub use errors::{CacheRefreshFailure, LedgerError, SecurityRole};
pub use events::{EventLeg, PostingEvent, PostingKind};
pub use position::{PositionKey, PositionSnapshot};
pub use security::SecurityInfo;
pub use split::{floor_shares, SecondaryLabel, SplitConfig};
pub use transaction::{
    EntryId, EntryStatus, IssuerId, SecurityId, ShareholderId, TransactionEntry, TransactionKind,
    MAX_SECURITY_ID_LEN,
};
