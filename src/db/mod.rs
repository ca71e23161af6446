pub mod memory;
pub mod scylla_store;
pub mod sled_store;
pub mod traits;

pub use memory::{MemoryLedgerDb, MemorySnapshotDb};
pub use scylla_store::{ScyllaLedgerDb, ScyllaSnapshotDb};
pub use sled_store::{SledLedgerDb, SledSnapshotDb};
pub use traits::{LedgerDb, SnapshotDb};
