pub mod adapters;
pub mod common_utils;
pub mod configure;
pub mod db;
pub mod engine;
pub mod ledger_store;
pub mod logger;
pub mod logging;
pub mod models;

pub use engine::{CapTable, Collaborators};
pub use ledger_store::LedgerStore;
pub use models::LedgerError;
