use serde::{Deserialize, Serialize};

use crate::models::transaction::{IssuerId, SecurityId};

/// Security metadata as served by the security directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub issuer_id: IssuerId,
    pub security_id: SecurityId,
    /// Class name, e.g. "Units" or "Class A Ordinary Shares"
    pub name: String,
    /// Informational only; not enforced by the posting path
    #[serde(default)]
    pub authorized_shares: Option<u64>,
}

impl SecurityInfo {
    /// Case-insensitive naming-convention match
    pub fn matches_name(&self, convention: &str) -> bool {
        let convention = convention.trim().to_lowercase();
        !convention.is_empty() && self.name.to_lowercase().contains(&convention)
    }
}
