//! In-memory directory of securities, shareholders and split rates
//!
//! Stands in for the external directories: tests build it by hand, the CLI
//! loads it from a JSON registry file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::traits::{SecurityDirectory, ShareholderDirectory, SplitConfigSource};
use crate::models::{
    IssuerId, SecurityInfo, ShareholderId, SplitConfig, TransactionKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareholderRecord {
    pub issuer_id: IssuerId,
    pub shareholder_id: ShareholderId,
    #[serde(default)]
    pub name: Option<String>,
}

/// On-disk registry layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub securities: Vec<SecurityInfo>,
    #[serde(default)]
    pub shareholders: Vec<ShareholderRecord>,
    #[serde(default)]
    pub split_configs: Vec<SplitConfig>,
}

#[derive(Default)]
struct Inner {
    securities: Vec<SecurityInfo>,
    shareholders: HashSet<(IssuerId, ShareholderId)>,
    split_configs: Vec<SplitConfig>,
}

#[derive(Default)]
pub struct StaticDirectory {
    inner: RwLock<Inner>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_registry(registry: RegistryFile) -> Self {
        let directory = Self::new();
        for security in registry.securities {
            directory.add_security(security);
        }
        for holder in registry.shareholders {
            directory.add_shareholder(holder.issuer_id, holder.shareholder_id);
        }
        for config in registry.split_configs {
            directory.set_split_config(config);
        }
        directory
    }

    /// Load from a JSON registry file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry {}", path.display()))?;
        let registry: RegistryFile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse registry {}", path.display()))?;
        Ok(Self::from_registry(registry))
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace a security (keyed by issuer + security id)
    pub fn add_security(&self, security: SecurityInfo) {
        let mut inner = self.write();
        inner.securities.retain(|s| {
            !(s.issuer_id == security.issuer_id && s.security_id == security.security_id)
        });
        inner.securities.push(security);
    }

    pub fn add_shareholder(&self, issuer_id: IssuerId, shareholder_id: ShareholderId) {
        self.write().shareholders.insert((issuer_id, shareholder_id));
    }

    pub fn remove_shareholder(&self, issuer_id: IssuerId, shareholder_id: ShareholderId) {
        self.write().shareholders.remove(&(issuer_id, shareholder_id));
    }

    /// Add or replace the rate for (issuer, triggering kind)
    pub fn set_split_config(&self, config: SplitConfig) {
        let mut inner = self.write();
        inner.split_configs.retain(|c| {
            !(c.issuer_id == config.issuer_id && c.triggering_kind == config.triggering_kind)
        });
        inner.split_configs.push(config);
    }
}

#[async_trait]
impl SecurityDirectory for StaticDirectory {
    async fn get(&self, issuer_id: IssuerId, security_id: &str) -> Result<Option<SecurityInfo>> {
        Ok(self
            .read()
            .securities
            .iter()
            .find(|s| s.issuer_id == issuer_id && s.security_id == security_id)
            .cloned())
    }

    async fn list(&self, issuer_id: IssuerId) -> Result<Vec<SecurityInfo>> {
        Ok(self
            .read()
            .securities
            .iter()
            .filter(|s| s.issuer_id == issuer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ShareholderDirectory for StaticDirectory {
    async fn exists(&self, issuer_id: IssuerId, shareholder_id: ShareholderId) -> Result<bool> {
        Ok(self.read().shareholders.contains(&(issuer_id, shareholder_id)))
    }
}

#[async_trait]
impl SplitConfigSource for StaticDirectory {
    async fn get(
        &self,
        issuer_id: IssuerId,
        triggering_kind: TransactionKind,
    ) -> Result<Option<SplitConfig>> {
        Ok(self
            .read()
            .split_configs
            .iter()
            .find(|c| c.issuer_id == issuer_id && c.triggering_kind == triggering_kind)
            .cloned())
    }
}
