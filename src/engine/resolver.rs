//! Finds the three securities of a split by naming convention

use serde::Serialize;
use std::sync::Arc;

use crate::adapters::SecurityDirectory;
use crate::configure::SplitNamingConfig;
use crate::models::{IssuerId, LedgerError, SecondaryLabel, SecurityInfo, SecurityRole};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitSecurities {
    pub base: SecurityInfo,
    pub class_a: SecurityInfo,
    pub secondary: SecurityInfo,
}

#[derive(Clone)]
pub struct SecurityResolver {
    directory: Arc<dyn SecurityDirectory>,
    naming: SplitNamingConfig,
}

impl SecurityResolver {
    pub fn new(directory: Arc<dyn SecurityDirectory>, naming: SplitNamingConfig) -> Self {
        Self { directory, naming }
    }

    /// Look up a security named directly by a posting
    pub async fn resolve_id(
        &self,
        issuer_id: IssuerId,
        security_id: &str,
    ) -> Result<SecurityInfo, LedgerError> {
        self.directory
            .get(issuer_id, security_id)
            .await
            .map_err(LedgerError::store)?
            .ok_or_else(|| LedgerError::SecurityNotFound {
                role: SecurityRole::Posting,
                search: security_id.to_string(),
            })
    }

    /// Resolve base, class A and the Right/Warrant security of an issuer.
    ///
    /// Each role tries its names in configured order; the first security
    /// matching a name wins. A security picked for one role is not
    /// considered for the next.
    pub async fn resolve_split(
        &self,
        issuer_id: IssuerId,
        label: SecondaryLabel,
    ) -> Result<SplitSecurities, LedgerError> {
        let securities = self.directory.list(issuer_id).await.map_err(LedgerError::store)?;

        let base = pick(&securities, &self.naming.base_names, &[], SecurityRole::Base)?;
        let class_a = pick(
            &securities,
            &self.naming.class_a_names,
            &[&base.security_id],
            SecurityRole::ClassA,
        )?;
        let secondary_names = match label {
            SecondaryLabel::Right => &self.naming.right_names,
            SecondaryLabel::Warrant => &self.naming.warrant_names,
        };
        let secondary = pick(
            &securities,
            secondary_names,
            &[&base.security_id, &class_a.security_id],
            SecurityRole::Secondary,
        )?;

        log::debug!(
            "Issuer {} split securities: base={} class_a={} {}={}",
            issuer_id,
            base.security_id,
            class_a.security_id,
            label,
            secondary.security_id
        );
        Ok(SplitSecurities { base, class_a, secondary })
    }
}

fn pick(
    securities: &[SecurityInfo],
    names: &[String],
    taken: &[&String],
    role: SecurityRole,
) -> Result<SecurityInfo, LedgerError> {
    names
        .iter()
        .find_map(|name| {
            securities
                .iter()
                .filter(|s| !taken.contains(&&s.security_id))
                .find(|s| s.matches_name(name))
        })
        .cloned()
        .ok_or_else(|| LedgerError::SecurityNotFound {
            role,
            search: names.join(" | "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticDirectory;

    fn security(id: &str, name: &str) -> SecurityInfo {
        SecurityInfo {
            issuer_id: 1,
            security_id: id.to_string(),
            name: name.to_string(),
            authorized_shares: None,
        }
    }

    fn resolver(securities: &[SecurityInfo]) -> SecurityResolver {
        let directory = StaticDirectory::new();
        for s in securities {
            directory.add_security(s.clone());
        }
        SecurityResolver::new(Arc::new(directory), SplitNamingConfig::default())
    }

    #[tokio::test]
    async fn test_resolves_by_label() {
        let resolver = resolver(&[
            security("U", "Units"),
            security("A", "Class A Ordinary Shares"),
            security("W", "Redeemable Warrants"),
            security("R", "Rights"),
        ]);

        let warrant = resolver.resolve_split(1, SecondaryLabel::Warrant).await.unwrap();
        assert_eq!(warrant.base.security_id, "U");
        assert_eq!(warrant.class_a.security_id, "A");
        assert_eq!(warrant.secondary.security_id, "W");

        let right = resolver.resolve_split(1, SecondaryLabel::Right).await.unwrap();
        assert_eq!(right.secondary.security_id, "R");
    }

    #[tokio::test]
    async fn test_class_a_fallback_order() {
        // No "Class A Ordinary"; "Class A Common" is next in line
        let resolver = resolver(&[
            security("U", "Units"),
            security("AX", "Class A Preferred"),
            security("AC", "Class A Common Stock"),
            security("W", "Warrants"),
        ]);
        let resolved = resolver.resolve_split(1, SecondaryLabel::Warrant).await.unwrap();
        assert_eq!(resolved.class_a.security_id, "AC");
    }

    #[tokio::test]
    async fn test_missing_role_reported() {
        let resolver = resolver(&[security("U", "Units"), security("A", "Class A Ordinary")]);
        let err = resolver.resolve_split(1, SecondaryLabel::Right).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::SecurityNotFound {
                role: SecurityRole::Secondary,
                search: "Right".to_string()
            }
        );

        let err = resolver.resolve_id(1, "NOPE").await.unwrap_err();
        assert!(matches!(err, LedgerError::SecurityNotFound { role: SecurityRole::Posting, .. }));
    }
}
