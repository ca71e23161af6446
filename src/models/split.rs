//! Split (unit conversion) rate table entries

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::errors::LedgerError;
use crate::models::transaction::{IssuerId, TransactionKind};

/// Label of the second derivative security. Picks a naming convention only.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SecondaryLabel {
    Right,
    Warrant,
}

/// Per-issuer conversion rates, keyed by the triggering kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub issuer_id: IssuerId,
    #[serde(default = "default_trigger")]
    pub triggering_kind: TransactionKind,
    /// Class A shares issued per unit converted
    pub class_a_ratio: Decimal,
    /// Right/Warrant shares issued per unit converted
    pub secondary_ratio: Decimal,
    pub secondary_label: SecondaryLabel,
}

fn default_trigger() -> TransactionKind {
    TransactionKind::Withdrawal
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.class_a_ratio.is_sign_negative() || self.secondary_ratio.is_sign_negative() {
            return Err(LedgerError::Validation(format!(
                "split ratios for issuer {} must be non-negative (class_a={}, secondary={})",
                self.issuer_id, self.class_a_ratio, self.secondary_ratio
            )));
        }
        Ok(())
    }

    /// Derivative quantities for `base` units: (class A, secondary)
    pub fn derive_quantities(&self, base: u64) -> Result<(u64, u64), LedgerError> {
        self.validate()?;
        Ok((
            floor_shares(base, self.class_a_ratio)?,
            floor_shares(base, self.secondary_ratio)?,
        ))
    }
}

/// `floor(quantity * ratio)`; fractional shares are never issued
pub fn floor_shares(quantity: u64, ratio: Decimal) -> Result<u64, LedgerError> {
    let product = Decimal::from(quantity)
        .checked_mul(ratio)
        .ok_or_else(|| LedgerError::Validation(format!("{} x {} overflows", quantity, ratio)))?;
    product
        .floor()
        .to_u64()
        .ok_or_else(|| LedgerError::Validation(format!("{} x {} is out of range", quantity, ratio)))
}
