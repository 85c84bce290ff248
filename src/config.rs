//! Matching configuration

use bigdecimal::BigDecimal;
use serde::Deserialize;

use crate::types::*;

/// Tolerances and limits used by the candidate finder, matcher and auto-reconcile.
///
/// Every field has a default, so a TOML document only needs the keys it overrides:
///
/// ```toml
/// rounding_precision = 2
/// amount_tolerance = "0.05"
/// max_date_distance_days = 60
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingConfig {
    /// Decimal places amounts are rounded to before they are compared for equality
    pub rounding_precision: u32,
    /// Largest absolute difference for which an amount still counts as matching
    pub amount_tolerance: BigDecimal,
    /// Upper bound on the number of candidates returned per transaction
    pub max_results: usize,
    /// Drop vouchers whose effective date is further away than this from the transaction
    pub max_date_distance_days: Option<u32>,
    /// How often auto-reconcile retries a transaction after a concurrent modification
    pub concurrency_retries: u32,
    /// Voucher types considered by default
    pub document_types: Vec<VoucherType>,
    /// Voucher types considered by auto-reconcile
    pub auto_document_types: Vec<VoucherType>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            rounding_precision: 2,
            amount_tolerance: BigDecimal::from(0),
            max_results: 150,
            max_date_distance_days: None,
            concurrency_retries: 1,
            document_types: vec![
                VoucherType::PaymentEntry,
                VoucherType::JournalEntry,
                VoucherType::SalesInvoice,
                VoucherType::PurchaseInvoice,
            ],
            auto_document_types: vec![VoucherType::PaymentEntry, VoucherType::JournalEntry],
        }
    }
}

impl MatchingConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(input: &str) -> ReconcileResult<Self> {
        let config: MatchingConfig =
            toml::from_str(input).map_err(|e| ReconcileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        if self.rounding_precision > 8 {
            return Err(ReconcileError::Config(format!(
                "rounding_precision must be at most 8, got {}",
                self.rounding_precision
            )));
        }

        if self.amount_tolerance < BigDecimal::from(0) {
            return Err(ReconcileError::Config(format!(
                "amount_tolerance cannot be negative, got {}",
                self.amount_tolerance
            )));
        }

        if self.max_results == 0 {
            return Err(ReconcileError::Config(
                "max_results must be at least 1".to_string(),
            ));
        }

        if self.document_types.is_empty() {
            return Err(ReconcileError::Config(
                "document_types cannot be empty".to_string(),
            ));
        }

        if self.auto_document_types.is_empty() {
            return Err(ReconcileError::Config(
                "auto_document_types cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Round an amount to the configured currency precision
    pub fn round(&self, amount: &BigDecimal) -> BigDecimal {
        amount.round(i64::from(self.rounding_precision))
    }

    /// Amounts are equal once rounded to the currency precision
    pub fn amounts_equal(&self, a: &BigDecimal, b: &BigDecimal) -> bool {
        self.round(a) == self.round(b)
    }

    /// Amounts are equal, or differ by no more than `amount_tolerance`
    pub fn within_tolerance(&self, a: &BigDecimal, b: &BigDecimal) -> bool {
        self.amounts_equal(a, b) || (a - b).abs() <= self.amount_tolerance
    }

    /// Reject amounts with more decimal places than the currency precision.
    ///
    /// Amounts entering the engine must be representable at that precision, so
    /// two amounts that compare equal after rounding are equal outright.
    pub fn validate_precision(&self, amount: &BigDecimal) -> ReconcileResult<()> {
        if self.round(amount) != *amount {
            return Err(ReconcileError::Validation(format!(
                "Amount {} has more than {} decimal places",
                amount, self.rounding_precision
            )));
        }
        Ok(())
    }
}
