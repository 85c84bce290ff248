//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> ReconcileResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ReconcileError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that a required filter or field has been provided.
///
/// Returns the trimmed value.
pub fn validate_required<'a>(field: &str, value: Option<&'a str>) -> ReconcileResult<&'a str> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ReconcileError::Validation(format!("{} is required", field))),
    }
}

/// Validate an ISO 4217 currency code
pub fn validate_currency_code(currency: &str) -> ReconcileResult<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ReconcileError::Validation(format!(
            "'{}' is not a valid ISO 4217 currency code",
            currency
        )));
    }
    Ok(())
}

/// Trim and upper-case a reference number; blank references become `None`
pub fn normalize_reference(reference: Option<&str>) -> Option<String> {
    reference
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_uppercase)
}

/// Two references match when both are set and equal after normalization
pub fn references_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (normalize_reference(a), normalize_reference(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Whether a voucher reference is quoted somewhere in a statement description
pub fn reference_in_description(reference: Option<&str>, description: &str) -> bool {
    match normalize_reference(reference) {
        Some(reference) => description.to_uppercase().contains(&reference),
        None => false,
    }
}

/// Proposal validator that refuses to settle vouchers of different parties with one
/// bank transaction
pub struct SinglePartyProposalValidator;

impl ProposalValidator for SinglePartyProposalValidator {
    fn validate_proposal(
        &self,
        proposal: &MatchProposal,
        _transaction: &BankTransaction,
        vouchers: &[Voucher],
    ) -> ReconcileResult<()> {
        proposal.validate()?;

        let mut parties = vouchers.iter().filter_map(|v| v.party.as_ref());
        if let Some(first) = parties.next() {
            if let Some(other) = parties.find(|p| *p != first) {
                return Err(ReconcileError::Validation(format!(
                    "Vouchers belong to different parties ({} and {})",
                    first.name, other.name
                )));
            }
        }

        Ok(())
    }
}
