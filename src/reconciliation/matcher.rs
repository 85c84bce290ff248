//! Match decisions between a bank transaction and its voucher candidates

use bigdecimal::BigDecimal;

use crate::config::MatchingConfig;
use crate::types::*;

/// Decides whether, and how, a bank transaction should be linked to vouchers
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatchingConfig,
}

impl Matcher {
    /// Create a new matcher
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    /// Propose allocations for the transaction's unallocated amount.
    ///
    /// Candidates are expected in finder order. Rules, first hit wins:
    ///
    /// 1. equal reference and equal amount (after rounding): one voucher, [`Confidence::Exact`]
    /// 2. amount within tolerance: one voucher, [`Confidence::Fuzzy`]
    /// 3. vouchers related by reference, description or party: allocated largest
    ///    outstanding first until the transaction is exhausted, [`Confidence::Fuzzy`]
    ///
    /// Returns `None` when nothing is left to allocate or no rule applies.
    pub fn propose(
        &self,
        transaction: &BankTransaction,
        candidates: &[Candidate],
    ) -> Option<MatchProposal> {
        let remaining = &transaction.unallocated_amount;
        if *remaining <= BigDecimal::from(0) {
            return None;
        }

        if let Some(candidate) = candidates.iter().find(|c| {
            c.reference_match
                && self
                    .config
                    .amounts_equal(&c.voucher.outstanding_amount, remaining)
        }) {
            return Some(single(transaction, candidate, Confidence::Exact));
        }

        if let Some(candidate) = candidates.iter().find(|c| {
            self.config
                .within_tolerance(&c.voucher.outstanding_amount, remaining)
        }) {
            return Some(single(transaction, candidate, Confidence::Fuzzy));
        }

        self.propose_partial(transaction, candidates)
    }

    fn propose_partial(
        &self,
        transaction: &BankTransaction,
        candidates: &[Candidate],
    ) -> Option<MatchProposal> {
        let mut related: Vec<&Candidate> = candidates.iter().filter(|c| c.is_related()).collect();
        if related.is_empty() {
            return None;
        }

        // Stable sort keeps finder order among equal amounts
        related.sort_by(|a, b| {
            b.voucher
                .outstanding_amount
                .cmp(&a.voucher.outstanding_amount)
        });

        let zero = BigDecimal::from(0);
        let mut remaining = transaction.unallocated_amount.clone();
        let mut proposal = MatchProposal::new(transaction, Confidence::Fuzzy);

        for candidate in related {
            if remaining <= zero {
                break;
            }
            let amount =
                std::cmp::min(candidate.voucher.outstanding_amount.clone(), remaining.clone());
            remaining -= &amount;
            proposal = proposal.allocate(&candidate.voucher, amount);
        }

        Some(proposal)
    }
}

fn single(
    transaction: &BankTransaction,
    candidate: &Candidate,
    confidence: Confidence,
) -> MatchProposal {
    let amount = std::cmp::min(
        candidate.voucher.outstanding_amount.clone(),
        transaction.unallocated_amount.clone(),
    );
    MatchProposal::new(transaction, confidence).allocate(&candidate.voucher, amount)
}
