//! Applying match proposals

use tracing::{info, warn};

use crate::traits::*;
use crate::types::*;

/// Applies match proposals atomically, revalidating against current state first
pub struct Reconciler<S: ReconciliationStorage> {
    storage: S,
    validator: Box<dyn ProposalValidator>,
}

impl<S: ReconciliationStorage> Reconciler<S> {
    /// Create a new reconciler with a proposal validator
    pub fn with_validator(storage: S, validator: Box<dyn ProposalValidator>) -> Self {
        Self { storage, validator }
    }

    /// Apply a proposal.
    ///
    /// Either every allocation is written or none is. Fails with
    /// `ConcurrentModification` when the transaction or a voucher no longer looks
    /// the way it did when the proposal was built, and with `OverAllocation` when
    /// an allocation exceeds what the transaction or a voucher has left.
    pub async fn apply(&mut self, proposal: &MatchProposal) -> ReconcileResult<Reconciliation> {
        proposal.validate()?;

        let transaction = self
            .storage
            .get_transaction(&proposal.transaction_id)
            .await?
            .ok_or_else(|| ReconcileError::TransactionNotFound(proposal.transaction_id.clone()))?;

        if transaction.unallocated_amount != proposal.expected_unallocated {
            warn!(
                transaction_id = %transaction.id,
                expected = %proposal.expected_unallocated,
                actual = %transaction.unallocated_amount,
                "Bank transaction changed since the proposal was built"
            );
            return Err(ReconcileError::ConcurrentModification(format!(
                "bank transaction {} changed: unallocated is {}, expected {}",
                transaction.id, transaction.unallocated_amount, proposal.expected_unallocated
            )));
        }

        let total = proposal.total_amount();
        if total > transaction.unallocated_amount {
            return Err(ReconcileError::OverAllocation {
                target: format!("bank transaction {}", transaction.id),
                requested: total,
                available: transaction.unallocated_amount.clone(),
            });
        }

        let mut vouchers = Vec::with_capacity(proposal.allocations.len());
        for allocation in &proposal.allocations {
            let voucher = self
                .storage
                .get_voucher(allocation.voucher_type, &allocation.voucher_id)
                .await?
                .ok_or_else(|| {
                    ReconcileError::VoucherNotFound(format!(
                        "{} {}",
                        allocation.voucher_type, allocation.voucher_id
                    ))
                })?;

            if voucher.outstanding_amount != allocation.expected_outstanding {
                warn!(
                    transaction_id = %transaction.id,
                    voucher_id = %voucher.id,
                    expected = %allocation.expected_outstanding,
                    actual = %voucher.outstanding_amount,
                    "Voucher changed since the proposal was built"
                );
                return Err(ReconcileError::ConcurrentModification(format!(
                    "{} {} changed: outstanding is {}, expected {}",
                    voucher.voucher_type,
                    voucher.id,
                    voucher.outstanding_amount,
                    allocation.expected_outstanding
                )));
            }

            if allocation.amount > voucher.outstanding_amount {
                return Err(ReconcileError::OverAllocation {
                    target: format!("{} {}", voucher.voucher_type, voucher.id),
                    requested: allocation.amount.clone(),
                    available: voucher.outstanding_amount.clone(),
                });
            }

            if voucher.company != transaction.company || voucher.currency != transaction.currency {
                return Err(ReconcileError::Validation(format!(
                    "{} {} is not in company {} / currency {}",
                    voucher.voucher_type, voucher.id, transaction.company, transaction.currency
                )));
            }

            vouchers.push(voucher);
        }

        self.validator
            .validate_proposal(proposal, &transaction, &vouchers)?;

        // Work on copies so a failure below leaves nothing half-applied
        let mut updated_transaction = transaction.clone();
        let mut updates = Vec::with_capacity(vouchers.len());
        for (allocation, voucher) in proposal.allocations.iter().zip(vouchers) {
            let expected_outstanding = voucher.outstanding_amount.clone();
            let mut updated_voucher = voucher;
            updated_voucher.settle(&allocation.amount)?;
            updated_transaction.allocate(
                allocation.voucher_type,
                &allocation.voucher_id,
                &allocation.amount,
            )?;
            updates.push(VoucherUpdate {
                voucher: updated_voucher,
                expected_outstanding,
            });
        }
        updated_transaction.validate()?;

        let commit = AllocationCommit {
            transaction: updated_transaction,
            expected_unallocated: transaction.unallocated_amount.clone(),
            vouchers: updates,
        };
        self.storage.commit_allocation(&commit).await?;

        info!(
            transaction_id = %commit.transaction.id,
            allocated = %total,
            unallocated = %commit.transaction.unallocated_amount,
            status = ?commit.transaction.status,
            vouchers = commit.vouchers.len(),
            "Applied reconciliation"
        );

        Ok(Reconciliation {
            transaction: commit.transaction,
            vouchers: commit.vouchers.into_iter().map(|u| u.voucher).collect(),
        })
    }
}
