//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::types::*;

/// Voucher state to write, together with the outstanding amount it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherUpdate {
    pub voucher: Voucher,
    pub expected_outstanding: BigDecimal,
}

/// Everything a single reconciliation writes.
///
/// Storage backends must apply a commit as one unit: when the stored transaction's
/// unallocated amount differs from `expected_unallocated`, or any stored voucher's
/// outstanding amount differs from its `expected_outstanding`, nothing is written and
/// `ReconcileError::ConcurrentModification` is returned.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationCommit {
    pub transaction: BankTransaction,
    pub expected_unallocated: BigDecimal,
    pub vouchers: Vec<VoucherUpdate>,
}

/// Storage abstraction for the reconciliation system
///
/// This trait is the seam to the persistence layer of the host accounting
/// application (PostgreSQL, MariaDB, in-memory, etc.).
#[async_trait]
pub trait ReconciliationStorage: Send + Sync {
    /// Save a bank account
    async fn save_bank_account(&mut self, account: &BankAccount) -> ReconcileResult<()>;

    /// Get a bank account by ID
    async fn get_bank_account(&self, account_id: &str) -> ReconcileResult<Option<BankAccount>>;

    /// Save a new bank transaction
    async fn save_transaction(&mut self, transaction: &BankTransaction) -> ReconcileResult<()>;

    /// Get a bank transaction by ID
    async fn get_transaction(&self, transaction_id: &str)
        -> ReconcileResult<Option<BankTransaction>>;

    /// List the transactions of a bank account booked within a date range, in any order
    async fn get_bank_transactions(
        &self,
        bank_account_id: &str,
        date_range: &DateRange,
    ) -> ReconcileResult<Vec<BankTransaction>>;

    /// Save a new voucher
    async fn save_voucher(&mut self, voucher: &Voucher) -> ReconcileResult<()>;

    /// Get a voucher by type and ID
    async fn get_voucher(
        &self,
        voucher_type: VoucherType,
        voucher_id: &str,
    ) -> ReconcileResult<Option<Voucher>>;

    /// Overwrite an existing voucher
    async fn update_voucher(&mut self, voucher: &Voucher) -> ReconcileResult<()>;

    /// List the vouchers of a company in a currency that still have an outstanding amount
    async fn get_outstanding_vouchers(
        &self,
        company: &str,
        currency: &str,
    ) -> ReconcileResult<Vec<Voucher>>;

    /// Atomically apply a reconciliation, see [`AllocationCommit`]
    async fn commit_allocation(&mut self, commit: &AllocationCommit) -> ReconcileResult<()>;
}

/// Trait for implementing custom proposal validation rules
///
/// Called by the reconciler after the vouchers of a proposal have been loaded and
/// before anything is written.
pub trait ProposalValidator: Send + Sync {
    fn validate_proposal(
        &self,
        proposal: &MatchProposal,
        transaction: &BankTransaction,
        vouchers: &[Voucher],
    ) -> ReconcileResult<()>;
}

/// Default proposal validator: structural checks only
pub struct DefaultProposalValidator;

impl ProposalValidator for DefaultProposalValidator {
    fn validate_proposal(
        &self,
        proposal: &MatchProposal,
        _transaction: &BankTransaction,
        _vouchers: &[Voucher],
    ) -> ReconcileResult<()> {
        proposal.validate()
    }
}
