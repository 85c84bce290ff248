//! Access to the bank transactions that still need reconciling

use tracing::debug;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_required;

/// Sort order for listed bank transactions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionOrder {
    #[default]
    DateAscending,
    DateDescending,
}

/// Transaction store for reading and recording bank transactions
pub struct TransactionStore<S: ReconciliationStorage> {
    pub(crate) storage: S,
}

impl<S: ReconciliationStorage> TransactionStore<S> {
    /// Create a new transaction store
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Get a bank account by ID, returning an error if not found
    pub async fn get_bank_account_required(
        &self,
        account_id: &str,
    ) -> ReconcileResult<BankAccount> {
        self.storage
            .get_bank_account(account_id)
            .await?
            .ok_or_else(|| ReconcileError::BankAccountNotFound(account_id.to_string()))
    }

    /// Get a bank transaction by ID, returning an error if not found
    pub async fn get_transaction_required(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<BankTransaction> {
        self.storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| ReconcileError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Unreconciled and partially reconciled transactions of a bank account, oldest first
    pub async fn list_transactions(
        &self,
        bank_account: Option<&str>,
        date_range: &DateRange,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        self.list_transactions_ordered(bank_account, date_range, TransactionOrder::default())
            .await
    }

    /// Unreconciled and partially reconciled transactions of a bank account
    pub async fn list_transactions_ordered(
        &self,
        bank_account: Option<&str>,
        date_range: &DateRange,
        order: TransactionOrder,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        let bank_account = validate_required("Bank account", bank_account)?;
        date_range.validate()?;

        let account = self.get_bank_account_required(bank_account).await?;

        let mut transactions: Vec<BankTransaction> = self
            .storage
            .get_bank_transactions(&account.id, date_range)
            .await?
            .into_iter()
            .filter(|txn| !txn.is_reconciled() && txn.has_unallocated())
            .collect();

        transactions.sort_by(|a, b| match order {
            TransactionOrder::DateAscending => a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)),
            TransactionOrder::DateDescending => b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)),
        });

        debug!(
            bank_account = %account.id,
            count = transactions.len(),
            "Listed open bank transactions"
        );

        Ok(transactions)
    }

    /// Record a newly imported transaction
    pub async fn record_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<()> {
        transaction.validate()?;

        if self.storage.get_transaction(&transaction.id).await?.is_some() {
            return Err(ReconcileError::Validation(format!(
                "Bank transaction with ID '{}' already exists",
                transaction.id
            )));
        }

        self.storage.save_transaction(transaction).await
    }
}
