//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

type VoucherKey = (VoucherType, String);

/// In-memory storage implementation for testing and development
///
/// Clones share the same underlying maps.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bank_accounts: Arc<RwLock<HashMap<String, BankAccount>>>,
    transactions: Arc<RwLock<HashMap<String, BankTransaction>>>,
    vouchers: Arc<RwLock<HashMap<VoucherKey, Voucher>>>,
}

fn read<T>(lock: &RwLock<T>) -> ReconcileResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| ReconcileError::Storage("storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> ReconcileResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| ReconcileError::Storage("storage lock poisoned".to_string()))
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            bank_accounts: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            vouchers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> ReconcileResult<()> {
        write(&self.bank_accounts)?.clear();
        write(&self.transactions)?.clear();
        write(&self.vouchers)?.clear();
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReconciliationStorage for MemoryStorage {
    async fn save_bank_account(&mut self, account: &BankAccount) -> ReconcileResult<()> {
        write(&self.bank_accounts)?.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_bank_account(&self, account_id: &str) -> ReconcileResult<Option<BankAccount>> {
        Ok(read(&self.bank_accounts)?.get(account_id).cloned())
    }

    async fn save_transaction(&mut self, transaction: &BankTransaction) -> ReconcileResult<()> {
        let mut transactions = write(&self.transactions)?;
        if transactions.contains_key(&transaction.id) {
            return Err(ReconcileError::Storage(format!(
                "Bank transaction {} already exists",
                transaction.id
            )));
        }
        transactions.insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>> {
        Ok(read(&self.transactions)?.get(transaction_id).cloned())
    }

    async fn get_bank_transactions(
        &self,
        bank_account_id: &str,
        date_range: &DateRange,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        let transactions = read(&self.transactions)?;
        let filtered: Vec<BankTransaction> = transactions
            .values()
            .filter(|txn| txn.bank_account_id == bank_account_id && date_range.contains(txn.date))
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn save_voucher(&mut self, voucher: &Voucher) -> ReconcileResult<()> {
        let mut vouchers = write(&self.vouchers)?;
        let key = (voucher.voucher_type, voucher.id.clone());
        if vouchers.contains_key(&key) {
            return Err(ReconcileError::Storage(format!(
                "{} {} already exists",
                voucher.voucher_type, voucher.id
            )));
        }
        vouchers.insert(key, voucher.clone());
        Ok(())
    }

    async fn get_voucher(
        &self,
        voucher_type: VoucherType,
        voucher_id: &str,
    ) -> ReconcileResult<Option<Voucher>> {
        Ok(read(&self.vouchers)?
            .get(&(voucher_type, voucher_id.to_string()))
            .cloned())
    }

    async fn update_voucher(&mut self, voucher: &Voucher) -> ReconcileResult<()> {
        let mut vouchers = write(&self.vouchers)?;
        match vouchers.get_mut(&(voucher.voucher_type, voucher.id.clone())) {
            Some(existing) => {
                *existing = voucher.clone();
                Ok(())
            }
            None => Err(ReconcileError::VoucherNotFound(format!(
                "{} {}",
                voucher.voucher_type, voucher.id
            ))),
        }
    }

    async fn get_outstanding_vouchers(
        &self,
        company: &str,
        currency: &str,
    ) -> ReconcileResult<Vec<Voucher>> {
        let vouchers = read(&self.vouchers)?;
        let zero = bigdecimal::BigDecimal::from(0);
        let filtered: Vec<Voucher> = vouchers
            .values()
            .filter(|v| {
                v.company == company && v.currency == currency && v.outstanding_amount > zero
            })
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn commit_allocation(&mut self, commit: &AllocationCommit) -> ReconcileResult<()> {
        // Lock order: transactions, then vouchers
        let mut transactions = write(&self.transactions)?;
        let mut vouchers = write(&self.vouchers)?;

        let stored = transactions
            .get(&commit.transaction.id)
            .ok_or_else(|| ReconcileError::TransactionNotFound(commit.transaction.id.clone()))?;
        if stored.unallocated_amount != commit.expected_unallocated {
            return Err(ReconcileError::ConcurrentModification(format!(
                "bank transaction {} changed: unallocated is {}, expected {}",
                stored.id, stored.unallocated_amount, commit.expected_unallocated
            )));
        }

        for update in &commit.vouchers {
            let key = (update.voucher.voucher_type, update.voucher.id.clone());
            let stored = vouchers.get(&key).ok_or_else(|| {
                ReconcileError::VoucherNotFound(format!(
                    "{} {}",
                    update.voucher.voucher_type, update.voucher.id
                ))
            })?;
            if stored.outstanding_amount != update.expected_outstanding {
                return Err(ReconcileError::ConcurrentModification(format!(
                    "{} {} changed: outstanding is {}, expected {}",
                    stored.voucher_type,
                    stored.id,
                    stored.outstanding_amount,
                    update.expected_outstanding
                )));
            }
        }

        // All checks passed; nothing below can fail
        transactions.insert(commit.transaction.id.clone(), commit.transaction.clone());
        for update in &commit.vouchers {
            vouchers.insert(
                (update.voucher.voucher_type, update.voucher.id.clone()),
                update.voucher.clone(),
            );
        }

        Ok(())
    }
}
