//! Turning decoded statement entries into bank transactions

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::utils::validation::validate_positive_amount;

/// Credit/debit indicator of a statement entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditDebit {
    /// `CRDT`: money received
    Credit,
    /// `DBIT`: money paid out
    Debit,
}

impl CreditDebit {
    pub fn direction(&self) -> Direction {
        match self {
            CreditDebit::Credit => Direction::Deposit,
            CreditDebit::Debit => Direction::Withdrawal,
        }
    }
}

impl FromStr for CreditDebit {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CRDT" => Ok(CreditDebit::Credit),
            "DBIT" => Ok(CreditDebit::Debit),
            other => Err(ReconcileError::Validation(format!(
                "Unknown credit/debit indicator '{}'",
                other
            ))),
        }
    }
}

/// One booked entry of a decoded bank statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub booking_date: NaiveDate,
    /// Absolute amount as printed on the statement
    pub amount: BigDecimal,
    pub indicator: CreditDebit,
    /// Entry currency; the bank account currency is assumed when absent
    pub currency: Option<String>,
    /// Structured creditor reference (e.g. QR or RF reference)
    pub creditor_reference: Option<String>,
    /// Reference assigned by the account servicing bank
    pub servicer_reference: Option<String>,
    /// Free text shown as the transaction description
    pub additional_info: Option<String>,
}

impl StatementEntry {
    /// Creditor reference, or the servicer reference when there is none
    pub fn reference(&self) -> Option<String> {
        non_blank(self.creditor_reference.as_deref())
            .or_else(|| non_blank(self.servicer_reference.as_deref()))
    }

    /// Convert into an unreconciled bank transaction on `bank_account`
    pub fn into_transaction(
        &self,
        id: String,
        bank_account: &BankAccount,
    ) -> ReconcileResult<BankTransaction> {
        validate_positive_amount(&self.amount)?;

        if let Some(currency) = &self.currency {
            if *currency != bank_account.currency {
                return Err(ReconcileError::Validation(format!(
                    "Entry currency {} does not match bank account currency {}",
                    currency, bank_account.currency
                )));
            }
        }

        let transaction = BankTransaction::new(
            id,
            bank_account,
            self.booking_date,
            self.indicator.direction(),
            self.amount.clone(),
            self.additional_info.clone().unwrap_or_default(),
        );

        Ok(match self.reference() {
            Some(reference) => transaction.with_reference(reference),
            None => transaction,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// An entry that could not be imported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntry {
    /// Position of the entry in the statement
    pub index: usize,
    pub reason: ReconcileError,
}

/// Outcome of a statement import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    /// IDs of the created bank transactions, in statement order
    pub imported: Vec<String>,
    pub rejected: Vec<RejectedEntry>,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        if self.rejected.is_empty() {
            format!("{} transactions imported", self.imported.len())
        } else {
            format!(
                "{} transactions imported, {} entries rejected",
                self.imported.len(),
                self.rejected.len()
            )
        }
    }
}
