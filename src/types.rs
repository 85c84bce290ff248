//! Core types and data structures for bank reconciliation

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Direction of money movement on the bank account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Money received on the account (camt `CRDT`)
    Deposit,
    /// Money paid out of the account (camt `DBIT`)
    Withdrawal,
}

impl Direction {
    /// Payment type a voucher must have to settle a transaction in this direction
    pub fn payment_type(&self) -> PaymentType {
        match self {
            Direction::Deposit => PaymentType::Receive,
            Direction::Withdrawal => PaymentType::Pay,
        }
    }
}

/// Payment type of a voucher, seen from the bank account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    Receive,
    Pay,
}

/// Reconciliation state of a bank transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Nothing allocated yet
    Unreconciled,
    /// Partially allocated
    Matched,
    /// Fully allocated
    Reconciled,
}

/// Kinds of accounting documents a bank transaction can be reconciled against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    PaymentEntry,
    JournalEntry,
    SalesInvoice,
    PurchaseInvoice,
    ExpenseClaim,
}

impl VoucherType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherType::PaymentEntry => "Payment Entry",
            VoucherType::JournalEntry => "Journal Entry",
            VoucherType::SalesInvoice => "Sales Invoice",
            VoucherType::PurchaseInvoice => "Purchase Invoice",
            VoucherType::ExpenseClaim => "Expense Claim",
        }
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document status of a voucher. Only submitted vouchers take part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherStatus {
    Draft,
    Submitted,
}

/// Kind of counterparty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyType {
    Customer,
    Supplier,
    Employee,
}

/// Counterparty of a transaction or voucher
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    pub party_type: PartyType,
    pub name: String,
}

impl Party {
    pub fn new(party_type: PartyType, name: impl Into<String>) -> Self {
        Self {
            party_type,
            name: name.into(),
        }
    }

    pub fn customer(name: impl Into<String>) -> Self {
        Self::new(PartyType::Customer, name)
    }

    pub fn supplier(name: impl Into<String>) -> Self {
        Self::new(PartyType::Supplier, name)
    }
}

/// Bank account that statement transactions are booked on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    /// Unique identifier for the bank account
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Company owning the account
    pub company: String,
    /// ISO 4217 currency code of the account
    pub currency: String,
    /// General ledger account the bank account posts to
    pub gl_account_id: String,
}

impl BankAccount {
    /// Create a new bank account
    pub fn new(
        id: String,
        name: String,
        company: String,
        currency: String,
        gl_account_id: String,
    ) -> Self {
        Self {
            id,
            name,
            company,
            currency,
            gl_account_id,
        }
    }
}

/// Inclusive date range with optional bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Range without bounds
    pub fn all() -> Self {
        Self::default()
    }

    /// Range bounded on both ends
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }

    /// Fail when the lower bound lies after the upper bound
    pub fn validate(&self) -> ReconcileResult<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ReconcileError::Validation(format!(
                    "Date range is inverted: {} is after {}",
                    from, to
                )));
            }
        }
        Ok(())
    }
}

/// A single voucher allocation recorded on a bank transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAllocation {
    pub voucher_type: VoucherType,
    pub voucher_id: String,
    pub amount: BigDecimal,
}

/// Bank transaction imported from a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Unique identifier for the transaction
    pub id: String,
    /// Bank account the transaction was booked on
    pub bank_account_id: String,
    /// Company owning the bank account
    pub company: String,
    /// Booking date
    pub date: NaiveDate,
    /// Deposit or withdrawal
    pub direction: Direction,
    /// Absolute amount, always positive
    pub amount: BigDecimal,
    /// ISO 4217 currency code
    pub currency: String,
    /// Free text from the statement
    pub description: String,
    /// Payment reference (creditor reference or bank reference)
    pub reference_number: Option<String>,
    /// Counterparty, when known
    pub party: Option<Party>,
    /// Running total already matched against vouchers
    pub allocated_amount: BigDecimal,
    /// Remaining amount still to be matched
    pub unallocated_amount: BigDecimal,
    pub status: TransactionStatus,
    /// Vouchers this transaction has been reconciled against
    pub allocations: Vec<TransactionAllocation>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BankTransaction {
    /// Create a new, unreconciled transaction on the given bank account
    pub fn new(
        id: String,
        bank_account: &BankAccount,
        date: NaiveDate,
        direction: Direction,
        amount: BigDecimal,
        description: String,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            bank_account_id: bank_account.id.clone(),
            company: bank_account.company.clone(),
            date,
            direction,
            unallocated_amount: amount.clone(),
            amount,
            currency: bank_account.currency.clone(),
            description,
            reference_number: None,
            party: None,
            allocated_amount: BigDecimal::from(0),
            status: TransactionStatus::Unreconciled,
            allocations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the payment reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_number = Some(reference.into());
        self
    }

    /// Set the counterparty
    pub fn with_party(mut self, party: Party) -> Self {
        self.party = Some(party);
        self
    }

    pub fn is_reconciled(&self) -> bool {
        self.status == TransactionStatus::Reconciled
    }

    /// Whether there is anything left to allocate
    pub fn has_unallocated(&self) -> bool {
        self.unallocated_amount > BigDecimal::from(0)
    }

    /// Record an allocation against a voucher.
    ///
    /// Rejects amounts larger than what is left unallocated; the transaction is
    /// left untouched in that case.
    pub fn allocate(
        &mut self,
        voucher_type: VoucherType,
        voucher_id: &str,
        amount: &BigDecimal,
    ) -> ReconcileResult<()> {
        if *amount <= BigDecimal::from(0) {
            return Err(ReconcileError::Validation(
                "Allocation amount must be positive".to_string(),
            ));
        }

        if *amount > self.unallocated_amount {
            return Err(ReconcileError::OverAllocation {
                target: format!("bank transaction {}", self.id),
                requested: amount.clone(),
                available: self.unallocated_amount.clone(),
            });
        }

        self.allocated_amount += amount;
        self.unallocated_amount -= amount;
        self.allocations.push(TransactionAllocation {
            voucher_type,
            voucher_id: voucher_id.to_string(),
            amount: amount.clone(),
        });
        self.refresh_status();
        self.updated_at = chrono::Utc::now().naive_utc();
        Ok(())
    }

    /// Derive the status from the allocated and unallocated amounts
    pub fn refresh_status(&mut self) {
        let zero = BigDecimal::from(0);
        self.status = if self.unallocated_amount <= zero {
            TransactionStatus::Reconciled
        } else if self.allocated_amount > zero {
            TransactionStatus::Matched
        } else {
            TransactionStatus::Unreconciled
        };
    }

    /// Validate the transaction's amounts
    pub fn validate(&self) -> ReconcileResult<()> {
        let zero = BigDecimal::from(0);

        if self.amount <= zero {
            return Err(ReconcileError::Validation(format!(
                "Bank transaction {} must have a positive amount",
                self.id
            )));
        }

        if self.allocated_amount < zero || self.allocated_amount > self.amount {
            return Err(ReconcileError::Validation(format!(
                "Bank transaction {} has allocated {} outside of 0..={}",
                self.id, self.allocated_amount, self.amount
            )));
        }

        if &self.allocated_amount + &self.unallocated_amount != self.amount {
            return Err(ReconcileError::Validation(format!(
                "Bank transaction {}: allocated {} + unallocated {} does not add up to {}",
                self.id, self.allocated_amount, self.unallocated_amount, self.amount
            )));
        }

        let allocations_total: BigDecimal = self.allocations.iter().map(|a| &a.amount).sum();
        if allocations_total != self.allocated_amount {
            return Err(ReconcileError::Validation(format!(
                "Bank transaction {}: allocation rows sum to {} but allocated amount is {}",
                self.id, allocations_total, self.allocated_amount
            )));
        }

        Ok(())
    }
}

/// Accounting document that a bank transaction can settle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    /// Identifier, unique per voucher type
    pub id: String,
    pub voucher_type: VoucherType,
    pub company: String,
    /// ISO 4217 currency code
    pub currency: String,
    /// Whether the voucher receives or pays money through the bank
    pub payment_type: PaymentType,
    /// Total value of the voucher
    pub amount: BigDecimal,
    /// Unsettled portion of the voucher
    pub outstanding_amount: BigDecimal,
    /// Reference number (cheque number, bill number, payment reference)
    pub reference_number: Option<String>,
    /// Date printed on the reference, if any
    pub reference_date: Option<NaiveDate>,
    pub posting_date: NaiveDate,
    pub party: Option<Party>,
    pub status: VoucherStatus,
    /// Additional metadata (mode of payment, cost center, counter account, ...)
    pub metadata: HashMap<String, String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Voucher {
    /// Create a new submitted voucher with its full amount outstanding
    pub fn new(
        id: String,
        voucher_type: VoucherType,
        company: String,
        currency: String,
        payment_type: PaymentType,
        amount: BigDecimal,
        posting_date: NaiveDate,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            voucher_type,
            company,
            currency,
            payment_type,
            outstanding_amount: amount.clone(),
            amount,
            reference_number: None,
            reference_date: None,
            posting_date,
            party: None,
            status: VoucherStatus::Submitted,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the reference number and, optionally, its date
    pub fn with_reference(
        mut self,
        reference: impl Into<String>,
        reference_date: Option<NaiveDate>,
    ) -> Self {
        self.reference_number = Some(reference.into());
        self.reference_date = reference_date;
        self
    }

    /// Set the counterparty
    pub fn with_party(mut self, party: Party) -> Self {
        self.party = Some(party);
        self
    }

    /// Override the outstanding amount (e.g. an invoice that is already partly paid)
    pub fn with_outstanding(mut self, outstanding_amount: BigDecimal) -> Self {
        self.outstanding_amount = outstanding_amount;
        self
    }

    /// Mark the voucher as a draft
    pub fn draft(mut self) -> Self {
        self.status = VoucherStatus::Draft;
        self
    }

    pub fn is_submitted(&self) -> bool {
        self.status == VoucherStatus::Submitted
    }

    /// Reference date when present, posting date otherwise
    pub fn effective_date(&self) -> NaiveDate {
        self.reference_date.unwrap_or(self.posting_date)
    }

    /// Decrement the outstanding amount by a settled allocation
    pub fn settle(&mut self, amount: &BigDecimal) -> ReconcileResult<()> {
        if *amount <= BigDecimal::from(0) {
            return Err(ReconcileError::Validation(
                "Settled amount must be positive".to_string(),
            ));
        }

        if *amount > self.outstanding_amount {
            return Err(ReconcileError::OverAllocation {
                target: format!("{} {}", self.voucher_type, self.id),
                requested: amount.clone(),
                available: self.outstanding_amount.clone(),
            });
        }

        self.outstanding_amount -= amount;
        self.updated_at = chrono::Utc::now().naive_utc();
        Ok(())
    }
}

/// How sure the matcher is about a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    /// Reference number and amount agree; safe to apply without confirmation
    Exact,
    /// Anything weaker; needs explicit confirmation
    Fuzzy,
}

/// Outstanding voucher considered for a bank transaction, with its match signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub voucher: Voucher,
    /// Voucher reference equals the transaction reference
    pub reference_match: bool,
    /// Outstanding amount equals the transaction's unallocated amount
    pub amount_match: bool,
    /// Same counterparty
    pub party_match: bool,
    /// Voucher reference appears in the transaction description
    pub description_match: bool,
    /// Days between the voucher's effective date and the transaction date
    pub date_distance_days: i64,
    /// Sum of the signals above, plus one
    pub rank: u32,
}

impl Candidate {
    /// Whether the voucher is tied to the transaction by something other than its amount
    pub fn is_related(&self) -> bool {
        self.reference_match || self.description_match || self.party_match
    }
}

/// Voucher allocation proposed by the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAllocation {
    pub voucher_type: VoucherType,
    pub voucher_id: String,
    /// Amount to allocate
    pub amount: BigDecimal,
    /// Voucher outstanding amount observed when the proposal was built
    pub expected_outstanding: BigDecimal,
}

/// Transient pairing of one bank transaction with one or more vouchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProposal {
    pub transaction_id: String,
    /// Transaction unallocated amount observed when the proposal was built
    pub expected_unallocated: BigDecimal,
    pub allocations: Vec<ProposedAllocation>,
    pub confidence: Confidence,
}

impl MatchProposal {
    /// Start a proposal for the transaction's current state
    pub fn new(transaction: &BankTransaction, confidence: Confidence) -> Self {
        Self {
            transaction_id: transaction.id.clone(),
            expected_unallocated: transaction.unallocated_amount.clone(),
            allocations: Vec::new(),
            confidence,
        }
    }

    /// Add an allocation against a voucher as it is currently known
    pub fn allocate(mut self, voucher: &Voucher, amount: BigDecimal) -> Self {
        self.allocations.push(ProposedAllocation {
            voucher_type: voucher.voucher_type,
            voucher_id: voucher.id.clone(),
            amount,
            expected_outstanding: voucher.outstanding_amount.clone(),
        });
        self
    }

    /// Total amount the proposal would allocate
    pub fn total_amount(&self) -> BigDecimal {
        self.allocations.iter().map(|a| &a.amount).sum()
    }

    pub fn is_exact(&self) -> bool {
        self.confidence == Confidence::Exact
    }

    /// Structural checks: non-empty, positive amounts, each voucher at most once
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.allocations.is_empty() {
            return Err(ReconcileError::Validation(format!(
                "Proposal for bank transaction {} has no allocations",
                self.transaction_id
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for allocation in &self.allocations {
            if allocation.amount <= BigDecimal::from(0) {
                return Err(ReconcileError::Validation(format!(
                    "Allocation against {} {} must be positive",
                    allocation.voucher_type, allocation.voucher_id
                )));
            }

            if !seen.insert((allocation.voucher_type, allocation.voucher_id.as_str())) {
                return Err(ReconcileError::Validation(format!(
                    "{} {} is referenced more than once",
                    allocation.voucher_type, allocation.voucher_id
                )));
            }
        }

        Ok(())
    }
}

/// Result of applying a proposal: the updated transaction and vouchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub transaction: BankTransaction,
    pub vouchers: Vec<Voucher>,
}

/// Errors that can occur while reconciling
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Bank account not found: {0}")]
    BankAccountNotFound(String),
    #[error("Bank transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),
    #[error("Over-allocation on {target}: requested {requested}, available {available}")]
    OverAllocation {
        target: String,
        requested: BigDecimal,
        available: BigDecimal,
    },
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Whether the operation may succeed when retried with freshly fetched data
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::ConcurrentModification(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ReconcileError::BankAccountNotFound(_)
                | ReconcileError::TransactionNotFound(_)
                | ReconcileError::VoucherNotFound(_)
        )
    }
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
