//! Creating vouchers for bank transactions that have no counterpart yet

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::types::*;
use crate::utils::validation::{validate_currency_code, validate_positive_amount, validate_required};

/// Kind of the counter account a journal entry books against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAccountType {
    Receivable,
    Payable,
    Other,
}

/// Ledger account on the other side of a journal entry
#[derive(Debug, Clone, PartialEq)]
pub struct CounterAccount {
    pub id: String,
    pub account_type: CounterAccountType,
    pub currency: String,
}

/// Parameters for creating a payment entry from a bank transaction
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEntrySpec {
    pub id: Option<String>,
    pub posting_date: NaiveDate,
    pub reference_number: Option<String>,
    pub reference_date: Option<NaiveDate>,
    pub party: Option<Party>,
    pub mode_of_payment: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    /// Keep the voucher as a draft for manual editing instead of reconciling it
    pub allow_edit: bool,
}

/// Parameters for creating a journal entry from a bank transaction
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntrySpec {
    pub id: Option<String>,
    pub posting_date: NaiveDate,
    pub reference_number: Option<String>,
    pub reference_date: Option<NaiveDate>,
    /// Journal entry type, e.g. "Bank Entry"
    pub entry_type: String,
    pub counter_account: CounterAccount,
    pub party: Option<Party>,
    pub mode_of_payment: Option<String>,
    pub remark: Option<String>,
    /// Keep the voucher as a draft for manual editing instead of reconciling it
    pub allow_edit: bool,
}

/// What to create for a bank transaction
#[derive(Debug, Clone, PartialEq)]
pub enum VoucherSpec {
    PaymentEntry(PaymentEntrySpec),
    JournalEntry(JournalEntrySpec),
}

impl VoucherSpec {
    pub fn voucher_type(&self) -> VoucherType {
        match self {
            VoucherSpec::PaymentEntry(_) => VoucherType::PaymentEntry,
            VoucherSpec::JournalEntry(_) => VoucherType::JournalEntry,
        }
    }

    pub fn allow_edit(&self) -> bool {
        match self {
            VoucherSpec::PaymentEntry(spec) => spec.allow_edit,
            VoucherSpec::JournalEntry(spec) => spec.allow_edit,
        }
    }

    fn requested_id(&self) -> Option<&str> {
        match self {
            VoucherSpec::PaymentEntry(spec) => spec.id.as_deref(),
            VoucherSpec::JournalEntry(spec) => spec.id.as_deref(),
        }
    }
}

/// Result of creating a voucher for a bank transaction
#[derive(Debug, Clone, PartialEq)]
pub enum VoucherOutcome {
    /// Saved as a draft; reconcile it once it has been submitted
    Draft(Voucher),
    /// Submitted and reconciled against the transaction
    Reconciled(Reconciliation),
}

/// Voucher builder for creating vouchers
#[derive(Debug)]
pub struct VoucherBuilder {
    voucher: Voucher,
}

impl VoucherBuilder {
    /// Create a new voucher builder
    pub fn new(
        id: String,
        voucher_type: VoucherType,
        company: String,
        currency: String,
        payment_type: PaymentType,
        amount: BigDecimal,
        posting_date: NaiveDate,
    ) -> Self {
        Self {
            voucher: Voucher::new(
                id,
                voucher_type,
                company,
                currency,
                payment_type,
                amount,
                posting_date,
            ),
        }
    }

    /// Set the reference number and date
    pub fn reference(
        mut self,
        reference: Option<String>,
        reference_date: Option<NaiveDate>,
    ) -> Self {
        self.voucher.reference_number = reference;
        self.voucher.reference_date = reference_date;
        self
    }

    /// Set the counterparty
    pub fn party(mut self, party: Option<Party>) -> Self {
        self.voucher.party = party;
        self
    }

    /// Add metadata when a value is present
    pub fn metadata(mut self, key: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.voucher.metadata.insert(key.to_string(), value);
        }
        self
    }

    /// Keep the voucher as a draft
    pub fn draft(mut self) -> Self {
        self.voucher.status = VoucherStatus::Draft;
        self
    }

    /// Build the voucher
    pub fn build(self) -> ReconcileResult<Voucher> {
        validate_required("Voucher ID", Some(self.voucher.id.as_str()))?;
        validate_required("Company", Some(self.voucher.company.as_str()))?;
        validate_currency_code(&self.voucher.currency)?;
        validate_positive_amount(&self.voucher.amount)?;
        Ok(self.voucher)
    }
}

/// Build the voucher described by `spec` for the transaction's unallocated amount.
///
/// The voucher is always returned as a draft; submitting it is up to the caller.
pub fn build_voucher(
    transaction: &BankTransaction,
    bank_account: &BankAccount,
    spec: &VoucherSpec,
) -> ReconcileResult<Voucher> {
    if !transaction.has_unallocated() {
        return Err(ReconcileError::Validation(format!(
            "Bank transaction {} has nothing left to allocate",
            transaction.id
        )));
    }

    let id = spec
        .requested_id()
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let builder = VoucherBuilder::new(
        id,
        spec.voucher_type(),
        transaction.company.clone(),
        transaction.currency.clone(),
        transaction.direction.payment_type(),
        transaction.unallocated_amount.clone(),
        transaction.date,
    )
    .draft()
    .metadata("bank_account", Some(bank_account.id.clone()));

    let builder = match spec {
        VoucherSpec::PaymentEntry(pe) => {
            let party = pe.party.clone().ok_or_else(|| {
                ReconcileError::Validation("Party is required for a Payment Entry".to_string())
            })?;
            let account_field = match transaction.direction {
                Direction::Deposit => "paid_to",
                Direction::Withdrawal => "paid_from",
            };

            VoucherBuilder {
                voucher: Voucher {
                    posting_date: pe.posting_date,
                    ..builder.voucher
                },
            }
            .reference(pe.reference_number.clone(), pe.reference_date)
            .party(Some(party))
            .metadata(account_field, Some(bank_account.gl_account_id.clone()))
            .metadata("mode_of_payment", pe.mode_of_payment.clone())
            .metadata("project", pe.project.clone())
            .metadata("cost_center", pe.cost_center.clone())
        }
        VoucherSpec::JournalEntry(je) => {
            let counter = &je.counter_account;
            let needs_party = matches!(
                counter.account_type,
                CounterAccountType::Receivable | CounterAccountType::Payable
            );
            if needs_party && je.party.is_none() {
                return Err(ReconcileError::Validation(format!(
                    "Party is required for Receivable / Payable account {}",
                    counter.id
                )));
            }
            if counter.currency != bank_account.currency {
                return Err(ReconcileError::Validation(format!(
                    "Counter account {} ({}) must use the currency of bank account {} ({})",
                    counter.id, counter.currency, bank_account.id, bank_account.currency
                )));
            }

            VoucherBuilder {
                voucher: Voucher {
                    posting_date: je.posting_date,
                    ..builder.voucher
                },
            }
            .reference(je.reference_number.clone(), je.reference_date)
            .party(je.party.clone())
            .metadata("entry_type", Some(je.entry_type.clone()))
            .metadata("counter_account", Some(counter.id.clone()))
            .metadata("bank_gl_account", Some(bank_account.gl_account_id.clone()))
            .metadata("mode_of_payment", je.mode_of_payment.clone())
            .metadata("remark", je.remark.clone())
        }
    };

    builder.build()
}
