//! Reconciliation engine that coordinates the store, finder, matcher and reconciler

use bigdecimal::BigDecimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::MatchingConfig;
use crate::reconciliation::candidates::{CandidateFilter, CandidateFinder};
use crate::reconciliation::import::{ImportSummary, RejectedEntry, StatementEntry};
use crate::reconciliation::matcher::Matcher;
use crate::reconciliation::reconciler::Reconciler;
use crate::reconciliation::store::{TransactionOrder, TransactionStore};
use crate::reconciliation::vouchers::{build_voucher, VoucherOutcome, VoucherSpec};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_currency_code, validate_required};

/// A voucher picked by the user for manual reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherSelection {
    pub voucher_type: VoucherType,
    pub voucher_id: String,
    /// Amount to allocate; defaults to what the voucher and the transaction have left
    pub amount: Option<BigDecimal>,
}

impl VoucherSelection {
    pub fn new(voucher_type: VoucherType, voucher_id: impl Into<String>) -> Self {
        Self {
            voucher_type,
            voucher_id: voucher_id.into(),
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: BigDecimal) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Parameters of an auto-reconcile run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoReconcileRequest {
    pub bank_account: Option<String>,
    /// Booking dates of the bank transactions to process
    pub date_range: DateRange,
    /// Restrict vouchers by reference date instead of by posting date within `date_range`
    pub reference_dates: Option<DateRange>,
}

/// A transaction auto-reconcile could not process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileFailure {
    pub transaction_id: String,
    pub error: ReconcileError,
}

/// Per-transaction outcome of an auto-reconcile run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutoReconcileSummary {
    /// Fully allocated transactions
    pub reconciled: Vec<String>,
    /// Transactions that received an allocation but still have an unallocated remainder
    pub partially_reconciled: Vec<String>,
    /// Transactions with a fuzzy proposal that was not applied
    pub needs_confirmation: Vec<String>,
    /// Transactions without any proposal
    pub unmatched: Vec<String>,
    pub failures: Vec<ReconcileFailure>,
}

impl AutoReconcileSummary {
    /// Number of transactions that received an allocation
    pub fn matched_count(&self) -> usize {
        self.reconciled.len() + self.partially_reconciled.len()
    }

    /// One-line summary for the user
    pub fn message(&self) -> String {
        let mut parts = Vec::new();
        if self.matched_count() == 0 {
            parts.push("No matches occurred".to_string());
        } else {
            parts.push(format!("{} transaction(s) reconciled", self.reconciled.len()));
            if !self.partially_reconciled.is_empty() {
                parts.push(format!(
                    "{} partially reconciled",
                    self.partially_reconciled.len()
                ));
            }
        }
        if !self.needs_confirmation.is_empty() {
            parts.push(format!(
                "{} need(s) confirmation",
                self.needs_confirmation.len()
            ));
        }
        if !self.failures.is_empty() {
            parts.push(format!("{} failed", self.failures.len()));
        }
        parts.join(", ")
    }
}

enum AutoOutcome {
    Reconciled,
    PartiallyReconciled,
    NeedsConfirmation,
    Unmatched,
}

/// Main reconciliation system that orchestrates all matching operations
pub struct ReconciliationEngine<S: ReconciliationStorage> {
    storage: S,
    store: TransactionStore<S>,
    finder: CandidateFinder<S>,
    matcher: Matcher,
    reconciler: Reconciler<S>,
    config: MatchingConfig,
}

impl<S: ReconciliationStorage + Clone> ReconciliationEngine<S> {
    /// Create a new engine with the default matching configuration
    pub fn new(storage: S) -> Self {
        Self::build(storage, MatchingConfig::default(), Box::new(DefaultProposalValidator))
    }

    /// Create a new engine with a custom matching configuration
    pub fn with_config(storage: S, config: MatchingConfig) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self::build(storage, config, Box::new(DefaultProposalValidator)))
    }

    /// Create a new engine with a custom configuration and proposal validator
    pub fn with_validator(
        storage: S,
        config: MatchingConfig,
        validator: Box<dyn ProposalValidator>,
    ) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self::build(storage, config, validator))
    }

    fn build(storage: S, config: MatchingConfig, validator: Box<dyn ProposalValidator>) -> Self {
        Self {
            store: TransactionStore::new(storage.clone()),
            finder: CandidateFinder::new(storage.clone(), config.clone()),
            matcher: Matcher::new(config.clone()),
            reconciler: Reconciler::with_validator(storage.clone(), validator),
            storage,
            config,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    // Master data
    /// Register a bank account statements can be imported into
    pub async fn register_bank_account(&mut self, account: &BankAccount) -> ReconcileResult<()> {
        validate_required("Bank account ID", Some(account.id.as_str()))?;
        validate_required("Company", Some(account.company.as_str()))?;
        validate_currency_code(&account.currency)?;
        self.storage.save_bank_account(account).await
    }

    /// Store a voucher of the accounting subsystem so it can be matched
    pub async fn register_voucher(&mut self, voucher: &Voucher) -> ReconcileResult<()> {
        validate_required("Voucher ID", Some(voucher.id.as_str()))?;
        validate_currency_code(&voucher.currency)?;
        self.config.validate_precision(&voucher.amount)?;
        self.config.validate_precision(&voucher.outstanding_amount)?;
        if voucher.outstanding_amount < BigDecimal::from(0)
            || voucher.outstanding_amount > voucher.amount
        {
            return Err(ReconcileError::Validation(format!(
                "{} {} has outstanding {} outside of 0..={}",
                voucher.voucher_type, voucher.id, voucher.outstanding_amount, voucher.amount
            )));
        }
        self.storage.save_voucher(voucher).await
    }

    /// Submit a draft voucher so it becomes available for matching
    pub async fn submit_voucher(
        &mut self,
        voucher_type: VoucherType,
        voucher_id: &str,
    ) -> ReconcileResult<Voucher> {
        let mut voucher = self.get_voucher(voucher_type, voucher_id).await?;
        if voucher.is_submitted() {
            return Err(ReconcileError::Validation(format!(
                "{} {} is already submitted",
                voucher_type, voucher_id
            )));
        }

        voucher.status = VoucherStatus::Submitted;
        voucher.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_voucher(&voucher).await?;
        Ok(voucher)
    }

    /// Get a voucher, returning an error if not found
    pub async fn get_voucher(
        &self,
        voucher_type: VoucherType,
        voucher_id: &str,
    ) -> ReconcileResult<Voucher> {
        self.storage
            .get_voucher(voucher_type, voucher_id)
            .await?
            .ok_or_else(|| {
                ReconcileError::VoucherNotFound(format!("{} {}", voucher_type, voucher_id))
            })
    }

    // Import
    /// Import decoded statement entries into a bank account.
    ///
    /// Entries that fail validation are reported in the summary; the rest are
    /// imported as unreconciled transactions.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn import(
        &mut self,
        entries: &[StatementEntry],
        company: &str,
        bank_account: Option<&str>,
    ) -> ReconcileResult<ImportSummary> {
        let bank_account = validate_required("Bank account", bank_account)?;
        let company = validate_required("Company", Some(company))?;
        let account = self.store.get_bank_account_required(bank_account).await?;
        if account.company != company {
            return Err(ReconcileError::Validation(format!(
                "Bank account {} does not belong to company {}",
                account.id, company
            )));
        }

        let mut summary = ImportSummary::default();
        for (index, entry) in entries.iter().enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            let transaction = self
                .config
                .validate_precision(&entry.amount)
                .and_then(|_| entry.into_transaction(id, &account));
            let result = match transaction {
                Ok(transaction) => self
                    .store
                    .record_transaction(&transaction)
                    .await
                    .map(|_| transaction.id),
                Err(e) => Err(e),
            };

            match result {
                Ok(id) => summary.imported.push(id),
                Err(ReconcileError::Validation(reason)) => {
                    warn!(index, %reason, "Rejected statement entry");
                    summary.rejected.push(RejectedEntry {
                        index,
                        reason: ReconcileError::Validation(reason),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            bank_account = %account.id,
            imported = summary.imported.len(),
            rejected = summary.rejected.len(),
            "Imported bank statement"
        );

        Ok(summary)
    }

    // Transaction operations
    /// Unreconciled and partially reconciled transactions of a bank account
    pub async fn list_transactions(
        &self,
        bank_account: Option<&str>,
        date_range: &DateRange,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        self.store.list_transactions(bank_account, date_range).await
    }

    /// Open transactions of a bank account in the given date order
    pub async fn list_transactions_ordered(
        &self,
        bank_account: Option<&str>,
        date_range: &DateRange,
        order: TransactionOrder,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        self.store
            .list_transactions_ordered(bank_account, date_range, order)
            .await
    }

    /// Get a bank transaction, returning an error if not found
    pub async fn get_transaction(&self, transaction_id: &str) -> ReconcileResult<BankTransaction> {
        self.store.get_transaction_required(transaction_id).await
    }

    // Matching operations
    /// Candidate vouchers for a bank transaction
    pub async fn find_candidates(
        &self,
        transaction_id: &str,
        filter: &CandidateFilter,
    ) -> ReconcileResult<Vec<Candidate>> {
        let transaction = self.get_transaction(transaction_id).await?;
        self.finder.find_candidates_with(&transaction, filter).await
    }

    /// Build a match proposal for a bank transaction from its current candidates
    pub async fn propose(
        &self,
        transaction_id: &str,
        filter: &CandidateFilter,
    ) -> ReconcileResult<Option<MatchProposal>> {
        let transaction = self.get_transaction(transaction_id).await?;
        let candidates = self.finder.find_candidates_with(&transaction, filter).await?;
        Ok(self.matcher.propose(&transaction, &candidates))
    }

    /// Apply a proposal, see [`Reconciler::apply`]
    pub async fn apply(&mut self, proposal: &MatchProposal) -> ReconcileResult<Reconciliation> {
        self.reconciler.apply(proposal).await
    }

    /// Reconcile a transaction against vouchers chosen by the user.
    ///
    /// Selections without an amount take whatever the voucher and the transaction
    /// still have; once the transaction is exhausted they are skipped.
    #[instrument(skip(self, selections), fields(vouchers = selections.len()))]
    pub async fn bulk_reconcile(
        &mut self,
        transaction_id: &str,
        selections: &[VoucherSelection],
    ) -> ReconcileResult<Reconciliation> {
        let transaction = self.get_transaction(transaction_id).await?;
        let zero = BigDecimal::from(0);
        let mut remaining = transaction.unallocated_amount.clone();
        let mut proposal = MatchProposal::new(&transaction, Confidence::Fuzzy);

        for selection in selections {
            let voucher = self
                .get_voucher(selection.voucher_type, &selection.voucher_id)
                .await?;
            if !voucher.is_submitted() {
                return Err(ReconcileError::Validation(format!(
                    "{} {} must be submitted before it can be reconciled",
                    voucher.voucher_type, voucher.id
                )));
            }

            let amount = match &selection.amount {
                Some(amount) => {
                    self.config.validate_precision(amount)?;
                    amount.clone()
                }
                None if remaining <= zero => continue,
                None => std::cmp::min(voucher.outstanding_amount.clone(), remaining.clone()),
            };
            remaining -= &amount;
            proposal = proposal.allocate(&voucher, amount);
        }

        self.reconciler.apply(&proposal).await
    }

    /// Apply exact-reference matches across a bank account without confirmation.
    ///
    /// Transactions are processed one after another; a failure is recorded in the
    /// summary and does not stop the run. Fuzzy proposals are left for the user.
    #[instrument(skip_all, fields(bank_account = request.bank_account.as_deref()))]
    pub async fn auto_reconcile(
        &mut self,
        request: &AutoReconcileRequest,
    ) -> ReconcileResult<AutoReconcileSummary> {
        if let Some(range) = &request.reference_dates {
            range.validate()?;
        }
        let transactions = self
            .store
            .list_transactions(request.bank_account.as_deref(), &request.date_range)
            .await?;

        let mut filter = CandidateFilter::auto_reconcile(self.config.auto_document_types.clone());
        match request.reference_dates {
            Some(range) => filter.reference_dates = Some(range),
            None => filter.posting_dates = Some(request.date_range),
        }

        let mut summary = AutoReconcileSummary::default();
        for transaction in transactions {
            let id = transaction.id.clone();
            match self.auto_reconcile_transaction(&id, &filter).await {
                Ok(AutoOutcome::Reconciled) => summary.reconciled.push(id),
                Ok(AutoOutcome::PartiallyReconciled) => summary.partially_reconciled.push(id),
                Ok(AutoOutcome::NeedsConfirmation) => summary.needs_confirmation.push(id),
                Ok(AutoOutcome::Unmatched) => summary.unmatched.push(id),
                Err(error) => {
                    warn!(transaction_id = %id, %error, "Skipping bank transaction");
                    summary.failures.push(ReconcileFailure {
                        transaction_id: id,
                        error,
                    });
                }
            }
        }

        info!(
            reconciled = summary.reconciled.len(),
            partially_reconciled = summary.partially_reconciled.len(),
            needs_confirmation = summary.needs_confirmation.len(),
            unmatched = summary.unmatched.len(),
            failed = summary.failures.len(),
            "Auto-reconcile finished"
        );

        Ok(summary)
    }

    async fn auto_reconcile_transaction(
        &mut self,
        transaction_id: &str,
        filter: &CandidateFilter,
    ) -> ReconcileResult<AutoOutcome> {
        let mut attempt = 0;
        loop {
            let Some(proposal) = self.propose(transaction_id, filter).await? else {
                return Ok(AutoOutcome::Unmatched);
            };
            if !proposal.is_exact() {
                debug!(transaction_id, "Fuzzy proposal left for confirmation");
                return Ok(AutoOutcome::NeedsConfirmation);
            }

            match self.reconciler.apply(&proposal).await {
                Ok(reconciliation) if reconciliation.transaction.is_reconciled() => {
                    return Ok(AutoOutcome::Reconciled);
                }
                Ok(_) => return Ok(AutoOutcome::PartiallyReconciled),
                Err(e) if e.is_retryable() && attempt < self.config.concurrency_retries => {
                    attempt += 1;
                    warn!(transaction_id, attempt, error = %e, "Retrying with fresh candidates");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create a payment or journal entry for a transaction's unallocated amount.
    ///
    /// Unless `allow_edit` is set, the voucher is submitted and reconciled
    /// against the transaction right away.
    #[instrument(skip(self, spec), fields(voucher_type = %spec.voucher_type()))]
    pub async fn create_voucher_and_reconcile(
        &mut self,
        transaction_id: &str,
        spec: &VoucherSpec,
    ) -> ReconcileResult<VoucherOutcome> {
        let transaction = self.get_transaction(transaction_id).await?;
        let account = self
            .store
            .get_bank_account_required(&transaction.bank_account_id)
            .await?;

        let mut voucher = build_voucher(&transaction, &account, spec)?;
        self.storage.save_voucher(&voucher).await?;

        if spec.allow_edit() {
            info!(voucher_id = %voucher.id, "Created draft voucher for manual editing");
            return Ok(VoucherOutcome::Draft(voucher));
        }

        voucher.status = VoucherStatus::Submitted;
        self.storage.update_voucher(&voucher).await?;

        let amount = voucher.outstanding_amount.clone();
        let proposal =
            MatchProposal::new(&transaction, Confidence::Exact).allocate(&voucher, amount);
        match self.reconciler.apply(&proposal).await {
            Ok(reconciliation) => Ok(VoucherOutcome::Reconciled(reconciliation)),
            Err(e) => {
                // Nothing was allocated; take the voucher out of matching again
                warn!(
                    voucher_id = %voucher.id,
                    error = %e,
                    "Reconciliation failed, returning voucher to draft"
                );
                voucher.status = VoucherStatus::Draft;
                self.storage.update_voucher(&voucher).await?;
                Err(e)
            }
        }
    }
}
