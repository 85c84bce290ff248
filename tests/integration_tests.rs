//! Integration tests for reconciliation-core

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use reconciliation_core::utils::{MemoryStorage, SinglePartyProposalValidator};
use reconciliation_core::{
    AllocationCommit, AutoReconcileRequest, BankAccount, BankTransaction, CandidateFilter,
    Confidence, CounterAccount, CounterAccountType, CreditDebit, DateRange, Direction,
    JournalEntrySpec, MatchProposal, MatchingConfig, Party, PaymentType, ProposalValidator,
    ReconcileError, ReconcileResult, ReconciliationEngine, ReconciliationStorage, StatementEntry,
    TransactionOrder, TransactionStatus, Voucher, VoucherOutcome, VoucherSelection, VoucherSpec,
    VoucherStatus, VoucherType,
};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

fn amount(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn bank_account() -> BankAccount {
    BankAccount::new(
        "ubs-chf".to_string(),
        "UBS CHF".to_string(),
        "centura".to_string(),
        "CHF".to_string(),
        "1020".to_string(),
    )
}

fn deposit(id: &str, value: &str, reference: Option<&str>) -> BankTransaction {
    let txn = BankTransaction::new(
        id.to_string(),
        &bank_account(),
        date(10),
        Direction::Deposit,
        amount(value),
        format!("Incoming payment {}", id),
    );
    match reference {
        Some(reference) => txn.with_reference(reference),
        None => txn,
    }
}

fn payment(id: &str, value: &str, reference: Option<&str>) -> Voucher {
    let voucher = Voucher::new(
        id.to_string(),
        VoucherType::PaymentEntry,
        "centura".to_string(),
        "CHF".to_string(),
        PaymentType::Receive,
        amount(value),
        date(9),
    );
    match reference {
        Some(reference) => voucher.with_reference(reference, None),
        None => voucher,
    }
}

async fn setup<S: ReconciliationStorage + Clone>(
    storage: S,
    transactions: Vec<BankTransaction>,
    vouchers: Vec<Voucher>,
) -> ReconciliationEngine<S> {
    let mut engine = ReconciliationEngine::new(storage.clone());
    engine.register_bank_account(&bank_account()).await.unwrap();

    let mut storage = storage;
    for txn in &transactions {
        storage.save_transaction(txn).await.unwrap();
    }
    for voucher in &vouchers {
        engine.register_voucher(voucher).await.unwrap();
    }
    engine
}

#[tokio::test]
async fn test_exact_match_reconciles_transaction() {
    let mut engine = setup(
        MemoryStorage::new(),
        vec![deposit("bt-1", "100", Some("INV-1"))],
        vec![payment("pe-1", "100", Some("INV-1")), payment("pe-2", "100", None)],
    )
    .await;

    let proposal = engine
        .propose("bt-1", &CandidateFilter::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(proposal.confidence, Confidence::Exact);
    assert_eq!(proposal.allocations[0].voucher_id, "pe-1");

    let reconciliation = engine.apply(&proposal).await.unwrap();
    assert_eq!(reconciliation.transaction.status, TransactionStatus::Reconciled);
    assert_eq!(reconciliation.transaction.allocated_amount, amount("100"));
    assert_eq!(reconciliation.vouchers[0].outstanding_amount, amount("0"));

    let stored = engine.get_transaction("bt-1").await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Reconciled);
    assert_eq!(stored.allocations.len(), 1);

    let voucher = engine
        .get_voucher(VoucherType::PaymentEntry, "pe-1")
        .await
        .unwrap();
    assert_eq!(voucher.outstanding_amount, amount("0"));

    // A reconciled transaction is no longer listed
    let open = engine
        .list_transactions(Some("ubs-chf"), &DateRange::all())
        .await
        .unwrap();
    assert!(open.is_empty());
}

#[tokio::test]
async fn test_partial_match_leaves_remainder() {
    let mut engine = setup(
        MemoryStorage::new(),
        vec![deposit("bt-1", "150", Some("INV-7"))],
        vec![payment("pe-1", "100", Some("INV-7"))],
    )
    .await;

    let proposal = engine
        .propose("bt-1", &CandidateFilter::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(proposal.confidence, Confidence::Fuzzy);
    assert_eq!(proposal.total_amount(), amount("100"));

    let reconciliation = engine.apply(&proposal).await.unwrap();
    assert_eq!(reconciliation.transaction.status, TransactionStatus::Matched);
    assert_eq!(reconciliation.transaction.allocated_amount, amount("100"));
    assert_eq!(reconciliation.transaction.unallocated_amount, amount("50"));

    // Partially reconciled transactions stay open
    let open = engine
        .list_transactions(Some("ubs-chf"), &DateRange::all())
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].unallocated_amount, amount("50"));

    // Nothing left to match against
    assert!(engine
        .propose("bt-1", &CandidateFilter::default())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_over_allocation_is_rejected_without_state_change() {
    let mut engine = setup(
        MemoryStorage::new(),
        vec![deposit("bt-1", "300", None), deposit("bt-2", "50", None)],
        vec![payment("pe-1", "100", None)],
    )
    .await;

    let txn = engine.get_transaction("bt-1").await.unwrap();
    let voucher = engine
        .get_voucher(VoucherType::PaymentEntry, "pe-1")
        .await
        .unwrap();

    let proposal =
        MatchProposal::new(&txn, Confidence::Fuzzy).allocate(&voucher, amount("200"));
    let err = engine.apply(&proposal).await.unwrap_err();
    assert!(matches!(err, ReconcileError::OverAllocation { .. }));

    // Transaction side: 100 against 50 unallocated
    let small = engine.get_transaction("bt-2").await.unwrap();
    let proposal =
        MatchProposal::new(&small, Confidence::Fuzzy).allocate(&voucher, amount("100"));
    let err = engine.apply(&proposal).await.unwrap_err();
    assert!(matches!(err, ReconcileError::OverAllocation { .. }));

    assert_eq!(engine.get_transaction("bt-1").await.unwrap(), txn);
    assert_eq!(engine.get_transaction("bt-2").await.unwrap(), small);
    assert_eq!(
        engine
            .get_voucher(VoucherType::PaymentEntry, "pe-1")
            .await
            .unwrap(),
        voucher
    );
}

#[tokio::test]
async fn test_stale_proposal_fails_and_retry_never_double_allocates() {
    let mut engine = setup(
        MemoryStorage::new(),
        vec![
            deposit("bt-1", "100", Some("INV-1")),
            deposit("bt-2", "100", Some("INV-1")),
        ],
        vec![payment("pe-1", "100", Some("INV-1"))],
    )
    .await;

    let first = engine
        .propose("bt-1", &CandidateFilter::default())
        .await
        .unwrap()
        .unwrap();
    let second = engine
        .propose("bt-2", &CandidateFilter::default())
        .await
        .unwrap()
        .unwrap();

    engine.apply(&first).await.unwrap();

    // Same proposal again: the transaction moved on
    let err = engine.apply(&first).await.unwrap_err();
    assert!(err.is_retryable());

    // The other transaction's proposal saw the voucher before it was settled
    let err = engine.apply(&second).await.unwrap_err();
    assert!(matches!(err, ReconcileError::ConcurrentModification(_)));

    let txn = engine.get_transaction("bt-1").await.unwrap();
    assert_eq!(txn.allocated_amount, amount("100"));
    assert_eq!(txn.allocations.len(), 1);
    let other = engine.get_transaction("bt-2").await.unwrap();
    assert_eq!(other.status, TransactionStatus::Unreconciled);

    // Re-fetching candidates finds nothing left to allocate
    assert!(engine
        .propose("bt-2", &CandidateFilter::default())
        .await
        .unwrap()
        .is_none());
}

/// Storage that reports a concurrent modification for the first `conflicts` commits of one
/// transaction
#[derive(Clone)]
struct ConflictingStorage {
    inner: MemoryStorage,
    conflicting_transaction: String,
    remaining_conflicts: Arc<AtomicU32>,
}

impl ConflictingStorage {
    fn new(transaction_id: &str, conflicts: u32) -> Self {
        Self {
            inner: MemoryStorage::new(),
            conflicting_transaction: transaction_id.to_string(),
            remaining_conflicts: Arc::new(AtomicU32::new(conflicts)),
        }
    }

    fn take_conflict(&self, transaction_id: &str) -> bool {
        transaction_id == self.conflicting_transaction
            && self
                .remaining_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl ReconciliationStorage for ConflictingStorage {
    async fn save_bank_account(&mut self, account: &BankAccount) -> ReconcileResult<()> {
        self.inner.save_bank_account(account).await
    }

    async fn get_bank_account(&self, account_id: &str) -> ReconcileResult<Option<BankAccount>> {
        self.inner.get_bank_account(account_id).await
    }

    async fn save_transaction(&mut self, transaction: &BankTransaction) -> ReconcileResult<()> {
        self.inner.save_transaction(transaction).await
    }

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>> {
        self.inner.get_transaction(transaction_id).await
    }

    async fn get_bank_transactions(
        &self,
        bank_account_id: &str,
        date_range: &DateRange,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        self.inner
            .get_bank_transactions(bank_account_id, date_range)
            .await
    }

    async fn save_voucher(&mut self, voucher: &Voucher) -> ReconcileResult<()> {
        self.inner.save_voucher(voucher).await
    }

    async fn get_voucher(
        &self,
        voucher_type: VoucherType,
        voucher_id: &str,
    ) -> ReconcileResult<Option<Voucher>> {
        self.inner.get_voucher(voucher_type, voucher_id).await
    }

    async fn update_voucher(&mut self, voucher: &Voucher) -> ReconcileResult<()> {
        self.inner.update_voucher(voucher).await
    }

    async fn get_outstanding_vouchers(
        &self,
        company: &str,
        currency: &str,
    ) -> ReconcileResult<Vec<Voucher>> {
        self.inner.get_outstanding_vouchers(company, currency).await
    }

    async fn commit_allocation(&mut self, commit: &AllocationCommit) -> ReconcileResult<()> {
        if self.take_conflict(&commit.transaction.id) {
            return Err(ReconcileError::ConcurrentModification(format!(
                "bank transaction {} is being reconciled elsewhere",
                commit.transaction.id
            )));
        }
        self.inner.commit_allocation(commit).await
    }
}

#[tokio::test]
async fn test_auto_reconcile_batch_reports_conflict_and_continues() {
    let mut engine = setup(
        ConflictingStorage::new("bt-2", u32::MAX),
        vec![
            deposit("bt-1", "100", Some("INV-1")),
            deposit("bt-2", "200", Some("INV-2")),
            deposit("bt-3", "300", Some("INV-3")),
            deposit("bt-4", "400", Some("INV-4")),
            deposit("bt-5", "500", None),
        ],
        vec![
            payment("pe-1", "100", Some("INV-1")),
            payment("pe-2", "200", Some("INV-2")),
            payment("pe-3", "300", Some("INV-3")),
            // Same reference, different amount: fuzzy
            payment("pe-4", "350", Some("INV-4")),
            // Same amount, no reference: not considered by auto-reconcile
            payment("pe-5", "500", None),
        ],
    )
    .await;

    let summary = engine
        .auto_reconcile(&AutoReconcileRequest {
            bank_account: Some("ubs-chf".to_string()),
            date_range: DateRange::between(date(1), date(31)),
            reference_dates: None,
        })
        .await
        .unwrap();

    assert_eq!(summary.reconciled, vec!["bt-1", "bt-3"]);
    assert!(summary.partially_reconciled.is_empty());
    assert_eq!(summary.needs_confirmation, vec!["bt-4"]);
    assert_eq!(summary.unmatched, vec!["bt-5"]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].transaction_id, "bt-2");
    assert!(summary.failures[0].error.is_retryable());
    assert_eq!(
        summary.message(),
        "2 transaction(s) reconciled, 1 need(s) confirmation, 1 failed"
    );

    // Fuzzy and conflicting transactions are untouched
    for id in ["bt-2", "bt-4", "bt-5"] {
        let txn = engine.get_transaction(id).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Unreconciled, "{}", id);
    }
    let pe4 = engine
        .get_voucher(VoucherType::PaymentEntry, "pe-4")
        .await
        .unwrap();
    assert_eq!(pe4.outstanding_amount, amount("350"));
}

#[tokio::test]
async fn test_auto_reconcile_retries_after_concurrent_modification() {
    let mut engine = setup(
        ConflictingStorage::new("bt-1", 1),
        vec![deposit("bt-1", "100", Some("INV-1"))],
        vec![payment("pe-1", "100", Some("INV-1"))],
    )
    .await;

    let summary = engine
        .auto_reconcile(&AutoReconcileRequest {
            bank_account: Some("ubs-chf".to_string()),
            date_range: DateRange::all(),
            reference_dates: None,
        })
        .await
        .unwrap();

    assert_eq!(summary.reconciled, vec!["bt-1"]);
    assert!(summary.failures.is_empty());

    let txn = engine.get_transaction("bt-1").await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Reconciled);
    assert_eq!(txn.allocations.len(), 1);
    assert_eq!(txn.allocated_amount, amount("100"));
    let voucher = engine
        .get_voucher(VoucherType::PaymentEntry, "pe-1")
        .await
        .unwrap();
    assert_eq!(voucher.outstanding_amount, amount("0"));
}

#[tokio::test]
async fn test_auto_reconcile_reference_date_filter() {
    let mut engine = setup(
        MemoryStorage::new(),
        vec![deposit("bt-1", "100", Some("INV-1"))],
        vec![payment("pe-1", "100", None).with_reference("INV-1", Some(date(2)))],
    )
    .await;

    let mut request = AutoReconcileRequest {
        bank_account: Some("ubs-chf".to_string()),
        date_range: DateRange::all(),
        reference_dates: Some(DateRange::between(date(5), date(31))),
    };
    let summary = engine.auto_reconcile(&request).await.unwrap();
    assert_eq!(summary.unmatched, vec!["bt-1"]);
    assert_eq!(summary.message(), "No matches occurred");

    request.reference_dates = Some(DateRange::between(date(1), date(3)));
    let summary = engine.auto_reconcile(&request).await.unwrap();
    assert_eq!(summary.reconciled, vec!["bt-1"]);
}

#[tokio::test]
async fn test_bank_account_is_required() {
    let mut engine = setup(MemoryStorage::new(), vec![], vec![]).await;

    let err = engine
        .list_transactions(None, &DateRange::all())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    let err = engine
        .list_transactions(Some("unknown"), &DateRange::all())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::BankAccountNotFound(_)));
    assert!(err.is_not_found());

    let err = engine
        .auto_reconcile(&AutoReconcileRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    let err = engine
        .list_transactions(Some("ubs-chf"), &DateRange::between(date(20), date(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
}

#[tokio::test]
async fn test_import_statement() {
    let mut engine = setup(MemoryStorage::new(), vec![], vec![]).await;
    let entries = vec![
        StatementEntry {
            booking_date: date(3),
            amount: amount("120.50"),
            indicator: CreditDebit::Credit,
            currency: Some("CHF".to_string()),
            creditor_reference: Some("RF18539007547034".to_string()),
            servicer_reference: Some("ZV-001".to_string()),
            additional_info: Some("Muster AG".to_string()),
        },
        StatementEntry {
            booking_date: date(2),
            amount: amount("80"),
            indicator: CreditDebit::Debit,
            currency: None,
            creditor_reference: None,
            servicer_reference: Some("ZV-002".to_string()),
            additional_info: None,
        },
        StatementEntry {
            booking_date: date(4),
            amount: amount("10"),
            indicator: CreditDebit::Credit,
            currency: Some("EUR".to_string()),
            creditor_reference: None,
            servicer_reference: None,
            additional_info: None,
        },
    ];

    let err = engine.import(&entries, "centura", None).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
    let err = engine
        .import(&entries, "acme", Some("ubs-chf"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    let summary = engine
        .import(&entries, "centura", Some("ubs-chf"))
        .await
        .unwrap();
    assert_eq!(summary.imported.len(), 2);
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].index, 2);

    let open = engine
        .list_transactions(Some("ubs-chf"), &DateRange::all())
        .await
        .unwrap();
    assert_eq!(open.len(), 2);
    // Oldest first
    assert_eq!(open[0].reference_number.as_deref(), Some("ZV-002"));
    assert_eq!(open[0].direction, Direction::Withdrawal);
    assert_eq!(open[1].reference_number.as_deref(), Some("RF18539007547034"));
    assert_eq!(open[1].status, TransactionStatus::Unreconciled);

    let newest_first = engine
        .list_transactions_ordered(
            Some("ubs-chf"),
            &DateRange::all(),
            TransactionOrder::DateDescending,
        )
        .await
        .unwrap();
    assert_eq!(newest_first.len(), 2);
    assert_eq!(newest_first[0].date, date(3));
    assert_eq!(newest_first[1].date, date(2));
}

#[tokio::test]
async fn test_amounts_beyond_currency_precision_are_rejected() {
    let mut engine = setup(
        MemoryStorage::new(),
        vec![deposit("bt-1", "100", Some("INV-1"))],
        vec![],
    )
    .await;

    // 99.996 rounds to 100.00 but could never settle the transaction exactly
    let err = engine
        .register_voucher(&payment("pe-1", "99.996", Some("INV-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
    assert!(engine
        .get_voucher(VoucherType::PaymentEntry, "pe-1")
        .await
        .unwrap_err()
        .is_not_found());

    let entries = vec![StatementEntry {
        booking_date: date(11),
        amount: amount("100.004"),
        indicator: CreditDebit::Credit,
        currency: Some("CHF".to_string()),
        creditor_reference: Some("INV-2".to_string()),
        servicer_reference: None,
        additional_info: None,
    }];
    let summary = engine
        .import(&entries, "centura", Some("ubs-chf"))
        .await
        .unwrap();
    assert!(summary.imported.is_empty());
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].index, 0);

    // Trailing zeros are fine and settle the transaction in full
    engine
        .register_voucher(&payment("pe-1", "100.000", Some("INV-1")))
        .await
        .unwrap();
    let err = engine
        .bulk_reconcile(
            "bt-1",
            &[VoucherSelection::new(VoucherType::PaymentEntry, "pe-1")
                .with_amount(amount("0.001"))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    let summary = engine
        .auto_reconcile(&AutoReconcileRequest {
            bank_account: Some("ubs-chf".to_string()),
            date_range: DateRange::all(),
            reference_dates: None,
        })
        .await
        .unwrap();
    assert_eq!(summary.reconciled, vec!["bt-1"]);
    let txn = engine.get_transaction("bt-1").await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Reconciled);
    assert_eq!(txn.unallocated_amount, amount("0"));
}

fn fee_journal(allow_edit: bool) -> VoucherSpec {
    VoucherSpec::JournalEntry(JournalEntrySpec {
        id: Some("je-1".to_string()),
        posting_date: date(10),
        reference_number: Some("FEES-03".to_string()),
        reference_date: Some(date(10)),
        entry_type: "Bank Entry".to_string(),
        counter_account: CounterAccount {
            id: "6900".to_string(),
            account_type: CounterAccountType::Other,
            currency: "CHF".to_string(),
        },
        party: None,
        mode_of_payment: None,
        remark: None,
        allow_edit,
    })
}

fn withdrawal(id: &str, value: &str) -> BankTransaction {
    BankTransaction::new(
        id.to_string(),
        &bank_account(),
        date(10),
        Direction::Withdrawal,
        amount(value),
        "Bank fees".to_string(),
    )
}

#[tokio::test]
async fn test_create_voucher_and_reconcile() {
    let mut engine =
        setup(MemoryStorage::new(), vec![withdrawal("bt-1", "12.40")], vec![]).await;

    let outcome = engine
        .create_voucher_and_reconcile("bt-1", &fee_journal(false))
        .await
        .unwrap();
    let VoucherOutcome::Reconciled(reconciliation) = outcome else {
        panic!("expected the voucher to be reconciled");
    };
    assert_eq!(reconciliation.transaction.status, TransactionStatus::Reconciled);
    assert_eq!(reconciliation.vouchers[0].payment_type, PaymentType::Pay);

    let voucher = engine
        .get_voucher(VoucherType::JournalEntry, "je-1")
        .await
        .unwrap();
    assert_eq!(voucher.status, VoucherStatus::Submitted);
    assert_eq!(voucher.amount, amount("12.40"));
    assert_eq!(voucher.outstanding_amount, amount("0"));
}

/// Validator that turns every proposal down
struct RejectingValidator;

impl ProposalValidator for RejectingValidator {
    fn validate_proposal(
        &self,
        _proposal: &MatchProposal,
        _transaction: &BankTransaction,
        _vouchers: &[Voucher],
    ) -> ReconcileResult<()> {
        Err(ReconcileError::Validation("rejected".to_string()))
    }
}

#[tokio::test]
async fn test_failed_reconcile_returns_created_voucher_to_draft() {
    let storage = MemoryStorage::new();
    let mut engine = ReconciliationEngine::with_validator(
        storage.clone(),
        MatchingConfig::default(),
        Box::new(RejectingValidator),
    )
    .unwrap();
    engine.register_bank_account(&bank_account()).await.unwrap();
    let mut writer = storage.clone();
    writer
        .save_transaction(&withdrawal("bt-1", "12.40"))
        .await
        .unwrap();

    let err = engine
        .create_voucher_and_reconcile("bt-1", &fee_journal(false))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    let voucher = engine
        .get_voucher(VoucherType::JournalEntry, "je-1")
        .await
        .unwrap();
    assert_eq!(voucher.status, VoucherStatus::Draft);
    assert_eq!(voucher.outstanding_amount, amount("12.40"));
    assert_eq!(
        engine.get_transaction("bt-1").await.unwrap().status,
        TransactionStatus::Unreconciled
    );

    // Drafts stay out of matching
    let candidates = engine
        .find_candidates("bt-1", &CandidateFilter::default())
        .await
        .unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_create_voucher_for_editing_leaves_transaction_open() {
    let mut engine =
        setup(MemoryStorage::new(), vec![withdrawal("bt-1", "12.40")], vec![]).await;

    let outcome = engine
        .create_voucher_and_reconcile("bt-1", &fee_journal(true))
        .await
        .unwrap();
    let VoucherOutcome::Draft(draft) = outcome else {
        panic!("expected a draft voucher");
    };
    assert_eq!(draft.status, VoucherStatus::Draft);
    assert_eq!(
        engine.get_transaction("bt-1").await.unwrap().status,
        TransactionStatus::Unreconciled
    );

    // Drafts are not candidates and cannot be reconciled
    let candidates = engine
        .find_candidates("bt-1", &CandidateFilter::default())
        .await
        .unwrap();
    assert!(candidates.is_empty());
    let selection = [VoucherSelection::new(VoucherType::JournalEntry, "je-1")];
    assert!(engine.bulk_reconcile("bt-1", &selection).await.is_err());

    engine
        .submit_voucher(VoucherType::JournalEntry, "je-1")
        .await
        .unwrap();
    let reconciliation = engine.bulk_reconcile("bt-1", &selection).await.unwrap();
    assert_eq!(reconciliation.transaction.status, TransactionStatus::Reconciled);
}

#[tokio::test]
async fn test_journal_entry_rules() {
    let mut engine =
        setup(MemoryStorage::new(), vec![withdrawal("bt-1", "500")], vec![]).await;

    let VoucherSpec::JournalEntry(base) = fee_journal(false) else {
        unreachable!()
    };

    let payable_without_party = VoucherSpec::JournalEntry(JournalEntrySpec {
        counter_account: CounterAccount {
            id: "2000".to_string(),
            account_type: CounterAccountType::Payable,
            currency: "CHF".to_string(),
        },
        ..base.clone()
    });
    let err = engine
        .create_voucher_and_reconcile("bt-1", &payable_without_party)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    let foreign_currency = VoucherSpec::JournalEntry(JournalEntrySpec {
        counter_account: CounterAccount {
            id: "6900-EUR".to_string(),
            account_type: CounterAccountType::Other,
            currency: "EUR".to_string(),
        },
        ..base
    });
    let err = engine
        .create_voucher_and_reconcile("bt-1", &foreign_currency)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    // Nothing was saved
    assert!(engine
        .get_voucher(VoucherType::JournalEntry, "je-1")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_bulk_reconcile_across_vouchers() {
    let mut engine = setup(
        MemoryStorage::new(),
        vec![deposit("bt-1", "250", None)],
        vec![
            payment("pe-1", "100", None),
            payment("pe-2", "120", None),
            payment("pe-3", "80", None),
        ],
    )
    .await;

    let reconciliation = engine
        .bulk_reconcile(
            "bt-1",
            &[
                VoucherSelection::new(VoucherType::PaymentEntry, "pe-1")
                    .with_amount(amount("60")),
                VoucherSelection::new(VoucherType::PaymentEntry, "pe-2"),
                VoucherSelection::new(VoucherType::PaymentEntry, "pe-3"),
            ],
        )
        .await
        .unwrap();

    // 60 + 120 + 70
    assert_eq!(reconciliation.transaction.status, TransactionStatus::Reconciled);
    assert_eq!(reconciliation.vouchers[0].outstanding_amount, amount("40"));
    assert_eq!(reconciliation.vouchers[1].outstanding_amount, amount("0"));
    assert_eq!(reconciliation.vouchers[2].outstanding_amount, amount("10"));
}

#[tokio::test]
async fn test_single_party_validator() {
    let storage = MemoryStorage::new();
    let mut engine = ReconciliationEngine::with_validator(
        storage.clone(),
        MatchingConfig::default(),
        Box::new(SinglePartyProposalValidator),
    )
    .unwrap();
    engine.register_bank_account(&bank_account()).await.unwrap();
    let mut writer = storage.clone();
    writer
        .save_transaction(&deposit("bt-1", "200", None))
        .await
        .unwrap();
    let muster = payment("pe-1", "100", None).with_party(Party::customer("Muster AG"));
    let beispiel = payment("pe-2", "100", None).with_party(Party::customer("Beispiel GmbH"));
    engine.register_voucher(&muster).await.unwrap();
    engine.register_voucher(&beispiel).await.unwrap();

    let err = engine
        .bulk_reconcile(
            "bt-1",
            &[
                VoucherSelection::new(VoucherType::PaymentEntry, "pe-1"),
                VoucherSelection::new(VoucherType::PaymentEntry, "pe-2"),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
    assert_eq!(
        engine.get_transaction("bt-1").await.unwrap().status,
        TransactionStatus::Unreconciled
    );
}

#[tokio::test]
async fn test_config_from_toml_drives_tolerance() {
    let config = MatchingConfig::from_toml("amount_tolerance = \"0.05\"").unwrap();
    let storage = MemoryStorage::new();
    let mut engine = ReconciliationEngine::with_config(storage.clone(), config).unwrap();
    engine.register_bank_account(&bank_account()).await.unwrap();
    let mut writer = storage.clone();
    writer
        .save_transaction(&deposit("bt-1", "100", None))
        .await
        .unwrap();
    engine
        .register_voucher(&payment("pe-1", "99.97", None))
        .await
        .unwrap();

    let proposal = engine
        .propose("bt-1", &CandidateFilter::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(proposal.confidence, Confidence::Fuzzy);

    let reconciliation = engine.apply(&proposal).await.unwrap();
    assert_eq!(reconciliation.transaction.unallocated_amount, amount("0.03"));
    assert_eq!(reconciliation.transaction.status, TransactionStatus::Matched);
}
