//! Statement import and auto-reconcile example

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::utils::MemoryStorage;
use reconciliation_core::{
    AutoReconcileRequest, BankAccount, CandidateFilter, CounterAccount, CounterAccountType,
    CreditDebit, DateRange, JournalEntrySpec, Party, PaymentType, ReconciliationEngine,
    StatementEntry, Voucher, VoucherOutcome, VoucherSpec, VoucherType,
};
use std::str::FromStr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reconciliation_core=debug".into()),
        )
        .init();

    println!("🏦 Reconciliation Core - Auto Reconcile Example\n");

    let storage = MemoryStorage::new();
    let mut engine = ReconciliationEngine::new(storage);

    // 1. Bank account and the vouchers the accounting side already knows about
    let account = BankAccount::new(
        "ubs-chf".to_string(),
        "UBS Business CHF".to_string(),
        "centura".to_string(),
        "CHF".to_string(),
        "1020".to_string(),
    );
    engine.register_bank_account(&account).await?;

    let march = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
    let vouchers = vec![
        Voucher::new(
            "PE-0001".to_string(),
            VoucherType::PaymentEntry,
            "centura".to_string(),
            "CHF".to_string(),
            PaymentType::Receive,
            BigDecimal::from_str("1250.00")?,
            march(3),
        )
        .with_reference("RF18539007547034", None)
        .with_party(Party::customer("Muster AG")),
        Voucher::new(
            "SINV-0042".to_string(),
            VoucherType::SalesInvoice,
            "centura".to_string(),
            "CHF".to_string(),
            PaymentType::Receive,
            BigDecimal::from_str("430.00")?,
            march(1),
        )
        .with_reference("SINV-0042", None)
        .with_party(Party::customer("Beispiel GmbH")),
    ];
    for voucher in &vouchers {
        engine.register_voucher(voucher).await?;
        println!(
            "  ✓ Voucher {} {} outstanding {}",
            voucher.voucher_type, voucher.id, voucher.outstanding_amount
        );
    }

    // 2. Import a decoded statement
    println!("\n📥 Importing statement...");
    let entries = vec![
        StatementEntry {
            booking_date: march(4),
            amount: BigDecimal::from_str("1250.00")?,
            indicator: "CRDT".parse::<CreditDebit>()?,
            currency: Some("CHF".to_string()),
            creditor_reference: Some("RF18539007547034".to_string()),
            servicer_reference: Some("ZV20250304/001".to_string()),
            additional_info: Some("Gutschrift Muster AG".to_string()),
        },
        StatementEntry {
            booking_date: march(5),
            amount: BigDecimal::from_str("400.00")?,
            indicator: CreditDebit::Credit,
            currency: Some("CHF".to_string()),
            creditor_reference: Some("SINV-0042".to_string()),
            servicer_reference: None,
            additional_info: Some("Teilzahlung Beispiel GmbH".to_string()),
        },
        StatementEntry {
            booking_date: march(6),
            amount: BigDecimal::from_str("18.90")?,
            indicator: CreditDebit::Debit,
            currency: None,
            creditor_reference: None,
            servicer_reference: Some("ZV20250306/007".to_string()),
            additional_info: Some("Kontoführungsgebühr".to_string()),
        },
    ];
    let imported = engine
        .import(&entries, "centura", Some(account.id.as_str()))
        .await?;
    println!("  ✓ {}", imported.message());

    // 3. Auto-reconcile exact reference matches
    println!("\n🔗 Auto-reconciling...");
    let summary = engine
        .auto_reconcile(&AutoReconcileRequest {
            bank_account: Some(account.id.clone()),
            date_range: DateRange::between(march(1), march(31)),
            reference_dates: None,
        })
        .await?;
    println!("  {}", summary.message());
    println!("{}", serde_json::to_string_pretty(&summary)?);

    // 4. Walk through what is still open
    println!("\n📋 Open transactions:");
    let open = engine
        .list_transactions(Some(account.id.as_str()), &DateRange::all())
        .await?;
    for txn in &open {
        println!(
            "  {} {} {:?} {} (unallocated {})",
            txn.date,
            txn.reference_number.as_deref().unwrap_or("-"),
            txn.direction,
            txn.amount,
            txn.unallocated_amount
        );

        let candidates = engine
            .find_candidates(&txn.id, &CandidateFilter::default())
            .await?;
        for candidate in candidates.iter().take(3) {
            println!(
                "    candidate {} {} outstanding {} rank {}",
                candidate.voucher.voucher_type,
                candidate.voucher.id,
                candidate.voucher.outstanding_amount,
                candidate.rank
            );
        }
    }

    // 5. Confirm the partial payment and book the bank fee
    for txn in &open {
        if let Some(proposal) = engine.propose(&txn.id, &CandidateFilter::default()).await? {
            let reconciliation = engine.apply(&proposal).await?;
            println!(
                "\n  ✓ Confirmed {:?} proposal: {} now {:?}",
                proposal.confidence, txn.id, reconciliation.transaction.status
            );
            continue;
        }

        let spec = VoucherSpec::JournalEntry(JournalEntrySpec {
            id: None,
            posting_date: txn.date,
            reference_number: txn.reference_number.clone(),
            reference_date: Some(txn.date),
            entry_type: "Bank Entry".to_string(),
            counter_account: CounterAccount {
                id: "6940".to_string(),
                account_type: CounterAccountType::Other,
                currency: "CHF".to_string(),
            },
            party: None,
            mode_of_payment: None,
            remark: Some(txn.description.clone()),
            allow_edit: false,
        });
        if let VoucherOutcome::Reconciled(reconciliation) =
            engine.create_voucher_and_reconcile(&txn.id, &spec).await?
        {
            println!(
                "\n  ✓ Booked {} {} for {}",
                reconciliation.vouchers[0].voucher_type, reconciliation.vouchers[0].id, txn.id
            );
        }
    }

    let remaining = engine
        .list_transactions(Some(account.id.as_str()), &DateRange::all())
        .await?;
    println!("\n✅ {} transaction(s) left to reconcile", remaining.len());

    Ok(())
}
