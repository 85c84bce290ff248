//! Voucher candidate lookup and ranking

use std::cmp::Ordering;

use tracing::debug;

use crate::config::MatchingConfig;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{reference_in_description, references_match};

/// Optional restrictions on top of the always-applied company, currency,
/// direction and outstanding-amount filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilter {
    /// Voucher types to consider; `None` uses the configured document types
    pub document_types: Option<Vec<VoucherType>>,
    /// Only vouchers whose outstanding amount equals the transaction's unallocated amount
    pub exact_amount: bool,
    /// Only vouchers of the transaction's party
    pub exact_party: bool,
    /// Only vouchers whose reference equals the transaction reference
    pub reference_only: bool,
    /// Only vouchers posted within this range
    pub posting_dates: Option<DateRange>,
    /// Only vouchers whose reference date (or posting date, when unset) falls within this range
    pub reference_dates: Option<DateRange>,
}

impl CandidateFilter {
    /// Filter used by auto-reconcile: equal references only, among the given voucher types
    pub fn auto_reconcile(document_types: Vec<VoucherType>) -> Self {
        Self {
            document_types: Some(document_types),
            reference_only: true,
            ..Self::default()
        }
    }
}

/// Evaluate the match signals of a voucher against a transaction
pub fn evaluate(
    transaction: &BankTransaction,
    voucher: Voucher,
    config: &MatchingConfig,
) -> Candidate {
    let reference_match = references_match(
        transaction.reference_number.as_deref(),
        voucher.reference_number.as_deref(),
    );
    let amount_match =
        config.amounts_equal(&voucher.outstanding_amount, &transaction.unallocated_amount);
    let party_match = match (&transaction.party, &voucher.party) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    let description_match =
        reference_in_description(voucher.reference_number.as_deref(), &transaction.description);
    let date_distance_days = (voucher.effective_date() - transaction.date).num_days().abs();

    let rank = 1
        + u32::from(reference_match)
        + u32::from(amount_match)
        + u32::from(party_match)
        + u32::from(date_distance_days == 0)
        + u32::from(description_match);

    Candidate {
        voucher,
        reference_match,
        amount_match,
        party_match,
        description_match,
        date_distance_days,
        rank,
    }
}

/// Reference matches first, then amount matches, then the closest dates
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.reference_match
        .cmp(&a.reference_match)
        .then_with(|| b.amount_match.cmp(&a.amount_match))
        .then_with(|| a.date_distance_days.cmp(&b.date_distance_days))
        .then_with(|| b.rank.cmp(&a.rank))
        .then_with(|| a.voucher.voucher_type.cmp(&b.voucher.voucher_type))
        .then_with(|| a.voucher.id.cmp(&b.voucher.id))
}

/// Filter, evaluate and order vouchers for a transaction
pub fn select_candidates(
    transaction: &BankTransaction,
    vouchers: Vec<Voucher>,
    filter: &CandidateFilter,
    config: &MatchingConfig,
) -> Vec<Candidate> {
    let document_types = filter
        .document_types
        .as_ref()
        .unwrap_or(&config.document_types);
    let payment_type = transaction.direction.payment_type();
    let zero = bigdecimal::BigDecimal::from(0);

    let mut candidates: Vec<Candidate> = vouchers
        .into_iter()
        .filter(|v| {
            v.is_submitted()
                && v.company == transaction.company
                && v.currency == transaction.currency
                && v.payment_type == payment_type
                && v.outstanding_amount > zero
                && document_types.contains(&v.voucher_type)
        })
        .filter(|v| {
            filter
                .posting_dates
                .is_none_or(|range| range.contains(v.posting_date))
                && filter
                    .reference_dates
                    .is_none_or(|range| range.contains(v.effective_date()))
        })
        .map(|v| evaluate(transaction, v, config))
        .filter(|c| {
            (!filter.exact_amount || c.amount_match)
                && (!filter.exact_party || c.party_match)
                && (!filter.reference_only || c.reference_match)
                && config
                    .max_date_distance_days
                    .is_none_or(|max| c.date_distance_days <= i64::from(max))
        })
        .collect();

    candidates.sort_by(compare_candidates);
    candidates.truncate(config.max_results);
    candidates
}

/// Looks up outstanding vouchers that could settle a bank transaction
pub struct CandidateFinder<S: ReconciliationStorage> {
    storage: S,
    config: MatchingConfig,
}

impl<S: ReconciliationStorage> CandidateFinder<S> {
    /// Create a new candidate finder
    pub fn new(storage: S, config: MatchingConfig) -> Self {
        Self { storage, config }
    }

    /// Candidates for a transaction with the default filter
    pub async fn find_candidates(
        &self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<Vec<Candidate>> {
        self.find_candidates_with(transaction, &CandidateFilter::default())
            .await
    }

    /// Candidates for a transaction, narrowed by `filter`
    pub async fn find_candidates_with(
        &self,
        transaction: &BankTransaction,
        filter: &CandidateFilter,
    ) -> ReconcileResult<Vec<Candidate>> {
        let vouchers = self
            .storage
            .get_outstanding_vouchers(&transaction.company, &transaction.currency)
            .await?;
        let considered = vouchers.len();

        let candidates = select_candidates(transaction, vouchers, filter, &self.config);

        debug!(
            transaction_id = %transaction.id,
            considered,
            candidates = candidates.len(),
            "Found voucher candidates"
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn transaction(amount: i64, reference: Option<&str>) -> BankTransaction {
        let account = BankAccount::new(
            "ubs-chf".to_string(),
            "UBS CHF".to_string(),
            "centura".to_string(),
            "CHF".to_string(),
            "1020".to_string(),
        );
        let txn = BankTransaction::new(
            "bt-1".to_string(),
            &account,
            date(10),
            Direction::Deposit,
            BigDecimal::from(amount),
            "Incoming payment".to_string(),
        );
        match reference {
            Some(reference) => txn.with_reference(reference),
            None => txn,
        }
    }

    fn voucher(id: &str, amount: i64, day: u32) -> Voucher {
        Voucher::new(
            id.to_string(),
            VoucherType::PaymentEntry,
            "centura".to_string(),
            "CHF".to_string(),
            PaymentType::Receive,
            BigDecimal::from(amount),
            date(day),
        )
    }

    #[test]
    fn test_ordering_reference_then_amount_then_date() {
        let txn = transaction(100, Some("INV-1"));
        let vouchers = vec![
            voucher("close-date", 70, 10),
            voucher("amount", 100, 20),
            voucher("reference", 40, 25).with_reference("INV-1", None),
            voucher("far-date", 70, 1),
        ];

        let candidates = select_candidates(
            &txn,
            vouchers,
            &CandidateFilter::default(),
            &MatchingConfig::default(),
        );
        let ids: Vec<&str> = candidates.iter().map(|c| c.voucher.id.as_str()).collect();
        assert_eq!(ids, vec!["reference", "amount", "close-date", "far-date"]);
    }

    #[test]
    fn test_restricted_to_company_currency_direction_and_submitted() {
        let txn = transaction(100, None);
        let mut other_company = voucher("other-company", 100, 10);
        other_company.company = "acme".to_string();
        let mut other_currency = voucher("other-currency", 100, 10);
        other_currency.currency = "EUR".to_string();
        let mut paying = voucher("paying", 100, 10);
        paying.payment_type = PaymentType::Pay;
        let draft = voucher("draft", 100, 10).draft();
        let settled = voucher("settled", 100, 10).with_outstanding(BigDecimal::from(0));

        let candidates = select_candidates(
            &txn,
            vec![
                other_company,
                other_currency,
                paying,
                draft,
                settled,
                voucher("ok", 100, 10),
            ],
            &CandidateFilter::default(),
            &MatchingConfig::default(),
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].voucher.id, "ok");
        assert!(candidates[0].amount_match);
    }

    #[test]
    fn test_reference_only_and_document_types() {
        let txn = transaction(100, Some("INV-1"));
        let mut invoice = voucher("sinv-1", 100, 10).with_reference("INV-1", None);
        invoice.voucher_type = VoucherType::SalesInvoice;

        let candidates = select_candidates(
            &txn,
            vec![
                invoice,
                voucher("pe-1", 100, 10),
                voucher("pe-2", 100, 10).with_reference("inv-1", None),
            ],
            &CandidateFilter::auto_reconcile(vec![VoucherType::PaymentEntry]),
            &MatchingConfig::default(),
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].voucher.id, "pe-2");
    }

    #[test]
    fn test_reference_date_filter_falls_back_to_posting_date() {
        let txn = transaction(100, None);
        let filter = CandidateFilter {
            reference_dates: Some(DateRange::between(date(1), date(5))),
            ..CandidateFilter::default()
        };

        let candidates = select_candidates(
            &txn,
            vec![
                voucher("ref-in-range", 100, 20).with_reference("X", Some(date(3))),
                voucher("posted-in-range", 100, 4),
                voucher("out-of-range", 100, 9),
            ],
            &filter,
            &MatchingConfig::default(),
        );
        let mut ids: Vec<&str> = candidates.iter().map(|c| c.voucher.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["posted-in-range", "ref-in-range"]);
    }

    #[test]
    fn test_rank_counts_signals_and_result_is_truncated() {
        let txn = transaction(100, Some("INV-1"))
            .with_party(Party::customer("Muster AG"));
        let best = voucher("best", 100, 10)
            .with_reference("INV-1", None)
            .with_party(Party::customer("Muster AG"));
        let config = MatchingConfig {
            max_results: 2,
            ..MatchingConfig::default()
        };

        let candidates = select_candidates(
            &txn,
            vec![best, voucher("a", 10, 1), voucher("b", 10, 2), voucher("c", 10, 3)],
            &CandidateFilter::default(),
            &config,
        );
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].voucher.id, "best");
        // base + reference + amount + party + same day
        assert_eq!(candidates[0].rank, 5);
        assert_eq!(candidates[1].voucher.id, "c");
    }

    #[test]
    fn test_max_date_distance() {
        let txn = transaction(100, None);
        let config = MatchingConfig {
            max_date_distance_days: Some(3),
            ..MatchingConfig::default()
        };

        let candidates = select_candidates(
            &txn,
            vec![voucher("near", 100, 8), voucher("far", 100, 1)],
            &CandidateFilter::default(),
            &config,
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].voucher.id, "near");
    }
}
