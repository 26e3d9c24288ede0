pub use bankfeed_core::DedupPolicy;
use bankfeed_core::{DateRange, RawTransaction, Transaction};

/// Result of filtering one batch of candidates.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Genuinely new candidates, in input order.
    pub accepted: Vec<RawTransaction>,
    pub duplicates: usize,
    /// New candidates dropped because the policy's cap was reached.
    pub over_cap: usize,
}

/// Dates an existing transaction must fall into to possibly duplicate
/// `candidate`. `None` means any date.
pub fn candidate_window(policy: &DedupPolicy, candidate: &RawTransaction) -> Option<DateRange> {
    policy
        .window
        .map(|w| DateRange::around(candidate.value_date, w.days_before, w.days_after))
}

/// Value-date range covering the windows of every candidate, for loading
/// the stored transactions to compare against. `None` when the policy has
/// no window or the batch is empty; callers skip empty batches.
pub fn lookup_range(policy: &DedupPolicy, candidates: &[RawTransaction]) -> Option<DateRange> {
    candidates
        .iter()
        .map(|c| candidate_window(policy, c))
        .reduce(|acc, w| match (acc, w) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => None,
        })
        .flatten()
}

/// True when `existing` (same account) has the same trimmed text and amount
/// inside the candidate's window.
pub fn is_duplicate(policy: &DedupPolicy, candidate: &RawTransaction, existing: &Transaction) -> bool {
    if existing.amount != candidate.amount {
        return false;
    }
    if existing.text.trim() != candidate.text.trim() {
        return false;
    }
    candidate_window(policy, candidate).map_or(true, |w| w.contains(existing.value_date))
}

/// Splits normalized candidates of one account into new and duplicate rows.
/// Only stored rows count; identical candidates inside one batch are all kept.
pub fn filter_duplicates(
    policy: &DedupPolicy,
    candidates: Vec<RawTransaction>,
    existing: &[Transaction],
) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();

    for candidate in candidates {
        if existing.iter().any(|e| is_duplicate(policy, &candidate, e)) {
            outcome.duplicates += 1;
            continue;
        }
        if policy.cap.is_some_and(|cap| outcome.accepted.len() >= cap) {
            outcome.over_cap += 1;
            continue;
        }
        outcome.accepted.push(candidate);
    }

    outcome
}
