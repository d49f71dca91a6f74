//! Round-up engine
//!
//! Pure arithmetic: the same transaction and granularity always produce the same
//! candidate, which is what lets the ledger deduplicate by signature.

use rust_decimal::Decimal;

use crate::domain::{ClassifiedDelta, Granularity, Network, RawTransaction, RoundUpCandidate};
use crate::services::scanner::classify_delta;

/// Distance from `amount` up to the next multiple of `granularity`
///
/// Exact multiples round up by zero.
pub fn compute_round_up(amount: Decimal, granularity: Granularity) -> Decimal {
    let step = granularity.value();
    let remainder = amount.abs() % step;
    if remainder.is_zero() {
        Decimal::ZERO
    } else {
        (step - remainder).normalize()
    }
}

/// Candidate for one classified delta, or `None` when nothing rounds up
///
/// The timestamp is the block time, 0 when the ledger did not report one.
pub fn build_candidate(
    tx: &RawTransaction,
    delta: &ClassifiedDelta,
    granularity: Granularity,
) -> Option<RoundUpCandidate> {
    let round_up = compute_round_up(delta.amount, granularity);
    if round_up <= Decimal::ZERO {
        return None;
    }

    Some(RoundUpCandidate {
        signature: tx.signature.clone(),
        original_amount: delta.amount,
        round_up_amount: round_up,
        timestamp: tx.block_time.unwrap_or_default(),
        processed: false,
        asset_type: delta.asset_type,
    })
}

/// Classify a page of activity and build every candidate it yields
///
/// A transaction with both a stable and a native delta produces two candidates
/// under one signature; the ledger keeps the first (stable) one.
pub fn candidates_from_activity(
    activity: &[RawTransaction],
    address: &str,
    network: Network,
    granularity: Granularity,
) -> Vec<RoundUpCandidate> {
    activity
        .iter()
        .flat_map(|tx| {
            classify_delta(tx, address, network)
                .into_iter()
                .filter_map(move |delta| build_candidate(tx, &delta, granularity))
        })
        .collect()
}
