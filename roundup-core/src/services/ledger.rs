//! Round-up ledger - one candidate per signature, ever

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{AssetType, PendingTotal, RoundUpCandidate};
use crate::ports::{KeyValueStore, KeyValueStoreExt, StoreKey};

/// Durable candidate collection under `pending_round_ups`
///
/// Every write is a single atomic read-modify-write of the whole list, so reads
/// always see the result of the last completed append or mark.
pub struct RoundUpLedger {
    store: Arc<dyn KeyValueStore>,
}

impl RoundUpLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Merge new candidates, keeping the first one seen for each signature
    ///
    /// Returns how many were actually added.
    pub fn append_candidates(&self, new: Vec<RoundUpCandidate>) -> Result<usize> {
        if new.is_empty() {
            return Ok(0);
        }
        self.store
            .update_json(StoreKey::PendingRoundUps, |ledger: &mut Vec<RoundUpCandidate>| {
                let mut seen: HashSet<String> =
                    ledger.iter().map(|c| c.signature.clone()).collect();
                let before = ledger.len();
                for candidate in new {
                    if seen.insert(candidate.signature.clone()) {
                        ledger.push(candidate);
                    }
                }
                Ok(ledger.len() - before)
            })
    }

    /// Flag a candidate as deposited; unknown signatures are ignored
    ///
    /// Returns whether a pending candidate was flipped.
    pub fn mark_processed(&self, signature: &str) -> Result<bool> {
        self.store
            .update_json(StoreKey::PendingRoundUps, |ledger: &mut Vec<RoundUpCandidate>| {
                Ok(match ledger.iter_mut().find(|c| c.signature == signature) {
                    Some(candidate) if !candidate.processed => {
                        candidate.processed = true;
                        true
                    }
                    _ => false,
                })
            })
    }

    pub fn candidates(&self) -> Result<Vec<RoundUpCandidate>> {
        Ok(self
            .store
            .get_json(StoreKey::PendingRoundUps)?
            .unwrap_or_default())
    }

    pub fn pending(&self) -> Result<Vec<RoundUpCandidate>> {
        Ok(self
            .candidates()?
            .into_iter()
            .filter(RoundUpCandidate::is_pending)
            .collect())
    }

    /// Sum of unprocessed round-up amounts
    pub fn total_pending(&self) -> Result<Decimal> {
        Ok(self.pending()?.iter().map(|c| c.round_up_amount).sum())
    }

    /// Pending totals per asset, since native and stable amounts are different units
    pub fn pending_by_asset(&self) -> Result<Vec<PendingTotal>> {
        let mut totals: BTreeMap<AssetType, PendingTotal> = BTreeMap::new();
        for candidate in self.pending()? {
            let entry = totals
                .entry(candidate.asset_type)
                .or_insert_with(|| PendingTotal {
                    asset_type: candidate.asset_type,
                    count: 0,
                    amount: Decimal::ZERO,
                });
            entry.count += 1;
            entry.amount += candidate.round_up_amount;
        }
        Ok(totals.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;

    fn candidate(signature: &str, round_up: &str, asset_type: AssetType) -> RoundUpCandidate {
        RoundUpCandidate {
            signature: signature.to_string(),
            original_amount: Decimal::ONE,
            round_up_amount: round_up.parse().unwrap(),
            timestamp: 0,
            processed: false,
            asset_type,
        }
    }

    fn ledger() -> RoundUpLedger {
        RoundUpLedger::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn test_append_dedups_within_batch() {
        let ledger = ledger();
        let added = ledger
            .append_candidates(vec![
                candidate("sigA", "0.33", AssetType::Stable),
                candidate("sigA", "0.75", AssetType::Native),
            ])
            .unwrap();
        assert_eq!(added, 1);
        let all = ledger.candidates().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].asset_type, AssetType::Stable);
    }

    #[test]
    fn test_overlapping_append_is_idempotent() {
        let ledger = ledger();
        ledger
            .append_candidates(vec![
                candidate("a", "0.33", AssetType::Stable),
                candidate("b", "0.50", AssetType::Stable),
            ])
            .unwrap();
        let total = ledger.total_pending().unwrap();

        let added = ledger
            .append_candidates(vec![
                candidate("b", "0.50", AssetType::Stable),
                candidate("a", "0.33", AssetType::Stable),
            ])
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(ledger.total_pending().unwrap(), total);
        assert_eq!(total, "0.83".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_first_occurrence_wins_across_batches() {
        let ledger = ledger();
        ledger.append_candidates(vec![candidate("a", "0.33", AssetType::Stable)]).unwrap();
        ledger.append_candidates(vec![candidate("a", "0.90", AssetType::Stable)]).unwrap();
        assert_eq!(ledger.candidates().unwrap()[0].round_up_amount, "0.33".parse().unwrap());
    }

    #[test]
    fn test_mark_processed() {
        let ledger = ledger();
        ledger
            .append_candidates(vec![
                candidate("a", "0.33", AssetType::Stable),
                candidate("b", "0.50", AssetType::Stable),
            ])
            .unwrap();

        assert!(ledger.mark_processed("a").unwrap());
        assert!(!ledger.mark_processed("a").unwrap());
        assert!(!ledger.mark_processed("unknown").unwrap());

        assert_eq!(ledger.total_pending().unwrap(), "0.50".parse::<Decimal>().unwrap());
        assert_eq!(ledger.pending().unwrap().len(), 1);
        // Never deleted
        assert_eq!(ledger.candidates().unwrap().len(), 2);
    }

    #[test]
    fn test_processed_candidate_is_not_readded() {
        let ledger = ledger();
        ledger.append_candidates(vec![candidate("a", "0.33", AssetType::Stable)]).unwrap();
        ledger.mark_processed("a").unwrap();
        ledger.append_candidates(vec![candidate("a", "0.33", AssetType::Stable)]).unwrap();
        assert_eq!(ledger.total_pending().unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_pending_by_asset() {
        let ledger = ledger();
        ledger
            .append_candidates(vec![
                candidate("a", "0.33", AssetType::Stable),
                candidate("b", "0.7525", AssetType::Native),
                candidate("c", "0.50", AssetType::Stable),
            ])
            .unwrap();
        let totals = ledger.pending_by_asset().unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].asset_type, AssetType::Stable);
        assert_eq!(totals[0].count, 2);
        assert_eq!(totals[0].amount, "0.83".parse::<Decimal>().unwrap());
        assert_eq!(totals[1].amount, "0.7525".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = ledger();
        assert_eq!(ledger.append_candidates(vec![]).unwrap(), 0);
        assert_eq!(ledger.total_pending().unwrap(), Decimal::ZERO);
        assert!(ledger.pending_by_asset().unwrap().is_empty());
    }
}
