//! Concurrent access tests
//!
//! Overlapping monitor runs and concurrent writers must never lose, duplicate
//! or regress anything: appends dedup by signature, marks are not lost, and the
//! scan cursor only moves forward.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use tempfile::TempDir;

use roundup_core::adapters::duckdb::DuckDbStore;
use roundup_core::adapters::memory::RecordingNotifier;
use roundup_core::adapters::simulated::SimulatedLedger;
use roundup_core::domain::settings::TEST_STABLE_MINT;
use roundup_core::domain::DerivationPath;
use roundup_core::ports::{KeyValueStore, StoreKey};
use roundup_core::services::monitor::{CancelToken, RunOutcome};
use roundup_core::services::{AccountStore, ChainScanner, MonitorLoop, RoundUpLedger};
use roundup_core::{Account, AssetType, Network, RoundUpCandidate, ScanCursor, Settings};

/// Number of concurrent writers.
/// A wallet realistically has the monitor, a request handler and a CLI command.
const THREAD_COUNT: usize = 6;

const ADDR: &str = "Owner1111111111111111111111111111111111111";

fn shared_store(dir: &TempDir) -> Arc<DuckDbStore> {
    Arc::new(DuckDbStore::new(&dir.path().join("wallet.duckdb")).expect("Failed to open store"))
}

fn candidate(signature: &str, cents: i64) -> RoundUpCandidate {
    RoundUpCandidate {
        signature: signature.to_string(),
        original_amount: Decimal::new(1000 - cents, 2),
        round_up_amount: Decimal::new(cents, 2),
        timestamp: 1_700_000_000,
        processed: false,
        asset_type: AssetType::Stable,
    }
}

/// Unlocked single-account wallet state without a sealed phrase
fn seed_wallet(store: &Arc<DuckDbStore>) {
    let account = Account::new(ADDR, &DerivationPath::for_account(0), 0);
    store
        .set_many(AccountStore::initial_entries(&[account], &Settings::default()).unwrap())
        .unwrap();
    store.set(StoreKey::IsLocked, json!(false)).unwrap();
}

/// Test: every thread appends the same 20 signatures in a different order.
/// Exactly 20 candidates must remain, each stored once.
#[test]
fn test_concurrent_overlapping_appends() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let ledger = RoundUpLedger::new(store);
                barrier.wait();
                let mut added = 0;
                for i in 0..20 {
                    let n = (i + thread_id * 3) % 20;
                    added += ledger
                        .append_candidates(vec![candidate(&format!("sig{}", n), n as i64 + 1)])
                        .unwrap();
                }
                added
            })
        })
        .collect();

    let total_added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total_added, 20);

    let ledger = RoundUpLedger::new(store);
    let all = ledger.candidates().unwrap();
    assert_eq!(all.len(), 20);
    // 0.01 + 0.02 + ... + 0.20
    assert_eq!(ledger.total_pending().unwrap(), Decimal::new(210, 2));
}

/// Test: marks and appends racing on the same key lose nothing.
#[test]
fn test_concurrent_marks_and_appends() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);
    let ledger = RoundUpLedger::new(store.clone());
    ledger
        .append_candidates((0..10).map(|i| candidate(&format!("old{}", i), 10)).collect())
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let marker = {
        let store = store.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let ledger = RoundUpLedger::new(store);
            barrier.wait();
            for i in 0..10 {
                ledger.mark_processed(&format!("old{}", i)).unwrap();
            }
        })
    };
    let appender = {
        let store = store.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let ledger = RoundUpLedger::new(store);
            barrier.wait();
            for i in 0..10 {
                ledger
                    .append_candidates(vec![candidate(&format!("new{}", i), 5)])
                    .unwrap();
            }
        })
    };
    marker.join().unwrap();
    appender.join().unwrap();

    let all = ledger.candidates().unwrap();
    assert_eq!(all.len(), 20);
    assert!(all.iter().filter(|c| c.signature.starts_with("old")).all(|c| c.processed));
    assert_eq!(ledger.total_pending().unwrap(), Decimal::new(50, 2));
}

/// Test: cursor advances in any interleaving end at the maximum slot.
#[test]
fn test_cursor_monotonic_under_contention() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let accounts = AccountStore::new(store);
                barrier.wait();
                // Descending per thread so late writes carry older slots
                for step in (0..10u64).rev() {
                    let slot = step * 100 + thread_id as u64;
                    accounts
                        .advance_cursor(ADDR, &ScanCursor::new(format!("s{}", slot), slot))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let highest = 900 + (THREAD_COUNT as u64 - 1);
    let cursor = AccountStore::new(store).cursor(ADDR).unwrap().unwrap();
    assert_eq!(cursor, ScanCursor::new(format!("s{}", highest), highest));
}

/// Test: two monitor runs over the same activity overlap in time.
/// Both finish; the ledger holds each signature once and the cursor is the newest.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_monitor_runs() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);
    seed_wallet(&store);

    let chain = Arc::new(SimulatedLedger::new());
    for (i, cents) in [2967u64, 450, 999, 1250].iter().enumerate() {
        let pre = 1_000_000_000;
        chain.push_stable_transfer(ADDR, &format!("sig{}", i), TEST_STABLE_MINT, pre, pre - cents * 10_000);
    }
    let newest_slot = chain.push_native_transfer(ADDR, "sig4", 3_000_000_000, 2_500_000_000);
    chain.set_latency(Duration::from_millis(20));

    let make_monitor = || {
        let scanner = ChainScanner::new().with_client(Network::Simulated, chain.clone());
        Arc::new(MonitorLoop::new(store.clone(), scanner, Arc::new(RecordingNotifier::new())))
    };
    let (first, second) = (make_monitor(), make_monitor());

    let a = tokio::spawn(async move { first.run_once(&CancelToken::new()).await });
    let b = tokio::spawn(async move { second.run_once(&CancelToken::new()).await });
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

    let added = |outcome: &RunOutcome| match outcome {
        RunOutcome::Completed(summary) => summary.added,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(added(&a) + added(&b), 5);

    let ledger = RoundUpLedger::new(store.clone());
    let mut sigs: Vec<_> = ledger.candidates().unwrap().into_iter().map(|c| c.signature).collect();
    sigs.sort();
    assert_eq!(sigs, vec!["sig0", "sig1", "sig2", "sig3", "sig4"]);

    let cursor = AccountStore::new(store).cursor(ADDR).unwrap().unwrap();
    assert_eq!(cursor, ScanCursor::new("sig4", newest_slot));
}

/// Test: a slow run that observed only old activity finishes after a fast run
/// that saw newer activity; the cursor keeps the newer watermark.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_run_does_not_regress_cursor() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);
    seed_wallet(&store);

    let old_chain = Arc::new(SimulatedLedger::new());
    let old_slot = old_chain.push_native_transfer(ADDR, "old", 1_000_000_000, 2_500_000_000);
    old_chain.set_latency(Duration::from_millis(200));

    let new_chain = Arc::new(SimulatedLedger::new());
    new_chain.push_native_transfer(ADDR, "old", 1_000_000_000, 2_500_000_000);
    let new_slot = new_chain.push_native_transfer(ADDR, "new", 2_500_000_000, 4_000_000_000);
    assert!(new_slot > old_slot);

    let slow = MonitorLoop::new(
        store.clone(),
        ChainScanner::new().with_client(Network::Simulated, old_chain),
        Arc::new(RecordingNotifier::new()),
    );
    let fast = MonitorLoop::new(
        store.clone(),
        ChainScanner::new().with_client(Network::Simulated, new_chain),
        Arc::new(RecordingNotifier::new()),
    );

    let slow_task = tokio::spawn(async move { slow.run_once(&CancelToken::new()).await });
    fast.run_once(&CancelToken::new()).await.unwrap();
    slow_task.await.unwrap().unwrap();

    let cursor = AccountStore::new(store.clone()).cursor(ADDR).unwrap().unwrap();
    assert_eq!(cursor, ScanCursor::new("new", new_slot));
    assert_eq!(RoundUpLedger::new(store).candidates().unwrap().len(), 2);
}
