//! Monitor loop - periodic scan, round-up and ledger update
//!
//! A run is `Idle -> Scanning -> Idle`. Everything a run finds is collected in
//! memory first; only a run that finished scanning persists anything, so a
//! network failure, timeout or cancellation leaves the ledger and cursor as
//! they were. Overlapping runs are safe because the ledger append dedups by
//! signature and the cursor only ever moves to the later slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, RoundUpCandidate, ScanCursor, Settings};
use crate::ports::{KeyValueStore, Notification, Notifier};
use crate::services::accounts::AccountStore;
use crate::services::ledger::RoundUpLedger;
use crate::services::logging::{EntryPoint, LogEvent, LoggingService};
use crate::services::round_up::candidates_from_activity;
use crate::services::scanner::{newest_cursor, ChainScanner};
use crate::services::vault::SecretVault;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared cancellation flag for monitor runs
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    Locked,
    NoActiveAccount,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::Locked => "locked",
            SkipReason::NoActiveAccount => "no_active_account",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Transactions newer than the cursor
    pub scanned: usize,
    /// Candidates built from them
    pub found: usize,
    /// Candidates that were new to the ledger
    pub added: usize,
    pub cursor: Option<ScanCursor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Skipped { reason: SkipReason },
    Cancelled,
    Completed(RunSummary),
}

/// What a run collected before persisting anything
struct Collected {
    scanned: usize,
    candidates: Vec<RoundUpCandidate>,
    newest: Option<ScanCursor>,
}

pub struct MonitorLoop {
    vault: SecretVault,
    accounts: AccountStore,
    ledger: RoundUpLedger,
    scanner: ChainScanner,
    notifier: Arc<dyn Notifier>,
    logger: Option<Arc<LoggingService>>,
    run_timeout: Duration,
}

impl MonitorLoop {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        scanner: ChainScanner,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            vault: SecretVault::new(store.clone()),
            accounts: AccountStore::new(store.clone()),
            ledger: RoundUpLedger::new(store),
            scanner,
            notifier,
            logger: None,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.log_quietly(event.with_entry_point(EntryPoint::Monitor));
        }
    }

    fn guard(&self) -> Result<std::result::Result<(Settings, Account), SkipReason>> {
        let settings = self.accounts.settings()?;
        if !settings.round_up_enabled {
            return Ok(Err(SkipReason::Disabled));
        }
        if self.vault.is_locked()? {
            return Ok(Err(SkipReason::Locked));
        }
        match self.accounts.active_account() {
            Ok(account) => Ok(Ok((settings, account))),
            Err(Error::NoActiveAccount) => Ok(Err(SkipReason::NoActiveAccount)),
            Err(e) => Err(e),
        }
    }

    async fn collect(
        &self,
        settings: &Settings,
        account: &Account,
        cursor: Option<&ScanCursor>,
    ) -> Result<Collected> {
        let activity = self
            .scanner
            .fetch_recent_activity_strict(settings.network, &account.public_key, cursor)
            .await?;
        let candidates = candidates_from_activity(
            &activity,
            &account.public_key,
            settings.network,
            settings.round_up_granularity,
        );
        Ok(Collected {
            scanned: activity.len(),
            candidates,
            newest: newest_cursor(&activity),
        })
    }

    /// One guarded scan of the active account
    ///
    /// Returns `Timeout` when the scan outlives the run deadline and
    /// `NetworkUnavailable` when the ledger fails; neither persists anything.
    pub async fn run_once(&self, cancel: &CancelToken) -> Result<RunOutcome> {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let (settings, account) = match self.guard()? {
            Ok(ready) => ready,
            Err(reason) => {
                self.log(LogEvent::new("monitor_skipped").with_error(reason.as_str()));
                return Ok(RunOutcome::Skipped { reason });
            }
        };

        let stored = self.accounts.cursor(&account.public_key)?;
        let scan = tokio::time::timeout(
            self.run_timeout,
            self.collect(&settings, &account, stored.as_ref()),
        );

        let collected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.log(LogEvent::new("monitor_cancelled").with_network(settings.network.as_str()));
                return Ok(RunOutcome::Cancelled);
            }
            result = scan => match result {
                Ok(Ok(collected)) => collected,
                Ok(Err(e)) => return Err(self.failed(&settings, e)),
                Err(_) => return Err(self.failed(&settings, Error::Timeout)),
            },
        };

        let found = collected.candidates.len();
        let added = self.ledger.append_candidates(collected.candidates)?;
        let cursor = match &collected.newest {
            Some(newest) => Some(self.accounts.advance_cursor(&account.public_key, newest)?),
            None => stored,
        };

        if added > 0 {
            self.notifier.notify(&Notification::round_ups_found(added));
        }
        self.log(
            LogEvent::new("monitor_completed")
                .with_network(settings.network.as_str())
                .with_count(added),
        );

        Ok(RunOutcome::Completed(RunSummary {
            scanned: collected.scanned,
            found,
            added,
            cursor,
        }))
    }

    fn failed(&self, settings: &Settings, error: Error) -> Error {
        self.log(
            LogEvent::new("monitor_failed")
                .with_network(settings.network.as_str())
                .with_error(error_kind(&error)),
        );
        error
    }

    /// Run on a fixed period until cancelled
    ///
    /// Failed runs are logged and retried on the next tick. Ticks missed while a
    /// slow run was in flight are skipped, not replayed.
    pub async fn run_forever(&self, period: Duration, cancel: &CancelToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            match self.run_once(cancel).await {
                Ok(RunOutcome::Cancelled) => return,
                Ok(_) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => self.log(LogEvent::new("monitor_error").with_error(error_kind(&e))),
            }
        }
    }
}

/// Error category without any payload that could carry user data
fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::NetworkUnavailable(_) => "network_unavailable",
        Error::Timeout => "timeout",
        Error::Storage(_) => "storage",
        Error::Json(_) => "json",
        Error::Io(_) => "io",
        Error::Validation(_) => "validation",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryStore, RecordingNotifier};
    use crate::adapters::simulated::SimulatedLedger;
    use crate::domain::settings::TEST_STABLE_MINT;
    use crate::domain::{DerivationPath, Network, SettingsUpdate};
    use crate::ports::StoreKey;
    use rust_decimal::Decimal;
    use serde_json::json;

    const ADDR: &str = "Owner1111111111111111111111111111111111111";

    struct Harness {
        store: Arc<InMemoryStore>,
        ledger: Arc<SimulatedLedger>,
        notifier: Arc<RecordingNotifier>,
        monitor: MonitorLoop,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let account = Account::new(ADDR, &DerivationPath::for_account(0), 0);
        store
            .set_many(AccountStore::initial_entries(&[account], &Settings::default()).unwrap())
            .unwrap();
        store.set(StoreKey::IsLocked, json!(false)).unwrap();

        let ledger = Arc::new(SimulatedLedger::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let scanner = ChainScanner::new().with_client(Network::Simulated, ledger.clone());
        let monitor = MonitorLoop::new(store.clone(), scanner, notifier.clone());
        Harness {
            store,
            ledger,
            notifier,
            monitor,
        }
    }

    fn ledger_of(h: &Harness) -> RoundUpLedger {
        RoundUpLedger::new(h.store.clone())
    }

    fn cursor_of(h: &Harness) -> Option<ScanCursor> {
        AccountStore::new(h.store.clone()).cursor(ADDR).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_short_circuits() {
        let h = harness();
        h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);
        AccountStore::new(h.store.clone())
            .update_settings(&SettingsUpdate {
                round_up_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();

        let outcome = h.monitor.run_once(&CancelToken::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped { reason: SkipReason::Disabled });
        assert!(ledger_of(&h).candidates().unwrap().is_empty());
        assert!(cursor_of(&h).is_none());
    }

    #[tokio::test]
    async fn test_locked_short_circuits() {
        let h = harness();
        h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);
        h.store.set(StoreKey::IsLocked, json!(true)).unwrap();

        let outcome = h.monitor.run_once(&CancelToken::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped { reason: SkipReason::Locked });
        assert!(ledger_of(&h).candidates().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_active_account_short_circuits() {
        let h = harness();
        h.store.remove(StoreKey::ActiveAccount).unwrap();
        let outcome = h.monitor.run_once(&CancelToken::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped { reason: SkipReason::NoActiveAccount });
    }

    #[tokio::test]
    async fn test_successful_run_persists_and_notifies() {
        let h = harness();
        let slot = h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);

        let outcome = h.monitor.run_once(&CancelToken::new()).await.unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run, got {:?}", outcome);
        };
        assert_eq!(summary.added, 1);
        assert_eq!(summary.cursor, Some(ScanCursor::new("sigA", slot)));

        let candidates = ledger_of(&h).candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].round_up_amount, "0.33".parse::<Decimal>().unwrap());
        assert_eq!(cursor_of(&h), Some(ScanCursor::new("sigA", slot)));
        assert_eq!(h.notifier.sent(), vec![Notification::round_ups_found(1)]);
    }

    #[tokio::test]
    async fn test_repeat_run_adds_nothing() {
        let h = harness();
        h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);
        h.monitor.run_once(&CancelToken::new()).await.unwrap();

        let outcome = h.monitor.run_once(&CancelToken::new()).await.unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.scanned, 0);
        assert_eq!(summary.added, 0);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_advances_without_candidates() {
        let h = harness();
        // Exact multiple: no round-up, but the signature is still consumed
        let slot = h.ledger.push_stable_transfer(ADDR, "even", TEST_STABLE_MINT, 100_000_000, 70_000_000);
        h.monitor.run_once(&CancelToken::new()).await.unwrap();
        assert!(ledger_of(&h).candidates().unwrap().is_empty());
        assert_eq!(cursor_of(&h), Some(ScanCursor::new("even", slot)));
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failure_midway_persists_nothing() {
        let h = harness();
        h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);
        h.ledger.push_stable_transfer(ADDR, "sigB", TEST_STABLE_MINT, 70_330_000, 60_000_000);
        // Newest is fetched first and succeeds, the older one fails
        h.ledger.fail_detail_for("sigA");

        let err = h.monitor.run_once(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable(_)));
        assert!(ledger_of(&h).candidates().unwrap().is_empty());
        assert!(cursor_of(&h).is_none());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_run() {
        let h = harness();
        h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);
        h.ledger.set_latency(Duration::from_secs(60));
        let monitor = h.monitor.with_run_timeout(Duration::from_secs(30));

        let err = monitor.run_once(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert!(RoundUpLedger::new(h.store.clone()).candidates().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_run() {
        let h = harness();
        h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);
        h.ledger.set_latency(Duration::from_secs(10));

        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let outcome = h.monitor.run_once(&cancel).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(ledger_of(&h).candidates().unwrap().is_empty());
        assert!(cursor_of(&h).is_none());
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let h = harness();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(h.monitor.run_once(&cancel).await.unwrap(), RunOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_forever_retries_after_outage() {
        let h = harness();
        h.ledger.push_stable_transfer(ADDR, "sigA", TEST_STABLE_MINT, 100_000_000, 70_330_000);
        h.ledger.set_offline(true);

        let monitor = Arc::new(h.monitor);
        let cancel = CancelToken::new();
        let task = {
            let monitor = monitor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run_forever(DEFAULT_PERIOD, &cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(RoundUpLedger::new(h.store.clone()).candidates().unwrap().is_empty());

        h.ledger.set_offline(false);
        tokio::time::sleep(DEFAULT_PERIOD).await;
        assert_eq!(RoundUpLedger::new(h.store.clone()).candidates().unwrap().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
