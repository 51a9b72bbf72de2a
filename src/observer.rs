use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::ledger::{LedgerError, TransferLedger};
use crate::store::StatsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationSummary {
    pub events_applied: usize,
    pub new_checkpoint: Option<u64>,
}

/// One observation cycle: read checkpoint, query transfer events up to the
/// ledger head, fold them into the daily aggregate, then advance the
/// checkpoint.
///
/// A range rejected as out-of-retention is retried exactly once with the
/// provider's maximum lookback; the retry's outcome is final. Any other
/// query failure aborts the run before a single write. The checkpoint moves
/// last and only forward, so a partially applied run is re-observed in full
/// by the next cycle.
///
/// Events are bucketed under the observation wall-clock day, not the on-chain
/// day of the event.
pub async fn observe(
    store: &StatsStore,
    ledger: &dyn TransferLedger,
    clock: &dyn Clock,
) -> Result<ObservationSummary> {
    let checkpoint = store.read_checkpoint()?;
    let head = ledger.latest_block().await?;

    let events = match ledger.transfer_events(checkpoint, head).await {
        Ok(events) => events,
        Err(LedgerError::RangeUnsupported(reason)) => {
            let narrowed = head.saturating_sub(ledger.max_lookback_blocks());
            warn!(
                "provider rejected range from {checkpoint:?} to {head}: {reason}; \
                 retrying from block {narrowed}"
            );
            ledger.transfer_events(Some(narrowed), head).await?
        }
        Err(err) => return Err(err.into()),
    };

    let day = clock.today();
    for event in &events {
        store.upsert_reward_transfer(day, &event.recipient, event.amount)?;
    }
    store.advance_checkpoint(head)?;

    let new_checkpoint = store.read_checkpoint()?;
    info!(
        "applied {} transfer events, checkpoint at {new_checkpoint:?}",
        events.len()
    );
    Ok(ObservationSummary {
        events_applied: events.len(),
        new_checkpoint,
    })
}

/// Drives repeated observation cycles on a fixed interval. A failed cycle is
/// logged and retried naturally on the next one, since the checkpoint did
/// not move.
pub async fn run_observer_loop(
    store: &StatsStore,
    ledger: &dyn TransferLedger,
    clock: &dyn Clock,
    interval: Duration,
    iterations: u32,
) -> Result<()> {
    let total = iterations.max(1);
    for i in 0..total {
        if let Err(err) = observe(store, ledger, clock).await {
            warn!("observation cycle {} failed: {err:#}", i + 1);
        }
        if i + 1 < total {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio_test::block_on;

    use super::observe;
    use crate::clock::fixed;
    use crate::ledger::{LedgerError, TransferEvent, TransferLedger};
    use crate::store::StatsStore;
    use crate::window::DateWindow;

    struct ScriptedLedger {
        head: u64,
        lookback: u64,
        responses: Mutex<VecDeque<Result<Vec<TransferEvent>, LedgerError>>>,
        calls: Mutex<Vec<(Option<u64>, u64)>>,
    }

    impl ScriptedLedger {
        fn new(
            head: u64,
            lookback: u64,
            responses: Vec<Result<Vec<TransferEvent>, LedgerError>>,
        ) -> Self {
            Self {
                head,
                lookback,
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn recorded_calls(&self) -> Vec<(Option<u64>, u64)> {
            self.calls.lock().expect("calls mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl TransferLedger for ScriptedLedger {
        async fn latest_block(&self) -> Result<u64, LedgerError> {
            Ok(self.head)
        }

        async fn transfer_events(
            &self,
            from_block: Option<u64>,
            to_block: u64,
        ) -> Result<Vec<TransferEvent>, LedgerError> {
            self.calls
                .lock()
                .expect("calls mutex poisoned")
                .push((from_block, to_block));
            self.responses
                .lock()
                .expect("responses mutex poisoned")
                .pop_front()
                .expect("ledger queried more often than scripted")
        }

        fn max_lookback_blocks(&self) -> u64 {
            self.lookback
        }
    }

    fn event(recipient: &str, amount: f64, block_number: u64) -> TransferEvent {
        TransferEvent {
            recipient: recipient.to_string(),
            amount,
            block_number,
        }
    }

    fn observation_day() -> DateWindow {
        let day = "2024-04-10".parse().expect("invalid test date");
        DateWindow { from: day, to: day }
    }

    #[test]
    fn applies_events_additively_and_advances_checkpoint() {
        let store = StatsStore::open_in_memory().expect("failed to open store");
        let ledger = ScriptedLedger::new(
            500,
            100,
            vec![Ok(vec![
                event("0xaaa", 1.0, 480),
                event("0xaaa", 2.5, 490),
                event("0xbbb", 4.0, 495),
            ])],
        );
        let clock = fixed("2024-04-10T12:00:00Z");

        let summary = block_on(observe(&store, &ledger, &clock)).expect("observe failed");
        assert_eq!(summary.events_applied, 3);
        assert_eq!(summary.new_checkpoint, Some(500));
        assert_eq!(ledger.recorded_calls(), vec![(None, 500)]);

        let rewards = store
            .daily_rewards(&observation_day())
            .expect("query failed");
        assert_eq!(rewards.len(), 1);
        assert!((rewards[0].amount - 7.5).abs() < 1e-9);
    }

    #[test]
    fn buckets_under_the_observation_day_not_the_event_day() {
        let store = StatsStore::open_in_memory().expect("failed to open store");
        // Blocks far older than the observation day still land on it.
        let ledger = ScriptedLedger::new(500, 100, vec![Ok(vec![event("0xaaa", 1.0, 3)])]);
        let clock = fixed("2024-04-10T12:00:00Z");

        block_on(observe(&store, &ledger, &clock)).expect("observe failed");
        let rewards = store
            .daily_rewards(&observation_day())
            .expect("query failed");
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].day, "2024-04-10");
    }

    #[test]
    fn retries_a_rejected_range_once_with_the_narrowed_window() {
        let store = StatsStore::open_in_memory().expect("failed to open store");
        store.advance_checkpoint(5).expect("advance failed");
        let ledger = ScriptedLedger::new(
            1000,
            100,
            vec![
                Err(LedgerError::RangeUnsupported("too old".to_string())),
                Ok(vec![event("0xaaa", 1.0, 950)]),
            ],
        );
        let clock = fixed("2024-04-10T12:00:00Z");

        let summary = block_on(observe(&store, &ledger, &clock)).expect("observe failed");
        assert_eq!(summary.events_applied, 1);
        assert_eq!(summary.new_checkpoint, Some(1000));
        assert_eq!(
            ledger.recorded_calls(),
            vec![(Some(5), 1000), (Some(900), 1000)]
        );
    }

    #[test]
    fn the_narrowed_retry_outcome_is_final() {
        let store = StatsStore::open_in_memory().expect("failed to open store");
        let ledger = ScriptedLedger::new(
            1000,
            100,
            vec![
                Err(LedgerError::RangeUnsupported("too old".to_string())),
                Err(LedgerError::Query("still failing".to_string())),
            ],
        );
        let clock = fixed("2024-04-10T12:00:00Z");

        block_on(observe(&store, &ledger, &clock)).expect_err("expected failed run");
        assert_eq!(ledger.recorded_calls().len(), 2);
        assert_eq!(store.read_checkpoint().expect("read failed"), None);
        assert!(store
            .daily_rewards(&observation_day())
            .expect("query failed")
            .is_empty());
    }

    #[test]
    fn a_fatal_query_error_leaves_the_store_untouched() {
        let store = StatsStore::open_in_memory().expect("failed to open store");
        let ledger = ScriptedLedger::new(
            1000,
            100,
            vec![Err(LedgerError::Query("connection reset".to_string()))],
        );
        let clock = fixed("2024-04-10T12:00:00Z");

        block_on(observe(&store, &ledger, &clock)).expect_err("expected failed run");
        assert_eq!(ledger.recorded_calls().len(), 1);
        assert_eq!(store.read_checkpoint().expect("read failed"), None);
    }

    #[test]
    fn a_stale_run_cannot_regress_the_checkpoint() {
        let store = StatsStore::open_in_memory().expect("failed to open store");
        store.advance_checkpoint(800).expect("advance failed");
        let ledger = ScriptedLedger::new(500, 100, vec![Ok(vec![event("0xaaa", 1.0, 480)])]);
        let clock = fixed("2024-04-10T12:00:00Z");

        let summary = block_on(observe(&store, &ledger, &clock)).expect("observe failed");
        assert_eq!(summary.new_checkpoint, Some(800));
        assert_eq!(store.read_checkpoint().expect("read failed"), Some(800));
    }
}
