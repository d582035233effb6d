use crate::config::SequenceConfig;
use crate::domain::ports::SequenceStoreRef;
use crate::domain::sequence::{Block, RolloverPolicy, rollover_tag};
use crate::error::{PaymentError, Result};
use chrono::{NaiveDate, Utc};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Source of the calendar day used for the daily rollover.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillExit {
    UnknownSequence,
    Shutdown,
}

/// Hands out trace numbers (STANs) from durably reserved batches.
///
/// A single background task per allocator keeps a bounded buffer of `batch_size + prefetch`
/// values topped up. It waits until the buffer has room for a whole batch, reserves the
/// batch in the store, and only then makes the values visible to `next()`. Consumers may
/// be many concurrent tasks; they get unique values but not in request order.
///
/// Every buffered value remembers the day it was reserved for. Values left over from a
/// previous day are discarded, since the store restarts the range at the rollover.
pub struct SequenceAllocator {
    name: String,
    clock: Arc<dyn Clock>,
    reserved: Mutex<mpsc::Receiver<Reserved>>,
    exit: Arc<OnceLock<FillExit>>,
    shutdown: CancellationToken,
}

#[derive(Debug)]
struct Reserved {
    value: u64,
    tag: Arc<str>,
}

struct FillLoop {
    name: String,
    store: SequenceStoreRef,
    clock: Arc<dyn Clock>,
    policy: RolloverPolicy,
    batch_size: u64,
    retry_interval: Duration,
    sender: mpsc::Sender<Reserved>,
    exit: Arc<OnceLock<FillExit>>,
    shutdown: CancellationToken,
}

impl SequenceAllocator {
    /// Validates the config and spawns the fill loop on the current Tokio runtime.
    pub fn start(
        config: &SequenceConfig,
        store: SequenceStoreRef,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let capacity = usize::try_from(config.batch_size + config.prefetch)
            .map_err(|e| PaymentError::Validation(format!("sequence buffer too large: {e}")))?;
        let (sender, receiver) = mpsc::channel(capacity);
        let exit = Arc::new(OnceLock::new());
        let shutdown = CancellationToken::new();

        let fill = FillLoop {
            name: config.name.clone(),
            store,
            clock: clock.clone(),
            policy: RolloverPolicy {
                min_value: config.min_value,
                max_value: config.max_value,
            },
            batch_size: config.batch_size,
            retry_interval: config.retry_interval(),
            sender,
            exit: exit.clone(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(fill.run());

        Ok(Self {
            name: config.name.clone(),
            clock,
            reserved: Mutex::new(receiver),
            exit,
            shutdown,
        })
    }

    /// Waits for the next value reserved for the current day.
    pub async fn next(&self) -> Result<u64> {
        let mut reserved = self.reserved.lock().await;
        let mut stale = 0u64;
        loop {
            let Some(next) = reserved.recv().await else {
                return match self.exit.get() {
                    Some(FillExit::UnknownSequence) => {
                        Err(PaymentError::UnknownSequence(self.name.clone()))
                    }
                    _ => Err(PaymentError::SequenceClosed(self.name.clone())),
                };
            };
            if *next.tag == *rollover_tag(self.clock.today()) {
                if stale > 0 {
                    tracing::info!(sequence = %self.name, discarded = stale, "dropped values reserved for a previous day");
                }
                return Ok(next.value);
            }
            stale += 1;
        }
    }

    /// Stops the fill loop. Values already buffered can still be drained.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for SequenceAllocator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl FillLoop {
    async fn run(self) {
        loop {
            let permits = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.finish(FillExit::Shutdown);
                    return;
                }
                permits = self.sender.reserve_many(self.batch_size as usize) => match permits {
                    Ok(permits) => permits,
                    // every consumer is gone
                    Err(_) => return,
                },
            };

            let today = rollover_tag(self.clock.today());
            let policy = self.policy;
            let condition = |block: &Block| policy.should_roll_over(block, &today);
            let target = policy.target(&today);

            match self
                .store
                .next_batch(&self.name, self.batch_size, &condition, &target)
                .await
            {
                Ok(start) => {
                    if start == policy.min_value {
                        tracing::info!(sequence = %self.name, tag = %today, "sequence rolled over");
                    }
                    let tag: Arc<str> = Arc::from(today.as_str());
                    for (permit, value) in permits.zip(start..start + self.batch_size) {
                        permit.send(Reserved {
                            value,
                            tag: tag.clone(),
                        });
                    }
                }
                Err(PaymentError::UnknownSequence(name)) => {
                    tracing::error!(sequence = %name, "sequence is not provisioned");
                    self.finish(FillExit::UnknownSequence);
                    return;
                }
                Err(err) => {
                    tracing::warn!(sequence = %self.name, error = %err, "failed to reserve sequence batch");
                    drop(permits);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            self.finish(FillExit::Shutdown);
                            return;
                        }
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
            }
        }
    }

    fn finish(&self, reason: FillExit) {
        let _ = self.exit.set(reason);
        tracing::info!(sequence = %self.name, ?reason, "sequence fill loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemorySequenceStore;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    struct FixedClock(StdMutex<NaiveDate>);

    impl FixedClock {
        fn on(year: i32, month: u32, day: u32) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(
                NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            )))
        }

        fn advance_to(&self, year: i32, month: u32, day: u32) {
            *self.0.lock().unwrap() = NaiveDate::from_ymd_opt(year, month, day).unwrap();
        }
    }

    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            *self.0.lock().unwrap()
        }
    }

    fn config(min_value: u64, max_value: u64, batch_size: u64, prefetch: u64) -> SequenceConfig {
        SequenceConfig {
            name: "stan".to_string(),
            min_value,
            max_value,
            batch_size,
            prefetch,
            retry_interval_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_values_are_consecutive_within_a_day() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.provision("stan", Block::new(1, "0307")).await;
        let allocator =
            SequenceAllocator::start(&config(1, 999_999, 10, 5), store, FixedClock::on(2024, 3, 7))
                .unwrap();

        let mut values = Vec::new();
        for _ in 0..25 {
            values.push(allocator.next().await.unwrap());
        }
        assert_eq!(values, (1..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrent_consumers_never_share_a_value() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.provision("stan", Block::new(1, "0307")).await;
        let allocator = Arc::new(
            SequenceAllocator::start(
                &config(1, 999_999, 16, 8),
                store,
                FixedClock::on(2024, 3, 7),
            )
            .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                for _ in 0..50 {
                    mine.push(allocator.next().await.unwrap());
                }
                mine
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.await.unwrap() {
                assert!((1..=999_999).contains(&value));
                assert!(seen.insert(value), "value {value} handed out twice");
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[tokio::test]
    async fn test_restarts_at_floor_after_overflow() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.provision("stan", Block::new(1, "0307")).await;
        let allocator =
            SequenceAllocator::start(&config(1, 250, 100, 10), store, FixedClock::on(2024, 3, 7))
                .unwrap();

        for expected in 1..=200 {
            assert_eq!(allocator.next().await.unwrap(), expected);
        }
        // 201..=300 would cross the ceiling, so the third batch starts over
        assert_eq!(allocator.next().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restarts_at_floor_on_new_day() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.provision("stan", Block::new(4711, "0306")).await;
        let allocator =
            SequenceAllocator::start(&config(1, 999_999, 10, 5), store.clone(), FixedClock::on(2024, 3, 7))
                .unwrap();

        assert_eq!(allocator.next().await.unwrap(), 1);
        assert_eq!(store.block("stan").await.unwrap().rollover_value, "0307");
    }

    #[tokio::test]
    async fn test_values_buffered_before_midnight_are_not_reused() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.provision("stan", Block::new(1, "0307")).await;
        let clock = FixedClock::on(2024, 3, 7);
        let allocator =
            SequenceAllocator::start(&config(1, 999_999, 100, 50), store.clone(), clock.clone())
                .unwrap();

        for expected in 1..=60 {
            assert_eq!(allocator.next().await.unwrap(), expected);
        }

        clock.advance_to(2024, 3, 8);
        let mut next_day = HashSet::new();
        for _ in 0..300 {
            let value = allocator.next().await.unwrap();
            assert!(next_day.insert(value), "value {value} handed out twice on 0308");
        }
        assert!(next_day.contains(&1));
        assert_eq!(store.block("stan").await.unwrap().rollover_value, "0308");
    }

    #[tokio::test]
    async fn test_unknown_sequence_is_fatal() {
        let store = Arc::new(InMemorySequenceStore::new());
        let allocator =
            SequenceAllocator::start(&config(1, 999, 10, 5), store, FixedClock::on(2024, 3, 7))
                .unwrap();

        let err = allocator.next().await.unwrap_err();
        assert!(matches!(err, PaymentError::UnknownSequence(name) if name == "stan"));
    }

    #[tokio::test]
    async fn test_transient_store_errors_are_retried() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.provision("stan", Block::new(1, "0307")).await;
        store.fail_next(2);
        let allocator =
            SequenceAllocator::start(&config(1, 999, 10, 5), store, FixedClock::on(2024, 3, 7))
                .unwrap();

        assert_eq!(allocator.next().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_buffer_drains_after_shutdown() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.provision("stan", Block::new(1, "0307")).await;
        let allocator =
            SequenceAllocator::start(&config(1, 999, 10, 0), store, FixedClock::on(2024, 3, 7))
                .unwrap();

        assert_eq!(allocator.next().await.unwrap(), 1);
        allocator.shutdown();

        let mut drained = 1;
        while allocator.next().await.is_ok() {
            drained += 1;
        }
        // only already reserved values come out, and at most one batch was pending
        assert!(drained <= 20);
        assert!(matches!(
            allocator.next().await,
            Err(PaymentError::SequenceClosed(_))
        ));
    }
}
