//! Fixed-size batching with a delay between batches.

use crate::report::ResultAggregator;
use crate::source::MigrationRecord;
use crate::transfer::Transfer;
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info};

/// Drives transfer workers over a record set, one batch at a time.
///
/// Workers inside a batch run concurrently on the calling task. A batch is
/// awaited completely before the next starts, and the delay is slept before
/// every batch except the first one this coordinator runs.
#[derive(Debug)]
pub struct BatchCoordinator {
    batch_size: usize,
    delay: Duration,
    batches_run: usize,
}

impl BatchCoordinator {
    /// A batch size of zero is treated as one.
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
            batches_run: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches run so far, across all calls to [`run`](Self::run).
    pub fn batches_run(&self) -> usize {
        self.batches_run
    }

    /// Split records into contiguous, order-preserving batches.
    pub fn partition<'a>(&self, records: &'a [MigrationRecord]) -> Vec<&'a [MigrationRecord]> {
        records.chunks(self.batch_size).collect()
    }

    /// Sizes of the batches `records` would be split into.
    pub fn plan(&self, records: &[MigrationRecord]) -> Vec<usize> {
        self.partition(records).iter().map(|b| b.len()).collect()
    }

    /// Run every record through `worker`, recording outcomes in input order.
    ///
    /// A failed record never stops its batch or later batches.
    pub async fn run(
        &mut self,
        records: &[MigrationRecord],
        worker: &dyn Transfer,
        results: &mut ResultAggregator,
    ) {
        let batches = self.partition(records);
        let total = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            if self.batches_run > 0 && !self.delay.is_zero() {
                debug!("Waiting {:?} before next batch", self.delay);
                tokio::time::sleep(self.delay).await;
            }

            info!("Processing batch {}/{} ({} records)", i + 1, total, batch.len());

            // join_all yields outputs in input order regardless of completion order
            let outcomes = join_all(batch.iter().map(|record| worker.transfer(record))).await;
            for outcome in outcomes {
                results.record(outcome);
            }

            self.batches_run += 1;
            results.log_progress(i + 1, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportKind;
    use crate::source::FileRecord;
    use crate::transfer::TransferOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn records(n: usize) -> Vec<MigrationRecord> {
        (0..n)
            .map(|i| {
                MigrationRecord::File(FileRecord {
                    name: format!("file{}.png", i),
                    source_key: format!("key{}", i),
                    custom_id: None,
                    source_url: format!("https://old.example.com/{}", i),
                    size_bytes: 1,
                    uploaded_at: None,
                })
            })
            .collect()
    }

    /// Fails every record whose index is listed, succeeds otherwise.
    struct ScriptedWorker {
        failing: Vec<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transfer for ScriptedWorker {
        async fn transfer(&self, record: &MigrationRecord) -> TransferOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let url = record.source_id();
            let index: usize = url.rsplit('/').next().unwrap().parse().unwrap();
            // later records finish first within a batch
            tokio::time::sleep(Duration::from_millis(100 - index as u64)).await;
            if self.failing.contains(&index) {
                TransferOutcome::failed(record, "HTTP 500")
            } else {
                TransferOutcome::succeeded(record, format!("https://new.example.com/{}", index))
            }
        }
    }

    fn worker(failing: &[usize]) -> ScriptedWorker {
        ScriptedWorker {
            failing: failing.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_partition_twelve_by_five() {
        let coordinator = BatchCoordinator::new(5, Duration::ZERO);
        assert_eq!(coordinator.plan(&records(12)), vec![5, 5, 2]);
        assert!(coordinator.plan(&records(0)).is_empty());
    }

    #[test]
    fn test_partition_preserves_order() {
        let recs = records(7);
        let coordinator = BatchCoordinator::new(3, Duration::ZERO);
        let flattened: Vec<String> = coordinator
            .partition(&recs)
            .into_iter()
            .flatten()
            .map(|r| r.source_id())
            .collect();
        let original: Vec<String> = recs.iter().map(|r| r.source_id()).collect();
        assert_eq!(flattened, original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_batches_only() {
        let recs = records(12);
        let mut coordinator = BatchCoordinator::new(5, Duration::from_secs(2));
        let mut results = ResultAggregator::new(ReportKind::Files, recs.len());
        let w = worker(&[]);

        let start = Instant::now();
        coordinator.run(&recs, &w, &mut results).await;
        let elapsed = start.elapsed();

        // two delays, plus at most 100ms of simulated work per batch
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(coordinator.batches_run(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_later_batches() {
        let recs = records(12);
        let mut coordinator = BatchCoordinator::new(5, Duration::from_millis(10));
        let mut results = ResultAggregator::new(ReportKind::Files, recs.len());
        let w = worker(&[0, 1, 2, 3, 4, 7]);

        coordinator.run(&recs, &w, &mut results).await;

        assert_eq!(w.calls.load(Ordering::SeqCst), 12);
        assert_eq!(results.processed(), 12);
        assert_eq!(results.failed(), 6);
        assert_eq!(results.successful(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_recorded_in_input_order() {
        let recs = records(5);
        let mut coordinator = BatchCoordinator::new(5, Duration::ZERO);
        let mut results = ResultAggregator::new(ReportKind::Files, recs.len());

        coordinator.run(&recs, &worker(&[]), &mut results).await;

        let ids: Vec<String> = results.outcomes().iter().map(|o| o.record.source_id()).collect();
        let expected: Vec<String> = recs.iter().map(|r| r.source_id()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_spans_consecutive_runs() {
        let mut coordinator = BatchCoordinator::new(5, Duration::from_secs(2));
        let mut results = ResultAggregator::new(ReportKind::Files, 6);
        let w = worker(&[]);

        let start = Instant::now();
        coordinator.run(&records(3), &w, &mut results).await;
        coordinator.run(&records(3), &w, &mut results).await;

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(coordinator.batches_run(), 2);
    }
}
