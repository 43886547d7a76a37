//! Batch coordinator
//!
//! Pages are consumed in arrival order and split into batches. Each batch runs
//! the worker pool to completion, then the flush pool saves what the batch
//! dirtied. The checkpoint advances once per page.

use futures::stream::{self, StreamExt};
use intelbridge_common::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::checkpoint::{page_position, CheckpointStore};
use crate::flush::EventFlusher;
use crate::model::{Indicator, Timestamp};
use crate::registry::ContainerRegistry;
use crate::source::IndicatorPages;
use crate::worker::{IndicatorWorker, WorkerOutcome};

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub pages: usize,
    pub indicators: usize,
    pub category_attached: usize,
    pub family_attached: usize,
    pub containers_saved: usize,
    pub containers_failed: usize,
    pub checkpoint: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct BatchStats {
    category_attached: usize,
    category_skipped: usize,
    family_attached: usize,
    family_skipped: usize,
}

impl BatchStats {
    fn from_outcomes(outcomes: &[WorkerOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            if outcome.category_attached {
                stats.category_attached += 1;
            } else {
                stats.category_skipped += 1;
            }
            if outcome.family_attached {
                stats.family_attached += 1;
            } else {
                stats.family_skipped += 1;
            }
        }
        stats
    }
}

pub struct BatchCoordinator {
    worker: IndicatorWorker,
    flusher: EventFlusher,
    registry: Arc<ContainerRegistry>,
    checkpoint: CheckpointStore,
    batch_size: usize,
    concurrency: usize,
}

impl BatchCoordinator {
    pub fn new(
        worker: IndicatorWorker,
        flusher: EventFlusher,
        registry: Arc<ContainerRegistry>,
        checkpoint: CheckpointStore,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            worker,
            flusher,
            registry,
            checkpoint,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Drive every page to completion.
    ///
    /// `requested_at` is committed when the source yields nothing at all, so
    /// the next run does not skip the window.
    pub async fn run(&self, mut pages: IndicatorPages, requested_at: Timestamp) -> Result<RunStats> {
        let mut stats = RunStats::default();

        while let Some(page) = pages.next().await {
            let page = page?;
            stats.pages += 1;
            self.push_page(&page, &mut stats).await;

            match page_position(&page) {
                Some(position) => {
                    self.checkpoint.commit(position)?;
                    stats.checkpoint = Some(position);
                },
                None if page.is_empty() => {},
                None => warn!(count = page.len(), "Page carries no last-updated value, checkpoint not advanced"),
            }
        }

        if stats.indicators == 0 {
            info!("Source returned no indicators");
            self.checkpoint.commit(requested_at)?;
            stats.checkpoint = Some(requested_at);
        }

        let missing = self.registry.drain_missing_galaxies();
        self.checkpoint.write_missing_galaxies(&missing)?;

        Ok(stats)
    }

    async fn push_page(&self, page: &[Indicator], stats: &mut RunStats) {
        let started = Instant::now();
        debug!(batch_size = self.batch_size, "Processing page in batches");

        let mut pushed = 0;
        for batch in page.chunks(self.batch_size) {
            info!(count = batch.len(), "Processing batch of indicators");
            let outcomes = self.run_workers(batch).await;
            let batch_stats = BatchStats::from_outcomes(&outcomes);

            let dirty = self.registry.dirty_containers();
            info!(
                batch = batch.len(),
                attached = batch_stats.category_attached + batch_stats.family_attached,
                containers = dirty.len(),
                "Batch produced indicators for containers"
            );
            debug!(
                category_skipped = batch_stats.category_skipped,
                family_skipped = batch_stats.family_skipped,
                "Container updates skipped"
            );

            let report = self.flusher.flush(dirty).await;
            self.registry.clear_dirty(&report.saved);

            stats.category_attached += batch_stats.category_attached;
            stats.family_attached += batch_stats.family_attached;
            stats.containers_saved += report.saved.len();
            stats.containers_failed += report.failed.len();

            pushed += batch.len();
            debug!(pushed, total = page.len(), "Batch complete");
        }

        stats.indicators += page.len();
        info!(
            count = page.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Pushed indicators"
        );
    }

    async fn run_workers(&self, batch: &[Indicator]) -> Vec<WorkerOutcome> {
        let worker = &self.worker;
        stream::iter(batch)
            .map(|indicator| worker.process(indicator))
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
