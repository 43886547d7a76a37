//! Container persistence
//!
//! Saves dirty containers concurrently. Each save gets one bounded budget of
//! attempts; a save that runs past the refresh threshold re-reads the
//! container so later batches build on the destination's current copy.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::misp::RetryingDestination;
use crate::registry::{ContainerRegistry, DirtyContainer};
use crate::transport::RetryPolicy;

/// Total attempts for one container save
pub const SAVE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: Vec<String>,
    pub failed: Vec<String>,
}

pub struct EventFlusher {
    destination: RetryingDestination,
    registry: Arc<ContainerRegistry>,
    refresh_after: Duration,
    concurrency: usize,
}

impl EventFlusher {
    pub fn new(
        destination: RetryingDestination,
        registry: Arc<ContainerRegistry>,
        refresh_after: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            destination,
            registry,
            refresh_after,
            concurrency: concurrency.max(1),
        }
    }

    /// Persist every given container; returns the titles that were saved
    pub async fn flush(&self, dirty: Vec<DirtyContainer>) -> FlushReport {
        let results: Vec<(String, bool)> = stream::iter(dirty)
            .map(|container| async move {
                let title = container.event.info.clone();
                let saved = self.save(container).await;
                (title, saved)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = FlushReport::default();
        for (title, saved) in results {
            if saved {
                report.saved.push(title);
            } else {
                report.failed.push(title);
            }
        }
        report
    }

    async fn save(&self, container: DirtyContainer) -> bool {
        let DirtyContainer { event, changes } = container;
        let started = Instant::now();

        let saved = match self
            .destination
            .save_event(&event, RetryPolicy::without_backoff(SAVE_ATTEMPTS))
            .await
        {
            Ok(saved) => saved,
            Err(e) => {
                error!(
                    container = %event.info,
                    changes,
                    error = %e,
                    "Unable to save container with new indicators"
                );
                return false;
            },
        };

        if !event.is_persisted() {
            self.registry.mark_persisted(&event.info, &saved);
        }

        let elapsed = started.elapsed();
        info!(
            container = %event.info,
            changes,
            elapsed_secs = elapsed.as_secs_f64(),
            "Saved container"
        );

        if elapsed > self.refresh_after {
            self.refresh(&event.info, &event.uuid).await;
        }
        true
    }

    async fn refresh(&self, title: &str, uuid: &str) {
        debug!(container = title, "Refreshing container in memory");
        match self.destination.get_event(uuid).await {
            Ok(Some(current)) => {
                self.registry.refresh(title, current);
                info!(container = title, "Container refreshed in memory");
            },
            Ok(None) => warn!(container = title, "Container missing on refresh, keeping local copy"),
            Err(e) => error!(container = title, error = %e, "Could not refresh container in memory"),
        }
    }
}
