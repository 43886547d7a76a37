//! Sighting recorder
//!
//! Marks an already known indicator as seen again instead of creating a
//! duplicate attribute.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::misp::RetryingDestination;
use crate::model::{Attribute, DedupEntry, Sighting, Timestamp};

/// Log a progress line every this many sightings
const PROGRESS_INTERVAL: usize = 50;

/// When an observation counts as new information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingRule {
    /// Observed strictly after the stored timestamp
    Newer,
    /// Observed at any time other than the stored timestamp
    Changed,
}

impl SightingRule {
    pub fn applies(self, observed: Timestamp, last_known: Option<Timestamp>) -> bool {
        match (self, last_known) {
            (SightingRule::Newer, Some(known)) => observed > known,
            (SightingRule::Changed, Some(known)) => observed != known,
            (_, None) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingOutcome {
    Added,
    /// Nothing new to report
    Covered,
    Failed,
}

pub struct SightingRecorder {
    destination: RetryingDestination,
    source: String,
    added: AtomicUsize,
}

impl SightingRecorder {
    pub fn new(destination: RetryingDestination, source: impl Into<String>) -> Self {
        Self {
            destination,
            source: source.into(),
            added: AtomicUsize::new(0),
        }
    }

    pub fn added(&self) -> usize {
        self.added.load(Ordering::Relaxed)
    }

    /// Emit a sighting for `value` on `target_uuid` if `rule` says the
    /// observation is new. Write failures are logged and reported as `Failed`.
    pub async fn record(
        &self,
        container_title: &str,
        value: &str,
        target_uuid: &str,
        observed: Timestamp,
        last_known: Option<Timestamp>,
        rule: SightingRule,
    ) -> SightingOutcome {
        if !rule.applies(observed, last_known) {
            debug!(container = container_title, value, "Skipping sighting, already covered");
            return SightingOutcome::Covered;
        }

        let sighting = Sighting {
            value: value.to_string(),
            uuid: target_uuid.to_string(),
            source: self.source.clone(),
            timestamp: observed,
        };

        if !self.destination.add_sighting(&sighting).await {
            tracing::error!(container = container_title, value, "Could not add sighting");
            return SightingOutcome::Failed;
        }

        let added = self.added.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(container = container_title, value, "Added sighting");
        if added % PROGRESS_INTERVAL == 0 {
            info!(sightings = added, "Sightings added");
        }
        SightingOutcome::Added
    }

    /// Sighting for an attribute a container already holds. Fires only when
    /// the observation is newer than the attribute's stored timestamp.
    pub async fn record_for_attribute(
        &self,
        container_title: &str,
        attribute: &Attribute,
        observed: Timestamp,
    ) -> SightingOutcome {
        let stored = match self.destination.get_attribute(&attribute.uuid).await {
            Ok(Some(current)) => current.timestamp,
            Ok(None) => attribute.timestamp.or(attribute.last_seen),
            Err(e) => {
                tracing::error!(
                    container = container_title,
                    value = %attribute.value,
                    error = %e,
                    "Could not look up attribute for sighting"
                );
                return SightingOutcome::Failed;
            },
        };

        self.record(
            container_title,
            &attribute.value,
            &attribute.uuid,
            observed,
            stored,
            SightingRule::Newer,
        )
        .await
    }

    /// Sighting for a value held by a report container from an earlier run.
    /// Fires whenever the observation differs from the known timestamp.
    pub async fn record_for_report(&self, entry: &DedupEntry, observed: Timestamp) -> SightingOutcome {
        self.record(
            &entry.container_identity,
            &entry.value,
            &entry.identity,
            observed,
            entry.last_seen_timestamp,
            SightingRule::Changed,
        )
        .await
    }
}
