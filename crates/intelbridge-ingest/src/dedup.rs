//! Deduplication index
//!
//! Attribute values that already exist on the destination outside family
//! containers, loaded once per run.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::misp::RetryingDestination;
use crate::model::DedupEntry;

#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    entries: HashMap<String, DedupEntry>,
}

impl DedupIndex {
    /// Search every attribute type concurrently and keep the values that live
    /// outside the given family containers.
    ///
    /// A failed search logs a warning and contributes nothing.
    pub async fn build(
        destination: &RetryingDestination,
        kinds: &[&str],
        family_identities: &HashSet<String>,
        concurrency: usize,
    ) -> Self {
        let results: Vec<Vec<DedupEntry>> = stream::iter(kinds.iter().copied())
            .map(|kind| async move {
                match destination.search_attributes(kind).await {
                    Ok(attributes) => {
                        info!(kind, count = attributes.len(), "Retrieved existing attributes");
                        attributes
                            .into_iter()
                            .map(|attr| DedupEntry {
                                value: attr.value,
                                identity: attr.uuid,
                                container_identity: attr.event_uuid.unwrap_or_default(),
                                last_seen_timestamp: attr.timestamp,
                            })
                            .collect()
                    },
                    Err(e) => {
                        warn!(kind, error = %e, "Unable to retrieve attributes for duplicate checking");
                        Vec::new()
                    },
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let index = Self::from_entries(
            results
                .into_iter()
                .flatten()
                .filter(|entry| !family_identities.contains(&entry.container_identity)),
        );

        info!(count = index.len(), "Found pre-existing indicators outside family containers");
        index
    }

    pub fn from_entries(entries: impl IntoIterator<Item = DedupEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.value.clone(), e)).collect(),
        }
    }

    pub fn get(&self, value: &str) -> Option<&DedupEntry> {
        self.entries.get(value)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains_key(value)
    }

    /// Whether `value` is already stored in the given container
    pub fn held_by(&self, value: &str, container_identity: &str) -> bool {
        self.get(value)
            .is_some_and(|entry| entry.container_identity == container_identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
