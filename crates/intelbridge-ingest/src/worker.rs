//! Indicator worker
//!
//! Turns one feed indicator into attributes (or objects) on its category
//! container and, when it names a malware family, on the family container.
//! Duplicates become sightings or skips, never a second attribute.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::category::{build_payload, Handling, IndicatorCategory, IndicatorPayload};
use crate::dedup::DedupIndex;
use crate::model::{Attribute, Indicator, Tag};
use crate::registry::{ContainerKey, ContainerRegistry};
use crate::sighting::{SightingOutcome, SightingRecorder};
use crate::tags::{affiliated_branches, derive_all, TagDeriver};

/// Log a progress line every this many indicators
const PROGRESS_INTERVAL: usize = 100;

/// Which containers received a new attribute or object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub category_attached: bool,
    pub family_attached: bool,
}

pub struct IndicatorWorker {
    registry: Arc<ContainerRegistry>,
    dedup: Arc<DedupIndex>,
    sightings: Arc<SightingRecorder>,
    tagger: Arc<dyn TagDeriver>,
    log_duplicates_as_sightings: bool,
    processed: AtomicUsize,
}

impl IndicatorWorker {
    pub fn new(
        registry: Arc<ContainerRegistry>,
        dedup: Arc<DedupIndex>,
        sightings: Arc<SightingRecorder>,
        tagger: Arc<dyn TagDeriver>,
        log_duplicates_as_sightings: bool,
    ) -> Self {
        Self {
            registry,
            dedup,
            sightings,
            tagger,
            log_duplicates_as_sightings,
            processed: AtomicUsize::new(0),
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub async fn process(&self, indicator: &Indicator) -> WorkerOutcome {
        let outcome = self.process_inner(indicator).await;

        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % PROGRESS_INTERVAL == 0 {
            info!(processed, "Indicators processed");
        }
        outcome
    }

    async fn process_inner(&self, indicator: &Indicator) -> WorkerOutcome {
        let mut outcome = WorkerOutcome::default();

        let Some(value) = indicator.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
            warn!(indicator = %indicator.id, "Indicator missing indicator field");
            return outcome;
        };

        let category = match IndicatorCategory::from_type(&indicator.kind) {
            Ok(category) => category,
            Err(e) => {
                warn!(indicator = %indicator.id, error = %e, "Skipping indicator");
                return outcome;
            },
        };
        if category.handling() == Handling::Unsupported {
            warn!(indicator = %indicator.id, kind = %indicator.kind, "No destination mapping for indicator type, skipping");
            return outcome;
        }

        let category_title = self.registry.resolve(&ContainerKey::Category(category));
        let family_title = indicator.malware_family().map(|name| {
            self.registry.resolve(&ContainerKey::Family {
                name: name.to_string(),
                branches: affiliated_branches(indicator),
                threat_level: indicator.threat_level(),
            })
        });

        // Duplicate flags, computed independently per container
        let category_existing = self.registry.find_attribute(&category_title, value);
        let category_dupe = category_existing.is_some()
            || self
                .registry
                .identity(&category_title)
                .is_some_and(|uuid| self.dedup.held_by(value, &uuid));
        let family_existing = family_title
            .as_deref()
            .and_then(|title| self.registry.find_attribute(title, value));
        let family_dupe = family_existing.is_some();

        if !self.log_duplicates_as_sightings && category_dupe && (family_title.is_none() || family_dupe) {
            self.registry.record_skip();
            return outcome;
        }

        let attribute = match build_payload(indicator, category) {
            Ok(IndicatorPayload::Attribute(attribute)) => attribute,
            Ok(IndicatorPayload::Object(object)) => {
                outcome.category_attached = self.registry.attach_object(&category_title, object.clone());
                if let Some(title) = &family_title {
                    let mut copy = object;
                    copy.uuid = Uuid::new_v4().to_string();
                    outcome.family_attached = self.registry.attach_object(title, copy);
                }
                return outcome;
            },
            Err(e) => {
                warn!(indicator = %indicator.id, error = %e, "Couldn't generate indicator to attach, skipping");
                return outcome;
            },
        };

        let tagged = (!category_dupe || (family_title.is_some() && !family_dupe))
            .then(|| self.tagged(indicator, attribute));
        let observed = indicator.last_seen;
        let mut sighted = false;

        // Category container
        if !category_dupe {
            if let Some(attribute) = &tagged {
                outcome.category_attached = self.registry.attach(&category_title, attribute.clone());
                if !outcome.category_attached {
                    self.registry.record_skip();
                }
            }
        } else if self.log_duplicates_as_sightings {
            if let (Some(existing), Some(observed)) = (&category_existing, observed) {
                self.sight(&category_title, existing, observed).await;
                sighted = true;
            }
        }

        // Family container
        if let Some(title) = &family_title {
            self.registry.raise_threat_level(title, indicator.threat_level());

            if !family_dupe {
                if let Some(attribute) = &tagged {
                    let mut copy = attribute.clone();
                    copy.uuid = Uuid::new_v4().to_string();
                    outcome.family_attached = self.registry.attach(title, copy);
                }
            } else if self.log_duplicates_as_sightings && category_existing.is_none() {
                if let (Some(existing), Some(observed)) = (&family_existing, observed) {
                    self.sight(title, existing, observed).await;
                    sighted = true;
                }
            }
        }

        // Report container from an earlier run
        if !sighted && self.log_duplicates_as_sightings {
            if let (Some(entry), Some(observed)) = (self.dedup.get(value), observed) {
                if self.sightings.record_for_report(entry, observed).await == SightingOutcome::Covered {
                    self.registry.record_skip();
                }
            }
        }

        if outcome.category_attached || outcome.family_attached {
            debug!(value, "Created attribute for indicator");
        }
        outcome
    }

    /// Attribute with every derived tag applied. Unmapped family names are
    /// collected on the registry.
    fn tagged(&self, indicator: &Indicator, mut attribute: Attribute) -> Attribute {
        let (tags, unmapped) = derive_all(self.tagger.as_ref(), indicator);
        if !unmapped.is_empty() {
            self.registry.record_missing_galaxies(unmapped);
        }
        attribute.tags = tags.into_iter().map(Tag::new).collect();
        attribute
    }

    async fn sight(&self, title: &str, existing: &Attribute, observed: i64) {
        if self.sightings.record_for_attribute(title, existing, observed).await == SightingOutcome::Covered {
            self.registry.record_skip();
        }
    }
}
