//! Indicator import pipeline
//!
//! Wires the components together for one run: lookup data, container
//! bootstrap, the deduplication index, the page loop and the run summary.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use intelbridge_common::{IntelError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::category::{validate_categories, IndicatorCategory};
use crate::checkpoint::CheckpointStore;
use crate::coordinator::{BatchCoordinator, RunStats};
use crate::dedup::DedupIndex;
use crate::flush::EventFlusher;
use crate::misp::{EventFilter, RetryingDestination};
use crate::model::{ContainerEvent, Tag, Timestamp};
use crate::registry::{category_feed_tag, ContainerRegistry, ContainerTitles};
use crate::settings::ImportSettings;
use crate::sighting::SightingRecorder;
use crate::source::IndicatorSource;
use crate::tags::TagDeriver;
use crate::worker::IndicatorWorker;

const INDICATORS_BANNER: &str = r#"
 ___ _  _ ___ ___ ___   _ _____ ___  ___  ___
|_ _| \| |   \_ _/ __| /_\_   _/ _ \| _ \/ __|
 | || .` | |) | | (__ / _ \| || (_) |   /\__ \
|___|_|\_|___/___\___/_/ \_\_| \___/|_|_\|___/
"#;

/// Outcome of a full run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub indicators: usize,
    pub attributes_created: usize,
    pub skipped: usize,
    pub sightings: usize,
    pub containers_saved: usize,
    pub containers_failed: usize,
    pub checkpoint: Option<Timestamp>,
}

pub struct IngestPipeline {
    settings: ImportSettings,
    destination: RetryingDestination,
    source: Arc<dyn IndicatorSource>,
    tagger: Arc<dyn TagDeriver>,
}

impl IngestPipeline {
    pub fn new(
        settings: ImportSettings,
        destination: RetryingDestination,
        source: Arc<dyn IndicatorSource>,
        tagger: Arc<dyn TagDeriver>,
    ) -> Self {
        Self {
            settings,
            destination,
            source,
            tagger,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.settings.validate()?;
        validate_categories()?;

        if self.settings.no_banners {
            info!("BEGIN INDICATORS IMPORT");
        } else {
            for line in INDICATORS_BANNER.lines().filter(|l| !l.is_empty()) {
                info!("{}", line);
            }
        }

        info!("Retrieving lookup data for import of indicators");
        let checkpoint = CheckpointStore::new(
            &self.settings.indicators_timestamp_filename,
            &self.settings.miss_track_file,
        );
        let since = checkpoint.starting_point(
            self.settings.force,
            self.settings.init_indicators_minutes,
            Utc::now().timestamp(),
        )?;
        // taken before any fetch so indicators arriving mid-run are not skipped next time
        let requested_at = Utc::now().timestamp();

        let organisation = self
            .destination
            .get_organisation(&self.settings.crowdstrike_org_uuid)
            .await?
            .ok_or_else(|| {
                IntelError::config(format!(
                    "organisation {} not found on destination",
                    self.settings.crowdstrike_org_uuid
                ))
            })?;

        let threads = self.settings.effective_threads();
        let registry = Arc::new(ContainerRegistry::new(ContainerTitles {
            indicator_type: self.settings.indicator_type_title.clone(),
            malware_family: self.settings.malware_family_title.clone(),
        }));

        self.bootstrap_category_containers(&registry).await?;
        self.bootstrap_family_containers(&registry, threads).await?;
        if registry.is_empty() {
            info!("No existing containers found, containers will be created on demand");
        } else {
            debug!(containers = registry.len(), "Container registry loaded");
        }

        let dedup = DedupIndex::build(
            &self.destination,
            &IndicatorCategory::searchable_attribute_types(),
            &registry.family_identities(),
            threads,
        )
        .await;

        let sightings = Arc::new(SightingRecorder::new(self.destination.clone(), organisation.name.clone()));
        let worker = IndicatorWorker::new(
            registry.clone(),
            Arc::new(dedup),
            sightings.clone(),
            self.tagger.clone(),
            self.settings.log_duplicates_as_sightings,
        );
        let flusher = EventFlusher::new(
            self.destination.clone(),
            registry.clone(),
            self.settings.effective_refresh_interval(),
            threads,
        );
        let coordinator = BatchCoordinator::new(
            worker,
            flusher,
            registry.clone(),
            checkpoint,
            self.settings.effective_batch_size(),
            threads,
        );

        info!(since, threads, "Starting import of indicators");
        let pages = self
            .source
            .indicators(since, self.settings.delete_outdated_indicators);
        let stats: RunStats = coordinator.run(pages, requested_at).await?;

        let summary = RunSummary {
            indicators: stats.indicators,
            attributes_created: stats.category_attached + stats.family_attached,
            skipped: registry.skipped(),
            sightings: sightings.added(),
            containers_saved: stats.containers_saved,
            containers_failed: stats.containers_failed,
            checkpoint: stats.checkpoint,
        };

        info!(
            indicators = summary.indicators,
            attributes = summary.attributes_created,
            skipped = summary.skipped,
            sightings = summary.sightings,
            saved = summary.containers_saved,
            failed = summary.containers_failed,
            checkpoint = ?summary.checkpoint,
            "Finished importing indicators"
        );
        Ok(summary)
    }

    /// Load existing category containers and make sure each carries its feed tag
    async fn bootstrap_category_containers(&self, registry: &ContainerRegistry) -> Result<()> {
        let titles = registry.titles().clone();
        let filter = EventFilter::info(format!("{}%", titles.indicator_type.trim_end()))
            .with_org(self.settings.crowdstrike_org_uuid.clone());
        let found = self.destination.search_events(&filter).await?;

        let mut loaded = Vec::new();
        for mut event in found {
            let Some(category) = IndicatorCategory::all().find(|c| titles.category(*c) == event.info) else {
                continue;
            };
            let tag = category_feed_tag(category);
            if !event.has_tag(&tag) && self.destination.add_tag(&event.uuid, &tag).await {
                event.tags.push(Tag::new(tag));
            }
            loaded.push(event);
        }

        let count = registry.bootstrap(loaded);
        info!(count, "Loaded indicator type containers");
        Ok(())
    }

    /// Load existing family containers, fetching each in full concurrently
    async fn bootstrap_family_containers(&self, registry: &ContainerRegistry, threads: usize) -> Result<()> {
        let filter = EventFilter::info(format!("{}%", registry.titles().malware_family.trim_end()))
            .with_org(self.settings.crowdstrike_org_uuid.clone());
        let summaries = self.destination.search_index(&filter).await?;

        let events: Vec<Option<ContainerEvent>> = stream::iter(summaries)
            .map(|summary| async move {
                match self.destination.get_event(&summary.uuid).await {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(container = %summary.info, error = %e, "Unable to load family container");
                        None
                    },
                }
            })
            .buffer_unordered(threads.max(1))
            .collect()
            .await;

        let count = registry.bootstrap(events.into_iter().flatten());
        info!(count, "Loaded malware family containers");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{Attribute, Indicator};
    use crate::source::MemorySource;
    use crate::tags::FeedTagger;
    use crate::testing::MemoryDestination;
    use crate::transport::{RetryPolicy, RetryingTransport};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> ImportSettings {
        ImportSettings {
            misp_url: "https://misp.local".to_string(),
            misp_auth_key: "key".to_string(),
            crowdstrike_org_uuid: "org-uuid".to_string(),
            indicators_timestamp_filename: dir.path().join("ts").display().to_string(),
            miss_track_file: dir.path().join("galaxies.log").display().to_string(),
            no_banners: true,
            max_threads: Some(4),
            ..Default::default()
        }
    }

    fn indicator(value: &str, last_updated: i64, family: Option<&str>) -> Indicator {
        serde_json::from_value(serde_json::json!({
            "id": value,
            "type": "domain",
            "indicator": value,
            "last_updated": last_updated,
            "malicious_confidence": "high",
            "malware_families": family.into_iter().collect::<Vec<_>>()
        }))
        .unwrap()
    }

    fn pipeline(settings: ImportSettings, memory: &Arc<MemoryDestination>, pages: Vec<Vec<Indicator>>) -> IngestPipeline {
        IngestPipeline::new(
            settings,
            RetryingDestination::new(memory.clone(), RetryingTransport::new(RetryPolicy::without_backoff(3))),
            Arc::new(MemorySource::new(pages)),
            Arc::new(FeedTagger::new(&HashMap::new())),
        )
    }

    fn page() -> Vec<Indicator> {
        vec![
            indicator("evil.example", 1000, Some("LockBit")),
            indicator("worse.example", 1100, None),
            indicator("evil.example", 1000, Some("LockBit")),
        ]
    }

    #[tokio::test]
    async fn test_first_run_creates_containers_and_attributes() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryDestination::default());

        let summary = pipeline(settings(&dir), &memory, vec![page()]).run().await.unwrap();

        assert_eq!(summary.indicators, 3);
        // duplicate in the same batch never becomes a second attribute
        assert_eq!(summary.attributes_created, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.checkpoint, Some(1000));

        let category = memory.event("Indicator Type: Domain").unwrap();
        assert_eq!(category.attributes.len(), 2);
        let family = memory.event("Malware Family: LockBit").unwrap();
        assert_eq!(family.attributes.len(), 1);
        assert_eq!(family.threat_level_id, crate::model::ThreatLevel::High);
    }

    #[tokio::test]
    async fn test_second_run_creates_nothing_new() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryDestination::default());

        pipeline(settings(&dir), &memory, vec![page()]).run().await.unwrap();
        let before = memory.attribute_count();
        let events_before = memory.events().len();

        let summary = pipeline(settings(&dir), &memory, vec![page()]).run().await.unwrap();

        assert_eq!(summary.attributes_created, 0);
        assert_eq!(summary.skipped, 3);
        assert_eq!(memory.attribute_count(), before);
        assert_eq!(memory.events().len(), events_before);
    }

    #[tokio::test]
    async fn test_second_run_with_sightings_enabled() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryDestination::default());
        let mut with_sightings = settings(&dir);
        with_sightings.log_duplicates_as_sightings = true;

        pipeline(with_sightings.clone(), &memory, vec![page()]).run().await.unwrap();
        let before = memory.attribute_count();

        let newer = vec![indicator("worse.example", 2000, None)];
        let summary = pipeline(with_sightings, &memory, vec![newer]).run().await.unwrap();

        assert_eq!(summary.attributes_created, 0);
        assert_eq!(summary.sightings, 1);
        assert_eq!(memory.attribute_count(), before);
    }

    #[tokio::test]
    async fn test_missing_required_setting_aborts_before_network() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryDestination::default());
        let mut broken = settings(&dir);
        broken.misp_auth_key.clear();

        let result = pipeline(broken, &memory, vec![page()]).run().await;

        assert!(matches!(result, Err(IntelError::Config(_))));
        assert_eq!(memory.add_calls(), 0);
        assert!(!dir.path().join("ts").exists());
    }

    #[tokio::test]
    async fn test_bootstrap_reuses_existing_containers_and_tags_them() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryDestination::default());
        let mut existing = ContainerEvent::new("Indicator Type: Domain");
        existing
            .attributes
            .push(Attribute::new("domain", "Network activity", "evil.example"));
        let existing_uuid = existing.uuid.clone();
        memory.seed_events(vec![existing]);

        let summary = pipeline(settings(&dir), &memory, vec![vec![indicator("evil.example", 5, None)]])
            .run()
            .await
            .unwrap();

        assert_eq!(summary.attributes_created, 0);
        assert_eq!(memory.add_calls(), 0);
        assert!(memory
            .tags()
            .contains(&(existing_uuid, "CrowdStrike:indicator:feed:type: DOMAIN".to_string())));
    }

    #[tokio::test]
    async fn test_empty_source_commits_request_time() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryDestination::default());
        let started = Utc::now().timestamp();

        let summary = pipeline(settings(&dir), &memory, vec![]).run().await.unwrap();

        let committed = summary.checkpoint.unwrap();
        assert!(committed >= started);
        let on_disk: i64 = std::fs::read_to_string(dir.path().join("ts")).unwrap().parse().unwrap();
        assert_eq!(on_disk, committed);
    }
}
