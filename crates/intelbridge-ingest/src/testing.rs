//! In-memory destination for unit tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use intelbridge_common::{IntelError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::misp::{Destination, EventFilter};
use crate::model::{Attribute, ContainerEvent, EventSummary, Organisation, Sighting};

#[derive(Default)]
struct Store {
    /// Keyed by uuid
    events: HashMap<String, ContainerEvent>,
    loose_attributes: Vec<Attribute>,
    sightings: Vec<Sighting>,
    tags: Vec<(String, String)>,
    failing_searches: HashSet<String>,
}

/// Destination double with failure injection
#[derive(Default)]
pub struct MemoryDestination {
    store: Mutex<Store>,
    next_id: AtomicU32,
    add_calls: AtomicUsize,
    update_calls: AtomicUsize,
    save_failures: AtomicU32,
    sightings_fail: std::sync::atomic::AtomicBool,
    save_delay: Mutex<Duration>,
}

impl MemoryDestination {
    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }

    pub fn seed_attributes(&self, attributes: Vec<Attribute>) {
        self.store().loose_attributes.extend(attributes);
    }

    pub fn seed_events(&self, events: Vec<ContainerEvent>) {
        let mut store = self.store();
        for mut event in events {
            if event.id.is_none() {
                event.id = Some((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string());
            }
            store.events.insert(event.uuid.clone(), event);
        }
    }

    pub fn fail_searches_for(&self, kind: &str) {
        self.store().failing_searches.insert(kind.to_string());
    }

    /// The next `count` saves fail with a network error
    pub fn fail_saves(&self, count: u32) {
        self.save_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_sightings(&self) {
        self.sightings_fail.store(true, Ordering::SeqCst);
    }

    pub fn set_save_delay(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = delay;
    }

    /// Write an attribute straight into a stored event, as another client would
    pub fn append_remote_attribute(&self, title: &str, attribute: Attribute) {
        let mut store = self.store();
        if let Some(event) = store.events.values_mut().find(|e| e.info == title) {
            event.attributes.push(attribute);
        }
    }

    pub fn event(&self, title: &str) -> Option<ContainerEvent> {
        self.store().events.values().find(|e| e.info == title).cloned()
    }

    pub fn events(&self) -> Vec<ContainerEvent> {
        self.store().events.values().cloned().collect()
    }

    pub fn sightings(&self) -> Vec<Sighting> {
        self.store().sightings.clone()
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        self.store().tags.clone()
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Total attributes across stored events
    pub fn attribute_count(&self) -> usize {
        self.store().events.values().map(|e| e.attributes.len()).sum()
    }

    async fn before_save(&self) -> Result<()> {
        let delay = *self.save_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .save_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(IntelError::network("connection reset by peer"));
        }
        Ok(())
    }
}

fn matches(event: &ContainerEvent, filter: &EventFilter) -> bool {
    let info_ok = match filter.info.as_deref() {
        Some(pattern) => match pattern.strip_suffix('%') {
            Some(prefix) => event.info.starts_with(prefix),
            None => event.info == pattern,
        },
        None => true,
    };
    let uuid_ok = filter.uuid.as_deref().map_or(true, |u| event.uuid == u);
    let tags_ok = filter.tags.iter().all(|t| event.has_tag(t));
    info_ok && uuid_ok && tags_ok
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn search_attributes(&self, kind: &str) -> Result<Vec<Attribute>> {
        let store = self.store();
        if store.failing_searches.contains(kind) {
            return Err(IntelError::network("search timed out"));
        }
        let mut found: Vec<Attribute> = store
            .loose_attributes
            .iter()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect();
        for event in store.events.values() {
            found.extend(event.attributes.iter().filter(|a| a.kind == kind).map(|a| {
                let mut a = a.clone();
                a.event_uuid = Some(event.uuid.clone());
                a
            }));
        }
        Ok(found)
    }

    async fn search_events(&self, filter: &EventFilter) -> Result<Vec<ContainerEvent>> {
        Ok(self
            .store()
            .events
            .values()
            .filter(|e| matches(e, filter))
            .cloned()
            .collect())
    }

    async fn search_index(&self, filter: &EventFilter) -> Result<Vec<EventSummary>> {
        Ok(self
            .store()
            .events
            .values()
            .filter(|e| matches(e, filter))
            .map(|e| EventSummary {
                id: e.id.clone(),
                uuid: e.uuid.clone(),
                info: e.info.clone(),
            })
            .collect())
    }

    async fn get_event(&self, uuid: &str) -> Result<ContainerEvent> {
        self.store()
            .events
            .get(uuid)
            .cloned()
            .ok_or_else(|| IntelError::NotFound(format!("event {}", uuid)))
    }

    async fn get_organisation(&self, id: &str) -> Result<Organisation> {
        Ok(Organisation {
            id: Some("1".to_string()),
            uuid: id.to_string(),
            name: "CrowdStrike".to_string(),
        })
    }

    async fn get_attribute(&self, uuid: &str) -> Result<Attribute> {
        let store = self.store();
        store
            .loose_attributes
            .iter()
            .chain(store.events.values().flat_map(|e| e.attributes.iter()))
            .find(|a| a.uuid == uuid)
            .cloned()
            .ok_or_else(|| IntelError::api(404, "Invalid attribute"))
    }

    async fn add_event(&self, event: &ContainerEvent) -> Result<ContainerEvent> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.before_save().await?;

        let mut stored = event.clone();
        stored.id = Some((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string());
        self.store().events.insert(stored.uuid.clone(), stored.clone());
        Ok(stored)
    }

    /// Upserts attributes by uuid; attributes missing from the payload are kept
    async fn update_event(&self, event: &ContainerEvent) -> Result<ContainerEvent> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.before_save().await?;

        let mut store = self.store();
        let stored = store
            .events
            .get_mut(&event.uuid)
            .ok_or_else(|| IntelError::NotFound(format!("event {}", event.uuid)))?;

        for attribute in &event.attributes {
            match stored.attributes.iter_mut().find(|a| a.uuid == attribute.uuid) {
                Some(existing) => *existing = attribute.clone(),
                None => stored.attributes.push(attribute.clone()),
            }
        }
        for object in &event.objects {
            if !stored.objects.iter().any(|o| o.uuid == object.uuid) {
                stored.objects.push(object.clone());
            }
        }
        stored.threat_level_id = event.threat_level_id;
        stored.tags = event.tags.clone();
        Ok(stored.clone())
    }

    async fn add_sighting(&self, sighting: &Sighting) -> Result<()> {
        if self.sightings_fail.load(Ordering::SeqCst) {
            return Err(IntelError::network("sighting endpoint unavailable"));
        }
        self.store().sightings.push(sighting.clone());
        Ok(())
    }

    async fn add_tag(&self, uuid: &str, tag: &str) -> Result<()> {
        let mut store = self.store();
        if let Some(event) = store.events.get_mut(uuid) {
            event.tags.push(crate::model::Tag::new(tag));
        }
        store.tags.push((uuid.to_string(), tag.to_string()));
        Ok(())
    }

    async fn remove_tag(&self, uuid: &str, tag: &str) -> Result<()> {
        let mut store = self.store();
        if let Some(event) = store.events.get_mut(uuid) {
            event.tags.retain(|t| t.name != tag);
        }
        Ok(())
    }
}
