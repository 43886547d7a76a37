//! Container event registry
//!
//! Owns every container the run touches, keyed by title. All mutation goes
//! through short critical sections on one mutex; callers never hold a raw
//! handle to a container and no I/O happens under the lock.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::category::IndicatorCategory;
use crate::model::{Attribute, ContainerEvent, MispObject, Tag, ThreatLevel};
use crate::tags::{AdversaryBranch, INDICATOR_TAG_PREFIX};

pub const DEFAULT_INDICATOR_TYPE_TITLE: &str = "Indicator Type:";
pub const DEFAULT_MALWARE_FAMILY_TITLE: &str = "Malware Family:";

/// Title prefixes for the two container kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTitles {
    pub indicator_type: String,
    pub malware_family: String,
}

impl Default for ContainerTitles {
    fn default() -> Self {
        Self {
            indicator_type: DEFAULT_INDICATOR_TYPE_TITLE.to_string(),
            malware_family: DEFAULT_MALWARE_FAMILY_TITLE.to_string(),
        }
    }
}

impl ContainerTitles {
    pub fn category(&self, category: IndicatorCategory) -> String {
        category.title(&self.indicator_type)
    }

    pub fn family(&self, family: &str) -> String {
        format!("{} {}", self.malware_family.trim_end(), family.trim())
    }

    pub fn is_family(&self, title: &str) -> bool {
        title.starts_with(self.malware_family.trim_end())
    }
}

/// Event tag carried by every category container
pub fn category_feed_tag(category: IndicatorCategory) -> String {
    format!("{}:feed:type: {}", INDICATOR_TAG_PREFIX, category.as_str().to_uppercase())
}

/// What a container groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerKey {
    Category(IndicatorCategory),
    Family {
        name: String,
        branches: Vec<AdversaryBranch>,
        threat_level: ThreatLevel,
    },
}

/// A container awaiting a save, with the number of changes since the last one
#[derive(Debug, Clone)]
pub struct DirtyContainer {
    pub event: ContainerEvent,
    pub changes: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    containers: HashMap<String, ContainerEvent>,
    dirty: HashMap<String, usize>,
    skipped: usize,
    missing_galaxies: BTreeSet<String>,
}

impl RegistryState {
    fn mark_dirty(&mut self, title: &str) {
        *self.dirty.entry(title.to_string()).or_insert(0) += 1;
    }
}

#[derive(Debug, Default)]
pub struct ContainerRegistry {
    titles: ContainerTitles,
    state: Mutex<RegistryState>,
}

impl ContainerRegistry {
    pub fn new(titles: ContainerTitles) -> Self {
        Self {
            titles,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn titles(&self) -> &ContainerTitles {
        &self.titles
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load containers that already exist on the destination. Later entries
    /// with the same title replace earlier ones.
    pub fn bootstrap(&self, events: impl IntoIterator<Item = ContainerEvent>) -> usize {
        let mut state = self.state();
        let mut loaded = 0;
        for event in events {
            state.containers.insert(event.info.clone(), event);
            loaded += 1;
        }
        loaded
    }

    /// Title of the container for `key`, creating it in memory if absent
    pub fn resolve(&self, key: &ContainerKey) -> String {
        let title = match key {
            ContainerKey::Category(category) => self.titles.category(*category),
            ContainerKey::Family { name, .. } => self.titles.family(name),
        };

        let mut state = self.state();
        if !state.containers.contains_key(&title) {
            let mut event = ContainerEvent::new(title.clone());
            match key {
                ContainerKey::Category(category) => {
                    event.tags.push(Tag::new(category_feed_tag(*category)));
                },
                ContainerKey::Family {
                    branches, threat_level, ..
                } => {
                    event.threat_level_id = *threat_level;
                    event.tags.extend(branches.iter().map(|b| Tag::new(b.tag())));
                },
            }
            debug!(title = %title, "Created container in memory");
            state.containers.insert(title.clone(), event);
        }

        title
    }

    pub fn get(&self, title: &str) -> Option<ContainerEvent> {
        self.state().containers.get(title).cloned()
    }

    /// Destination uuid of a container
    pub fn identity(&self, title: &str) -> Option<String> {
        self.state().containers.get(title).map(|event| event.uuid.clone())
    }

    pub fn find_attribute(&self, title: &str, value: &str) -> Option<Attribute> {
        self.state()
            .containers
            .get(title)
            .and_then(|event| event.find_attribute(value))
            .cloned()
    }

    /// Append an attribute unless the container already holds its value.
    /// Returns whether it was added; an addition marks the container dirty.
    pub fn attach(&self, title: &str, attribute: Attribute) -> bool {
        let mut state = self.state();
        let Some(event) = state.containers.get_mut(title) else {
            return false;
        };
        if event.find_attribute(&attribute.value).is_some() {
            return false;
        }
        event.attributes.push(attribute);
        state.mark_dirty(title);
        true
    }

    /// Objects carry no value identity and are always appended
    pub fn attach_object(&self, title: &str, object: MispObject) -> bool {
        let mut state = self.state();
        let Some(event) = state.containers.get_mut(title) else {
            return false;
        };
        event.objects.push(object);
        state.mark_dirty(title);
        true
    }

    pub fn mark_dirty(&self, title: &str) {
        self.state().mark_dirty(title);
    }

    /// Raise a container's threat level, never lowering it. Returns the level in effect.
    pub fn raise_threat_level(&self, title: &str, observed: ThreatLevel) -> Option<ThreatLevel> {
        let mut state = self.state();
        let event = state.containers.get_mut(title)?;
        let raised = event.threat_level_id.raise(observed);
        if raised != event.threat_level_id {
            debug!(title, from = ?event.threat_level_id, to = ?raised, "Raised container threat level");
            event.threat_level_id = raised;
        }
        Some(raised)
    }

    /// Snapshot of every dirty container
    pub fn dirty_containers(&self) -> Vec<DirtyContainer> {
        let state = self.state();
        state
            .dirty
            .iter()
            .filter_map(|(title, changes)| {
                state.containers.get(title).map(|event| DirtyContainer {
                    event: event.clone(),
                    changes: *changes,
                })
            })
            .collect()
    }

    pub fn is_dirty(&self, title: &str) -> bool {
        self.state().dirty.contains_key(title)
    }

    pub fn clear_dirty<'a>(&self, titles: impl IntoIterator<Item = &'a String>) {
        let mut state = self.state();
        for title in titles {
            state.dirty.remove(title);
        }
    }

    /// Replace the in-memory copy with a fresher one from the destination
    pub fn refresh(&self, title: &str, replacement: ContainerEvent) {
        let mut state = self.state();
        state.containers.insert(title.to_string(), replacement);
    }

    /// Record the id the destination assigned on first save
    pub fn mark_persisted(&self, title: &str, saved: &ContainerEvent) {
        let mut state = self.state();
        if let Some(event) = state.containers.get_mut(title) {
            if event.id.is_none() {
                event.id = saved.id.clone();
            }
        }
    }

    pub fn record_skip(&self) {
        self.state().skipped += 1;
    }

    pub fn skipped(&self) -> usize {
        self.state().skipped
    }

    pub fn record_missing_galaxies(&self, families: impl IntoIterator<Item = String>) {
        let mut state = self.state();
        state.missing_galaxies.extend(families);
    }

    pub fn drain_missing_galaxies(&self) -> Vec<String> {
        std::mem::take(&mut self.state().missing_galaxies).into_iter().collect()
    }

    /// Uuids of every family container currently held
    pub fn family_identities(&self) -> HashSet<String> {
        self.state()
            .containers
            .values()
            .filter(|event| self.titles.is_family(&event.info))
            .map(|event| event.uuid.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state().containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
