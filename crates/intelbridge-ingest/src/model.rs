//! Source and destination record types
//!
//! Source records (`Indicator`) follow the intel feed's JSON shape. Destination
//! records (`ContainerEvent`, `Attribute`, `MispObject`, `Sighting`) follow the
//! MISP REST shape so they can be sent as-is.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Unix timestamp in seconds
pub type Timestamp = i64;

// ============================================================================
// Source records
// ============================================================================

/// A label attached to an indicator by the feed (e.g. "ThreatType/Ransomware")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Feed-assigned confidence that an indicator is malicious
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Unverified,
}

/// One observable from the source feed. Identity within a run is `(kind, value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: String,

    /// Feed type string, e.g. "domain" or "hash_sha256"
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "indicator", default)]
    pub value: Option<String>,

    #[serde(rename = "published_date", default)]
    pub first_seen: Option<Timestamp>,

    /// Feed ordering field, used for the resume checkpoint
    #[serde(rename = "last_updated", default)]
    pub last_seen: Option<Timestamp>,

    #[serde(default)]
    pub labels: Vec<Label>,

    #[serde(default)]
    pub actors: Vec<String>,

    #[serde(default)]
    pub threat_types: Vec<String>,

    #[serde(default)]
    pub malware_families: Vec<String>,

    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub malicious_confidence: Confidence,

    /// Set by the feed on expired records
    #[serde(default)]
    pub deleted: bool,
}

impl Indicator {
    /// The malware family used to pick a family container, if any
    pub fn malware_family(&self) -> Option<&str> {
        self.malware_families
            .iter()
            .map(|f| f.trim())
            .find(|f| !f.is_empty())
    }

    pub fn related_actor(&self) -> Option<&str> {
        self.actors.first().map(String::as_str)
    }

    /// Threat level implied by the feed confidence
    pub fn threat_level(&self) -> ThreatLevel {
        match self.malicious_confidence {
            Confidence::High => ThreatLevel::High,
            Confidence::Medium => ThreatLevel::Medium,
            Confidence::Low => ThreatLevel::Low,
            Confidence::Unverified => ThreatLevel::Undefined,
        }
    }
}

// ============================================================================
// Destination records
// ============================================================================

/// Container threat classification, stored by the destination as an id string
/// ("1" = high .. "4" = undefined).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThreatLevel {
    High,
    Medium,
    Low,
    #[default]
    Undefined,
}

impl ThreatLevel {
    pub fn id(self) -> u8 {
        match self {
            ThreatLevel::High => 1,
            ThreatLevel::Medium => 2,
            ThreatLevel::Low => 3,
            ThreatLevel::Undefined => 4,
        }
    }

    pub fn from_id(id: u8) -> Self {
        match id {
            1 => ThreatLevel::High,
            2 => ThreatLevel::Medium,
            3 => ThreatLevel::Low,
            _ => ThreatLevel::Undefined,
        }
    }

    /// The more severe of the two levels. Never lowers severity.
    pub fn raise(self, observed: ThreatLevel) -> ThreatLevel {
        if observed.id() < self.id() {
            observed
        } else {
            self
        }
    }
}

impl Serialize for ThreatLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id().to_string())
    }
}

impl<'de> Deserialize<'de> for ThreatLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = de_flexible_int(deserializer)?;
        Ok(id.map_or(ThreatLevel::Undefined, |v| {
            u8::try_from(v).map_or(ThreatLevel::Undefined, ThreatLevel::from_id)
        }))
    }
}

/// Accepts `"1690000000"`, `1690000000` or null.
fn de_flexible_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Int(i64),
        Text(String),
    }

    match Option::<Flexible>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flexible::Int(v)) => Ok(Some(v)),
        Some(Flexible::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Flexible::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A single value attached to a container event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub uuid: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    pub value: String,

    #[serde(rename = "Tag", default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,

    #[serde(default, deserialize_with = "de_flexible_int", skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<Timestamp>,

    #[serde(default, deserialize_with = "de_flexible_int", skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Timestamp>,

    /// Last modification time, assigned by the destination
    #[serde(default, deserialize_with = "de_flexible_int", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    /// Owning event, only present on attribute searches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_uuid: Option<String>,
}

impl Attribute {
    pub fn new(kind: impl Into<String>, category: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            kind: kind.into(),
            category: Some(category.into()),
            value: value.into(),
            tags: Vec::new(),
            first_seen: None,
            last_seen: None,
            timestamp: None,
            event_uuid: None,
        }
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

/// One field of a multi-value object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttribute {
    pub object_relation: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// A multi-field destination object (x509 certificate, registry key, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MispObject {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<ObjectAttribute>,
}

/// A destination-side grouping record that indicators attach to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// Assigned by the destination on first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub uuid: String,

    /// Human-readable title, the registry key
    pub info: String,

    #[serde(default)]
    pub threat_level_id: ThreatLevel,

    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<Attribute>,

    #[serde(rename = "Object", default)]
    pub objects: Vec<MispObject>,

    #[serde(rename = "Tag", default)]
    pub tags: Vec<Tag>,
}

impl ContainerEvent {
    /// A container that has not been saved to the destination yet
    pub fn new(info: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4().to_string(),
            info: info.into(),
            threat_level_id: ThreatLevel::Undefined,
            attributes: Vec::new(),
            objects: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn find_attribute(&self, value: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.value == value)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

/// Lightweight event record returned by index searches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    #[serde(default)]
    pub id: Option<String>,
    pub uuid: String,
    pub info: String,
}

/// "Seen again" marker for an existing attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    pub value: String,
    /// Attribute the sighting refers to
    pub uuid: String,
    pub source: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    #[serde(default)]
    pub id: Option<String>,
    pub uuid: String,
    pub name: String,
}

/// An attribute that already existed on the destination when the run started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub value: String,
    pub identity: String,
    pub container_identity: String,
    pub last_seen_timestamp: Option<Timestamp>,
}
