//! Tag derivation
//!
//! Tagging heuristics sit behind [`TagDeriver`] so the pipeline only depends on
//! the `(matched, tags)` contract. [`FeedTagger`] is the stock implementation.

use intelbridge_common::Result;
use std::collections::{BTreeSet, HashMap};

use crate::model::Indicator;

pub const ADVERSARY_TAG_PREFIX: &str = "CrowdStrike:adversary";
pub const INDICATOR_TAG_PREFIX: &str = "CrowdStrike:indicator";

/// The dimensions an attribute is tagged along, applied in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDimension {
    Actor,
    Target,
    Threat,
    Family,
    Label,
}

impl TagDimension {
    pub const ORDER: [TagDimension; 5] = [
        TagDimension::Actor,
        TagDimension::Target,
        TagDimension::Threat,
        TagDimension::Family,
        TagDimension::Label,
    ];
}

/// Result of one derivation step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDerivation {
    pub matched: bool,
    pub tags: BTreeSet<String>,
    /// Family names with no galaxy mapping
    pub unmapped_families: Vec<String>,
}

/// Context carried between dimensions
#[derive(Debug, Clone, Copy, Default)]
pub struct TagContext {
    pub actor_matched: bool,
    pub threat_matched: bool,
}

pub trait TagDeriver: Send + Sync {
    fn derive(
        &self,
        dimension: TagDimension,
        indicator: &Indicator,
        current: BTreeSet<String>,
        context: TagContext,
    ) -> Result<TagDerivation>;
}

/// All tags for an indicator plus the unmapped family names seen on the way.
///
/// A failing dimension is logged and skipped; the others still apply.
pub fn derive_all(deriver: &dyn TagDeriver, indicator: &Indicator) -> (Vec<String>, Vec<String>) {
    let mut tags = BTreeSet::new();
    let mut unmapped = Vec::new();
    let mut context = TagContext::default();

    for dimension in TagDimension::ORDER {
        match deriver.derive(dimension, indicator, tags.clone(), context) {
            Ok(derived) => {
                match dimension {
                    TagDimension::Actor => context.actor_matched = derived.matched,
                    TagDimension::Threat => context.threat_matched = derived.matched,
                    _ => {},
                }
                tags = derived.tags;
                unmapped.extend(derived.unmapped_families);
            },
            Err(e) => {
                tracing::warn!(
                    indicator = %indicator.id,
                    dimension = ?dimension,
                    error = %e,
                    "Tag derivation failed, continuing without it"
                );
            },
        }
    }

    (tags.into_iter().collect(), unmapped)
}

/// Adversary branch implied by an actor's naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdversaryBranch {
    Criminal,
    Hacktivist,
    NationState,
}

impl AdversaryBranch {
    pub fn as_str(self) -> &'static str {
        match self {
            AdversaryBranch::Criminal => "CRIMINAL",
            AdversaryBranch::Hacktivist => "HACKTIVIST",
            AdversaryBranch::NationState => "NATION-STATE",
        }
    }

    pub fn from_actor(actor: &str) -> Option<Self> {
        let actor = actor.to_ascii_uppercase();
        if actor.ends_with("SPIDER") {
            Some(AdversaryBranch::Criminal)
        } else if actor.ends_with("JACKAL") {
            Some(AdversaryBranch::Hacktivist)
        } else if NATION_STATE_SUFFIXES.iter().any(|s| actor.ends_with(s)) {
            Some(AdversaryBranch::NationState)
        } else {
            None
        }
    }

    pub fn tag(self) -> String {
        format!("{}:branch: {}", ADVERSARY_TAG_PREFIX, self.as_str())
    }
}

const NATION_STATE_SUFFIXES: &[&str] = &[
    "BEAR", "BUFFALO", "CHOLLIMA", "CRANE", "KITTEN", "LEOPARD", "OCELOT", "PANDA", "TIGER",
];

/// Distinct branches of every actor tied to the indicator
pub fn affiliated_branches(indicator: &Indicator) -> Vec<AdversaryBranch> {
    let branches: BTreeSet<_> = indicator
        .actors
        .iter()
        .filter_map(|a| AdversaryBranch::from_actor(a))
        .collect();
    branches.into_iter().collect()
}

/// Stock tagger for feed indicators.
///
/// `galaxy_map` maps a lower-cased malware family name to a destination galaxy tag.
#[derive(Debug, Clone, Default)]
pub struct FeedTagger {
    galaxy_map: HashMap<String, String>,
}

impl FeedTagger {
    pub fn new(galaxy_map: &HashMap<String, String>) -> Self {
        Self {
            galaxy_map: galaxy_map
                .iter()
                .map(|(family, tag)| (family.to_lowercase(), tag.clone()))
                .collect(),
        }
    }
}

impl TagDeriver for FeedTagger {
    fn derive(
        &self,
        dimension: TagDimension,
        indicator: &Indicator,
        mut tags: BTreeSet<String>,
        context: TagContext,
    ) -> Result<TagDerivation> {
        let mut unmapped_families = Vec::new();
        let before = tags.len();

        match dimension {
            TagDimension::Actor => {
                for actor in &indicator.actors {
                    tags.insert(format!("{}: {}", ADVERSARY_TAG_PREFIX, actor.to_uppercase()));
                }
                for branch in affiliated_branches(indicator) {
                    tags.insert(branch.tag());
                }
            },
            TagDimension::Target => {
                for target in &indicator.targets {
                    tags.insert(format!("{}:target: {}", INDICATOR_TAG_PREFIX, target));
                }
            },
            TagDimension::Threat => {
                for threat in &indicator.threat_types {
                    tags.insert(format!("{}:threat: {}", INDICATOR_TAG_PREFIX, threat));
                }
            },
            TagDimension::Family => {
                for family in indicator.malware_families.iter().filter(|f| !f.trim().is_empty()) {
                    match self.galaxy_map.get(&family.trim().to_lowercase()) {
                        Some(galaxy) => {
                            tags.insert(galaxy.clone());
                        },
                        None => {
                            tags.insert(format!("{}:malware: {}", INDICATOR_TAG_PREFIX, family.trim()));
                            unmapped_families.push(family.trim().to_string());
                        },
                    }
                }
            },
            TagDimension::Label => {
                for label in &indicator.labels {
                    let redundant = (context.actor_matched && label.name.starts_with("Actor/"))
                        || (context.threat_matched && label.name.starts_with("ThreatType/"));
                    if !redundant {
                        tags.insert(format!("{}:label: {}", INDICATOR_TAG_PREFIX, label.name));
                    }
                }
            },
        }

        Ok(TagDerivation {
            matched: tags.len() > before,
            tags,
            unmapped_families,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use intelbridge_common::IntelError;

    fn indicator() -> Indicator {
        serde_json::from_value(serde_json::json!({
            "id": "1",
            "type": "domain",
            "indicator": "evil.example",
            "actors": ["WIZARDSPIDER", "FANCYBEAR"],
            "threat_types": ["Ransomware"],
            "malware_families": ["TrickBot", "Unmapped"],
            "labels": [{"name": "ThreatType/Ransomware"}, {"name": "MaliciousConfidence/High"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_branches_from_actor_names() {
        assert_eq!(AdversaryBranch::from_actor("wizardspider"), Some(AdversaryBranch::Criminal));
        assert_eq!(AdversaryBranch::from_actor("FANCYBEAR"), Some(AdversaryBranch::NationState));
        assert_eq!(AdversaryBranch::from_actor("UNKNOWN"), None);
        assert_eq!(
            affiliated_branches(&indicator()),
            vec![AdversaryBranch::Criminal, AdversaryBranch::NationState]
        );
    }

    #[test]
    fn test_feed_tagger_all_dimensions() {
        let galaxies = HashMap::from([(
            "trickbot".to_string(),
            "misp-galaxy:malpedia=\"TrickBot\"".to_string(),
        )]);
        let tagger = FeedTagger::new(&galaxies);
        let (tags, unmapped) = derive_all(&tagger, &indicator());

        assert!(tags.contains(&"CrowdStrike:adversary: WIZARDSPIDER".to_string()));
        assert!(tags.contains(&"CrowdStrike:adversary:branch: CRIMINAL".to_string()));
        assert!(tags.contains(&"misp-galaxy:malpedia=\"TrickBot\"".to_string()));
        assert!(tags.contains(&"CrowdStrike:indicator:malware: Unmapped".to_string()));
        // threat already covered the ThreatType label
        assert!(!tags.iter().any(|t| t.ends_with("label: ThreatType/Ransomware")));
        assert!(tags.contains(&"CrowdStrike:indicator:label: MaliciousConfidence/High".to_string()));
        assert_eq!(unmapped, vec!["Unmapped".to_string()]);
    }

    struct FailingThreats;

    impl TagDeriver for FailingThreats {
        fn derive(
            &self,
            dimension: TagDimension,
            indicator: &Indicator,
            current: BTreeSet<String>,
            context: TagContext,
        ) -> Result<TagDerivation> {
            if dimension == TagDimension::Threat {
                return Err(IntelError::parse("bad threat table"));
            }
            FeedTagger::default().derive(dimension, indicator, current, context)
        }
    }

    #[test]
    fn test_failed_dimension_does_not_drop_other_tags() {
        let (tags, _) = derive_all(&FailingThreats, &indicator());
        assert!(tags.contains(&"CrowdStrike:adversary: FANCYBEAR".to_string()));
        assert!(!tags.iter().any(|t| t.contains(":threat: ")));
        // without a threat match the ThreatType label is kept
        assert!(tags.iter().any(|t| t.ends_with("label: ThreatType/Ransomware")));
    }
}
