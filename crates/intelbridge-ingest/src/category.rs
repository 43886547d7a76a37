//! Indicator categories and their destination mapping
//!
//! Every feed type string maps to exactly one [`IndicatorCategory`], and every
//! category has exactly one [`Handling`] policy. Unknown type strings are a
//! typed [`IntelError::Unmappable`], never a silent fall-through.

use intelbridge_common::{IntelError, Result};
use std::collections::HashSet;

use crate::model::{Attribute, Indicator, MispObject, ObjectAttribute};

/// How a category is represented on the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Single attribute of the given destination type and category
    Attribute {
        kind: &'static str,
        category: &'static str,
    },
    /// One-field object of the given template
    Object {
        name: &'static str,
        relation: &'static str,
        kind: &'static str,
    },
    /// Known to the feed but with no destination representation
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorCategory {
    BinaryString,
    BitcoinAddress,
    CampaignId,
    CoinAddress,
    CompileTime,
    DeviceName,
    Domain,
    EmailAddress,
    EmailSubject,
    EventName,
    FileMapping,
    FileName,
    FilePath,
    HashIon,
    HashMd5,
    HashSha1,
    HashSha256,
    IpAddress,
    IpAddressBlock,
    MutexName,
    Password,
    PersonaName,
    PhoneNumber,
    Port,
    Registry,
    SemaphoreName,
    ServiceName,
    Url,
    UserAgent,
    Username,
    X509Serial,
    X509Subject,
}

impl IndicatorCategory {
    pub const ALL: &'static [IndicatorCategory] = &[
        IndicatorCategory::BinaryString,
        IndicatorCategory::BitcoinAddress,
        IndicatorCategory::CampaignId,
        IndicatorCategory::CoinAddress,
        IndicatorCategory::CompileTime,
        IndicatorCategory::DeviceName,
        IndicatorCategory::Domain,
        IndicatorCategory::EmailAddress,
        IndicatorCategory::EmailSubject,
        IndicatorCategory::EventName,
        IndicatorCategory::FileMapping,
        IndicatorCategory::FileName,
        IndicatorCategory::FilePath,
        IndicatorCategory::HashIon,
        IndicatorCategory::HashMd5,
        IndicatorCategory::HashSha1,
        IndicatorCategory::HashSha256,
        IndicatorCategory::IpAddress,
        IndicatorCategory::IpAddressBlock,
        IndicatorCategory::MutexName,
        IndicatorCategory::Password,
        IndicatorCategory::PersonaName,
        IndicatorCategory::PhoneNumber,
        IndicatorCategory::Port,
        IndicatorCategory::Registry,
        IndicatorCategory::SemaphoreName,
        IndicatorCategory::ServiceName,
        IndicatorCategory::Url,
        IndicatorCategory::UserAgent,
        IndicatorCategory::Username,
        IndicatorCategory::X509Serial,
        IndicatorCategory::X509Subject,
    ];

    /// Feed type string
    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorCategory::BinaryString => "binary_string",
            IndicatorCategory::BitcoinAddress => "bitcoin_address",
            IndicatorCategory::CampaignId => "campaign_id",
            IndicatorCategory::CoinAddress => "coin_address",
            IndicatorCategory::CompileTime => "compile_time",
            IndicatorCategory::DeviceName => "device_name",
            IndicatorCategory::Domain => "domain",
            IndicatorCategory::EmailAddress => "email_address",
            IndicatorCategory::EmailSubject => "email_subject",
            IndicatorCategory::EventName => "event_name",
            IndicatorCategory::FileMapping => "file_mapping",
            IndicatorCategory::FileName => "file_name",
            IndicatorCategory::FilePath => "file_path",
            IndicatorCategory::HashIon => "hash_ion",
            IndicatorCategory::HashMd5 => "hash_md5",
            IndicatorCategory::HashSha1 => "hash_sha1",
            IndicatorCategory::HashSha256 => "hash_sha256",
            IndicatorCategory::IpAddress => "ip_address",
            IndicatorCategory::IpAddressBlock => "ip_address_block",
            IndicatorCategory::MutexName => "mutex_name",
            IndicatorCategory::Password => "password",
            IndicatorCategory::PersonaName => "persona_name",
            IndicatorCategory::PhoneNumber => "phone_number",
            IndicatorCategory::Port => "port",
            IndicatorCategory::Registry => "registry",
            IndicatorCategory::SemaphoreName => "semaphore_name",
            IndicatorCategory::ServiceName => "service_name",
            IndicatorCategory::Url => "url",
            IndicatorCategory::UserAgent => "user_agent",
            IndicatorCategory::Username => "username",
            IndicatorCategory::X509Serial => "x509_serial",
            IndicatorCategory::X509Subject => "x509_subject",
        }
    }

    /// Name used in the category container title
    pub fn display_name(self) -> &'static str {
        match self {
            IndicatorCategory::BinaryString => "Binary String",
            IndicatorCategory::BitcoinAddress => "Bitcoin Address",
            IndicatorCategory::CampaignId => "Campaign ID",
            IndicatorCategory::CoinAddress => "Coin Address",
            IndicatorCategory::CompileTime => "Compile Time",
            IndicatorCategory::DeviceName => "Device Name",
            IndicatorCategory::Domain => "Domain",
            IndicatorCategory::EmailAddress => "Email Address",
            IndicatorCategory::EmailSubject => "Email Subject",
            IndicatorCategory::EventName => "Event Name",
            IndicatorCategory::FileMapping => "File Mapping",
            IndicatorCategory::FileName => "File Name",
            IndicatorCategory::FilePath => "File Path",
            IndicatorCategory::HashIon => "Hash ION",
            IndicatorCategory::HashMd5 => "Hash MD5",
            IndicatorCategory::HashSha1 => "Hash SHA1",
            IndicatorCategory::HashSha256 => "Hash SHA256",
            IndicatorCategory::IpAddress => "IP Address",
            IndicatorCategory::IpAddressBlock => "IP Address Block",
            IndicatorCategory::MutexName => "Mutex Name",
            IndicatorCategory::Password => "Password",
            IndicatorCategory::PersonaName => "Persona Name",
            IndicatorCategory::PhoneNumber => "Phone Number",
            IndicatorCategory::Port => "Port",
            IndicatorCategory::Registry => "Registry",
            IndicatorCategory::SemaphoreName => "Semaphore Name",
            IndicatorCategory::ServiceName => "Service Name",
            IndicatorCategory::Url => "URL",
            IndicatorCategory::UserAgent => "User Agent",
            IndicatorCategory::Username => "Username",
            IndicatorCategory::X509Serial => "X509 Serial",
            IndicatorCategory::X509Subject => "X509 Subject",
        }
    }

    pub fn handling(self) -> Handling {
        use Handling::*;
        match self {
            IndicatorCategory::BinaryString => Attribute { kind: "pattern-in-file", category: "Payload installation" },
            IndicatorCategory::BitcoinAddress => Attribute { kind: "btc", category: "Financial fraud" },
            IndicatorCategory::CampaignId => Attribute { kind: "campaign-id", category: "Attribution" },
            IndicatorCategory::CoinAddress => Attribute { kind: "text", category: "Financial fraud" },
            IndicatorCategory::CompileTime => Attribute { kind: "text", category: "Other" },
            IndicatorCategory::DeviceName => Attribute { kind: "hostname", category: "Network activity" },
            IndicatorCategory::Domain => Attribute { kind: "domain", category: "Network activity" },
            IndicatorCategory::EmailAddress => Attribute { kind: "email-src", category: "Payload delivery" },
            IndicatorCategory::EmailSubject => Attribute { kind: "email-subject", category: "Payload delivery" },
            IndicatorCategory::EventName => Unsupported,
            IndicatorCategory::FileMapping => Unsupported,
            IndicatorCategory::FileName => Attribute { kind: "filename", category: "Payload delivery" },
            IndicatorCategory::FilePath => Attribute { kind: "filename", category: "Artifacts dropped" },
            IndicatorCategory::HashIon => Unsupported,
            IndicatorCategory::HashMd5 => Attribute { kind: "md5", category: "Payload delivery" },
            IndicatorCategory::HashSha1 => Attribute { kind: "sha1", category: "Payload delivery" },
            IndicatorCategory::HashSha256 => Attribute { kind: "sha256", category: "Payload delivery" },
            IndicatorCategory::IpAddress => Attribute { kind: "ip-dst", category: "Network activity" },
            IndicatorCategory::IpAddressBlock => Attribute { kind: "ip-dst", category: "Network activity" },
            IndicatorCategory::MutexName => Attribute { kind: "mutex", category: "Artifacts dropped" },
            IndicatorCategory::Password => Attribute { kind: "text", category: "Other" },
            IndicatorCategory::PersonaName => Attribute { kind: "text", category: "Attribution" },
            IndicatorCategory::PhoneNumber => Attribute { kind: "phone-number", category: "Other" },
            IndicatorCategory::Port => Attribute { kind: "port", category: "Network activity" },
            IndicatorCategory::Registry => Object { name: "registry-key", relation: "key", kind: "regkey" },
            IndicatorCategory::SemaphoreName => Attribute { kind: "text", category: "Artifacts dropped" },
            IndicatorCategory::ServiceName => Attribute { kind: "windows-service-name", category: "Artifacts dropped" },
            IndicatorCategory::Url => Attribute { kind: "url", category: "Network activity" },
            IndicatorCategory::UserAgent => Attribute { kind: "user-agent", category: "Network activity" },
            IndicatorCategory::Username => Attribute { kind: "target-user", category: "Targeting data" },
            IndicatorCategory::X509Serial => Object { name: "x509", relation: "serial-number", kind: "text" },
            IndicatorCategory::X509Subject => Object { name: "x509", relation: "subject", kind: "text" },
        }
    }

    /// Parse a feed type string (case-insensitive)
    pub fn from_type(kind: &str) -> Result<Self> {
        let wanted = kind.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| IntelError::Unmappable(kind.to_string()))
    }

    pub fn all() -> impl Iterator<Item = IndicatorCategory> {
        Self::ALL.iter().copied()
    }

    /// Container title for this category, e.g. "Indicator Type: Domain"
    pub fn title(self, prefix: &str) -> String {
        format!("{} {}", prefix.trim_end(), self.display_name())
    }

    /// Destination attribute types worth searching for duplicates, deduplicated
    pub fn searchable_attribute_types() -> Vec<&'static str> {
        let mut seen = HashSet::new();
        Self::ALL
            .iter()
            .filter_map(|c| match c.handling() {
                Handling::Attribute { kind, .. } => Some(kind),
                _ => None,
            })
            .filter(|kind| seen.insert(*kind))
            .collect()
    }
}

impl std::fmt::Display for IndicatorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Check the category table once at startup: feed strings and display names
/// must be unique and `from_type` must round-trip every entry.
pub fn validate_categories() -> Result<()> {
    let mut types = HashSet::new();
    let mut names = HashSet::new();

    for category in IndicatorCategory::ALL {
        if !types.insert(category.as_str()) {
            return Err(IntelError::config(format!(
                "duplicate indicator type mapping: {}",
                category.as_str()
            )));
        }
        if !names.insert(category.display_name()) {
            return Err(IntelError::config(format!(
                "duplicate indicator category title: {}",
                category.display_name()
            )));
        }
        if IndicatorCategory::from_type(category.as_str())? != *category {
            return Err(IntelError::config(format!(
                "indicator type {} does not map back to itself",
                category.as_str()
            )));
        }
    }

    Ok(())
}

/// Destination representation of one indicator
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorPayload {
    Attribute(Attribute),
    Object(MispObject),
}

/// Build the destination representation for an indicator.
///
/// Fails with `Unmappable` for unsupported categories and `Parse` when the
/// indicator carries no value.
pub fn build_payload(indicator: &Indicator, category: IndicatorCategory) -> Result<IndicatorPayload> {
    let value = indicator
        .value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IntelError::parse(format!("indicator {} has no value", indicator.id)))?;

    match category.handling() {
        Handling::Attribute { kind, category } => {
            let mut attribute = Attribute::new(kind, category, value);
            attribute.first_seen = indicator.first_seen;
            attribute.last_seen = indicator.last_seen;
            Ok(IndicatorPayload::Attribute(attribute))
        },
        Handling::Object { name, relation, kind } => Ok(IndicatorPayload::Object(MispObject {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            attributes: vec![ObjectAttribute {
                object_relation: relation.to_string(),
                kind: kind.to_string(),
                value: value.to_string(),
            }],
        })),
        Handling::Unsupported => Err(IntelError::Unmappable(category.as_str().to_string())),
    }
}
