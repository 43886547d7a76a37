//! Request and response shapes for the destination REST API

use serde::{Deserialize, Serialize};

use crate::model::{Attribute, ContainerEvent, Organisation};

/// Event search filter. `info` accepts `%` wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventFilter {
    #[serde(rename = "eventinfo", skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl EventFilter {
    pub fn info(info: impl Into<String>) -> Self {
        Self {
            info: Some(info.into()),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttributeSearchRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    #[serde(rename = "includeEventUuid")]
    pub include_event_uuid: bool,
    #[serde(rename = "returnFormat")]
    pub return_format: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EventSearchRequest<'a> {
    #[serde(flatten)]
    pub filter: &'a EventFilter,
    #[serde(rename = "returnFormat")]
    pub return_format: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagRequest<'a> {
    pub uuid: &'a str,
    pub tag: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EventBody<'a> {
    #[serde(rename = "Event")]
    pub event: &'a ContainerEvent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub response: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttributeList {
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventWrapper {
    #[serde(rename = "Event")]
    pub event: ContainerEvent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttributeWrapper {
    #[serde(rename = "Attribute")]
    pub attribute: Attribute,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrganisationWrapper {
    #[serde(rename = "Organisation")]
    pub organisation: Organisation,
}
