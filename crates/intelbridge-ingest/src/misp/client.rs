//! HTTP client for a MISP instance

use async_trait::async_trait;
use intelbridge_common::{IntelError, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::endpoints;
use super::types::*;
use super::Destination;
use crate::model::{Attribute, ContainerEvent, EventSummary, Organisation, Sighting};

// ============================================================================
// Client Constants
// ============================================================================

/// Default request timeout in seconds.
/// Can be overridden via INTELBRIDGE_MISP_TIMEOUT_SECS.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Code reported when the destination sends an error payload with a success status
const UNSPECIFIED_ERROR_CODE: u16 = 500;

/// REST client for the destination knowledge base
pub struct MispClient {
    client: Client,
    base_url: String,
    auth_key: String,
}

impl MispClient {
    pub fn new(base_url: impl Into<String>, auth_key: impl Into<String>, verify_ssl: bool) -> Result<Self> {
        let timeout_secs = std::env::var("INTELBRIDGE_MISP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| IntelError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_key: auth_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.send(self.client.get(url)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
        self.send(self.client.post(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(AUTHORIZATION, &self.auth_key)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| IntelError::network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IntelError::network(e.to_string()))?;

        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) if !status.is_success() => return Err(IntelError::api(status.as_u16(), text)),
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(err) = payload_error(status, &body) {
            debug!(status = status.as_u16(), error = %err, "Destination returned an error");
            return Err(err);
        }

        Ok(serde_json::from_value(body)?)
    }
}

/// Error carried by a response, either by status or by an `errors` payload
fn payload_error(status: StatusCode, body: &Value) -> Option<IntelError> {
    let errors = body.get("errors").filter(|e| !e.is_null());
    if status.is_success() && errors.is_none() {
        return None;
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| errors.map(Value::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    let code = if status.is_success() {
        body.get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(UNSPECIFIED_ERROR_CODE)
    } else {
        status.as_u16()
    };

    Some(IntelError::api(code, message))
}

#[async_trait]
impl Destination for MispClient {
    async fn search_attributes(&self, kind: &str) -> Result<Vec<Attribute>> {
        let request = AttributeSearchRequest {
            kind,
            include_event_uuid: true,
            return_format: "json",
        };
        let found: Envelope<AttributeList> =
            self.post(&endpoints::attribute_search_url(&self.base_url), &request).await?;
        Ok(found.response.attributes)
    }

    async fn search_events(&self, filter: &EventFilter) -> Result<Vec<ContainerEvent>> {
        let request = EventSearchRequest {
            filter,
            return_format: "json",
        };
        let found: Envelope<Vec<EventWrapper>> =
            self.post(&endpoints::event_search_url(&self.base_url), &request).await?;
        Ok(found.response.into_iter().map(|w| w.event).collect())
    }

    async fn search_index(&self, filter: &EventFilter) -> Result<Vec<EventSummary>> {
        self.post(&endpoints::event_index_url(&self.base_url), filter).await
    }

    async fn get_event(&self, uuid: &str) -> Result<ContainerEvent> {
        let found: EventWrapper = self.get(&endpoints::event_view_url(&self.base_url, uuid)).await?;
        Ok(found.event)
    }

    async fn get_organisation(&self, id: &str) -> Result<Organisation> {
        let found: OrganisationWrapper =
            self.get(&endpoints::organisation_view_url(&self.base_url, id)).await?;
        Ok(found.organisation)
    }

    async fn get_attribute(&self, uuid: &str) -> Result<Attribute> {
        let found: AttributeWrapper =
            self.get(&endpoints::attribute_view_url(&self.base_url, uuid)).await?;
        Ok(found.attribute)
    }

    async fn add_event(&self, event: &ContainerEvent) -> Result<ContainerEvent> {
        let saved: EventWrapper = self
            .post(&endpoints::event_add_url(&self.base_url), &EventBody { event })
            .await?;
        Ok(saved.event)
    }

    async fn update_event(&self, event: &ContainerEvent) -> Result<ContainerEvent> {
        let saved: EventWrapper = self
            .post(&endpoints::event_edit_url(&self.base_url, &event.uuid), &EventBody { event })
            .await?;
        Ok(saved.event)
    }

    async fn add_sighting(&self, sighting: &Sighting) -> Result<()> {
        let _: Value = self.post(&endpoints::sighting_add_url(&self.base_url), sighting).await?;
        Ok(())
    }

    async fn add_tag(&self, uuid: &str, tag: &str) -> Result<()> {
        let _: Value = self
            .post(&endpoints::tag_attach_url(&self.base_url), &TagRequest { uuid, tag })
            .await?;
        Ok(())
    }

    async fn remove_tag(&self, uuid: &str, tag: &str) -> Result<()> {
        let _: Value = self
            .post(&endpoints::tag_remove_url(&self.base_url), &TagRequest { uuid, tag })
            .await?;
        Ok(())
    }
}
