//! Destination calls routed through the retrying transport

use intelbridge_common::{IntelError, Result};
use std::sync::Arc;

use super::{Destination, EventFilter};
use crate::model::{Attribute, ContainerEvent, EventSummary, Organisation, Sighting};
use crate::transport::{RetryPolicy, RetryingTransport};

/// The destination as the pipeline sees it.
///
/// Lookups answer `None` for missing records, searches answer an empty list,
/// and the fire-and-forget writes (sightings, tags) answer whether they landed.
#[derive(Clone)]
pub struct RetryingDestination {
    inner: Arc<dyn Destination>,
    transport: RetryingTransport,
}

impl RetryingDestination {
    pub fn new(inner: Arc<dyn Destination>, transport: RetryingTransport) -> Self {
        Self { inner, transport }
    }

    pub async fn search_attributes(&self, kind: &str) -> Result<Vec<Attribute>> {
        let found = self
            .transport
            .call("search_attributes", || self.inner.search_attributes(kind))
            .await?;
        Ok(found.unwrap_or_default())
    }

    pub async fn search_events(&self, filter: &EventFilter) -> Result<Vec<ContainerEvent>> {
        let found = self
            .transport
            .call("search_events", || self.inner.search_events(filter))
            .await?;
        Ok(found.unwrap_or_default())
    }

    pub async fn search_index(&self, filter: &EventFilter) -> Result<Vec<EventSummary>> {
        let found = self
            .transport
            .call("search_index", || self.inner.search_index(filter))
            .await?;
        Ok(found.unwrap_or_default())
    }

    pub async fn get_event(&self, uuid: &str) -> Result<Option<ContainerEvent>> {
        self.transport.call("get_event", || self.inner.get_event(uuid)).await
    }

    pub async fn get_organisation(&self, id: &str) -> Result<Option<Organisation>> {
        self.transport
            .call("get_organisation", || self.inner.get_organisation(id))
            .await
    }

    pub async fn get_attribute(&self, uuid: &str) -> Result<Option<Attribute>> {
        self.transport
            .call("get_attribute", || self.inner.get_attribute(uuid))
            .await
    }

    /// Persist a container under an explicit policy: add when it has never been
    /// saved, update otherwise. Returns the stored copy.
    pub async fn save_event(&self, event: &ContainerEvent, policy: RetryPolicy) -> Result<ContainerEvent> {
        let (operation, saved) = if event.is_persisted() {
            let saved = self
                .transport
                .call_with(policy, "update_event", || self.inner.update_event(event))
                .await?;
            ("update_event", saved)
        } else {
            let saved = self
                .transport
                .call_with(policy, "add_event", || self.inner.add_event(event))
                .await?;
            ("add_event", saved)
        };

        saved.ok_or_else(|| IntelError::NotFound(format!("{} {}", operation, event.info)))
    }

    pub async fn add_sighting(&self, sighting: &Sighting) -> bool {
        self.fire("add_sighting", || self.inner.add_sighting(sighting)).await
    }

    pub async fn add_tag(&self, uuid: &str, tag: &str) -> bool {
        self.fire("add_tag", || self.inner.add_tag(uuid, tag)).await
    }

    async fn fire<F, Fut>(&self, operation: &str, call: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        match self.transport.call(operation, call).await {
            Ok(Some(())) => true,
            Ok(None) => {
                tracing::warn!(operation, "Target record not found");
                false
            },
            Err(e) => {
                tracing::warn!(operation, error = %e, "Destination write failed");
                false
            },
        }
    }
}
