//! Destination (MISP) API
//!
//! [`Destination`] is the seam the pipeline talks to. [`MispClient`] speaks the
//! REST protocol; [`RetryingDestination`] routes every call through the
//! retrying transport and is what the pipeline components hold.

pub mod client;
pub mod endpoints;
pub mod retrying;
pub mod types;

pub use client::MispClient;
pub use retrying::RetryingDestination;
pub use types::EventFilter;

use async_trait::async_trait;
use intelbridge_common::Result;

use crate::model::{Attribute, ContainerEvent, EventSummary, Organisation, Sighting};

/// Operations the pipeline consumes from the destination.
///
/// Implementations report a missing record as an error for which
/// `is_not_found()` holds; the transport turns that into `None`.
#[async_trait]
pub trait Destination: Send + Sync {
    /// All attributes of one destination type, with their owning event uuid
    async fn search_attributes(&self, kind: &str) -> Result<Vec<Attribute>>;

    /// Full events matching the filter
    async fn search_events(&self, filter: &EventFilter) -> Result<Vec<ContainerEvent>>;

    /// Lightweight event records matching the filter
    async fn search_index(&self, filter: &EventFilter) -> Result<Vec<EventSummary>>;

    async fn get_event(&self, uuid: &str) -> Result<ContainerEvent>;

    async fn get_organisation(&self, id: &str) -> Result<Organisation>;

    async fn get_attribute(&self, uuid: &str) -> Result<Attribute>;

    /// Create an event, returning it as stored (with its assigned id)
    async fn add_event(&self, event: &ContainerEvent) -> Result<ContainerEvent>;

    async fn update_event(&self, event: &ContainerEvent) -> Result<ContainerEvent>;

    async fn add_sighting(&self, sighting: &Sighting) -> Result<()>;

    async fn add_tag(&self, uuid: &str, tag: &str) -> Result<()>;

    async fn remove_tag(&self, uuid: &str, tag: &str) -> Result<()>;
}
