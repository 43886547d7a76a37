//! Intelbridge Ingest Library
//!
//! Synchronises threat-intel indicators from a feed into a MISP instance.
//!
//! # Layout
//!
//! - **Transport**: [`transport`] retries, [`misp`] REST client and destination seam
//! - **State**: [`registry`] containers, [`dedup`] pre-existing attributes
//! - **Work**: [`worker`] per indicator, [`sighting`] duplicates, [`flush`] saves
//! - **Run**: [`coordinator`] batching and [`checkpoint`] resume position, wired by [`pipeline`]
//!
//! # Example
//!
//! ```no_run
//! use intelbridge_ingest::misp::{MispClient, RetryingDestination};
//! use intelbridge_ingest::pipeline::IngestPipeline;
//! use intelbridge_ingest::settings::ImportSettings;
//! use intelbridge_ingest::source::JsonLinesSource;
//! use intelbridge_ingest::tags::FeedTagger;
//! use intelbridge_ingest::transport::RetryingTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = ImportSettings::load("intelbridge.toml")?;
//!     let client = MispClient::new(&settings.misp_url, &settings.misp_auth_key, settings.misp_enable_ssl)?;
//!     let destination = RetryingDestination::new(Arc::new(client), RetryingTransport::default());
//!     let tagger = FeedTagger::new(&settings.galaxy_map);
//!     let source = JsonLinesSource::open("indicators.jsonl")?;
//!
//!     IngestPipeline::new(settings, destination, Arc::new(source), Arc::new(tagger))
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod category;
pub mod checkpoint;
pub mod coordinator;
pub mod dedup;
pub mod flush;
pub mod misp;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod settings;
pub mod sighting;
pub mod source;
pub mod tags;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod testing;

pub use pipeline::{IngestPipeline, RunSummary};
pub use settings::ImportSettings;
