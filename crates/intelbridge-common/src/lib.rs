//! Intelbridge Common Library
//!
//! Shared error handling and logging for the intelbridge workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the [`IntelError`] taxonomy and its retry classification
//! - **Logging**: console/file/JSON tracing setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use intelbridge_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{IntelError, Result};
