//! Resume checkpoint and missing-galaxy log
//!
//! The checkpoint file holds one decimal unix timestamp. The galaxy log holds
//! newline-separated malware family names with no galaxy mapping.

use intelbridge_common::{IntelError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::model::{Indicator, Timestamp};

/// Longest initial look-back, in minutes (two weeks)
pub const MAX_LOOKBACK_MINUTES: i64 = 20220;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    timestamp_path: PathBuf,
    galaxy_log_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(timestamp_path: impl Into<PathBuf>, galaxy_log_path: impl Into<PathBuf>) -> Self {
        Self {
            timestamp_path: timestamp_path.into(),
            galaxy_log_path: galaxy_log_path.into(),
        }
    }

    pub fn timestamp_path(&self) -> &Path {
        &self.timestamp_path
    }

    /// Saved position, or `None` on a first run
    pub fn load(&self) -> Result<Option<Timestamp>> {
        if !self.timestamp_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.timestamp_path)?;
        let line = raw.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(None);
        }
        line.parse().map(Some).map_err(|e| {
            IntelError::parse(format!(
                "invalid checkpoint in {}: {}",
                self.timestamp_path.display(),
                e
            ))
        })
    }

    /// Overwrite the saved position
    pub fn commit(&self, timestamp: Timestamp) -> Result<()> {
        fs::write(&self.timestamp_path, timestamp.to_string())?;
        info!(timestamp, path = %self.timestamp_path.display(), "Checkpoint written");
        Ok(())
    }

    /// Write the galaxy log if any family went unmapped. Returns whether it was written.
    pub fn write_missing_galaxies(&self, families: &[String]) -> Result<bool> {
        if families.is_empty() {
            return Ok(false);
        }
        for family in families {
            warn!(family = %family, "No galaxy mapping found for malware family");
        }
        fs::write(&self.galaxy_log_path, families.join("\n"))?;
        Ok(true)
    }

    /// Where the feed should start: the saved position unless `force` is set,
    /// otherwise `now` minus the look-back window.
    pub fn starting_point(&self, force: bool, lookback_minutes: i64, now: Timestamp) -> Result<Timestamp> {
        let fallback = now - lookback_minutes.clamp(0, MAX_LOOKBACK_MINUTES) * 60;
        if force {
            return Ok(fallback);
        }
        Ok(self.load()?.unwrap_or(fallback))
    }
}

/// Last non-null `last_seen` scanning the page from its end
pub fn page_position(page: &[Indicator]) -> Option<Timestamp> {
    page.iter().rev().find_map(|ind| ind.last_seen)
}
