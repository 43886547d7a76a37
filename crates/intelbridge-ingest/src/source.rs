//! Source feed abstraction
//!
//! The pipeline only supplies a starting timestamp; paging is internal to the
//! source. Pages arrive as a stream and are consumed strictly in order.

use futures::stream::{self, BoxStream, StreamExt};
use intelbridge_common::{IntelError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::{Indicator, Timestamp};

/// Ordered pages of indicators
pub type IndicatorPages = BoxStream<'static, Result<Vec<Indicator>>>;

/// Default number of indicators per page, matching the intel API limit
pub const DEFAULT_PAGE_SIZE: usize = 5000;

pub trait IndicatorSource: Send + Sync {
    /// Indicators updated at or after `since`, oldest first.
    ///
    /// With `delete_outdated` set, records the feed flags as deleted are dropped.
    fn indicators(&self, since: Timestamp, delete_outdated: bool) -> IndicatorPages;
}

/// File-backed source reading one indicator per line
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    records: Vec<Indicator>,
    page_size: usize,
}

impl JsonLinesSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = serde_jsonlines::json_lines::<Indicator, _>(&path)?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| IntelError::parse(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), count = records.len(), "Loaded indicator feed");

        Ok(Self {
            path,
            records,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Matching records split into pages
    pub fn pages(&self, since: Timestamp, delete_outdated: bool) -> Vec<Vec<Indicator>> {
        let mut selected: Vec<Indicator> = self
            .records
            .iter()
            .filter(|ind| ind.last_seen.unwrap_or(Timestamp::MAX) >= since)
            .filter(|ind| !(delete_outdated && ind.deleted))
            .cloned()
            .collect();
        selected.sort_by_key(|ind| ind.last_seen.unwrap_or(Timestamp::MAX));

        selected.chunks(self.page_size).map(<[Indicator]>::to_vec).collect()
    }
}

impl IndicatorSource for JsonLinesSource {
    fn indicators(&self, since: Timestamp, delete_outdated: bool) -> IndicatorPages {
        stream::iter(self.pages(since, delete_outdated).into_iter().map(Ok)).boxed()
    }
}

/// Fixed pages handed out verbatim
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pages: Vec<Vec<Indicator>>,
}

impl MemorySource {
    pub fn new(pages: Vec<Vec<Indicator>>) -> Self {
        Self { pages }
    }
}

impl IndicatorSource for MemorySource {
    fn indicators(&self, _since: Timestamp, _delete_outdated: bool) -> IndicatorPages {
        stream::iter(self.pages.clone().into_iter().map(Ok)).boxed()
    }
}
