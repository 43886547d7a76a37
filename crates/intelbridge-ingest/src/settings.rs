//! Import settings
//!
//! Loaded from a TOML file, then overridden by `INTELBRIDGE_*` environment
//! variables. The CLI applies its own flags last.

use intelbridge_common::{IntelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::checkpoint::MAX_LOOKBACK_MINUTES;
use crate::registry::{DEFAULT_INDICATOR_TYPE_TITLE, DEFAULT_MALWARE_FAMILY_TITLE};

pub const MIN_BATCH_SIZE: usize = 50;
pub const MAX_BATCH_SIZE: usize = 5000;
pub const DEFAULT_BATCH_SIZE: i64 = 500;

pub const MIN_REFRESH_INTERVAL_SECS: u64 = 30;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 60;

/// Ceiling for the derived worker pool size
pub const MAX_DEFAULT_THREADS: usize = 32;

pub const DEFAULT_MISS_TRACK_FILE: &str = "no_galaxy_mapping.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    #[serde(default)]
    pub misp_url: String,
    #[serde(default)]
    pub misp_auth_key: String,
    #[serde(default = "default_true")]
    pub misp_enable_ssl: bool,
    #[serde(default)]
    pub crowdstrike_org_uuid: String,
    #[serde(default)]
    pub indicators_timestamp_filename: String,

    /// Ignore the saved checkpoint
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub no_banners: bool,
    #[serde(default)]
    pub delete_outdated_indicators: bool,

    /// Clamped to [50, 5000]
    #[serde(default = "default_batch_size")]
    pub ind_attribute_batch_size: i64,
    /// Seconds; clamped to [30, 300]
    #[serde(default = "default_refresh_interval")]
    pub event_save_memory_refresh_interval: i64,
    #[serde(default)]
    pub log_duplicates_as_sightings: bool,
    #[serde(default)]
    pub max_threads: Option<usize>,

    #[serde(default = "default_miss_track_file")]
    pub miss_track_file: String,
    #[serde(default = "default_indicator_type_title")]
    pub indicator_type_title: String,
    #[serde(default = "default_malware_family_title")]
    pub malware_family_title: String,
    #[serde(default = "default_init_minutes")]
    pub init_indicators_minutes: i64,

    /// Malware family name to galaxy tag
    #[serde(default)]
    pub galaxy_map: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE
}

fn default_refresh_interval() -> i64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_miss_track_file() -> String {
    DEFAULT_MISS_TRACK_FILE.to_string()
}

fn default_indicator_type_title() -> String {
    DEFAULT_INDICATOR_TYPE_TITLE.to_string()
}

fn default_malware_family_title() -> String {
    DEFAULT_MALWARE_FAMILY_TITLE.to_string()
}

fn default_init_minutes() -> i64 {
    MAX_LOOKBACK_MINUTES
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            misp_url: String::new(),
            misp_auth_key: String::new(),
            misp_enable_ssl: true,
            crowdstrike_org_uuid: String::new(),
            indicators_timestamp_filename: String::new(),
            force: false,
            no_banners: false,
            delete_outdated_indicators: false,
            ind_attribute_batch_size: default_batch_size(),
            event_save_memory_refresh_interval: default_refresh_interval(),
            log_duplicates_as_sightings: false,
            max_threads: None,
            miss_track_file: default_miss_track_file(),
            indicator_type_title: default_indicator_type_title(),
            malware_family_title: default_malware_family_title(),
            init_indicators_minutes: default_init_minutes(),
            galaxy_map: HashMap::new(),
        }
    }
}

fn env_var<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl ImportSettings {
    /// Read a settings file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IntelError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let settings: Self = toml::from_str(&raw)
            .map_err(|e| IntelError::config(format!("invalid settings in {}: {}", path.display(), e)))?;
        Ok(settings.merge_env())
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    pub fn merge_env(mut self) -> Self {
        if let Some(v) = env_var("INTELBRIDGE_MISP_URL") {
            self.misp_url = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_MISP_AUTH_KEY") {
            self.misp_auth_key = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_MISP_ENABLE_SSL") {
            self.misp_enable_ssl = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_CROWDSTRIKE_ORG_UUID") {
            self.crowdstrike_org_uuid = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_INDICATORS_TIMESTAMP_FILENAME") {
            self.indicators_timestamp_filename = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_IND_ATTRIBUTE_BATCH_SIZE") {
            self.ind_attribute_batch_size = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_EVENT_SAVE_MEMORY_REFRESH_INTERVAL") {
            self.event_save_memory_refresh_interval = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_LOG_DUPLICATES_AS_SIGHTINGS") {
            self.log_duplicates_as_sightings = v;
        }
        if let Some(v) = env_var("INTELBRIDGE_MAX_THREADS") {
            self.max_threads = Some(v);
        }
        if let Some(v) = env_var("INTELBRIDGE_INIT_INDICATORS_MINUTES") {
            self.init_indicators_minutes = v;
        }
        self
    }

    /// Fail before any network activity when a required setting is missing
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("misp_url", &self.misp_url),
            ("misp_auth_key", &self.misp_auth_key),
            ("crowdstrike_org_uuid", &self.crowdstrike_org_uuid),
            ("indicators_timestamp_filename", &self.indicators_timestamp_filename),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(IntelError::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub fn effective_batch_size(&self) -> usize {
        self.ind_attribute_batch_size
            .clamp(MIN_BATCH_SIZE as i64, MAX_BATCH_SIZE as i64) as usize
    }

    pub fn effective_refresh_interval(&self) -> Duration {
        let secs = self
            .event_save_memory_refresh_interval
            .clamp(MIN_REFRESH_INTERVAL_SECS as i64, MAX_REFRESH_INTERVAL_SECS as i64);
        Duration::from_secs(secs as u64)
    }

    /// Configured pool size, or four per available core capped at 32
    pub fn effective_threads(&self) -> usize {
        match self.max_threads {
            Some(n) if n > 0 => n,
            _ => {
                let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
                (cores * 4).min(MAX_DEFAULT_THREADS)
            },
        }
    }
}
