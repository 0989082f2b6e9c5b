//! Runner configuration.

use clap::Parser;
use metasync_core::{SyncConfig, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Default interval between refresh cycles in seconds (15 minutes).
pub const DEFAULT_INTERVAL_SECS: u64 = 900;

/// Default repository directory.
pub const DEFAULT_REPOSITORY_PATH: &str = "./repository";

/// Configuration for the refresh runner.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Catalog snapshot read at the start of every cycle.
    pub snapshot_path: PathBuf,

    /// Directory of the sled repository.
    pub repository_path: PathBuf,

    /// Interval between cycles. None runs a single cycle.
    pub interval: Option<Duration>,

    /// Settings passed to every cycle.
    pub sync: SyncConfig,
}

impl RunConfig {
    /// Create a configuration running once from `snapshot_path`.
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            repository_path: PathBuf::from(DEFAULT_REPOSITORY_PATH),
            interval: None,
            sync: SyncConfig::default(),
        }
    }

    /// Set the repository directory.
    pub fn with_repository_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.repository_path = path.into();
        self
    }

    /// Repeat cycles every `interval`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the cycle settings.
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Check if cycles repeat.
    pub fn is_scheduled(&self) -> bool {
        self.interval.is_some()
    }
}

/// Command-line arguments for the runner.
#[derive(Parser, Debug)]
#[command(name = "metasync")]
#[command(
    version,
    about = "Mirror a catalog snapshot into a metadata repository",
    long_about = None
)]
pub struct Args {
    /// JSON catalog snapshot to mirror.
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Path to the repository directory.
    #[arg(short, long, default_value = DEFAULT_REPOSITORY_PATH)]
    pub repository: PathBuf,

    /// Seconds between cycles.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: u64,

    /// Run a single cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Items requested per page.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Do not mirror views.
    #[arg(long)]
    pub no_views: bool,

    /// Do not create relationships from foreign keys.
    #[arg(long)]
    pub no_foreign_keys: bool,

    /// Steward recorded on created relationships.
    #[arg(long)]
    pub steward: Option<String>,

    /// Confidence (0-100) recorded on created relationships.
    #[arg(long)]
    pub confidence: Option<u8>,
}

impl Args {
    /// Convert command-line arguments to runner configuration.
    pub fn into_config(self) -> Result<RunConfig, Error> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page size {} is outside 1-{}",
                self.page_size, MAX_PAGE_SIZE
            )));
        }
        if !self.once && self.interval == 0 {
            return Err(Error::Config(
                "interval must be positive unless --once is given".to_string(),
            ));
        }
        if let Some(confidence) = self.confidence {
            if confidence > 100 {
                return Err(Error::Config(format!(
                    "confidence {} is outside 0-100",
                    confidence
                )));
            }
        }

        let mut sync = SyncConfig::new()
            .with_page_size(self.page_size)
            .with_views(!self.no_views)
            .with_foreign_keys(!self.no_foreign_keys);
        sync.foreign_key_properties.steward = self.steward;
        sync.foreign_key_properties.confidence = self.confidence;

        let interval = if self.once {
            None
        } else {
            Some(Duration::from_secs(self.interval))
        };

        Ok(RunConfig {
            snapshot_path: self.snapshot,
            repository_path: self.repository,
            interval,
            sync,
        })
    }
}
