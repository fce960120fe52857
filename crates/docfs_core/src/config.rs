//! Store configuration.

use docfs_storage::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root of the document tree.
    pub data_directory: PathBuf,

    /// Optional separate directory holding blobs, watched for changes.
    pub blob_storage_directory: Option<PathBuf>,

    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether mutations are recorded in the shared journal.
    pub journal: bool,

    /// How often the journal is synced into the cache.
    pub sync_interval: Duration,

    /// How often old journal entries are pruned.
    pub clean_interval: Duration,

    /// Journal entries older than this are pruned by `clean`.
    pub max_journal_item_age: Duration,

    /// A `sync` later than this after the previous one reloads everything.
    pub sync_staleness: Duration,

    /// Maximum time a mutation waits for queue admission.
    pub queue_wait_timeout: Duration,

    /// How often flat entity sets are compacted (zero = never).
    pub compaction_interval: Duration,

    /// Fraction of unparsable flat-file records that fails loading.
    pub corrupt_alert_threshold: f64,

    /// Retry policy for renames.
    pub rename_retry: RetryPolicy,

    /// Whether to watch for external modifications.
    pub watch: bool,

    /// How often the watcher scans the data directory.
    pub watch_interval: Duration,

    /// Minimum time between two external modification reports.
    pub watch_debounce: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("data"),
            blob_storage_directory: None,
            create_if_missing: true,
            journal: true,
            sync_interval: Duration::from_secs(10),
            clean_interval: Duration::from_secs(60),
            max_journal_item_age: Duration::from_secs(60),
            sync_staleness: Duration::from_secs(60),
            queue_wait_timeout: Duration::from_secs(60),
            compaction_interval: Duration::from_secs(60),
            corrupt_alert_threshold: 0.1,
            rename_retry: RetryPolicy::default(),
            watch: false,
            watch_interval: Duration::from_secs(1),
            watch_debounce: Duration::from_secs(1),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for the given data directory.
    #[must_use]
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            ..Self::default()
        }
    }

    /// Sets the blob storage directory.
    #[must_use]
    pub fn blob_storage_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.blob_storage_directory = Some(path.into());
        self
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Enables or disables the journal.
    #[must_use]
    pub const fn journal(mut self, value: bool) -> Self {
        self.journal = value;
        self
    }

    /// Sets the journal sync interval.
    #[must_use]
    pub const fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the journal clean interval.
    #[must_use]
    pub const fn clean_interval(mut self, interval: Duration) -> Self {
        self.clean_interval = interval;
        self
    }

    /// Sets the journal retention window.
    #[must_use]
    pub const fn max_journal_item_age(mut self, age: Duration) -> Self {
        self.max_journal_item_age = age;
        self
    }

    /// Sets the sync staleness window.
    #[must_use]
    pub const fn sync_staleness(mut self, window: Duration) -> Self {
        self.sync_staleness = window;
        self
    }

    /// Sets the queue admission timeout.
    #[must_use]
    pub const fn queue_wait_timeout(mut self, timeout: Duration) -> Self {
        self.queue_wait_timeout = timeout;
        self
    }

    /// Sets the compaction interval.
    #[must_use]
    pub const fn compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Sets the corrupted record threshold.
    #[must_use]
    pub const fn corrupt_alert_threshold(mut self, threshold: f64) -> Self {
        self.corrupt_alert_threshold = threshold;
        self
    }

    /// Sets the rename retry policy.
    #[must_use]
    pub fn rename_retry(mut self, policy: RetryPolicy) -> Self {
        self.rename_retry = policy;
        self
    }

    /// Enables or disables the external modification watcher.
    #[must_use]
    pub const fn watch(mut self, value: bool) -> Self {
        self.watch = value;
        self
    }

    /// Sets the watcher scan interval.
    #[must_use]
    pub const fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Sets the watcher debounce window.
    #[must_use]
    pub const fn watch_debounce(mut self, window: Duration) -> Self {
        self.watch_debounce = window;
        self
    }

    /// Disables every background task, for deterministic tests and tools.
    #[must_use]
    pub const fn without_background_tasks(mut self) -> Self {
        self.sync_interval = Duration::ZERO;
        self.clean_interval = Duration::ZERO;
        self.compaction_interval = Duration::ZERO;
        self.watch = false;
        self
    }
}
