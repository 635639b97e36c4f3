use std::time::Duration;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(6000);

/// File-name glob identifying AppMap recordings.
pub const DEFAULT_APPMAP_GLOB: &str = "*.appmap.json";

/// Per-project watcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Delay between the end of one tick and the start of the next.
    pub frequency: Duration,
    /// Glob matched against file names (not full paths).
    pub appmap_glob: String,
    /// Kill agent commands that run longer than this.
    pub command_timeout: Option<Duration>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_POLL_INTERVAL,
            appmap_glob: DEFAULT_APPMAP_GLOB.to_string(),
            command_timeout: None,
        }
    }
}

impl WatcherConfig {
    #[must_use]
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Parsed AppMap glob, falling back to the default on a bad pattern.
    pub fn appmap_pattern(&self) -> glob::Pattern {
        glob::Pattern::new(&self.appmap_glob).unwrap_or_else(|e| {
            tracing::warn!(pattern = %self.appmap_glob, "invalid AppMap glob: {e}");
            glob::Pattern::new(DEFAULT_APPMAP_GLOB).unwrap_or_default()
        })
    }
}
