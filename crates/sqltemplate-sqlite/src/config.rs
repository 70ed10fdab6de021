//! SQLite engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a [`SqliteEngine`](crate::SqliteEngine) opens its database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database file. `None` creates a private database in a temporary
    /// directory that is removed when the last engine clone is dropped.
    pub path: Option<PathBuf>,
    /// How long a statement waits for another connection's write lock
    /// before failing with a `Timeout` data access error.
    pub busy_timeout: Duration,
    /// Enforce `FOREIGN KEY` constraints.
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) the database file at `path`.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}
