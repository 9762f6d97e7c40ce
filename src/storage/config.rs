use std::time::Duration;

/// Connection pool and deadline settings for the ledger store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of pooled SQLite connections.
    pub max_connections: u32,
    /// How long a statement waits on a locked database before failing.
    /// Kept below `operation_timeout` so lock waits end inside the deadline.
    pub busy_timeout: Duration,
    /// How long to wait for a free pooled connection.
    pub acquire_timeout: Duration,
    /// Default deadline for a single store operation.
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_secs(2),
            acquire_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(3),
        }
    }
}

impl StoreConfig {
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Set the operation deadline, shrinking the busy timeout under it if needed.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self.busy_timeout = self.busy_timeout.min(timeout * 2 / 3);
        self
    }
}
