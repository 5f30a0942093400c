use std::time::Duration;

/// Settings consumed while assembling and running a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Soft error count that aborts execution once exceeded.
    pub max_errors: Option<u64>,
    pub verbose_explain: bool,
}

/// Settings for the result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    /// Upper bound on rows per entry.
    pub max_rows: Option<usize>,
}
