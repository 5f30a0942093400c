use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sluice_error::Result;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{CacheRowsInput, CacheStorage};
use crate::config::session::SessionConfig;
use crate::functions::FunctionRegistry;
use crate::io::RowsInput;
use crate::iterator::RowsInputIterator;
use crate::planner::PipelineBuilder;
use crate::scalar::ScalarValue;
use crate::statistics::ExecutionStatistics;

/// Flag shared between a session and the leaf iterators it created.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// State shared by every pipeline built in one session.
#[derive(Debug)]
pub struct ExecutionSession {
    id: Uuid,
    config: SessionConfig,
    registry: Arc<FunctionRegistry>,
    stats: Arc<ExecutionStatistics>,
    cache: Arc<CacheStorage>,
    cancel: CancellationToken,
}

impl Default for ExecutionSession {
    fn default() -> Self {
        Self::new(Arc::new(FunctionRegistry::with_builtins()))
    }
}

impl ExecutionSession {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self::with_config(registry, SessionConfig::default())
    }

    pub fn with_config(registry: Arc<FunctionRegistry>, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        debug!(%id, "created execution session");
        ExecutionSession {
            id,
            config,
            registry,
            stats: Arc::new(ExecutionStatistics::new()),
            cache: Arc::new(CacheStorage::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_setting(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        self.config.set_from_scalar(name, value)
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn statistics(&self) -> &Arc<ExecutionStatistics> {
        &self.stats
    }

    pub fn cache(&self) -> &Arc<CacheStorage> {
        &self.cache
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every pipeline created by this session. Takes effect at the
    /// next leaf read.
    pub fn cancel(&self) {
        debug!(id = %self.id, "cancelling session");
        self.cancel.cancel();
    }

    /// Wrap an input in the result cache if caching is enabled.
    pub fn wrap_input(&self, input: Box<dyn RowsInput>) -> Box<dyn RowsInput> {
        let conf = self.config.cache_config();
        if conf.enabled {
            Box::new(CacheRowsInput::new(input, self.cache.clone(), conf))
        } else {
            input
        }
    }

    /// Create the leaf iterator for an input.
    pub fn input_iterator(&self, input: Box<dyn RowsInput>) -> RowsInputIterator {
        RowsInputIterator::new(
            self.wrap_input(input),
            self.stats.clone(),
            self.cancel.clone(),
        )
    }

    /// Start a pipeline reading from an input.
    pub fn pipeline(&self, input: Box<dyn RowsInput>) -> PipelineBuilder<'_> {
        PipelineBuilder::new(self, Box::new(self.input_iterator(input)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryRowsInput;
    use crate::iterator::collect_rows_blocking;
    use crate::relational::schema;
    use crate::scalar::DataType;

    #[test]
    fn cancel_is_shared() {
        let session = ExecutionSession::default();
        let token = session.cancellation_token().clone();
        assert!(!token.is_cancelled());
        session.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cache_follows_setting() {
        let mut session = ExecutionSession::default();
        let input = || {
            Box::new(MemoryRowsInput::new(
                "t",
                schema([("a", DataType::Integer)]),
                vec![vec![1.into()]],
            ))
        };

        let mut iter = session.input_iterator(input());
        assert_eq!(1, collect_rows_blocking(&mut iter).unwrap().len());
        assert_eq!(1, session.cache().len());

        session.set_setting("cache_enabled", false.into()).unwrap();
        let mut iter = session.input_iterator(input());
        assert_eq!(1, collect_rows_blocking(&mut iter).unwrap().len());
        assert_eq!(1, session.cache().misses());
    }
}
