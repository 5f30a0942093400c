use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use sluice_error::Result;

use super::key::CacheKey;
use super::storage::{CacheEntryHandle, CacheLookup, CacheStorage, CachedRow};
use crate::config::execution::CacheConfig;
use crate::explain::{ExplainConfig, ExplainEntry};
use crate::io::{
    KeyColumn,
    KeyCondition,
    QueryContext,
    RowsInput,
    set_condition,
    unset_condition,
};
use crate::relational::Column;
use crate::scalar::ScalarValue;
use crate::scalar::ops::BinaryOperator;
use crate::statistics::ErrorCode;

/// Read counters for a cached input.
#[derive(Debug, Default)]
pub struct CacheReadCounters {
    cache_reads: AtomicU64,
    inner_reads: AtomicU64,
}

impl CacheReadCounters {
    /// Rows served from a cache entry.
    pub fn cache_reads(&self) -> u64 {
        self.cache_reads.load(Ordering::Relaxed)
    }

    /// Rows read from the wrapped input.
    pub fn inner_reads(&self) -> u64 {
        self.inner_reads.load(Ordering::Relaxed)
    }
}

/// Input that memoizes the rows of another input.
///
/// The entry is looked up on open and on every reset using the current
/// key conditions and query context. Rows missing from the entry are read
/// from the wrapped input and appended as they're produced.
#[derive(Debug)]
pub struct CacheRowsInput {
    inner: Box<dyn RowsInput>,
    storage: Arc<CacheStorage>,
    config: CacheConfig,
    conditions: Vec<KeyCondition>,
    context: QueryContext,
    handle: Option<CacheEntryHandle>,
    lookup: CacheLookup,
    /// Index of the next entry row.
    position: usize,
    /// Rows returned since the last reset.
    returned: u64,
    current: Option<CachedRow>,
    inner_opened: bool,
    inner_needs_reset: bool,
    /// Rows consumed from the wrapped input since it was last rewound.
    inner_pos: usize,
    counters: Arc<CacheReadCounters>,
}

impl CacheRowsInput {
    pub fn new(inner: Box<dyn RowsInput>, storage: Arc<CacheStorage>, config: CacheConfig) -> Self {
        CacheRowsInput {
            inner,
            storage,
            config,
            conditions: Vec::new(),
            context: QueryContext::default(),
            handle: None,
            lookup: CacheLookup::Created,
            position: 0,
            returned: 0,
            current: None,
            inner_opened: false,
            inner_needs_reset: false,
            inner_pos: 0,
            counters: Arc::default(),
        }
    }

    pub fn counters(&self) -> Arc<CacheReadCounters> {
        self.counters.clone()
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.inner.as_ref(), &self.context, &self.conditions)
    }

    fn acquire(&mut self) {
        let (handle, lookup) = self.storage.acquire(self.key(), &self.config);
        // Acquire before releasing so a partially read entry for the same
        // key survives the eviction pass.
        self.handle = Some(handle);
        self.lookup = lookup;
        self.position = 0;
        self.returned = 0;
        self.current = None;
    }

    fn prepare_inner(&mut self) -> Result<()> {
        if !self.inner_opened {
            self.inner.open()?;
            self.inner_opened = true;
            self.inner_needs_reset = false;
            self.inner_pos = 0;
        } else if self.inner_needs_reset {
            self.inner.reset()?;
            self.inner_needs_reset = false;
            self.inner_pos = 0;
        }
        Ok(())
    }

    fn matches_conditions(&self, row: &[ScalarValue]) -> bool {
        self.conditions
            .iter()
            .all(|cond| row.get(cond.column_index).is_some_and(|v| cond.matches(v)))
    }

    /// Read every column of the inner input's current row. Soft errors are
    /// kept with the row so replays report them too.
    fn read_inner_row(&self) -> CachedRow {
        let mut errors = Vec::new();
        let values: Vec<_> = (0..self.inner.columns().len())
            .map(|idx| match self.inner.read_value(idx) {
                Ok(v) => v,
                Err(code) => {
                    errors.push((idx, code));
                    ScalarValue::Null
                }
            })
            .collect();
        CachedRow::new(values, errors)
    }
}

impl RowsInput for CacheRowsInput {
    fn columns(&self) -> &Arc<[Column]> {
        self.inner.columns()
    }

    fn open(&mut self) -> Result<()> {
        self.acquire();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.handle = None;
        self.current = None;
        if self.inner_opened {
            self.inner_opened = false;
            self.inner.close()?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.acquire();
        if self.inner_opened {
            self.inner_needs_reset = true;
        }
        Ok(())
    }

    fn poll_read_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        if self.handle.is_none() {
            self.acquire();
        }
        let max_rows = self.context.max_rows();

        loop {
            let Some(handle) = self.handle.as_ref() else {
                return Poll::Ready(Ok(false));
            };
            let entry = handle.entry();

            if max_rows.is_some_and(|max| self.returned >= max) {
                self.current = None;
                return Poll::Ready(Ok(false));
            }

            if let Some(row) = entry.row(self.position) {
                self.position += 1;
                if self.lookup == CacheLookup::Subsumed && !self.matches_conditions(row.values()) {
                    continue;
                }
                self.current = Some(row);
                self.returned += 1;
                self.counters.cache_reads.fetch_add(1, Ordering::Relaxed);
                return Poll::Ready(Ok(true));
            }

            if entry.is_complete() {
                self.current = None;
                return Poll::Ready(Ok(false));
            }

            self.prepare_inner()?;

            // Another reader sharing the entry may have appended rows this
            // reader served from the cache. Skip past them in the inner
            // input.
            while self.inner_pos < self.position {
                if !ready!(self.inner.poll_read_next(cx))? {
                    self.current = None;
                    return Poll::Ready(Ok(false));
                }
                self.inner_pos += 1;
            }

            let has_row = ready!(self.inner.poll_read_next(cx))?;
            let read = has_row.then(|| self.read_inner_row());
            let Some(handle) = self.handle.as_ref() else {
                return Poll::Ready(Ok(false));
            };
            let entry = handle.entry();

            let Some(row) = read else {
                entry.mark_complete();
                self.current = None;
                return Poll::Ready(Ok(false));
            };

            entry.append(self.position, row.clone());
            self.inner_pos += 1;
            self.position += 1;
            self.returned += 1;
            if max_rows.is_some_and(|max| self.returned >= max) {
                entry.mark_complete();
            }

            self.current = Some(row);
            self.counters.inner_reads.fetch_add(1, Ordering::Relaxed);
            return Poll::Ready(Ok(true));
        }
    }

    fn read_value(&self, column_idx: usize) -> Result<ScalarValue, ErrorCode> {
        self.current
            .as_ref()
            .ok_or(ErrorCode::InvalidArgument)?
            .read_value(column_idx)
    }

    fn source_name(&self) -> &str {
        self.inner.source_name()
    }

    fn arguments(&self) -> Vec<String> {
        self.inner.arguments()
    }

    fn key_columns(&self) -> &[KeyColumn] {
        self.inner.key_columns()
    }

    fn set_key_column_value(&mut self, condition: KeyCondition) -> Result<()> {
        self.inner.set_key_column_value(condition.clone())?;
        set_condition(&mut self.conditions, condition);
        Ok(())
    }

    fn unset_key_column_value(
        &mut self,
        column_index: usize,
        operator: BinaryOperator,
    ) -> Result<()> {
        self.inner.unset_key_column_value(column_index, operator)?;
        unset_condition(&mut self.conditions, column_index, operator);
        Ok(())
    }

    fn set_query_context(&mut self, context: QueryContext) {
        self.inner.set_query_context(context.clone());
        self.context = context;
    }

    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Cache")
            .with_value("key", self.key())
            .with_value("input", self.inner.explain_entry(conf))
            .with_verbose_value(conf, "cache_reads", self.counters.cache_reads())
            .with_verbose_value(conf, "inner_reads", self.counters.inner_reads())
            .with_verbose_value(conf, "entries", self.storage.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures::executor::block_on;
    use futures::future::poll_fn;

    use super::*;
    use crate::io::memory::MemoryRowsInput;
    use crate::relational::schema;
    use crate::scalar::DataType;
    use crate::scalar::ops::BinaryOperator;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl: Duration::from_secs(60),
            max_rows: None,
        }
    }

    fn memory_input() -> MemoryRowsInput {
        let rows: Vec<Vec<ScalarValue>> = (1..=5)
            .map(|i| vec![i.into(), format!("r{i}").into()])
            .collect();
        MemoryRowsInput::new(
            "events",
            schema([("id", DataType::Integer), ("name", DataType::String)]),
            rows,
        )
        .with_arguments(["events.log"])
        .with_key_column(KeyColumn::new(0, [BinaryOperator::Equal]))
    }

    fn cached(storage: &Arc<CacheStorage>) -> (CacheRowsInput, Arc<AtomicUsize>) {
        let inner = memory_input();
        let reads = inner.read_counter();
        (
            CacheRowsInput::new(Box::new(inner), storage.clone(), config()),
            reads,
        )
    }

    fn read_all(input: &mut CacheRowsInput) -> Vec<Vec<ScalarValue>> {
        let mut rows = Vec::new();
        while block_on(poll_fn(|cx| input.poll_read_next(cx))).unwrap() {
            rows.push((0..2).map(|idx| input.read_value(idx).unwrap()).collect());
        }
        rows
    }

    #[test]
    fn reset_reuses_entry() {
        let storage = Arc::new(CacheStorage::new());
        let (mut input, reads) = cached(&storage);

        input.open().unwrap();
        let first = read_all(&mut input);
        assert_eq!(5, first.len());
        assert_eq!(5, reads.load(Ordering::Relaxed));

        input.reset().unwrap();
        let second = read_all(&mut input);
        assert_eq!(first, second);
        assert_eq!(5, reads.load(Ordering::Relaxed));
        assert_eq!(5, input.counters().cache_reads());
        assert_eq!(5, input.counters().inner_reads());
        assert_eq!(1, storage.len());
    }

    #[test]
    fn limited_read_completes_entry() {
        let storage = Arc::new(CacheStorage::new());
        let (mut input, reads) = cached(&storage);
        input.set_query_context(QueryContext {
            columns: Vec::new(),
            offset: 1,
            limit: Some(1),
        });

        input.open().unwrap();
        assert_eq!(2, read_all(&mut input).len());
        input.reset().unwrap();
        assert_eq!(2, read_all(&mut input).len());
        assert_eq!(2, reads.load(Ordering::Relaxed));
    }

    #[test]
    fn key_condition_served_from_full_entry() {
        let storage = Arc::new(CacheStorage::new());
        let (mut full, _) = cached(&storage);
        full.open().unwrap();
        read_all(&mut full);
        full.close().unwrap();

        let (mut filtered, reads) = cached(&storage);
        filtered
            .set_key_column_value(KeyCondition {
                column_index: 0,
                operator: BinaryOperator::Equal,
                value: 3.into(),
            })
            .unwrap();
        filtered.open().unwrap();

        let rows = read_all(&mut filtered);
        assert_eq!(vec![vec![ScalarValue::Integer(3), "r3".into()]], rows);
        assert_eq!(0, reads.load(Ordering::Relaxed));
    }

    #[test]
    fn rebound_key_reads_new_entry() {
        let storage = Arc::new(CacheStorage::new());
        let (mut input, _) = cached(&storage);
        let cond = |value: i64| KeyCondition {
            column_index: 0,
            operator: BinaryOperator::Equal,
            value: value.into(),
        };

        input.set_key_column_value(cond(1)).unwrap();
        input.open().unwrap();
        assert_eq!(vec![vec![ScalarValue::Integer(1), "r1".into()]], read_all(&mut input));

        input.set_key_column_value(cond(2)).unwrap();
        input.reset().unwrap();
        assert_eq!(vec![vec![ScalarValue::Integer(2), "r2".into()]], read_all(&mut input));
        let key = input.key();
        assert_eq!(1, key.conditions.len());
        assert_eq!(ScalarValue::Integer(2), key.conditions[0].value);

        input.unset_key_column_value(0, BinaryOperator::Equal).unwrap();
        input.reset().unwrap();
        assert_eq!(5, read_all(&mut input).len());
    }

    #[test]
    fn replay_reports_read_errors() {
        let storage = Arc::new(CacheStorage::new());
        let inner = memory_input().with_read_error(1, 1, ErrorCode::CannotCast);
        let reads = inner.read_counter();
        let mut input = CacheRowsInput::new(Box::new(inner), storage, config());

        let read_errors = |input: &mut CacheRowsInput| {
            let mut errors = Vec::new();
            while block_on(poll_fn(|cx| input.poll_read_next(cx))).unwrap() {
                for idx in 0..2 {
                    if let Err(code) = input.read_value(idx) {
                        errors.push((input.read_value(0).unwrap(), idx, code));
                    }
                }
            }
            errors
        };

        input.open().unwrap();
        let live = read_errors(&mut input);
        input.reset().unwrap();
        let replayed = read_errors(&mut input);

        assert_eq!(vec![(ScalarValue::Integer(2), 1, ErrorCode::CannotCast)], live);
        assert_eq!(live, replayed);
        assert_eq!(5, reads.load(Ordering::Relaxed));
        assert_eq!(5, input.counters().cache_reads());
    }

    #[test]
    fn readers_share_incomplete_entry() {
        let storage = Arc::new(CacheStorage::new());
        let (mut a, a_reads) = cached(&storage);
        let (mut b, b_reads) = cached(&storage);
        a.open().unwrap();
        b.open().unwrap();

        // A reads two rows, B then serves those from the entry and reads the
        // rest itself.
        for _ in 0..2 {
            assert!(block_on(poll_fn(|cx| a.poll_read_next(cx))).unwrap());
        }
        let rows = read_all(&mut b);
        assert_eq!(5, rows.len());
        assert_eq!(2, b.counters().cache_reads());
        assert_eq!(3, b.counters().inner_reads());

        // A continues from the entry B filled.
        let rest = read_all(&mut a);
        assert_eq!(rows[2..].to_vec(), rest);
        assert_eq!(2, a_reads.load(Ordering::Relaxed));
        assert_eq!(5, b_reads.load(Ordering::Relaxed));
    }

    #[test]
    fn bounded_entry_falls_through() {
        let storage = Arc::new(CacheStorage::new());
        let inner = memory_input();
        let reads = inner.read_counter();
        let conf = CacheConfig {
            max_rows: Some(2),
            ..config()
        };
        let mut input = CacheRowsInput::new(Box::new(inner), storage.clone(), conf);

        input.open().unwrap();
        assert_eq!(5, read_all(&mut input).len());
        input.reset().unwrap();
        assert_eq!(5, read_all(&mut input).len());

        // The truncated entry is never complete, so the second pass reads
        // the inner input again.
        assert_eq!(10, reads.load(Ordering::Relaxed));
    }
}
