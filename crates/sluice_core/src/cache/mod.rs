//! Memoization of rows read from inputs.
//!
//! Entries live in a `CacheStorage` shared by an execution session and are
//! keyed by what a read asks of its input. A complete entry can also serve a
//! narrower read when its key subsumes the requested one.

pub mod input;
pub mod key;
pub mod storage;

pub use self::input::{CacheReadCounters, CacheRowsInput};
pub use self::key::{CacheKey, CacheKeyCondition};
pub use self::storage::{CacheEntry, CacheEntryHandle, CacheLookup, CacheStorage};
