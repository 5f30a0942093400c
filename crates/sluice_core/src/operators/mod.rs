//! Relational operators.
//!
//! Each operator wraps one or two child iterators. Group, order and window
//! are barriers that drain their child before returning the first row.

pub mod combine;
pub mod distinct;
pub mod filter;
pub mod group;
pub mod join;
pub mod limit;
pub mod order;
pub mod project;
pub mod sort_index;
pub mod statistic;
pub mod window;

pub use self::combine::{CombineRowsIterator, CombineType};
pub use self::distinct::DistinctRowsIterator;
pub use self::filter::FilterRowsIterator;
pub use self::group::{AggregateTarget, GroupRowsIterator};
pub use self::join::{JoinType, NestedLoopJoinRowsIterator, join_columns};
pub use self::limit::{LimitRowsIterator, OffsetRowsIterator};
pub use self::order::OrderRowsIterator;
pub use self::project::{ProjectItem, ProjectRowsIterator};
pub use self::sort_index::{NullOrder, OrderKey, SortDirection, SortIndex, SortSpec};
pub use self::statistic::StatisticRowsIterator;
pub use self::window::{WindowRowsIterator, WindowSpec};
