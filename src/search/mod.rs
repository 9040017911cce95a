//! Cursor construction and evaluation over a [`Partition`](crate::core::partition::Partition).
//!
//! Leaf filters become index-backed cursors when an index exists and filtered
//! full scans otherwise. Composite filters wrap their children: AND drives
//! with the cheapest child, OR chains its children, NOT scans everything.

pub mod and;
pub mod engine;
pub mod evaluator;
pub mod filtered;
pub mod key;
pub mod not;
pub mod or;
pub mod ordering;
pub mod results;
pub mod scope;
pub mod substring;

use crate::core::types::Value;
use crate::cursor::Cursor;

/// Key carried by search cursors: the matched value for value-ordered leaf
/// cursors, `None` for id-ordered ones.
pub type SearchKey = Option<Value>;

pub type SearchCursor<'a> = Box<dyn Cursor<Key = SearchKey> + 'a>;

pub use and::AndCursor;
pub use engine::SearchEngine;
pub use evaluator::Evaluator;
pub use filtered::FilteredCursor;
pub use key::KeyCursor;
pub use not::NotCursor;
pub use or::OrCursor;
pub use ordering::{Backing, RangeCursor, Side};
pub use results::SearchResults;
pub use scope::ScopeCursor;
pub use substring::SubstringCursor;
