//! Query evaluation over in-memory documents.
//!
//! - [`Filter`]: MongoDB-style predicate tree
//! - [`Projection`]: include/exclude field lists
//! - [`Update`]: `$set` / `$unset` modifications
//! - [`Cursor`]: sort, skip and limit over matched documents

mod cursor;
mod filter;
mod projection;
mod update;

pub use cursor::{Cursor, Direction, Sort};
pub use filter::{values_equal, Condition, Filter, Pattern};
pub use projection::Projection;
pub use update::{Modifier, Update};
