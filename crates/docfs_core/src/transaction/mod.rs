//! Transactions and the persistence queue.
//!
//! Mutations are serialized through [`PersistenceQueue`]. A [`Transaction`]
//! buffers [`PendingWrite`]s against a private copy of the cache; committing
//! applies them to disk in order under one queue admission and then swaps
//! the shared cache to the working copy.
//!
//! State machine: `Active → Committing → Committed | RolledBack`.

mod queue;
mod state;

pub use queue::{Admission, PersistenceQueue};
pub use state::{PendingWrite, Transaction, TransactionState};
