//! In-memory storage.
//!
//! [`MemoryStore`] is a [`DataSource`](crate::executor::DataSource) that keeps
//! tables in process and evaluates the logical plan of each statement with SQL
//! semantics. It backs the test suite and any embedding that does not need a
//! database server.

mod eval;
mod memory;

pub use memory::MemoryStore;
