//! chained-hashmap: a single-threaded hash table from `i64` keys to scalar
//! [`Value`]s, with separate chaining and a plain-text snapshot format.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a small, predictable table whose layout can be reasoned about
//!   bucket by bucket and written to disk in that same order.
//! - Layers:
//!   - `HashTable`: bucket heads plus an arena (`SlotMap`) of entry nodes;
//!     each node links to the next node of its chain by arena key.
//!   - `snapshot`: text writer/reader built only on the public table API
//!     (`iter` to write, `insert` to read).
//!
//! Constraints
//! - Single-threaded; every mutation takes `&mut self`.
//! - Bucket index is `key mod capacity` (Euclidean, so negative keys work).
//! - Inserts append to the tail of the chain. Keys are not deduplicated:
//!   a repeated key adds another entry and lookups see the oldest.
//! - After each insert the table doubles while `len / capacity >= 0.7`.
//!   It never shrinks.
//!
//! Why an arena?
//! - Resizing moves arena keys between bucket lists; nodes and their text
//!   payloads are never copied or reallocated.
//! - Dropping the table drops the arena in one flat pass, so long chains do
//!   not recurse.
//!
//! Snapshot failures
//! - I/O errors and unreadable headers are returned as [`Error`].
//! - A malformed record ends the read; records before it stay inserted and
//!   [`LoadReport`] says where reading stopped.
//! - Text containing a line break cannot be written and is rejected before
//!   any output is produced.

mod error;
mod hash_table;
mod hash_table_proptest;
mod snapshot;
mod value;

// Public surface
pub use error::{DeserializeError, Error, RecordError, Result, SerializeError};
pub use hash_table::{Chain, HashTable, Iter, DEFAULT_CAPACITY};
pub use snapshot::{LoadReport, MalformedRecord};
pub use value::Value;
