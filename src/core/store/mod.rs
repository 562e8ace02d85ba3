// Durable state: the document store port plus the per-key exclusive sections
// every engine takes before a read-modify-write.

pub mod keyed_locks;
pub mod state_store;

pub use keyed_locks::KeyedLocks;
pub use state_store::*;
