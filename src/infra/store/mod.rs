// Implementations of the core StateStore port.

pub mod in_memory;
pub mod json_store;

#[allow(unused_imports)]
pub use in_memory::InMemoryStateStore;
pub use json_store::JsonStateStore;
