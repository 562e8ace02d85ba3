// The infra module contains implementations of core traits.
// Each storage backend goes in its own submodule.

#[path = "store/mod.rs"]
pub mod store;
