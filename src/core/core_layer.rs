// The core module contains all business logic.
// Each engine gets its own submodule; none of them import serenity or poise.

#[path = "store/mod.rs"]
pub mod store;

#[path = "audit.rs"]
pub mod audit;

#[path = "platform.rs"]
pub mod platform;

#[path = "config/mod.rs"]
pub mod config;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "leveling/leveling_service.rs"]
pub mod leveling;

#[path = "panels/mod.rs"]
pub mod panels;

#[path = "dispatcher.rs"]
pub mod dispatcher;

#[cfg(test)]
#[path = "testing.rs"]
pub mod testing;
