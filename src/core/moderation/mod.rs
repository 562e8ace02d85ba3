// Core moderation module - content filter and the escalation engine.

pub mod content_filter;
pub mod duration;
pub mod moderation_models;
pub mod moderation_service;

pub use content_filter::ContentFilter;
pub use moderation_models::*;
pub use moderation_service::*;
