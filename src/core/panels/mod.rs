// Role panels - persisted trigger -> role mappings and their reconciliation.

pub mod panel_models;
pub mod panel_service;

pub use panel_models::*;
pub use panel_service::*;
