//! nexus market pipeline application.
//!
//! Wires the components together in dependency order:
//! - Event bus
//! - Market store (attached to the bus)
//! - Feed connections (publishing onto the bus)
//! - Archon (reading the store)

pub mod app;
pub mod config;
pub mod demo;
pub mod error;

pub use app::{Application, ERROR_REPLY};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
