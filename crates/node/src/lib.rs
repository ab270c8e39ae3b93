//! Saga service node: configuration and per-role startup.

pub mod app;
pub mod config;
pub mod error;

pub use app::start;
pub use config::{Config, ConfigError, DatabaseConfig, Role};
pub use error::{NodeError, Result};
