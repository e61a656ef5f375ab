//! Configuration loading and management.
//!
//! All configuration is loaded once at startup and passed explicitly to the
//! components that need it; nothing reads the environment per request.

pub mod error;
pub mod loader;
pub mod models;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use models::GlobalConfig;
