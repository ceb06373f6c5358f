//! Configuration for texcache hosts.
//!
//! Loads [`TextureCacheConfig`] from the environment, a config file or
//! defaults, and installs the `tracing` subscriber used by the
//! `texcache-inspect` binary.

/// Subscriber setup for the bundled tools.
pub mod logging;
/// Serializable configuration types.
pub mod models;

pub use logging::init_tracing;
pub use models::cache::{CONFIG_JSON_ENV, CONFIG_PATH_ENV};
pub use models::{ConfigSource, TextureCacheConfig};
