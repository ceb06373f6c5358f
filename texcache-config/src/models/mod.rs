/// `TextureCacheConfig` and its loaders.
pub mod cache;

pub use cache::{ConfigSource, TextureCacheConfig};
