//! Image name resolution against search roots.

use std::path::{Path, PathBuf};

use crate::error::{Result, TextureError};

/// Resolves image names against a list of search roots.
#[derive(Debug, Clone, Default)]
pub struct AssetResolver {
    search_paths: Vec<PathBuf>,
}

impl AssetResolver {
    /// Resolver searching `search_paths` in order.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// The configured roots.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// First existing candidate: the name itself, then each root joined
    /// with the name.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        if direct.is_relative() {
            for root in &self.search_paths {
                let candidate = root.join(direct);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(TextureError::PathNotFound(direct.to_path_buf()))
    }

    /// Cache key for a resolved path.
    pub fn key_for(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}
