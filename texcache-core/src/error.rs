//! Error type shared by every cache operation.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures surfaced by the texture cache.
///
/// The type is `Clone` because a single failed decode can be delivered to
/// every subscriber that was waiting on the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    /// No candidate path exists.
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The decoder rejected the file.
    #[error("Failed to decode {}: {}", .path.display(), .reason)]
    Decode {
        /// File being decoded; empty when the decoder only saw bytes.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// No decoder handles the file's format.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Reading the file failed for a reason other than absence.
    #[error("IO error reading {}: {}", .path.display(), .message)]
    Io {
        /// File being read.
        path: PathBuf,
        /// Kind of the underlying I/O error.
        kind: io::ErrorKind,
        /// Message of the underlying I/O error.
        message: String,
    },

    /// The backend refused the upload.
    #[error("GPU upload failed: {0}")]
    Upload(String),

    /// Pixel data does not match its declared size.
    #[error("Invalid texture data: {0}")]
    InvalidData(String),

    /// The text renderer failed.
    #[error("Text rendering failed: {0}")]
    TextRender(String),

    /// The loader thread panicked while decoding.
    #[error("Loader thread failed: {0}")]
    Worker(String),

    /// The async pipeline no longer accepts work.
    #[error("Texture loader has shut down")]
    ShutDown,
}

impl TextureError {
    /// Classify an I/O failure for `path`, folding "not found" into
    /// [`TextureError::PathNotFound`].
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => TextureError::PathNotFound(path),
            kind => TextureError::Io {
                path,
                kind,
                message: err.to_string(),
            },
        }
    }

    pub(crate) fn decode(
        path: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        TextureError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attach the originating path to a decode error raised by a decoder
    /// that only saw bytes.
    pub(crate) fn with_path(self, path: &std::path::Path) -> Self {
        match self {
            TextureError::Decode { path: p, reason }
                if p.as_os_str().is_empty() =>
            {
                TextureError::Decode {
                    path: path.to_path_buf(),
                    reason,
                }
            }
            other => other,
        }
    }
}

/// Result alias for cache operations.
pub type Result<T> = std::result::Result<T, TextureError>;
