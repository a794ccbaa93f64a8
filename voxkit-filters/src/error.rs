//! Error types for the bundled filters

use std::path::PathBuf;

use thiserror::Error;

/// Error type for filter I/O helpers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] voxkit_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file could not be opened
    #[error("Could not open {}: {source}", path.display())]
    Open {
        /// File that failed to open
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

impl Error {
    /// Check if this is a premature end-of-file
    pub fn is_premature_eof(&self) -> bool {
        matches!(self, Error::Core(voxkit_core::Error::PrematureEof { .. }))
    }
}

/// Result type for filter I/O helpers
pub type Result<T> = std::result::Result<T, Error>;
