//! Error types for the voxkit data model and filter contract

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::scalar::ScalarKind;

/// Result type for voxkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for voxkit operations
#[derive(Error, Debug)]
pub enum Error {
    /// A buffer could not be sized or reserved
    #[error("Memory allocation failed: requested {requested_bytes} bytes")]
    AllocationFailed {
        /// Requested size in bytes (saturated on overflow)
        requested_bytes: usize,
    },

    /// An array name is already in use inside its group
    #[error("Duplicate name '{name}' in {scope}")]
    DuplicateName {
        /// Where the collision happened (group name)
        scope: String,
        /// The colliding name
        name: String,
    },

    /// A container or group name is already in use at its level
    #[error("Name collision: {kind} '{name}' already exists")]
    NameCollision {
        /// "data container" or "attribute group"
        kind: &'static str,
        /// The colliding name
        name: String,
    },

    /// A referenced group or array does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// What was looked up
        kind: &'static str,
        /// The name that was looked up
        name: String,
    },

    /// A referenced data container does not exist
    #[error("Data container '{0}' is missing")]
    MissingContainer(String),

    /// Tuple count or dimensionality incompatibility
    #[error("Shape mismatch for '{name}': expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Array or group being checked
        name: String,
        /// Expected tuple or component count
        expected: usize,
        /// Actual tuple or component count
        actual: usize,
    },

    /// Scalar kind mismatch
    #[error("Type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Array being accessed
        name: String,
        /// Requested kind
        expected: ScalarKind,
        /// Stored kind
        actual: ScalarKind,
    },

    /// The container has no geometry, or the wrong one
    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// Missing or invalid filter input
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Input file does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file holds fewer bytes than the read requires
    #[error("File holds {available} bytes but {required} are required")]
    ReadUnderflow {
        /// Bytes available after the header
        available: u64,
        /// Bytes required to fill the array
        required: u64,
    },

    /// The file ended before the expected byte count was read
    #[error("Premature end of file after {read} of {required} bytes")]
    PrematureEof {
        /// Bytes read before end of file
        read: u64,
        /// Bytes expected
        required: u64,
    },

    /// Illegal filter state transition
    #[error("Invalid filter state transition from {from} on {event}")]
    InvalidTransition {
        /// State before the event
        from: &'static str,
        /// Event that was applied
        event: &'static str,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::NotFound`]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for [`Error::Parameter`]
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter(message.into())
    }
}
