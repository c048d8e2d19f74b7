//! Error types for the terrain.

use std::path::PathBuf;

use thiserror::Error;

use crate::coords::TileCoord;

/// Top-level error type for terrain operations.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// Simulation backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Tile persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Tile buffer errors
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Cell encoding errors
    #[error("Cell error: {0}")]
    Cell(#[from] CellError),

    /// Tile is not loaded
    #[error("Tile {0} is not loaded")]
    TileNotLoaded(TileCoord),
}

/// Cell field encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// A field value does not fit its bit width
    #[error("{field} value {value} exceeds {bits}-bit field")]
    FieldOverflow {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u32,
        /// Declared width in bits
        bits: u32,
    },
}

/// Tile buffer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Raw data has the wrong length
    #[error("Data length is {actual}, expecting {expected}")]
    LengthMismatch {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Image has the wrong dimensions
    #[error("Image is {width}x{height}, expecting {expected_width}x{expected_height}")]
    WrongDimensions {
        /// Expected width
        expected_width: u32,
        /// Expected height
        expected_height: u32,
        /// Actual width
        width: u32,
        /// Actual height
        height: u32,
    },
}

/// Simulation backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Failed to initialize the backend
    #[error("Backend initialization failed: {0}")]
    InitFailed(String),

    /// Kernel execution failed
    #[error("Kernel execution failed: {0}")]
    KernelFailed(String),

    /// GPU to CPU readback failed
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),

    /// A pass ticket does not belong to the last flush
    #[error("Unknown pass ticket {0}")]
    UnknownTicket(usize),
}

/// Tile persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Save attempted on a read-only terrain
    #[error("Trying to save tile {0}, but terrain is set as read-only")]
    ReadOnly(TileCoord),

    /// Directory creation or file write failed
    #[error("I/O error at \"{path}\": {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Image encoding failed
    #[error("Failed to encode tile image at \"{path}\": {message}")]
    Encode {
        /// Offending path
        path: PathBuf,
        /// Encoder message
        message: String,
    },
}

/// Result type alias for terrain operations.
pub type TerrainResult<T> = Result<T, TerrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_tile() {
        let err = PersistenceError::ReadOnly(TileCoord::new(2, -3));
        assert_eq!(
            err.to_string(),
            "Trying to save tile [2, -3], but terrain is set as read-only"
        );

        let err: TerrainError = BufferError::LengthMismatch {
            expected: 4,
            actual: 3,
        }
        .into();
        assert_eq!(err.to_string(), "Buffer error: Data length is 3, expecting 4");
    }
}
