//! Error types for qmtile-codec.

use qmtile_mesh::MeshError;
use thiserror::Error;

/// Errors that can occur while encoding or decoding terrain tiles.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Decode error at a specific byte offset.
    #[error("Decode error at offset {offset}: {message}")]
    Decode {
        /// Byte offset where the error occurred.
        offset: usize,
        /// Description of the error.
        message: String,
    },

    /// Tile contents are inconsistent.
    #[error("Invalid tile: {0}")]
    InvalidTile(String),

    /// Decoded geometry does not form a valid mesh.
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),
}

impl CodecError {
    /// Create a decode error at a specific offset.
    pub fn decode_at(offset: usize, message: impl Into<String>) -> Self {
        CodecError::Decode {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid tile error.
    pub fn invalid_tile(message: impl Into<String>) -> Self {
        CodecError::InvalidTile(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::decode_at(92, "truncated vertex data");
        assert!(err.to_string().contains("offset 92"));

        let err = CodecError::invalid_tile("u and v lengths differ");
        assert!(err.to_string().contains("u and v"));
    }
}
