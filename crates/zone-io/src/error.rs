//! Error types for the binary sparse-array layout.

use thiserror::Error;
use zone_core::SparseError;

/// Errors raised while writing or reading the binary layout.
#[derive(Debug, Error)]
pub enum ZoneIoError {
    /// Underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file was written by an incompatible layout version.
    #[error("unsupported layout version {found} (expected {expected})")]
    UnsupportedVersion { found: i32, expected: i32 },

    /// Header or index table fields are inconsistent.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A decomposed cell did not have `types_per_cell` values.
    #[error("cell for key {key} has {actual} values but {expected} were expected")]
    CellWidth {
        key: i32,
        expected: usize,
        actual: usize,
    },

    /// The input ended inside a fixed-size section.
    #[error("input ended inside the {section}")]
    Truncated { section: &'static str },

    /// The payload length is not a whole number of cells.
    #[error("payload of {bytes} bytes is not a whole number of {cell_bytes}-byte cells")]
    PartialCell { bytes: usize, cell_bytes: usize },

    /// The payload does not end at the highest populated cell.
    #[error("payload holds {cells} cells but the header expects {expected}")]
    CellCount { cells: usize, expected: usize },

    /// The decoded index or data did not form a valid container.
    #[error(transparent)]
    Sparse(#[from] SparseError),
}

/// Convenience type alias for Results using ZoneIoError.
pub type ZoneIoResult<T> = Result<T, ZoneIoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_message_names_both_versions() {
        let err = ZoneIoError::UnsupportedVersion {
            found: 1,
            expected: 2,
        };
        assert_eq!(err.to_string(), "unsupported layout version 1 (expected 2)");
    }

    #[test]
    fn sparse_errors_pass_through() {
        let err: ZoneIoError = SparseError::InvalidStructure("overlap".into()).into();
        assert_eq!(err.to_string(), "invalid index structure: overlap");
    }
}
