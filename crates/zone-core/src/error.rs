//! Error types for sparse index construction and access.
//!
//! Structural problems are reported when a container is built and are never
//! recoverable locally. Reads that miss the index are not errors at all (they
//! yield `T::default()`); writes that miss are [`SparseError::IndexOutOfRange`].
//!
//! # Example
//!
//! ```
//! use zone_core::{SparseArray, SparseError};
//!
//! let err = SparseArray::create_sparse_array(&[1, 1], vec![0.0f32, 1.0]).unwrap_err();
//! assert!(matches!(err, SparseError::DuplicateKey { .. }));
//! ```

use std::fmt;
use thiserror::Error;

/// A sparse address in one, two or three dimensions, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKey {
    One(i32),
    Two(i32, i32),
    Three(i32, i32, i32),
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeKey::One(o) => write!(f, "{o}"),
            CompositeKey::Two(o, d) => write!(f, "{o}:{d}"),
            CompositeKey::Three(o, d, t) => write!(f, "{o}:{d}:{t}"),
        }
    }
}

/// Errors raised by the sparse containers.
#[derive(Error, Debug)]
pub enum SparseError {
    /// The same sparse address was supplied more than once at construction.
    #[error("sparse space was duplicated: {key} had more than one definition")]
    DuplicateKey { key: CompositeKey },

    /// Parallel key/data inputs disagree in length.
    #[error("{what} has {actual} entries but {expected} were expected")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Explicit data was supplied alongside index arrays that are not strictly increasing.
    #[error("{what} must be strictly increasing when explicit data is supplied (violated at position {position})")]
    NotMonotonic { what: &'static str, position: usize },

    /// A write addressed a location the index does not cover.
    #[error("the location {key} is invalid for this {container}")]
    IndexOutOfRange {
        key: CompositeKey,
        container: &'static str,
    },

    /// An index tree violates the ordering, nesting or depth rules.
    #[error("invalid index structure: {0}")]
    InvalidStructure(String),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using SparseError.
pub type SparseResult<T> = Result<T, SparseError>;

impl From<toml::de::Error> for SparseError {
    fn from(err: toml::de::Error) -> Self {
        SparseError::Config(err.to_string())
    }
}
