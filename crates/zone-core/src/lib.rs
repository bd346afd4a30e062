//! # zone-core: Sparse Zone-Indexed Containers
//!
//! Stores 1-, 2- and 3-dimensional tables addressed by zone numbers that have
//! holes in them, while keeping the values in dense, contiguous vectors.
//!
//! ## Design Philosophy
//!
//! A zone system such as `1..=5000` with a few hundred missing numbers is
//! compressed into a handful of inclusive ranges. Each range records the flat
//! position of its first key, so translating a zone number into a storage slot
//! is one range lookup plus an addition:
//! - **Reads** of uncovered keys return `T::default()`
//! - **Writes** to uncovered keys fail with [`SparseError::IndexOutOfRange`]
//! - **Index trees** are immutable after construction and shared through `Arc`
//!
//! ## Quick Start
//!
//! ```rust
//! use zone_core::*;
//!
//! // Population by zone, supplied in any order
//! let population = SparseArray::create_sparse_array(
//!     &[20, 5, 6, 7, 10, 11],
//!     vec![6.0f32, 1.0, 2.0, 3.0, 4.0, 5.0],
//! )
//! .unwrap();
//!
//! assert_eq!(population.valid_index_array(), vec![5, 6, 7, 10, 11, 20]);
//! assert_eq!(population.get_flat_index(6), Some(1));
//! assert_eq!(population[999], 0.0);
//!
//! // An origin-destination matrix over the same zones
//! let mut trips: SparseTwinIndex<f32> = population.create_square_twin_array();
//! trips[(5, 20)] = 12.5;
//! assert_eq!(trips.get(5, 20), 12.5);
//! assert!(trips.set(5, 8, 1.0).is_err());
//!
//! // Zone systems are compared range for range
//! let employment: SparseArray<f64> = population.create_similar_array();
//! assert!(employment.is_same_zone_system(&population));
//! ```
//!
//! ## Core Data Structures
//!
//! - [`SparseArray`] - 1-D container
//! - [`SparseTwinIndex`] - 2-D jagged container (origin, destination)
//! - [`SparseTriIndex`] - 3-D jagged container
//! - [`SparseIndexing`] - the shared multi-level range index behind all three
//! - [`RangeSet`] / [`IndexedRangeSet`] - range-compressed key sets and their text grammar
//!
//! ## Modules
//!
//! - [`range`] - Ranges, range sets and the `1-3,7,10+` grammar
//! - [`indexing`] - Index arenas, builders and lookup strategies
//! - [`config`] - Lookup tuning, loaded from TOML
//! - [`diagnostics`] - Structural checks on index trees
//!
//! ## Integration with zone-io
//!
//! The zone-io crate saves a [`SparseArray`] in a fixed little-endian layout
//! and reads it back.

pub mod array;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod indexing;
pub mod range;
pub mod tri;
pub mod twin;

pub use array::SparseArray;
pub use config::{IndexingConfig, DEFAULT_LINEAR_LOOKUP_MAX};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{CompositeKey, SparseError, SparseResult};
pub use indexing::{
    generate_structure, IndexBuilder, Level, LevelId, SparseIndexing, SparseSet, ValidIndexes,
};
pub use range::{IndexedRangeSet, Range, RangeParseError, RangeSet};
pub use tri::SparseTriIndex;
pub use twin::SparseTwinIndex;
