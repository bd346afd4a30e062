//! # zone-io: Sparse Array Persistence
//!
//! Saves a [`SparseArray`] in a compact little-endian layout (header, range
//! table, then packed `f32` cells) and reads it back into an identical zone
//! system. See [`binary`] for the byte layout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zone_core::SparseArray;
//! use zone_io::{load_sparse_array, save_sparse_array};
//!
//! fn main() -> anyhow::Result<()> {
//!     let pop = SparseArray::create_sparse_array(&[1, 2, 10], vec![3.0f32, 4.0, 5.0])?;
//!     save_sparse_array("population.bin", &pop, 1, |&v| Some(vec![v]))?;
//!
//!     let loaded: SparseArray<f32> = load_sparse_array("population.bin", |_, cell| cell[0])?;
//!     assert!(loaded.is_same_zone_system(&pop));
//!     Ok(())
//! }
//! ```
//!
//! Stream-level functions ([`write_sparse_array`], [`read_sparse_array`]) return
//! [`ZoneIoError`]; the path-level helpers add file context through `anyhow`.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use zone_core::SparseArray;

pub mod binary;
pub mod error;

pub use binary::{
    read_f32_array, read_sparse_array, write_f32_array, write_sparse_array, LayoutHeader,
    LAYOUT_VERSION,
};
pub use error::{ZoneIoError, ZoneIoResult};

/// Saves `array` to `path`, replacing any existing file.
pub fn save_sparse_array<T, F>(
    path: impl AsRef<Path>,
    array: &SparseArray<T>,
    types_per_cell: usize,
    decompose: F,
) -> Result<()>
where
    F: Fn(&T) -> Option<Vec<f32>>,
{
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("creating sparse array file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_sparse_array(&mut writer, array, types_per_cell, decompose)
        .with_context(|| format!("writing sparse array to {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("flushing sparse array file {}", path.display()))
}

/// Loads an array saved by [`save_sparse_array`].
pub fn load_sparse_array<T, F>(path: impl AsRef<Path>, make: F) -> Result<SparseArray<T>>
where
    T: Default,
    F: Fn(i32, &[f32]) -> T,
{
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("opening sparse array file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    read_sparse_array(&mut reader, make)
        .with_context(|| format!("reading sparse array from {}", path.display()))
}
