//! One-dimensional sparse container.
//!
//! Values live in a dense vector; the [`SparseIndexing`] maps each zone number
//! to its slot. Reads of an uncovered key yield `T::default()` rather than an
//! error, so kernels can sweep arbitrary key ranges without guarding every
//! access. Writes to an uncovered key fail.
//!
//! ```
//! use zone_core::SparseArray;
//!
//! let mut pop = SparseArray::create_sparse_array(&[20, 5, 10], vec![2.0f32, 0.5, 1.0]).unwrap();
//! assert_eq!(pop.valid_index_array(), vec![5, 10, 20]);
//! assert_eq!(pop[10], 1.0);
//! assert_eq!(pop[11], 0.0);
//!
//! pop[5] += 1.0;
//! assert_eq!(pop.flat_data(), &[1.5, 1.0, 2.0]);
//! assert!(pop.set(11, 3.0).is_err());
//! ```

use crate::config::IndexingConfig;
use crate::error::{CompositeKey, SparseError, SparseResult};
use crate::indexing::{compress_sorted, IndexBuilder, SparseIndexing, ValidIndexes};
use crate::twin::SparseTwinIndex;
use std::ops::{Index, IndexMut};

/// A dense vector addressed by sparse `i32` keys.
#[derive(Debug, Clone)]
pub struct SparseArray<T> {
    indexing: SparseIndexing,
    data: Vec<T>,
    missing: T,
}

impl<T: Default> SparseArray<T> {
    /// Wraps existing storage, or default-initialises it when `data` is `None`.
    pub fn new(indexing: SparseIndexing, data: Option<Vec<T>>) -> SparseResult<Self> {
        if !indexing.has_depth(1) {
            return Err(SparseError::InvalidStructure(format!(
                "a sparse array needs a one-level index, found depth {:?}",
                indexing.depth()
            )));
        }
        let expected = indexing.key_count();
        let data = match data {
            Some(data) if data.len() != expected => {
                return Err(SparseError::LengthMismatch {
                    what: "data",
                    expected,
                    actual: data.len(),
                })
            }
            Some(data) => data,
            None => default_vec(expected),
        };
        Ok(Self {
            indexing,
            data,
            missing: T::default(),
        })
    }

    /// Builds an array from unsorted keys and their values.
    ///
    /// Data is reordered into ascending key order. Repeated keys are rejected.
    pub fn create_sparse_array(keys: &[i32], data: Vec<T>) -> SparseResult<Self> {
        if keys.len() != data.len() {
            return Err(SparseError::LengthMismatch {
                what: "data",
                expected: keys.len(),
                actual: data.len(),
            });
        }

        let mut order: Vec<(i32, usize)> = keys.iter().copied().zip(0..).collect();
        order.sort_unstable();
        if let Some(pair) = order.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(SparseError::DuplicateKey {
                key: CompositeKey::One(pair[0].0),
            });
        }

        let mut builder = IndexBuilder::new();
        let root = builder.push_level(compress_sorted(order.iter().map(|&(key, _)| key)));
        let indexing = builder.assemble(root, IndexingConfig::global().linear_lookup_max);

        let mut slots: Vec<Option<T>> = data.into_iter().map(Some).collect();
        let data = order
            .iter()
            .map(|&(_, pos)| slots[pos].take().unwrap_or_default())
            .collect();

        Ok(Self {
            indexing,
            data,
            missing: T::default(),
        })
    }

    /// Builds an array whose keys are derived from the values themselves.
    pub fn create_sparse_array_by<F>(place: F, data: Vec<T>) -> SparseResult<Self>
    where
        F: Fn(&T) -> i32,
    {
        let keys: Vec<i32> = data.iter().map(place).collect();
        Self::create_sparse_array(&keys, data)
    }

    /// A default-filled array sharing this array's index.
    pub fn create_similar_array<K: Default>(&self) -> SparseArray<K> {
        SparseArray {
            indexing: self.indexing.clone(),
            data: default_vec(self.data.len()),
            missing: K::default(),
        }
    }

    /// A default-filled square matrix over this array's zones.
    pub fn create_square_twin_array<K: Default>(&self) -> SparseTwinIndex<K> {
        SparseTwinIndex::square_over(&self.indexing, &self.indexing)
    }
}

impl<T> SparseArray<T> {
    /// Value at `key`, or the default when the key is not covered.
    pub fn get(&self, key: i32) -> T
    where
        T: Clone + Default,
    {
        self.try_get(key).cloned().unwrap_or_default()
    }

    pub fn try_get(&self, key: i32) -> Option<&T> {
        self.get_flat_index(key).map(|flat| &self.data[flat])
    }

    pub fn get_mut(&mut self, key: i32) -> Option<&mut T> {
        let flat = self.get_flat_index(key)?;
        self.data.get_mut(flat)
    }

    /// Stores `value` at `key`; fails when the key is not covered.
    pub fn set(&mut self, key: i32, value: T) -> SparseResult<()> {
        match self.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(out_of_range(key)),
        }
    }

    #[inline]
    pub fn contains_index(&self, key: i32) -> bool {
        self.get_flat_index(key).is_some()
    }

    #[inline]
    pub fn get_flat_index(&self, key: i32) -> Option<usize> {
        self.indexing.root().flat_index(key)
    }

    #[inline]
    pub fn get_sparse_index(&self, flat: usize) -> Option<i32> {
        self.indexing.root().sparse_index(flat)
    }

    /// Covered keys, ascending.
    pub fn valid_index_array(&self) -> Vec<i32> {
        self.valid_indexes().collect()
    }

    pub fn valid_indexes(&self) -> ValidIndexes<'_> {
        self.indexing.root().keys()
    }

    /// `(key, value)` pairs in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &T)> + '_ {
        self.valid_indexes().zip(self.data.iter())
    }

    /// Highest covered key.
    pub fn top(&self) -> Option<i32> {
        self.indexing.root().sets().last().map(|set| set.stop)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn flat_data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn flat_data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn indexing(&self) -> &SparseIndexing {
        &self.indexing
    }

    pub fn with_linear_lookup_max(mut self, linear_lookup_max: usize) -> Self {
        self.indexing = self.indexing.with_linear_lookup_max(linear_lookup_max);
        self
    }

    /// True when both arrays cover exactly the same keys.
    pub fn is_same_zone_system<K>(&self, other: &SparseArray<K>) -> bool {
        self.indexing == other.indexing
    }
}

impl<T: Default> Default for SparseArray<T> {
    fn default() -> Self {
        Self {
            indexing: SparseIndexing::empty(),
            data: Vec::new(),
            missing: T::default(),
        }
    }
}

impl<T> Index<i32> for SparseArray<T> {
    type Output = T;

    fn index(&self, key: i32) -> &T {
        self.try_get(key).unwrap_or(&self.missing)
    }
}

impl<T> IndexMut<i32> for SparseArray<T> {
    fn index_mut(&mut self, key: i32) -> &mut T {
        match self.get_flat_index(key) {
            Some(flat) => &mut self.data[flat],
            None => panic!("{}", out_of_range(key)),
        }
    }
}

fn out_of_range(key: i32) -> SparseError {
    SparseError::IndexOutOfRange {
        key: CompositeKey::One(key),
        container: "SparseArray",
    }
}

pub(crate) fn default_vec<T: Default>(len: usize) -> Vec<T> {
    std::iter::repeat_with(T::default).take(len).collect()
}
