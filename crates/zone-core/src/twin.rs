//! Two-dimensional sparse container.
//!
//! The outer level indexes origins; each origin's set points at the level
//! indexing its destinations. Storage is jagged: one row per covered origin,
//! one column per destination covered under that origin.
//!
//! ```
//! use zone_core::SparseTwinIndex;
//!
//! let twin = SparseTwinIndex::create_twin_index(&[1, 1, 2], &[1, 2, 1], vec![1.0f32, 2.0, 3.0]).unwrap();
//! assert_eq!(twin.valid_index_array(), vec![1, 2]);
//! assert_eq!(twin.valid_indexes_for(1).collect::<Vec<_>>(), vec![1, 2]);
//! assert_eq!(twin[(1, 2)], 2.0);
//! assert_eq!(twin[(2, 2)], 0.0);
//! ```

use crate::array::{default_vec, SparseArray};
use crate::config::IndexingConfig;
use crate::error::{CompositeKey, SparseError, SparseResult};
use crate::indexing::{compress_sorted, IndexBuilder, SparseIndexing, SparseSet, ValidIndexes};
use std::ops::{Index, IndexMut};

/// A jagged matrix addressed by pairs of sparse keys.
#[derive(Debug, Clone)]
pub struct SparseTwinIndex<T> {
    indexing: SparseIndexing,
    data: Vec<Vec<T>>,
    missing: T,
}

impl<T: Default> SparseTwinIndex<T> {
    /// Wraps existing rows, or default-initialises them when `data` is `None`.
    pub fn new(indexing: SparseIndexing, data: Option<Vec<Vec<T>>>) -> SparseResult<Self> {
        if !indexing.has_depth(2) {
            return Err(SparseError::InvalidStructure(format!(
                "a twin index needs a two-level index, found depth {:?}",
                indexing.depth()
            )));
        }
        let widths = row_widths(&indexing);
        let data = match data {
            Some(data) => {
                check_rows(&data, &widths)?;
                data
            }
            None => widths.iter().map(|&w| default_vec(w)).collect(),
        };
        Ok(Self {
            indexing,
            data,
            missing: T::default(),
        })
    }

    /// Builds a twin index from parallel, unsorted key and value lists.
    ///
    /// Every distinct `first` key gets its own destination level; runs of
    /// consecutive `second` keys under it share a range. Repeated pairs are
    /// rejected. Empty input yields an index where every read misses.
    pub fn create_twin_index(first: &[i32], second: &[i32], data: Vec<T>) -> SparseResult<Self> {
        check_len("second", first.len(), second.len())?;
        check_len("data", first.len(), data.len())?;
        if first.is_empty() {
            return Ok(Self::default());
        }

        let mut order: Vec<(i32, i32, usize)> = first
            .iter()
            .zip(second)
            .zip(0..)
            .map(|((&f, &s), pos)| (f, s, pos))
            .collect();
        order.sort_unstable();
        if let Some(pair) = order
            .windows(2)
            .find(|w| (w[0].0, w[0].1) == (w[1].0, w[1].1))
        {
            return Err(SparseError::DuplicateKey {
                key: CompositeKey::Two(pair[0].0, pair[0].1),
            });
        }

        let mut slots: Vec<Option<T>> = data.into_iter().map(Some).collect();
        let mut builder = IndexBuilder::new();
        let mut outer = Vec::new();
        let mut rows = Vec::new();
        for group in order.chunk_by(|a, b| a.0 == b.0) {
            let origin = group[0].0;
            let inner = builder.push_level(compress_sorted(group.iter().map(|e| e.1)));
            outer.push(SparseSet::with_sub_index(origin, origin, inner));
            rows.push(
                group
                    .iter()
                    .map(|e| slots[e.2].take().unwrap_or_default())
                    .collect(),
            );
        }
        let root = builder.push_level(outer);

        Ok(Self {
            indexing: builder.assemble(root, IndexingConfig::global().linear_lookup_max),
            data: rows,
            missing: T::default(),
        })
    }

    /// Builds a full `first × second` matrix.
    ///
    /// With explicit `data` both key lists must be strictly increasing and
    /// the data must have `first.len()` rows of `second.len()` values. Without
    /// data the keys may come in any order and every cell starts at the default.
    pub fn create_square_twin_index(
        first: &[i32],
        second: &[i32],
        data: Option<Vec<Vec<T>>>,
    ) -> SparseResult<Self> {
        let (first, second) = match &data {
            Some(rows) => {
                check_increasing("first", first)?;
                check_increasing("second", second)?;
                check_len("data", first.len(), rows.len())?;
                for row in rows {
                    check_len("data row", second.len(), row.len())?;
                }
                (first.to_vec(), second.to_vec())
            }
            None => (sorted_distinct(first)?, sorted_distinct(second)?),
        };
        if first.is_empty() || second.is_empty() {
            return Ok(Self::default());
        }

        let mut builder = IndexBuilder::new();
        let inner = builder.push_level(compress_sorted(second.iter().copied()));
        let outer = compress_sorted(first.iter().copied())
            .into_iter()
            .map(|set| SparseSet::with_sub_index(set.start, set.stop, inner))
            .collect();
        let root = builder.push_level(outer);
        let indexing = builder.assemble(root, IndexingConfig::global().linear_lookup_max);

        let data = match data {
            Some(rows) => rows,
            None => (0..first.len()).map(|_| default_vec(second.len())).collect(),
        };
        Ok(Self {
            indexing,
            data,
            missing: T::default(),
        })
    }

    /// A default-filled matrix whose origins are `first`'s zones and whose
    /// destinations are `second`'s zones.
    pub fn create_similar_array_from<J, K>(first: &SparseArray<J>, second: &SparseArray<K>) -> Self {
        Self::square_over(first.indexing(), second.indexing())
    }

    /// A default-filled twin index sharing this one's index.
    pub fn create_similar_array<K: Default>(&self) -> SparseTwinIndex<K> {
        SparseTwinIndex {
            indexing: self.indexing.clone(),
            data: self.data.iter().map(|row| default_vec(row.len())).collect(),
            missing: K::default(),
        }
    }

    pub(crate) fn square_over(outer: &SparseIndexing, inner: &SparseIndexing) -> Self {
        let (outer_sets, inner_sets) = (outer.root().sets(), inner.root().sets());
        if outer_sets.is_empty() || inner_sets.is_empty() {
            return Self::default();
        }

        let mut builder = IndexBuilder::new();
        let inner_id = builder.push_level(
            inner_sets
                .iter()
                .map(|s| SparseSet::new(s.start, s.stop))
                .collect(),
        );
        let root = builder.push_level(
            outer_sets
                .iter()
                .map(|s| SparseSet::with_sub_index(s.start, s.stop, inner_id))
                .collect(),
        );
        let indexing = builder.assemble(root, outer.linear_lookup_max());
        let (rows, cols) = (outer.key_count(), inner.key_count());
        Self {
            indexing,
            data: (0..rows).map(|_| default_vec(cols)).collect(),
            missing: T::default(),
        }
    }
}

impl<T> SparseTwinIndex<T> {
    /// Value at `(o, d)`, or the default when the pair is not covered.
    pub fn get(&self, o: i32, d: i32) -> T
    where
        T: Clone + Default,
    {
        self.try_get(o, d).cloned().unwrap_or_default()
    }

    pub fn try_get(&self, o: i32, d: i32) -> Option<&T> {
        let (row, col) = self.get_flat_index_pair(o, d)?;
        Some(&self.data[row][col])
    }

    pub fn get_mut(&mut self, o: i32, d: i32) -> Option<&mut T> {
        let (row, col) = self.get_flat_index_pair(o, d)?;
        Some(&mut self.data[row][col])
    }

    /// Stores `value` at `(o, d)`; fails when the pair is not covered.
    pub fn set(&mut self, o: i32, d: i32, value: T) -> SparseResult<()> {
        match self.get_mut(o, d) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(out_of_range(o, d)),
        }
    }

    #[inline]
    pub fn contains_index(&self, o: i32, d: i32) -> bool {
        self.get_flat_index_pair(o, d).is_some()
    }

    /// Row holding origin `o`.
    #[inline]
    pub fn get_flat_index(&self, o: i32) -> Option<usize> {
        self.indexing.root().flat_index(o)
    }

    /// Row and column holding `(o, d)`.
    pub fn get_flat_index_pair(&self, o: i32, d: i32) -> Option<(usize, usize)> {
        let (row, inner) = self.indexing.root().descend(o)?;
        let col = inner?.flat_index(d)?;
        Some((row, col))
    }

    #[inline]
    pub fn get_sparse_index(&self, row: usize) -> Option<i32> {
        self.indexing.root().sparse_index(row)
    }

    /// Origin and destination stored at `(row, col)`.
    pub fn get_sparse_index_pair(&self, row: usize, col: usize) -> Option<(i32, i32)> {
        let root = self.indexing.root();
        let set = root.set_at_flat(row)?;
        let o = root.sparse_index(row)?;
        let d = root.child(set)?.sparse_index(col)?;
        Some((o, d))
    }

    /// Covered origins, ascending.
    pub fn valid_indexes(&self) -> ValidIndexes<'_> {
        self.indexing.root().keys()
    }

    /// Destinations covered under origin `o`, ascending; empty when `o` is not covered.
    pub fn valid_indexes_for(&self, o: i32) -> ValidIndexes<'_> {
        match self.indexing.root().descend(o) {
            Some((_, Some(inner))) => inner.keys(),
            _ => ValidIndexes::empty(),
        }
    }

    pub fn valid_index_array(&self) -> Vec<i32> {
        self.valid_indexes().collect()
    }

    /// Number of stored cells.
    pub fn count(&self) -> usize {
        self.data.iter().map(Vec::len).sum()
    }

    #[inline]
    pub fn flat_data(&self) -> &[Vec<T>] {
        &self.data
    }

    /// Mutable rows. Rows are disjoint, so they may be handed to separate workers.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [T]> + '_ {
        self.data.iter_mut().map(Vec::as_mut_slice)
    }

    #[inline]
    pub fn indexing(&self) -> &SparseIndexing {
        &self.indexing
    }

    pub fn with_linear_lookup_max(mut self, linear_lookup_max: usize) -> Self {
        self.indexing = self.indexing.with_linear_lookup_max(linear_lookup_max);
        self
    }

    /// True when both indexes cover exactly the same pairs.
    pub fn is_same_zone_system<K>(&self, other: &SparseTwinIndex<K>) -> bool {
        self.indexing == other.indexing
    }
}

impl<T: Default> Default for SparseTwinIndex<T> {
    fn default() -> Self {
        Self {
            indexing: SparseIndexing::empty(),
            data: Vec::new(),
            missing: T::default(),
        }
    }
}

impl<T> Index<(i32, i32)> for SparseTwinIndex<T> {
    type Output = T;

    fn index(&self, (o, d): (i32, i32)) -> &T {
        self.try_get(o, d).unwrap_or(&self.missing)
    }
}

impl<T> IndexMut<(i32, i32)> for SparseTwinIndex<T> {
    fn index_mut(&mut self, (o, d): (i32, i32)) -> &mut T {
        match self.get_flat_index_pair(o, d) {
            Some((row, col)) => &mut self.data[row][col],
            None => panic!("{}", out_of_range(o, d)),
        }
    }
}

fn out_of_range(o: i32, d: i32) -> SparseError {
    SparseError::IndexOutOfRange {
        key: CompositeKey::Two(o, d),
        container: "SparseTwinIndex",
    }
}

/// Columns per row, in row order.
pub(crate) fn row_widths(indexing: &SparseIndexing) -> Vec<usize> {
    let root = indexing.root();
    root.sets()
        .iter()
        .flat_map(|set| {
            let width = root.child(set).map_or(0, |child| child.key_count());
            std::iter::repeat(width).take(set.len())
        })
        .collect()
}

pub(crate) fn check_rows<T>(rows: &[Vec<T>], widths: &[usize]) -> SparseResult<()> {
    check_len("data rows", widths.len(), rows.len())?;
    for (row, &width) in rows.iter().zip(widths) {
        check_len("data row", width, row.len())?;
    }
    Ok(())
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> SparseResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SparseError::LengthMismatch {
            what,
            expected,
            actual,
        })
    }
}

fn check_increasing(what: &'static str, keys: &[i32]) -> SparseResult<()> {
    match keys.windows(2).position(|w| w[0] >= w[1]) {
        Some(pos) => Err(SparseError::NotMonotonic {
            what,
            position: pos + 1,
        }),
        None => Ok(()),
    }
}

fn sorted_distinct(keys: &[i32]) -> SparseResult<Vec<i32>> {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    match sorted.windows(2).find(|w| w[0] == w[1]) {
        Some(w) => Err(SparseError::DuplicateKey {
            key: CompositeKey::One(w[0]),
        }),
        None => Ok(sorted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_jagged_rows() {
        let twin =
            SparseTwinIndex::create_twin_index(&[2, 1, 1, 1], &[7, 3, 1, 2], vec![4, 3, 1, 2])
                .unwrap();
        assert_eq!(twin.flat_data(), &[vec![1, 2, 3], vec![4]]);
        assert_eq!(twin.count(), 4);
        assert_eq!(twin.valid_indexes_for(2).collect::<Vec<_>>(), vec![7]);
        assert_eq!(twin.valid_indexes_for(3).count(), 0);
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let err = SparseTwinIndex::create_twin_index(&[1, 2, 1], &[5, 5, 5], vec![0u8; 3])
            .unwrap_err();
        assert!(matches!(
            err,
            SparseError::DuplicateKey {
                key: CompositeKey::Two(1, 5)
            }
        ));
        assert!(err.to_string().contains("1:5"));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(matches!(
            SparseTwinIndex::create_twin_index(&[1, 2], &[1], vec![0u8; 2]),
            Err(SparseError::LengthMismatch { what: "second", .. })
        ));
        assert!(matches!(
            SparseTwinIndex::create_twin_index(&[1, 2], &[1, 2], vec![0u8; 3]),
            Err(SparseError::LengthMismatch { what: "data", .. })
        ));
    }

    #[test]
    fn empty_input_is_a_null_space() {
        let twin = SparseTwinIndex::<f32>::create_twin_index(&[], &[], Vec::new()).unwrap();
        assert_eq!(twin.count(), 0);
        assert_eq!(twin.get(1, 1), 0.0);
        assert!(!twin.contains_index(0, 0));
    }

    #[test]
    fn square_index_with_data() {
        let twin = SparseTwinIndex::create_square_twin_index(
            &[1, 2, 5],
            &[10, 20],
            Some(vec![vec![1, 2], vec![3, 4], vec![5, 6]]),
        )
        .unwrap();
        assert_eq!(twin[(5, 20)], 6);
        assert_eq!(twin[(2, 10)], 3);
        assert_eq!(twin.indexing().root().range_count(), 2);
        assert_eq!(twin.get_sparse_index_pair(2, 1), Some((5, 20)));
    }

    #[test]
    fn square_index_checks_order_and_shape() {
        let err = SparseTwinIndex::create_square_twin_index(&[1, 3, 2], &[1], Some(vec![vec![0]; 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            SparseError::NotMonotonic {
                what: "first",
                position: 2
            }
        ));

        let err =
            SparseTwinIndex::create_square_twin_index(&[1, 2], &[4, 9, 9], Some(vec![vec![0; 3]; 2]))
                .unwrap_err();
        assert!(matches!(
            err,
            SparseError::NotMonotonic {
                what: "second",
                position: 2
            }
        ));

        let err = SparseTwinIndex::create_square_twin_index(&[1, 1], &[1], Some(vec![vec![0]; 2]))
            .unwrap_err();
        assert!(matches!(
            err,
            SparseError::NotMonotonic {
                what: "first",
                position: 1
            }
        ));

        let err = SparseTwinIndex::create_square_twin_index(&[1, 2], &[1, 2], Some(vec![vec![0]; 2]))
            .unwrap_err();
        assert!(matches!(
            err,
            SparseError::LengthMismatch {
                what: "data row",
                ..
            }
        ));
    }

    #[test]
    fn square_index_without_data_sorts_keys() {
        let twin = SparseTwinIndex::<u16>::create_square_twin_index(&[3, 1, 2], &[9, 8], None)
            .unwrap();
        assert_eq!(twin.valid_index_array(), vec![1, 2, 3]);
        assert_eq!(twin.valid_indexes_for(2).collect::<Vec<_>>(), vec![8, 9]);
        assert_eq!(twin.count(), 6);

        let err = SparseTwinIndex::<u16>::create_square_twin_index(&[1, 1], &[1], None).unwrap_err();
        assert!(matches!(err, SparseError::DuplicateKey { .. }));
    }

    #[test]
    fn new_rejects_wrong_depth_and_shape() {
        let flat = SparseIndexing::from_sets(vec![SparseSet::new(1, 2)]).unwrap();
        assert!(SparseTwinIndex::<f32>::new(flat, None).is_err());

        let twin = SparseTwinIndex::create_twin_index(&[1, 1], &[1, 2], vec![0.0f32; 2]).unwrap();
        let index = twin.indexing().clone();
        assert!(SparseTwinIndex::new(index.clone(), Some(vec![vec![0.0f32]])).is_err());
        let rebuilt = SparseTwinIndex::new(index, Some(vec![vec![1.0f32, 2.0]])).unwrap();
        assert_eq!(rebuilt[(1, 2)], 2.0);
    }

    #[test]
    fn writes_outside_the_index_fail() {
        let mut twin = SparseTwinIndex::create_twin_index(&[1], &[1], vec![0i32]).unwrap();
        twin.set(1, 1, 4).unwrap();
        twin[(1, 1)] += 1;
        assert_eq!(twin.get(1, 1), 5);
        let err = twin.set(1, 2, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the location 1:2 is invalid for this SparseTwinIndex"
        );
    }
}
