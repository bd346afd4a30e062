//! Three-dimensional sparse container, nested the same way as the twin index
//! with one more level.

use crate::array::{default_vec, SparseArray};
use crate::config::IndexingConfig;
use crate::error::{CompositeKey, SparseError, SparseResult};
use crate::indexing::{compress_sorted, IndexBuilder, SparseIndexing, SparseSet, ValidIndexes};
use crate::twin::{check_len, check_rows};
use std::ops::{Index, IndexMut};

/// A doubly jagged cube addressed by triples of sparse keys.
#[derive(Debug, Clone)]
pub struct SparseTriIndex<T> {
    indexing: SparseIndexing,
    data: Vec<Vec<Vec<T>>>,
    missing: T,
}

impl<T: Default> SparseTriIndex<T> {
    /// Wraps existing storage, or default-initialises it when `data` is `None`.
    pub fn new(indexing: SparseIndexing, data: Option<Vec<Vec<Vec<T>>>>) -> SparseResult<Self> {
        if !indexing.has_depth(3) {
            return Err(SparseError::InvalidStructure(format!(
                "a tri index needs a three-level index, found depth {:?}",
                indexing.depth()
            )));
        }
        let shape = plane_widths(&indexing);
        let data = match data {
            Some(data) => {
                check_len("data planes", shape.len(), data.len())?;
                for (plane, widths) in data.iter().zip(&shape) {
                    check_rows(plane, widths)?;
                }
                data
            }
            None => shape
                .iter()
                .map(|widths| widths.iter().map(|&w| default_vec(w)).collect())
                .collect(),
        };
        Ok(Self {
            indexing,
            data,
            missing: T::default(),
        })
    }

    /// Builds a tri index from parallel, unsorted key and value lists.
    ///
    /// Repeated triples are rejected. Empty input yields an index where every
    /// read misses.
    pub fn create_sparse_tri_index(
        first: &[i32],
        second: &[i32],
        third: &[i32],
        data: Vec<T>,
    ) -> SparseResult<Self> {
        check_len("second", first.len(), second.len())?;
        check_len("third", first.len(), third.len())?;
        check_len("data", first.len(), data.len())?;
        if first.is_empty() {
            return Ok(Self::default());
        }

        let mut order: Vec<(i32, i32, i32, usize)> = (0..first.len())
            .map(|i| (first[i], second[i], third[i], i))
            .collect();
        order.sort_unstable();
        if let Some(pair) = order
            .windows(2)
            .find(|w| (w[0].0, w[0].1, w[0].2) == (w[1].0, w[1].1, w[1].2))
        {
            return Err(SparseError::DuplicateKey {
                key: CompositeKey::Three(pair[0].0, pair[0].1, pair[0].2),
            });
        }

        let mut slots: Vec<Option<T>> = data.into_iter().map(Some).collect();
        let mut builder = IndexBuilder::new();
        let mut outer = Vec::new();
        let mut planes = Vec::new();
        for by_first in order.chunk_by(|a, b| a.0 == b.0) {
            let mut middle = Vec::new();
            let mut plane = Vec::new();
            for by_second in by_first.chunk_by(|a, b| a.1 == b.1) {
                let d = by_second[0].1;
                let inner = builder.push_level(compress_sorted(by_second.iter().map(|e| e.2)));
                middle.push(SparseSet::with_sub_index(d, d, inner));
                plane.push(
                    by_second
                        .iter()
                        .map(|e| slots[e.3].take().unwrap_or_default())
                        .collect(),
                );
            }
            let o = by_first[0].0;
            let middle = builder.push_level(middle);
            outer.push(SparseSet::with_sub_index(o, o, middle));
            planes.push(plane);
        }
        let root = builder.push_level(outer);

        Ok(Self {
            indexing: builder.assemble(root, IndexingConfig::global().linear_lookup_max),
            data: planes,
            missing: T::default(),
        })
    }

    /// A default-filled cube over the zones of three arrays.
    pub fn create_similar_array_from<A, B, C>(
        first: &SparseArray<A>,
        second: &SparseArray<B>,
        third: &SparseArray<C>,
    ) -> Self {
        let sets = |index: &SparseIndexing| index.root().sets().to_vec();
        let (a, b, c) = (
            sets(first.indexing()),
            sets(second.indexing()),
            sets(third.indexing()),
        );
        if a.is_empty() || b.is_empty() || c.is_empty() {
            return Self::default();
        }

        let mut builder = IndexBuilder::new();
        let inner = builder.push_level(c.iter().map(|s| SparseSet::new(s.start, s.stop)).collect());
        let middle = builder.push_level(
            b.iter()
                .map(|s| SparseSet::with_sub_index(s.start, s.stop, inner))
                .collect(),
        );
        let root = builder.push_level(
            a.iter()
                .map(|s| SparseSet::with_sub_index(s.start, s.stop, middle))
                .collect(),
        );
        let indexing = builder.assemble(root, first.indexing().linear_lookup_max());
        let (rows, cols, depth) = (first.len(), second.len(), third.len());
        Self {
            indexing,
            data: (0..rows)
                .map(|_| (0..cols).map(|_| default_vec(depth)).collect())
                .collect(),
            missing: T::default(),
        }
    }

    /// A default-filled tri index sharing this one's index.
    pub fn create_similar_array<K: Default>(&self) -> SparseTriIndex<K> {
        SparseTriIndex {
            indexing: self.indexing.clone(),
            data: self
                .data
                .iter()
                .map(|plane| plane.iter().map(|row| default_vec(row.len())).collect())
                .collect(),
            missing: K::default(),
        }
    }
}

impl<T> SparseTriIndex<T> {
    pub fn get(&self, o: i32, d: i32, t: i32) -> T
    where
        T: Clone + Default,
    {
        self.try_get(o, d, t).cloned().unwrap_or_default()
    }

    pub fn try_get(&self, o: i32, d: i32, t: i32) -> Option<&T> {
        let (i, j, k) = self.get_flat_index_triple(o, d, t)?;
        Some(&self.data[i][j][k])
    }

    pub fn get_mut(&mut self, o: i32, d: i32, t: i32) -> Option<&mut T> {
        let (i, j, k) = self.get_flat_index_triple(o, d, t)?;
        Some(&mut self.data[i][j][k])
    }

    pub fn set(&mut self, o: i32, d: i32, t: i32, value: T) -> SparseResult<()> {
        match self.get_mut(o, d, t) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(out_of_range(o, d, t)),
        }
    }

    #[inline]
    pub fn contains_index(&self, o: i32, d: i32, t: i32) -> bool {
        self.get_flat_index_triple(o, d, t).is_some()
    }

    #[inline]
    pub fn get_flat_index(&self, o: i32) -> Option<usize> {
        self.indexing.root().flat_index(o)
    }

    pub fn get_flat_index_pair(&self, o: i32, d: i32) -> Option<(usize, usize)> {
        let (i, middle) = self.indexing.root().descend(o)?;
        let j = middle?.flat_index(d)?;
        Some((i, j))
    }

    pub fn get_flat_index_triple(&self, o: i32, d: i32, t: i32) -> Option<(usize, usize, usize)> {
        let (i, middle) = self.indexing.root().descend(o)?;
        let (j, inner) = middle?.descend(d)?;
        let k = inner?.flat_index(t)?;
        Some((i, j, k))
    }

    #[inline]
    pub fn get_sparse_index(&self, i: usize) -> Option<i32> {
        self.indexing.root().sparse_index(i)
    }

    /// Keys stored at flat position `(i, j, k)`.
    pub fn get_sparse_index_triple(&self, i: usize, j: usize, k: usize) -> Option<(i32, i32, i32)> {
        let root = self.indexing.root();
        let o = root.sparse_index(i)?;
        let middle = root.child(root.set_at_flat(i)?)?;
        let d = middle.sparse_index(j)?;
        let inner = middle.child(middle.set_at_flat(j)?)?;
        let t = inner.sparse_index(k)?;
        Some((o, d, t))
    }

    pub fn valid_indexes(&self) -> ValidIndexes<'_> {
        self.indexing.root().keys()
    }

    /// Second keys covered under `o`.
    pub fn valid_indexes_for(&self, o: i32) -> ValidIndexes<'_> {
        match self.indexing.root().descend(o) {
            Some((_, Some(middle))) => middle.keys(),
            _ => ValidIndexes::empty(),
        }
    }

    /// Third keys covered under `(o, d)`.
    pub fn valid_indexes_for_pair(&self, o: i32, d: i32) -> ValidIndexes<'_> {
        let inner = self
            .indexing
            .root()
            .descend(o)
            .and_then(|(_, middle)| middle?.descend(d))
            .and_then(|(_, inner)| inner);
        match inner {
            Some(inner) => inner.keys(),
            None => ValidIndexes::empty(),
        }
    }

    pub fn valid_index_array(&self) -> Vec<i32> {
        self.valid_indexes().collect()
    }

    /// Number of stored cells.
    pub fn count(&self) -> usize {
        self.data.iter().flatten().map(Vec::len).sum()
    }

    #[inline]
    pub fn flat_data(&self) -> &[Vec<Vec<T>>] {
        &self.data
    }

    /// Mutable innermost rows, in flat order.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [T]> + '_ {
        self.data
            .iter_mut()
            .flat_map(|plane| plane.iter_mut().map(Vec::as_mut_slice))
    }

    #[inline]
    pub fn indexing(&self) -> &SparseIndexing {
        &self.indexing
    }

    pub fn with_linear_lookup_max(mut self, linear_lookup_max: usize) -> Self {
        self.indexing = self.indexing.with_linear_lookup_max(linear_lookup_max);
        self
    }

    pub fn is_same_zone_system<K>(&self, other: &SparseTriIndex<K>) -> bool {
        self.indexing == other.indexing
    }
}

impl<T: Default> Default for SparseTriIndex<T> {
    fn default() -> Self {
        Self {
            indexing: SparseIndexing::empty(),
            data: Vec::new(),
            missing: T::default(),
        }
    }
}

impl<T> Index<(i32, i32, i32)> for SparseTriIndex<T> {
    type Output = T;

    fn index(&self, (o, d, t): (i32, i32, i32)) -> &T {
        self.try_get(o, d, t).unwrap_or(&self.missing)
    }
}

impl<T> IndexMut<(i32, i32, i32)> for SparseTriIndex<T> {
    fn index_mut(&mut self, (o, d, t): (i32, i32, i32)) -> &mut T {
        match self.get_flat_index_triple(o, d, t) {
            Some((i, j, k)) => &mut self.data[i][j][k],
            None => panic!("{}", out_of_range(o, d, t)),
        }
    }
}

fn out_of_range(o: i32, d: i32, t: i32) -> SparseError {
    SparseError::IndexOutOfRange {
        key: CompositeKey::Three(o, d, t),
        container: "SparseTriIndex",
    }
}

/// Innermost widths for every `(i, j)`, grouped by `i`.
fn plane_widths(indexing: &SparseIndexing) -> Vec<Vec<usize>> {
    let root = indexing.root();
    let mut planes = Vec::new();
    for set in root.sets() {
        let widths = match root.child(set) {
            Some(middle) => middle
                .sets()
                .iter()
                .flat_map(|m| {
                    let width = middle.child(m).map_or(0, |inner| inner.key_count());
                    std::iter::repeat(width).take(m.len())
                })
                .collect(),
            None => Vec::new(),
        };
        planes.extend(std::iter::repeat(widths).take(set.len()));
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SparseTriIndex<u32> {
        SparseTriIndex::create_sparse_tri_index(
            &[1, 1, 1, 2, 1],
            &[1, 1, 3, 1, 1],
            &[1, 2, 5, 9, 3],
            vec![11, 12, 135, 219, 13],
        )
        .unwrap()
    }

    #[test]
    fn nests_three_levels() {
        let tri = sample();
        assert_eq!(tri.valid_index_array(), vec![1, 2]);
        assert_eq!(tri.valid_indexes_for(1).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(tri.valid_indexes_for_pair(1, 1).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(tri.valid_indexes_for_pair(1, 2).count(), 0);
        assert_eq!(tri[(1, 3, 5)], 135);
        assert_eq!(tri[(2, 1, 9)], 219);
        assert_eq!(tri[(2, 1, 8)], 0);
        assert_eq!(tri.count(), 5);
        assert_eq!(tri.indexing().depth(), Some(3));
    }

    #[test]
    fn flat_and_sparse_addresses_round_trip() {
        let tri = sample();
        let (i, j, k) = tri.get_flat_index_triple(1, 1, 3).unwrap();
        assert_eq!(tri.flat_data()[i][j][k], 13);
        assert_eq!(tri.get_sparse_index_triple(i, j, k), Some((1, 1, 3)));
        assert_eq!(tri.get_flat_index_pair(1, 3), Some((0, 1)));
    }

    #[test]
    fn duplicate_triples_are_rejected() {
        let err = SparseTriIndex::create_sparse_tri_index(&[1, 1], &[2, 2], &[3, 3], vec![0u8; 2])
            .unwrap_err();
        assert!(err.to_string().contains("1:2:3"));
    }

    #[test]
    fn writes_outside_the_index_fail() {
        let mut tri = sample();
        tri.set(1, 3, 5, 7).unwrap();
        assert_eq!(tri.get(1, 3, 5), 7);
        let err = tri.set(1, 3, 6, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the location 1:3:6 is invalid for this SparseTriIndex"
        );
    }

    #[test]
    fn similar_arrays_keep_the_shape() {
        let tri = sample();
        let similar: SparseTriIndex<f64> = tri.create_similar_array();
        assert!(tri.is_same_zone_system(&similar));
        assert_eq!(similar.count(), tri.count());

        let rebuilt = SparseTriIndex::new(tri.indexing().clone(), Some(tri.flat_data().to_vec()))
            .unwrap();
        assert_eq!(rebuilt[(1, 1, 2)], 12);
    }

    #[test]
    fn cube_from_arrays() {
        let a = SparseArray::create_sparse_array(&[1, 2], vec![0u8; 2]).unwrap();
        let b = SparseArray::create_sparse_array(&[5], vec![0u8]).unwrap();
        let c = SparseArray::create_sparse_array(&[7, 9, 8], vec![0u8; 3]).unwrap();
        let cube = SparseTriIndex::<f32>::create_similar_array_from(&a, &b, &c);
        assert_eq!(cube.count(), 6);
        assert!(cube.contains_index(2, 5, 9));
        assert!(!cube.contains_index(2, 6, 9));
    }
}
