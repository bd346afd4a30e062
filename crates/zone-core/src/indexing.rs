//! Multi-level range indexes.
//!
//! A [`SparseIndexing`] translates sparse keys (zone numbers with holes) into
//! dense flat positions. Each level is an ascending list of disjoint
//! [`SparseSet`]s; a set's `base_location` is the flat position of its first
//! key, so a hit costs one range lookup plus an addition:
//!
//! ```text
//! keys  5 6 7    10 11    20
//! set   [5-7]    [10-11]  [20]
//! base   0        3        5
//! ```
//!
//! Sets may point at a sub-level (`sub_index`), which is how the twin and tri
//! containers nest a second and third dimension under each outer key.
//!
//! ## Storage
//!
//! All levels of one tree live in a single arena and refer to each other by
//! [`LevelId`]. A level may only point at levels pushed before it, so every
//! tree is acyclic by construction. The arena is shared through an [`Arc`];
//! cloning an index never copies ranges.
//!
//! ## Lookup strategies
//!
//! Levels holding fewer than `linear_lookup_max` sets are scanned linearly
//! with an early exit; larger levels are binary searched. Both strategies are
//! public on [`Level`] and always agree.
//!
//! ```
//! use zone_core::indexing::{IndexBuilder, SparseSet};
//!
//! let mut builder = IndexBuilder::new();
//! let root = builder.push_level(vec![
//!     SparseSet::new(5, 7),
//!     SparseSet::new(10, 11),
//!     SparseSet::new(20, 20),
//! ]);
//! let index = builder.finish(root).unwrap();
//!
//! assert_eq!(index.root().flat_index(6), Some(1));
//! assert_eq!(index.root().flat_index(20), Some(5));
//! assert_eq!(index.root().flat_index(8), None);
//! assert_eq!(index.root().keys().collect::<Vec<_>>(), vec![5, 6, 7, 10, 11, 20]);
//! ```

use crate::config::IndexingConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{SparseError, SparseResult};
use crate::range::{Range, RangeSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::iter::FusedIterator;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, trace};

/// Position of a level inside an index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(usize);

impl LevelId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LevelId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// One inclusive key range of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SparseSet {
    pub start: i32,
    pub stop: i32,
    /// Flat position of `start` within the level.
    pub base_location: usize,
    /// Level holding the next dimension for every key of this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_index: Option<LevelId>,
}

impl SparseSet {
    #[inline]
    pub fn new(start: i32, stop: i32) -> Self {
        Self {
            start,
            stop,
            base_location: 0,
            sub_index: None,
        }
    }

    #[inline]
    pub fn with_sub_index(start: i32, stop: i32, sub_index: LevelId) -> Self {
        Self {
            sub_index: Some(sub_index),
            ..Self::new(start, stop)
        }
    }

    #[inline]
    pub fn range(&self) -> Range {
        Range::new(self.start, self.stop)
    }

    /// Number of keys covered; zero for an inverted set.
    #[inline]
    pub fn len(&self) -> usize {
        self.range().len() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stop < self.start
    }

    #[inline]
    pub fn contains(&self, key: i32) -> bool {
        self.start <= key && key <= self.stop
    }

    /// Flat position of `key`, which must lie inside this set.
    #[inline]
    pub fn flat_offset(&self, key: i32) -> usize {
        self.base_location + (i64::from(key) - i64::from(self.start)) as usize
    }

    /// One past the flat position of `stop`.
    #[inline]
    fn flat_end(&self) -> usize {
        self.base_location + self.len()
    }
}

/// Assigns every set its running prefix-sum base location.
pub fn generate_structure(sets: &mut [SparseSet]) {
    let mut base = 0usize;
    for set in sets.iter_mut() {
        set.base_location = base;
        base += set.len();
    }
}

/// Collapses ascending, distinct keys into runs of consecutive keys.
pub(crate) fn compress_sorted(keys: impl IntoIterator<Item = i32>) -> Vec<SparseSet> {
    let mut sets: Vec<SparseSet> = Vec::new();
    for key in keys {
        match sets.last_mut() {
            Some(last) if i64::from(key) == i64::from(last.stop) + 1 => last.stop = key,
            _ => sets.push(SparseSet::new(key, key)),
        }
    }
    generate_structure(&mut sets);
    sets
}

#[derive(Debug)]
struct IndexArena {
    levels: Vec<Box<[SparseSet]>>,
}

/// Accumulates levels bottom-up and freezes them into a [`SparseIndexing`].
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    levels: Vec<Vec<SparseSet>>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a level. Its sets may only reference levels pushed earlier.
    pub fn push_level(&mut self, sets: Vec<SparseSet>) -> LevelId {
        self.levels.push(sets);
        LevelId(self.levels.len() - 1)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Reports every structural problem of the pending levels.
    ///
    /// Base locations are not checked; [`IndexBuilder::finish`] recomputes them.
    pub fn validate(&self) -> Diagnostics {
        let levels: Vec<&[SparseSet]> = self.levels.iter().map(Vec::as_slice).collect();
        check_levels(&levels, false)
    }

    /// Validates the levels and freezes them under `root`, using the
    /// process-wide [`IndexingConfig`].
    pub fn finish(self, root: LevelId) -> SparseResult<SparseIndexing> {
        self.finish_with_config(root, IndexingConfig::global())
    }

    pub fn finish_with_config(
        self,
        root: LevelId,
        config: &IndexingConfig,
    ) -> SparseResult<SparseIndexing> {
        if root.value() >= self.levels.len() {
            return Err(SparseError::InvalidStructure(format!(
                "root level {} does not exist ({} levels)",
                root.value(),
                self.levels.len()
            )));
        }

        let diagnostics = self.validate();
        if diagnostics.has_errors() {
            let messages: Vec<String> = diagnostics.errors().map(|e| e.to_string()).collect();
            return Err(SparseError::InvalidStructure(messages.join("; ")));
        }
        for warning in diagnostics.warnings() {
            trace!(%warning, "index level could be compacted");
        }

        Ok(self.assemble(root, config.linear_lookup_max))
    }

    /// Freezes levels the caller built correctly by construction.
    pub(crate) fn assemble(self, root: LevelId, linear_lookup_max: usize) -> SparseIndexing {
        debug_assert!(!self.validate().has_errors());
        let levels: Vec<Box<[SparseSet]>> = self
            .levels
            .into_iter()
            .map(|mut sets| {
                generate_structure(&mut sets);
                sets.into_boxed_slice()
            })
            .collect();

        let indexing = SparseIndexing {
            arena: Arc::new(IndexArena { levels }),
            root,
            linear_lookup_max,
        };
        debug!(
            levels = indexing.level_count(),
            keys = indexing.key_count(),
            linear_lookup_max,
            "built sparse index"
        );
        indexing
    }
}

/// An immutable, shareable multi-level range index.
///
/// Equality is structural: two indexes are equal when their trees hold the
/// same ranges in the same shape, whatever arena they live in. The lookup
/// threshold does not take part in equality.
#[derive(Debug, Clone)]
pub struct SparseIndexing {
    arena: Arc<IndexArena>,
    root: LevelId,
    linear_lookup_max: usize,
}

impl SparseIndexing {
    /// An index covering no keys.
    pub fn empty() -> Self {
        let mut builder = IndexBuilder::new();
        let root = builder.push_level(Vec::new());
        builder.assemble(root, IndexingConfig::global().linear_lookup_max)
    }

    /// Single-level index over the given sets.
    pub fn from_sets(sets: Vec<SparseSet>) -> SparseResult<Self> {
        let mut builder = IndexBuilder::new();
        let root = builder.push_level(sets);
        builder.finish(root)
    }

    /// Single-level index over a normalised range set.
    pub fn from_range_set(ranges: &RangeSet) -> Self {
        let sets = ranges.iter().map(|r| SparseSet::new(r.start, r.stop)).collect();
        let mut builder = IndexBuilder::new();
        let root = builder.push_level(sets);
        builder.assemble(root, IndexingConfig::global().linear_lookup_max)
    }

    /// Same tree, different lookup threshold. The arena stays shared.
    pub fn with_linear_lookup_max(&self, linear_lookup_max: usize) -> Self {
        Self {
            arena: Arc::clone(&self.arena),
            root: self.root,
            linear_lookup_max,
        }
    }

    #[inline]
    pub fn linear_lookup_max(&self) -> usize {
        self.linear_lookup_max
    }

    #[inline]
    pub fn root(&self) -> Level<'_> {
        self.level(self.root)
    }

    #[inline]
    pub(crate) fn level(&self, id: LevelId) -> Level<'_> {
        Level {
            indexing: self,
            id,
            sets: &self.arena.levels[id.value()],
        }
    }

    pub fn level_count(&self) -> usize {
        self.arena.levels.len()
    }

    /// Keys covered by the root level.
    pub fn key_count(&self) -> usize {
        self.root().key_count()
    }

    /// Number of nested levels under (and including) the root, or `None` for
    /// an empty root.
    pub fn depth(&self) -> Option<usize> {
        let mut level = self.root();
        let mut depth = 0;
        loop {
            let first = level.sets.first()?;
            depth += 1;
            match level.child(first) {
                Some(child) => level = child,
                None => return Some(depth),
            }
        }
    }

    /// True when the tree has exactly `depth` levels. An empty root matches
    /// any depth.
    pub fn has_depth(&self, depth: usize) -> bool {
        self.depth().map_or(true, |d| d == depth)
    }

    /// True when both indexes are backed by the same arena.
    pub fn shares_arena(&self, other: &SparseIndexing) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena)
    }

    /// Reports every structural problem, including base locations.
    pub fn validate(&self) -> Diagnostics {
        let levels: Vec<&[SparseSet]> = self.arena.levels.iter().map(|l| &l[..]).collect();
        check_levels(&levels, true)
    }

    /// Range-for-range comparison of the two trees.
    pub fn structurally_eq(&self, other: &SparseIndexing) -> bool {
        if self.shares_arena(other) && self.root == other.root {
            return true;
        }
        let mut visited = HashSet::new();
        levels_eq(self.root(), other.root(), &mut visited)
    }
}

impl PartialEq for SparseIndexing {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_eq(other)
    }
}

impl Eq for SparseIndexing {}

impl Default for SparseIndexing {
    fn default() -> Self {
        Self::empty()
    }
}

fn levels_eq(a: Level<'_>, b: Level<'_>, visited: &mut HashSet<(LevelId, LevelId)>) -> bool {
    if !visited.insert((a.id, b.id)) {
        return true;
    }
    if a.sets.len() != b.sets.len() {
        return false;
    }
    a.sets.iter().zip(b.sets).all(|(x, y)| {
        x.start == y.start
            && x.stop == y.stop
            && match (a.child(x), b.child(y)) {
                (None, None) => true,
                (Some(ca), Some(cb)) => levels_eq(ca, cb, visited),
                _ => false,
            }
    })
}

/// A borrowed view of one level of a [`SparseIndexing`].
#[derive(Debug, Clone, Copy)]
pub struct Level<'a> {
    indexing: &'a SparseIndexing,
    id: LevelId,
    sets: &'a [SparseSet],
}

impl<'a> Level<'a> {
    #[inline]
    pub fn id(&self) -> LevelId {
        self.id
    }

    #[inline]
    pub fn sets(&self) -> &'a [SparseSet] {
        self.sets
    }

    #[inline]
    pub fn range_count(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Keys covered by this level.
    pub fn key_count(&self) -> usize {
        self.sets.last().map_or(0, SparseSet::flat_end)
    }

    #[inline]
    pub fn uses_binary_search(&self) -> bool {
        self.sets.len() >= self.indexing.linear_lookup_max
    }

    /// The set containing `key`, using the level's lookup strategy.
    #[inline]
    pub fn find(&self, key: i32) -> Option<&'a SparseSet> {
        if self.uses_binary_search() {
            self.find_binary(key)
        } else {
            self.find_linear(key)
        }
    }

    /// Front-to-back scan that stops at the first set ending at or after `key`.
    pub fn find_linear(&self, key: i32) -> Option<&'a SparseSet> {
        for set in self.sets {
            if set.stop >= key {
                return (set.start <= key).then_some(set);
            }
        }
        None
    }

    pub fn find_binary(&self, key: i32) -> Option<&'a SparseSet> {
        let mut lo = 0;
        let mut hi = self.sets.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let set = &self.sets[mid];
            if key < set.start {
                hi = mid;
            } else if key > set.stop {
                lo = mid + 1;
            } else {
                return Some(set);
            }
        }
        None
    }

    #[inline]
    pub fn flat_index(&self, key: i32) -> Option<usize> {
        self.find(key).map(|set| set.flat_offset(key))
    }

    /// Flat position of `key` together with the level nested under it.
    #[inline]
    pub fn descend(&self, key: i32) -> Option<(usize, Option<Level<'a>>)> {
        let set = self.find(key)?;
        Some((set.flat_offset(key), self.child(set)))
    }

    /// The set holding flat position `flat`.
    pub fn set_at_flat(&self, flat: usize) -> Option<&'a SparseSet> {
        let pos = self.sets.partition_point(|s| s.flat_end() <= flat);
        self.sets.get(pos).filter(|s| s.base_location <= flat)
    }

    /// Inverse of [`Level::flat_index`].
    pub fn sparse_index(&self, flat: usize) -> Option<i32> {
        let set = self.set_at_flat(flat)?;
        Some((i64::from(set.start) + (flat - set.base_location) as i64) as i32)
    }

    /// The level nested under `set`, which must belong to this index.
    #[inline]
    pub fn child(&self, set: &SparseSet) -> Option<Level<'a>> {
        set.sub_index.map(|id| self.indexing.level(id))
    }

    /// Ascending covered keys. The iterator is lazy and cheap to clone.
    pub fn keys(&self) -> ValidIndexes<'a> {
        ValidIndexes {
            sets: self.sets.iter(),
            current: None,
        }
    }
}

/// Lazy iterator over the keys of one level.
#[derive(Debug, Clone)]
pub struct ValidIndexes<'a> {
    sets: std::slice::Iter<'a, SparseSet>,
    current: Option<RangeInclusive<i32>>,
}

impl<'a> ValidIndexes<'a> {
    /// An iterator yielding nothing.
    pub fn empty() -> Self {
        let sets: &'a [SparseSet] = &[];
        ValidIndexes {
            sets: sets.iter(),
            current: None,
        }
    }
}

impl Iterator for ValidIndexes<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        loop {
            if let Some(key) = self.current.as_mut().and_then(Iterator::next) {
                return Some(key);
            }
            let set = self.sets.next()?;
            self.current = Some(set.start..=set.stop);
        }
    }
}

impl FusedIterator for ValidIndexes<'_> {}

fn check_levels(levels: &[&[SparseSet]], check_bases: bool) -> Diagnostics {
    let mut diag = Diagnostics::new();
    let mut depths: Vec<Option<usize>> = Vec::with_capacity(levels.len());

    for (id, sets) in levels.iter().enumerate() {
        let mut level_depth: Option<usize> = None;
        let mut mixed = false;
        let mut expected_base = 0usize;

        for (pos, set) in sets.iter().enumerate() {
            let entity = set.range().to_string();

            if set.start > set.stop {
                diag.add_error_at_level("inverted", "range stops before it starts", id, &entity);
            }

            if pos > 0 {
                let prev = &sets[pos - 1];
                if prev.stop >= set.start {
                    diag.add_error_at_level(
                        "order",
                        format!("range follows {} out of order or overlapping", prev.range()),
                        id,
                        &entity,
                    );
                } else if prev.sub_index.is_none()
                    && set.sub_index.is_none()
                    && i64::from(prev.stop) + 1 == i64::from(set.start)
                {
                    diag.add_warning_at_level(
                        "compaction",
                        format!("range touches {} and could be merged", prev.range()),
                        id,
                        &entity,
                    );
                }
            }

            let depth = match set.sub_index {
                None => Some(1),
                Some(sub) if sub.value() >= id => {
                    diag.add_error_at_level(
                        "structure",
                        format!("sub-level {} is not below level {}", sub.value(), id),
                        id,
                        &entity,
                    );
                    None
                }
                Some(sub) => {
                    if levels[sub.value()].is_empty() {
                        diag.add_error_at_level(
                            "structure",
                            format!("sub-level {} is empty", sub.value()),
                            id,
                            &entity,
                        );
                    }
                    depths[sub.value()].map(|d| d + 1)
                }
            };
            if let Some(depth) = depth {
                match level_depth {
                    None => level_depth = Some(depth),
                    Some(existing) if existing != depth && !mixed => {
                        mixed = true;
                        diag.add_error_at_level(
                            "structure",
                            format!("level mixes depths {} and {}", existing, depth),
                            id,
                            &entity,
                        );
                    }
                    Some(_) => {}
                }
            }

            if check_bases && set.base_location != expected_base {
                diag.add_error_at_level(
                    "base-location",
                    format!(
                        "base location {} should be {}",
                        set.base_location, expected_base
                    ),
                    id,
                    &entity,
                );
            }
            expected_base += set.len();
        }

        depths.push(level_depth);
    }

    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SparseIndexing {
        let mut builder = IndexBuilder::new();
        let root = builder.push_level(vec![
            SparseSet::new(5, 7),
            SparseSet::new(10, 11),
            SparseSet::new(20, 20),
        ]);
        builder.finish(root).unwrap()
    }

    #[test]
    fn base_locations_are_prefix_sums() {
        let index = sample();
        let bases: Vec<usize> = index.root().sets().iter().map(|s| s.base_location).collect();
        assert_eq!(bases, vec![0, 3, 5]);
        assert_eq!(index.key_count(), 6);
    }

    #[test]
    fn forward_and_inverse_transforms() {
        let index = sample();
        let root = index.root();
        for (flat, key) in [5, 6, 7, 10, 11, 20].into_iter().enumerate() {
            assert_eq!(root.flat_index(key), Some(flat));
            assert_eq!(root.sparse_index(flat), Some(key));
        }
        assert_eq!(root.flat_index(4), None);
        assert_eq!(root.flat_index(8), None);
        assert_eq!(root.flat_index(21), None);
        assert_eq!(root.sparse_index(6), None);
    }

    #[test]
    fn linear_and_binary_agree() {
        let index = sample();
        let root = index.root();
        for key in -3..25 {
            assert_eq!(root.find_linear(key), root.find_binary(key), "key {key}");
        }
    }

    #[test]
    fn threshold_selects_strategy() {
        let index = sample();
        assert!(!index.root().uses_binary_search());
        let binary = index.with_linear_lookup_max(0);
        assert!(binary.root().uses_binary_search());
        assert!(binary.shares_arena(&index));
        assert_eq!(binary, index);
    }

    #[test]
    fn compress_sorted_merges_runs() {
        let sets = compress_sorted([1, 2, 3, 7, 9, 10]);
        let ranges: Vec<Range> = sets.iter().map(SparseSet::range).collect();
        assert_eq!(
            ranges,
            vec![Range::new(1, 3), Range::singleton(7), Range::new(9, 10)]
        );
        assert_eq!(sets[2].base_location, 4);
    }

    #[test]
    fn extreme_keys_do_not_overflow() {
        let index = SparseIndexing::from_sets(vec![
            SparseSet::new(i32::MIN, i32::MIN + 1),
            SparseSet::new(i32::MAX - 1, i32::MAX),
        ])
        .unwrap();
        let root = index.root();
        assert_eq!(root.flat_index(i32::MAX), Some(3));
        assert_eq!(root.sparse_index(0), Some(i32::MIN));
        assert_eq!(root.keys().count(), 4);
    }

    #[test]
    fn rejects_overlapping_and_inverted_ranges() {
        let err = SparseIndexing::from_sets(vec![SparseSet::new(1, 5), SparseSet::new(4, 9)])
            .unwrap_err();
        assert!(err.to_string().contains("order"));

        let err = SparseIndexing::from_sets(vec![SparseSet::new(9, 3)]).unwrap_err();
        assert!(err.to_string().contains("inverted"));
    }

    #[test]
    fn rejects_forward_references_and_mixed_depth() {
        let mut builder = IndexBuilder::new();
        let root = builder.push_level(vec![SparseSet::with_sub_index(1, 1, LevelId::new(0))]);
        let err = builder.finish(root).unwrap_err();
        assert!(err.to_string().contains("not below"));

        let mut builder = IndexBuilder::new();
        let inner = builder.push_level(vec![SparseSet::new(1, 2)]);
        let root = builder.push_level(vec![
            SparseSet::with_sub_index(1, 1, inner),
            SparseSet::new(3, 3),
        ]);
        let diag = builder.validate();
        assert_eq!(diag.issues_by_category("structure").count(), 1);
        assert!(builder.finish(root).is_err());
    }

    #[test]
    fn touching_leaf_ranges_only_warn() {
        let mut builder = IndexBuilder::new();
        let root = builder.push_level(vec![SparseSet::new(1, 2), SparseSet::new(3, 4)]);
        let diag = builder.validate();
        assert!(!diag.has_errors());
        assert_eq!(diag.issues_by_category("compaction").count(), 1);
        assert_eq!(builder.finish(root).unwrap().key_count(), 4);
    }

    #[test]
    fn issues_name_their_level_and_range() {
        let mut builder = IndexBuilder::new();
        builder.push_level(vec![SparseSet::new(1, 2)]);
        builder.push_level(vec![SparseSet::new(2, 6), SparseSet::new(4, 9), SparseSet::new(10, 10)]);
        let diag = builder.validate();

        let order = diag.issues_by_category("order").next().unwrap();
        assert_eq!(order.level, Some(1));
        assert_eq!(order.entity.as_deref(), Some("4-9"));

        let compaction = diag.warnings().next().unwrap();
        assert_eq!(compaction.category, "compaction");
        assert_eq!(compaction.level, Some(1));
        assert_eq!(compaction.entity.as_deref(), Some("10"));
    }

    #[test]
    fn built_indexes_validate_clean() {
        let diag = sample().validate();
        assert!(!diag.has_issues(), "{diag}");
    }

    #[test]
    fn structural_equality_ignores_arena_identity() {
        let a = sample();
        let b = SparseIndexing::from_range_set(&RangeSet::from_keys(&[20, 11, 10, 7, 6, 5]));
        assert!(!a.shares_arena(&b));
        assert_eq!(a, b);
        let c = SparseIndexing::from_range_set(&RangeSet::from_keys(&[5, 6, 7]));
        assert_ne!(a, c);
    }

    #[test]
    fn nested_equality_compares_children() {
        let build = |inner_stop: i32| {
            let mut builder = IndexBuilder::new();
            let inner = builder.push_level(vec![SparseSet::new(1, inner_stop)]);
            let root = builder.push_level(vec![SparseSet::with_sub_index(1, 2, inner)]);
            builder.finish(root).unwrap()
        };
        assert_eq!(build(3), build(3));
        assert_ne!(build(3), build(4));
        assert_eq!(build(3).depth(), Some(2));
        assert!(SparseIndexing::empty().has_depth(3));
    }

    #[test]
    fn keys_iterator_is_restartable() {
        let index = sample();
        let keys = index.root().keys();
        let again = keys.clone();
        assert_eq!(keys.collect::<Vec<_>>(), again.collect::<Vec<_>>());
        assert_eq!(ValidIndexes::empty().next(), None);
    }
}
