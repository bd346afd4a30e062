//! Inclusive integer ranges and range-compressed key sets.
//!
//! A [`RangeSet`] is the compact form of a set of zone numbers: keys that follow
//! each other by one collapse into a single [`Range`], so a zone system such as
//! `1..=5000` with a handful of holes costs a few dozen records instead of
//! thousands.
//!
//! # Textual grammar
//!
//! Range sets are frequently configured by hand. The grammar is a comma
//! separated list of tokens:
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `n`   | the single key `n` |
//! | `a-b` | every key from `a` to `b`, inclusive |
//! | `a+`  | every key from `a` up to `i32::MAX` |
//!
//! [`IndexedRangeSet`] prefixes each token with a category index: `0:0-15,1:16-25,2:26+`.
//!
//! ```
//! use zone_core::range::{Range, RangeSet};
//!
//! let zones: RangeSet = "1-3, 7, 10+".parse().unwrap();
//! assert_eq!(zones.len(), 3);
//! assert!(zones.contains(2));
//! assert!(!zones.contains(8));
//! assert_eq!(zones.to_string(), "1-3,7,10+");
//! assert_eq!(RangeSet::from_keys(&[3, 1, 2, 9]).as_slice(), &[Range::new(1, 3), Range::singleton(9)]);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing the range grammar.
///
/// Parsing never panics; every malformed input maps to one of these variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    #[error("no number was inserted before a range at position {position}")]
    MissingStart { position: usize },

    #[error("ended while reading a range's end value at position {position}")]
    MissingStop { position: usize },

    #[error("unrecognized symbol '{symbol}' at position {position}")]
    UnrecognizedSymbol { symbol: char, position: usize },

    #[error("the number at position {position} does not fit in a 32-bit integer")]
    Overflow { position: usize },

    #[error("the range {start}-{stop} ends before it starts")]
    Inverted { start: i32, stop: i32 },

    #[error("empty entry at position {position}")]
    EmptyEntry { position: usize },

    #[error("missing 'index:' prefix at position {position}")]
    MissingIndex { position: usize },

    #[error("the index {index} was defined more than once")]
    DuplicateIndex { index: i32 },
}

/// An inclusive run of integer keys, `start <= stop`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Range {
    pub start: i32,
    pub stop: i32,
}

impl Range {
    #[inline]
    pub const fn new(start: i32, stop: i32) -> Self {
        Self { start, stop }
    }

    #[inline]
    pub const fn singleton(key: i32) -> Self {
        Self::new(key, key)
    }

    /// Open range from `start` to `i32::MAX`.
    #[inline]
    pub const fn open(start: i32) -> Self {
        Self::new(start, i32::MAX)
    }

    /// Half-open membership: `start <= value < stop`.
    #[inline]
    pub fn contains(&self, value: i32) -> bool {
        self.start <= value && value < self.stop
    }

    #[inline]
    pub fn contains_inclusive(&self, value: i32) -> bool {
        self.start <= value && value <= self.stop
    }

    /// True when the two inclusive ranges share at least one key.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }

    /// Number of keys covered.
    #[inline]
    pub fn len(&self) -> u64 {
        (i64::from(self.stop) - i64::from(self.start) + 1).max(0) as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stop < self.start
    }

    pub fn keys(&self) -> RangeInclusive<i32> {
        self.start..=self.stop
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.stop {
            write!(f, "{}", self.start)
        } else if self.stop == i32::MAX {
            write!(f, "{}+", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.stop)
        }
    }
}

impl FromStr for Range {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_range_token(s, 0)
    }
}

/// Ordered, disjoint, minimal set of ranges.
///
/// Immutable once built: the only way to obtain one is from keys, from ranges
/// (which are normalised), or by parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Range>", into = "Vec<Range>")]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the minimal range cover of an unsorted key list.
    ///
    /// Keys differing by one share a range. Duplicates fold into their run.
    pub fn from_keys(keys: &[i32]) -> Self {
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        let mut ranges: Vec<Range> = Vec::new();
        for key in sorted {
            match ranges.last_mut() {
                Some(last) if i64::from(key) <= i64::from(last.stop) + 1 => {
                    last.stop = last.stop.max(key);
                }
                _ => ranges.push(Range::singleton(key)),
            }
        }
        Self { ranges }
    }

    /// Normalises arbitrary ranges: sorts them and merges overlapping or touching runs.
    /// Inverted ranges are dropped.
    pub fn from_ranges(ranges: impl IntoIterator<Item = Range>) -> Self {
        let mut input: Vec<Range> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
        input.sort_unstable();
        let mut merged: Vec<Range> = Vec::with_capacity(input.len());
        for range in input {
            match merged.last_mut() {
                Some(last) if i64::from(range.start) <= i64::from(last.stop) + 1 => {
                    last.stop = last.stop.max(range.stop);
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// Parses the comma separated grammar. Blank input yields an empty set.
    ///
    /// The result is normalised like [`RangeSet::from_ranges`]: ranges come
    /// back sorted, and overlapping or touching tokens are merged, so
    /// `"8-9, 1-3, 2-5"` yields `1-5, 8-9`. Token order is not preserved.
    pub fn try_parse(input: &str) -> Result<Self, RangeParseError> {
        let mut ranges = Vec::new();
        for (position, token) in tokens(input) {
            ranges.push(parse_range_token(token, position)?);
        }
        Ok(Self::from_ranges(ranges))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Range> {
        self.ranges.get(index)
    }

    pub fn as_slice(&self) -> &[Range] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Range> {
        self.ranges.iter()
    }

    /// Total number of keys covered.
    pub fn key_count(&self) -> u64 {
        self.ranges.iter().map(Range::len).sum()
    }

    /// Every covered key in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.ranges.iter().flat_map(Range::keys)
    }

    pub fn contains(&self, number: i32) -> bool {
        self.index_of(number).is_some()
    }

    /// Position of the range containing `number`.
    pub fn index_of(&self, number: i32) -> Option<usize> {
        let pos = self.ranges.partition_point(|r| r.stop < number);
        self.ranges
            .get(pos)
            .filter(|r| r.start <= number)
            .map(|_| pos)
    }

    /// Position of a range identical to `range`.
    pub fn index_of_range(&self, range: &Range) -> Option<usize> {
        self.ranges.binary_search(range).ok()
    }

    pub fn contains_range(&self, range: &Range) -> bool {
        self.index_of_range(range).is_some()
    }

    pub fn overlaps(&self, range: &Range) -> bool {
        let pos = self.ranges.partition_point(|r| r.stop < range.start);
        self.ranges
            .get(pos)
            .map_or(false, |r| r.start <= range.stop)
    }

    pub fn overlaps_set(&self, other: &RangeSet) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a, b) = (&self.ranges[i], &other.ranges[j]);
            if a.overlaps(b) {
                return true;
            }
            if a.stop < b.stop {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }
}

impl From<Vec<Range>> for RangeSet {
    fn from(ranges: Vec<Range>) -> Self {
        Self::from_ranges(ranges)
    }
}

impl From<RangeSet> for Vec<Range> {
    fn from(set: RangeSet) -> Self {
        set.ranges
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

impl FromStr for RangeSet {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s)
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

/// Ranges tagged with a category index, e.g. age groups `0:0-15,1:16-25,2:26+`.
///
/// Entries are kept sorted by index. Ranges of different entries may overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IndexedRangeSet {
    entries: Vec<(i32, Range)>,
}

impl IndexedRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_parse(input: &str) -> Result<Self, RangeParseError> {
        let mut entries: Vec<(i32, Range)> = Vec::new();
        for (position, token) in tokens(input) {
            let (index_text, range_text) = token
                .split_once(':')
                .ok_or(RangeParseError::MissingIndex { position })?;
            let index = parse_number(index_text, position)?;
            let range = parse_range_token(range_text, position + index_text.len() + 1)?;
            entries.push((index, range));
        }
        entries.sort_by_key(|(index, _)| *index);
        if let Some(w) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(RangeParseError::DuplicateIndex { index: w[0].0 });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: i32) -> Option<Range> {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    pub fn contains_key(&self, index: i32) -> bool {
        self.get(index).is_some()
    }

    /// Lowest index whose range contains `value` (inclusive).
    pub fn find_index(&self, value: i32) -> Option<i32> {
        self.entries
            .iter()
            .find(|(_, range)| range.contains_inclusive(value))
            .map(|(index, _)| *index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, Range)> + '_ {
        self.entries.iter().copied()
    }
}

impl FromStr for IndexedRangeSet {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s)
    }
}

impl fmt::Display for IndexedRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (index, range)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{index}:{range}")?;
        }
        Ok(())
    }
}

/// Comma separated tokens with their byte offsets. Blank input has no tokens.
fn tokens(input: &str) -> impl Iterator<Item = (usize, &str)> {
    let blank = input.trim().is_empty();
    let mut offset = 0;
    input
        .split(',')
        .filter(move |_| !blank)
        .map(move |token| {
            let position = offset;
            offset += token.len() + 1;
            (position, token)
        })
}

fn parse_range_token(token: &str, position: usize) -> Result<Range, RangeParseError> {
    let lead = token.len() - token.trim_start().len();
    let token = token.trim();
    if token.is_empty() {
        return Err(RangeParseError::EmptyEntry { position });
    }
    let position = position + lead;
    if let Some(start) = token.strip_suffix('+') {
        return Ok(Range::open(parse_number(start, position)?));
    }
    match token.split_once('-') {
        Some((start_text, stop)) => {
            let start = parse_number(start_text, position)?;
            if stop.trim().is_empty() {
                return Err(RangeParseError::MissingStop { position });
            }
            let stop = parse_number(stop, position + start_text.len() + 1)?;
            if stop < start {
                return Err(RangeParseError::Inverted { start, stop });
            }
            Ok(Range::new(start, stop))
        }
        None => parse_number(token, position).map(Range::singleton),
    }
}

fn parse_number(text: &str, position: usize) -> Result<i32, RangeParseError> {
    let position = position + (text.len() - text.trim_start().len());
    let text = text.trim();
    if text.is_empty() {
        return Err(RangeParseError::MissingStart { position });
    }
    if let Some((i, symbol)) = text.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        return Err(RangeParseError::UnrecognizedSymbol {
            symbol,
            position: position + i,
        });
    }
    text.parse::<i32>()
        .map_err(|_| RangeParseError::Overflow { position })
}
