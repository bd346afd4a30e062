//! Little-endian binary layout for [`SparseArray`].
//!
//! ```text
//! i32  highest populated flat index (0 when nothing is populated)
//! i32  layout version (2)
//! i32  values per cell
//! i32  range count n
//! n × (i32 start, i32 stop, i64 byte offset)
//! f32 × values per cell, for each written cell in flat order
//! ```
//!
//! A range's byte offset is `12 + 8 * n` plus `4 * values per cell` for every
//! key of the ranges before it. Readers reject tables whose offsets deviate
//! from that formula.
//!
//! Cells are written in flat order up to the highest populated one. An
//! unpopulated cell below it is written as zeros so later cells keep their
//! positions; cells above it are left out and read back as `T::default()`.

use crate::error::{ZoneIoError, ZoneIoResult};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, warn};
use zone_core::{IndexBuilder, SparseArray, SparseSet};

/// Layout version written and accepted.
pub const LAYOUT_VERSION: i32 = 2;

const HEADER_BYTES: i64 = 12;
const VALUE_BYTES: usize = 4;

/// Fixed header plus index table of a saved array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutHeader {
    pub highest_populated: i32,
    pub version: i32,
    pub types_per_cell: i32,
    /// `(start, stop, byte offset)` per range.
    pub ranges: Vec<(i32, i32, i64)>,
}

impl LayoutHeader {
    /// Header describing `sets` with `types_per_cell` values per key.
    ///
    /// Fails when an offset does not fit in an `i64`.
    pub fn for_sets(
        sets: &[SparseSet],
        types_per_cell: i32,
        highest_populated: i32,
    ) -> ZoneIoResult<Self> {
        let overflow = || {
            ZoneIoError::InvalidHeader(format!(
                "byte offsets overflow for {} ranges of {types_per_cell} values per cell",
                sets.len()
            ))
        };
        let cell_bytes = i64::from(types_per_cell) * VALUE_BYTES as i64;
        let mut offset = first_offset(sets.len()).ok_or_else(overflow)?;
        let mut ranges = Vec::with_capacity(sets.len());
        for set in sets {
            ranges.push((set.start, set.stop, offset));
            offset = i64::try_from(set.len())
                .ok()
                .and_then(|keys| keys.checked_mul(cell_bytes))
                .and_then(|bytes| offset.checked_add(bytes))
                .ok_or_else(overflow)?;
        }
        Ok(Self {
            highest_populated,
            version: LAYOUT_VERSION,
            types_per_cell,
            ranges,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> ZoneIoResult<()> {
        writer.write_all(&self.highest_populated.to_le_bytes())?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.types_per_cell.to_le_bytes())?;
        writer.write_all(&(self.ranges.len() as i32).to_le_bytes())?;
        for &(start, stop, offset) in &self.ranges {
            writer.write_all(&start.to_le_bytes())?;
            writer.write_all(&stop.to_le_bytes())?;
            writer.write_all(&offset.to_le_bytes())?;
        }
        Ok(())
    }

    /// Reads and checks the header and index table.
    pub fn read_from<R: Read>(reader: &mut R) -> ZoneIoResult<Self> {
        let highest_populated = read_i32(reader, "header")?;
        let version = read_i32(reader, "header")?;
        if version != LAYOUT_VERSION {
            return Err(ZoneIoError::UnsupportedVersion {
                found: version,
                expected: LAYOUT_VERSION,
            });
        }
        let types_per_cell = read_i32(reader, "header")?;
        if types_per_cell < 1 {
            return Err(ZoneIoError::InvalidHeader(format!(
                "{types_per_cell} values per cell"
            )));
        }
        let range_count = read_i32(reader, "header")?;
        let range_count = usize::try_from(range_count).map_err(|_| {
            ZoneIoError::InvalidHeader(format!("negative range count {range_count}"))
        })?;

        let mut ranges = Vec::with_capacity(range_count.min(1 << 16));
        for _ in 0..range_count {
            let start = read_i32(reader, "index table")?;
            let stop = read_i32(reader, "index table")?;
            let mut offset = [0u8; 8];
            read_exact(reader, &mut offset, "index table")?;
            ranges.push((start, stop, i64::from_le_bytes(offset)));
        }

        let header = Self {
            highest_populated,
            version,
            types_per_cell,
            ranges,
        };
        header.check_offsets()?;
        Ok(header)
    }

    pub fn sets(&self) -> Vec<SparseSet> {
        self.ranges
            .iter()
            .map(|&(start, stop, _)| SparseSet::new(start, stop))
            .collect()
    }

    fn cell_bytes(&self) -> usize {
        self.types_per_cell as usize * VALUE_BYTES
    }

    fn check_offsets(&self) -> ZoneIoResult<()> {
        let expected = Self::for_sets(&self.sets(), self.types_per_cell, self.highest_populated)?;
        for (found, wanted) in self.ranges.iter().zip(&expected.ranges) {
            if found.2 != wanted.2 {
                return Err(ZoneIoError::InvalidHeader(format!(
                    "range {}-{} starts at byte {} but should start at {}",
                    found.0, found.1, found.2, wanted.2
                )));
            }
        }
        Ok(())
    }
}

fn first_offset(range_count: usize) -> Option<i64> {
    i64::try_from(range_count)
        .ok()?
        .checked_mul(8)?
        .checked_add(HEADER_BYTES)
}

/// Writes `array`, turning each value into `types_per_cell` floats with
/// `decompose`. `None` marks an unpopulated cell.
pub fn write_sparse_array<T, W, F>(
    writer: &mut W,
    array: &SparseArray<T>,
    types_per_cell: usize,
    decompose: F,
) -> ZoneIoResult<()>
where
    W: Write,
    F: Fn(&T) -> Option<Vec<f32>>,
{
    let types = i32::try_from(types_per_cell)
        .ok()
        .filter(|&t| t >= 1)
        .ok_or_else(|| ZoneIoError::InvalidHeader(format!("{types_per_cell} values per cell")))?;

    let mut cells = Vec::with_capacity(array.len());
    for (key, value) in array.iter() {
        let cell = decompose(value);
        if let Some(values) = &cell {
            if values.len() != types_per_cell {
                return Err(ZoneIoError::CellWidth {
                    key,
                    expected: types_per_cell,
                    actual: values.len(),
                });
            }
        }
        cells.push(cell);
    }
    let written = cells.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
    let highest = written.saturating_sub(1) as i32;

    let header = LayoutHeader::for_sets(array.indexing().root().sets(), types, highest)?;
    header.write_to(writer)?;

    let zeros = vec![0.0f32; types_per_cell];
    for cell in &cells[..written] {
        for value in cell.as_deref().unwrap_or(zeros.as_slice()) {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    debug!(
        ranges = header.ranges.len(),
        keys = array.len(),
        cells = written,
        types_per_cell,
        "wrote sparse array"
    );
    Ok(())
}

/// Writes a single-value array with every cell populated.
pub fn write_f32_array<W: Write>(writer: &mut W, array: &SparseArray<f32>) -> ZoneIoResult<()> {
    write_sparse_array(writer, array, 1, |&v| Some(vec![v]))
}

/// Reads an array, building each value from its key and its floats with `make`.
pub fn read_sparse_array<T, R, F>(reader: &mut R, make: F) -> ZoneIoResult<SparseArray<T>>
where
    T: Default,
    R: Read,
    F: Fn(i32, &[f32]) -> T,
{
    let header = LayoutHeader::read_from(reader)?;

    let mut builder = IndexBuilder::new();
    let root = builder.push_level(header.sets());
    let diagnostics = builder.validate();
    for issue in diagnostics.warnings() {
        warn!(%issue, "sparse array index");
    }
    let indexing = builder.finish(root)?;
    let key_count = indexing.key_count();

    if header.highest_populated < 0
        || (key_count > 0 && header.highest_populated as usize >= key_count)
    {
        return Err(ZoneIoError::InvalidHeader(format!(
            "highest populated index {} outside {} keys",
            header.highest_populated, key_count
        )));
    }

    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;
    let cell_bytes = header.cell_bytes();
    if payload.len() % cell_bytes != 0 {
        return Err(ZoneIoError::PartialCell {
            bytes: payload.len(),
            cell_bytes,
        });
    }
    let cells = payload.len() / cell_bytes;
    if cells > key_count {
        return Err(ZoneIoError::InvalidHeader(format!(
            "payload holds {cells} cells for {key_count} keys"
        )));
    }
    // An empty payload means nothing was populated; otherwise it must reach
    // the highest populated cell exactly.
    let expected_cells = header.highest_populated as usize + 1;
    if cells > 0 && cells != expected_cells {
        return Err(ZoneIoError::CellCount {
            cells,
            expected: expected_cells,
        });
    }
    if cells == 0 && header.highest_populated != 0 {
        return Err(ZoneIoError::Truncated { section: "payload" });
    }

    let values: Vec<f32> = payload
        .chunks_exact(VALUE_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let types = header.types_per_cell as usize;
    let data: Vec<T> = indexing
        .root()
        .keys()
        .enumerate()
        .map(|(flat, key)| match values.get(flat * types..(flat + 1) * types) {
            Some(cell) => make(key, cell),
            None => T::default(),
        })
        .collect();

    debug!(
        ranges = header.ranges.len(),
        keys = key_count,
        cells,
        types_per_cell = types,
        "read sparse array"
    );
    Ok(SparseArray::new(indexing, Some(data))?)
}

/// Reads a single-value array.
pub fn read_f32_array<R: Read>(reader: &mut R) -> ZoneIoResult<SparseArray<f32>> {
    read_sparse_array(reader, |_, cell| cell[0])
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], section: &'static str) -> ZoneIoResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ZoneIoError::Truncated { section },
        _ => ZoneIoError::Io(e),
    })
}

fn read_i32<R: Read>(reader: &mut R, section: &'static str) -> ZoneIoResult<i32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, section)?;
    Ok(i32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> SparseArray<f32> {
        SparseArray::create_sparse_array(&[5, 6, 7, 10, 11, 20], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
    }

    fn i32_at(bytes: &[u8], at: usize) -> i32 {
        i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn i64_at(bytes: &[u8], at: usize) -> i64 {
        i64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
    }

    #[test]
    fn header_and_offsets_follow_the_layout() {
        let mut bytes = Vec::new();
        write_sparse_array(&mut bytes, &sample(), 2, |&v| Some(vec![v, -v])).unwrap();

        assert_eq!(i32_at(&bytes, 0), 5);
        assert_eq!(i32_at(&bytes, 4), LAYOUT_VERSION);
        assert_eq!(i32_at(&bytes, 8), 2);
        assert_eq!(i32_at(&bytes, 12), 3);

        // (5-7), (10-11), (20): offsets start at 12 + 8*3 and advance 8 bytes per key
        let table = 16;
        assert_eq!((i32_at(&bytes, table), i32_at(&bytes, table + 4)), (5, 7));
        assert_eq!(i64_at(&bytes, table + 8), 36);
        assert_eq!(i64_at(&bytes, table + 24), 36 + 3 * 8);
        assert_eq!(i64_at(&bytes, table + 40), 36 + 5 * 8);

        let payload = table + 3 * 16;
        assert_eq!(bytes.len(), payload + 6 * 2 * 4);
        let first = f32::from_le_bytes(bytes[payload + 4..payload + 8].try_into().unwrap());
        assert_eq!(first, -1.0);
    }

    #[test]
    fn unpopulated_tail_is_not_written() {
        let mut bytes = Vec::new();
        let array = sample();
        write_sparse_array(&mut bytes, &array, 1, |&v| (v < 3.5).then(|| vec![v])).unwrap();
        assert_eq!(i32_at(&bytes, 0), 2);
        assert_eq!(bytes.len(), 16 + 3 * 16 + 3 * 4);

        let loaded = read_f32_array(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(loaded.flat_data(), &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        assert!(loaded.is_same_zone_system(&array));
    }

    #[test]
    fn gaps_below_the_highest_cell_are_zero_filled() {
        let mut bytes = Vec::new();
        write_sparse_array(&mut bytes, &sample(), 1, |&v| (v != 2.0).then(|| vec![v])).unwrap();
        let loaded = read_f32_array(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(loaded.flat_data(), &[1.0, 0.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn nothing_populated() {
        let mut bytes = Vec::new();
        write_sparse_array(&mut bytes, &sample(), 1, |_| None).unwrap();
        assert_eq!(i32_at(&bytes, 0), 0);
        let loaded = read_f32_array(&mut Cursor::new(bytes)).unwrap();
        assert!(loaded.flat_data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn cell_width_is_enforced() {
        let err = write_sparse_array(&mut Vec::new(), &sample(), 2, |&v| Some(vec![v]))
            .unwrap_err();
        assert!(matches!(
            err,
            ZoneIoError::CellWidth {
                key: 5,
                expected: 2,
                actual: 1
            }
        ));
        assert!(write_f32_array(&mut Vec::new(), &sample()).is_ok());
        assert!(matches!(
            write_sparse_array(&mut Vec::new(), &sample(), 0, |_| None),
            Err(ZoneIoError::InvalidHeader(_))
        ));
    }

    #[test]
    fn rejects_other_versions() {
        let mut bytes = Vec::new();
        write_f32_array(&mut bytes, &sample()).unwrap();
        bytes[4..8].copy_from_slice(&1i32.to_le_bytes());
        let err = read_f32_array(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(
            err,
            ZoneIoError::UnsupportedVersion { found: 1, .. }
        ));
    }

    #[test]
    fn rejects_tampered_offsets() {
        let mut bytes = Vec::new();
        write_f32_array(&mut bytes, &sample()).unwrap();
        bytes[16 + 16 + 8..16 + 16 + 16].copy_from_slice(&99i64.to_le_bytes());
        let err = read_f32_array(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("should start at"));
    }

    #[test]
    fn rejects_truncated_input() {
        let mut bytes = Vec::new();
        write_f32_array(&mut bytes, &sample()).unwrap();

        let err = read_f32_array(&mut Cursor::new(&bytes[..20])).unwrap_err();
        assert!(matches!(
            err,
            ZoneIoError::Truncated {
                section: "index table"
            }
        ));

        let err = read_f32_array(&mut Cursor::new(&bytes[..bytes.len() - 2])).unwrap_err();
        assert!(matches!(err, ZoneIoError::PartialCell { cell_bytes: 4, .. }));
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let header =
            LayoutHeader::for_sets(&[SparseSet::new(1, 5), SparseSet::new(3, 8)], 1, 0).unwrap();
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        let err = read_f32_array(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, ZoneIoError::Sparse(_)));
    }

    #[test]
    fn rejects_a_missing_trailing_cell() {
        let mut bytes = Vec::new();
        write_f32_array(&mut bytes, &sample()).unwrap();
        bytes.truncate(bytes.len() - 4);

        let err = read_f32_array(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(
            err,
            ZoneIoError::CellCount {
                cells: 5,
                expected: 6
            }
        ));
    }

    #[test]
    fn rejects_a_payload_with_every_cell_missing() {
        let mut bytes = Vec::new();
        write_f32_array(&mut bytes, &sample()).unwrap();
        bytes.truncate(16 + 3 * 16);

        let err = read_f32_array(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, ZoneIoError::Truncated { section: "payload" }));
    }

    #[test]
    fn overflowing_offsets_are_an_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&LAYOUT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        for (start, stop) in [(i32::MIN, i32::MAX - 2), (i32::MAX, i32::MAX)] {
            bytes.extend_from_slice(&start.to_le_bytes());
            bytes.extend_from_slice(&stop.to_le_bytes());
            bytes.extend_from_slice(&28i64.to_le_bytes());
        }

        let err = LayoutHeader::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, ZoneIoError::InvalidHeader(ref msg) if msg.contains("overflow")));
    }
}
