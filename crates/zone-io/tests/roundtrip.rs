//! File round trips through the binary layout

use tempfile::TempDir;
use zone_core::SparseArray;
use zone_io::{load_sparse_array, save_sparse_array, ZoneIoError};

#[derive(Debug, Clone, Default, PartialEq)]
struct ZoneAttributes {
    population: f32,
    employment: f32,
    planning_district: f32,
}

fn zones() -> SparseArray<ZoneAttributes> {
    let keys = [101, 102, 103, 205, 206, 3000];
    let data = keys
        .iter()
        .map(|&k| ZoneAttributes {
            population: k as f32 * 2.0,
            employment: k as f32 / 4.0,
            planning_district: (k / 100) as f32,
        })
        .collect();
    SparseArray::create_sparse_array(&keys, data).unwrap()
}

#[test]
fn multi_value_cells_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zones.bin");
    let original = zones();

    save_sparse_array(&path, &original, 3, |z| {
        Some(vec![z.population, z.employment, z.planning_district])
    })
    .unwrap();

    let loaded = load_sparse_array(&path, |_, cell| ZoneAttributes {
        population: cell[0],
        employment: cell[1],
        planning_district: cell[2],
    })
    .unwrap();

    assert!(loaded.is_same_zone_system(&original));
    assert_eq!(loaded.valid_index_array(), original.valid_index_array());
    for key in original.valid_indexes() {
        assert_eq!(loaded[key], original[key]);
    }
}

#[test]
fn reader_receives_each_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.bin");
    let original = zones();
    save_sparse_array(&path, &original, 1, |z| Some(vec![z.population])).unwrap();

    let loaded: SparseArray<i32> = load_sparse_array(&path, |key, _| key).unwrap();
    for (key, &value) in loaded.iter() {
        assert_eq!(key, value);
    }
}

#[test]
fn empty_array_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.bin");
    let empty = SparseArray::<f32>::create_sparse_array(&[], Vec::new()).unwrap();
    save_sparse_array(&path, &empty, 1, |&v| Some(vec![v])).unwrap();

    let loaded: SparseArray<f32> = load_sparse_array(&path, |_, cell| cell[0]).unwrap();
    assert!(loaded.is_empty());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
}

#[test]
fn missing_file_reports_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.bin");
    let err = load_sparse_array(&path, |_, cell| -> f32 { cell[0] }).unwrap_err();
    assert!(format!("{err:#}").contains("absent.bin"));
}

#[test]
fn corrupt_file_keeps_the_layout_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.bin");
    let original = zones();
    save_sparse_array(&path, &original, 1, |z| Some(vec![z.population])).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 1);
    std::fs::write(&path, bytes).unwrap();

    let err = load_sparse_array(&path, |_, cell| -> f32 { cell[0] }).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ZoneIoError>(),
        Some(ZoneIoError::PartialCell { .. })
    ));
}
