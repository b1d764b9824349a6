//! Tests for RamDirectory
//!
//! These tests verify:
//! - The Directory contract holds for the in-memory backend
//! - In-process locking through the default lock factory
//! - Snapshotting another directory with copy_of

use std::path::PathBuf;

use indexstore::store::{DataInput, DataOutput, Directory, FsDirectory, IndexOutput, RamDirectory};
use indexstore::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index");
    (temp_dir, path)
}

fn write_bytes(dir: &dyn Directory, name: &str, data: &[u8]) {
    let mut out = dir.create_output(name).unwrap();
    out.write_bytes(data).unwrap();
    out.close().unwrap();
}

// =============================================================================
// Catalog Tests
// =============================================================================

#[test]
fn test_catalog_operations() {
    let dir = RamDirectory::new();
    assert!(dir.list_all().unwrap().is_empty());

    write_bytes(&dir, "b", &[1; 20]);
    write_bytes(&dir, "a", &[2; 5]);

    assert_eq!(dir.list_all().unwrap(), vec!["a", "b"]);
    assert_eq!(dir.file_length("b").unwrap(), 20);
    assert_eq!(dir.size_in_bytes(), 25);

    dir.rename_file("a", "c").unwrap();
    assert!(!dir.file_exists("a").unwrap());
    assert!(dir.file_exists("c").unwrap());

    dir.delete_file("b").unwrap();
    assert!(matches!(dir.delete_file("b"), Err(StoreError::FileNotFound(_))));
    assert!(matches!(dir.file_length("b"), Err(StoreError::FileNotFound(_))));
    assert!(matches!(dir.open_input("b"), Err(StoreError::FileNotFound(_))));
}

#[test]
fn test_touch_moves_modified_forward() {
    let dir = RamDirectory::new();
    write_bytes(&dir, "f", b"x");

    let before = dir.file_modified("f").unwrap();
    dir.touch_file("f").unwrap();
    assert!(dir.file_modified("f").unwrap() > before);
}

#[test]
fn test_create_output_truncates() {
    let dir = RamDirectory::new();
    write_bytes(&dir, "f", &[9; 100]);
    write_bytes(&dir, "f", &[1, 2]);
    assert_eq!(dir.file_length("f").unwrap(), 2);
}

#[test]
fn test_large_file_round_trip() {
    let dir = RamDirectory::new();
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
    write_bytes(&dir, "big", &data);

    let mut input = dir.open_input_with_buffer("big", 1000).unwrap();
    let mut back = vec![0u8; data.len()];
    input.read_bytes(&mut back[..10]).unwrap();
    input.read_bytes(&mut back[10..]).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_set_length_presizes_file() {
    let dir = RamDirectory::new();
    let mut out = dir.create_output("sized").unwrap();
    out.set_length(64).unwrap();
    out.write_int(7).unwrap();
    out.close().unwrap();

    assert_eq!(dir.file_length("sized").unwrap(), 64);
    let mut input = dir.open_input("sized").unwrap();
    assert_eq!(input.read_int().unwrap(), 7);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_closed_directory_rejects_operations() {
    let dir = RamDirectory::new();
    write_bytes(&dir, "f", b"x");
    dir.close().unwrap();

    assert!(matches!(dir.list_all(), Err(StoreError::AlreadyClosed(_))));
    assert!(matches!(dir.create_output("g"), Err(StoreError::AlreadyClosed(_))));
    assert!(matches!(dir.sync("f"), Err(StoreError::AlreadyClosed(_))));
}

#[test]
fn test_sync_checks_existence() {
    let dir = RamDirectory::new();
    write_bytes(&dir, "f", b"x");
    dir.sync("f").unwrap();
    assert!(matches!(dir.sync("missing"), Err(StoreError::FileNotFound(_))));
}

// =============================================================================
// Locking Tests
// =============================================================================

#[test]
fn test_locks_exclude_within_directory() {
    let dir = RamDirectory::new();
    let mut first = dir.make_lock("write.lock").unwrap();
    let mut second = dir.make_lock("write.lock").unwrap();

    assert!(first.obtain().unwrap());
    assert!(!second.obtain().unwrap());
    assert!(second.is_locked().unwrap());

    first.release().unwrap();
    assert!(second.obtain().unwrap());
    second.release().unwrap();
    assert!(!first.is_locked().unwrap());
}

#[test]
fn test_clear_lock_frees_name() {
    let dir = RamDirectory::new();
    let mut holder = dir.make_lock("write.lock").unwrap();
    assert!(holder.obtain().unwrap());

    dir.clear_lock("write.lock").unwrap();
    let mut other = dir.make_lock("write.lock").unwrap();
    assert!(other.obtain().unwrap());
}

#[test]
fn test_lock_name_carries_directory_prefix() {
    let dir = RamDirectory::new();
    let lock = dir.make_lock("write.lock").unwrap();
    assert_eq!(lock.name(), format!("{}-write.lock", dir.lock_id()));
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_copy_of_fs_directory() {
    let (_temp, path) = setup_temp_dir();
    let fs_dir = FsDirectory::open(&path).unwrap();
    write_bytes(&fs_dir, "one", &[1; 3]);
    write_bytes(&fs_dir, "two", &[2; 40_000]);

    let ram = RamDirectory::copy_of(&fs_dir).unwrap();
    assert_eq!(ram.list_all().unwrap(), vec!["one", "two"]);
    assert_eq!(ram.file_length("two").unwrap(), 40_000);

    // Source is left open and independent
    assert!(fs_dir.is_open());
    fs_dir.delete_file("one").unwrap();
    assert!(ram.file_exists("one").unwrap());
}
