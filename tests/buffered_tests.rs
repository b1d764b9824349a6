//! Tests for the buffering layer
//!
//! These tests verify:
//! - Byte-at-a-time and bulk writes produce the same file
//! - Writes larger than the buffer bypass it without losing pending bytes
//! - Seek-and-overwrite leaves the rest of the file intact
//! - Input seeks inside and outside the buffered window

use std::path::PathBuf;
use std::sync::Arc;

use indexstore::store::{
    BufferedOutput, DataInput, DataOutput, Directory, FsDirectory, IndexInput, IndexOutput,
    RamDirectory, RawOutput, BUFFER_SIZE,
};
use indexstore::{Config, Result, StoreError};
use parking_lot::Mutex;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index");
    (temp_dir, path)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

fn read_all(dir: &dyn Directory, name: &str) -> Vec<u8> {
    let mut input = dir.open_input(name).unwrap();
    let mut bytes = vec![0u8; input.length() as usize];
    input.read_bytes(&mut bytes).unwrap();
    bytes
}

/// Raw sink that records each raw write
#[derive(Clone, Default)]
struct RecordingSink {
    data: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<Vec<usize>>>,
}

impl RawOutput for RecordingSink {
    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.data.lock().extend_from_slice(buf);
        self.writes.lock().push(buf.len());
        Ok(())
    }

    fn seek_raw(&mut self, _pos: u64) -> Result<()> {
        Err(StoreError::Unsupported("seek".to_string()))
    }

    fn raw_length(&self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn set_raw_length(&mut self, len: u64) -> Result<()> {
        self.data.lock().resize(len as usize, 0);
        Ok(())
    }

    fn close_raw(&mut self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Transparency Tests
// =============================================================================

#[test]
fn test_single_bytes_equal_bulk_write() {
    let (_temp, path) = setup_temp_dir();
    let dir = FsDirectory::open(&path).unwrap();

    let sizes = [0, 1, BUFFER_SIZE - 1, BUFFER_SIZE, BUFFER_SIZE + 1, 3 * BUFFER_SIZE + 123];
    for size in sizes {
        let data = pattern(size);

        let mut bulk = dir.create_output("bulk").unwrap();
        bulk.write_bytes(&data).unwrap();
        bulk.close().unwrap();

        let mut single = dir.create_output("single").unwrap();
        for &b in &data {
            single.write_byte(b).unwrap();
        }
        assert_eq!(single.file_pointer(), size as u64);
        single.close().unwrap();

        assert_eq!(read_all(&dir, "bulk"), data, "bulk write of {} bytes", size);
        assert_eq!(read_all(&dir, "single"), data, "byte writes of {} bytes", size);

        // Reading back one byte at a time crosses every refill boundary
        let mut input = dir.open_input("single").unwrap();
        for (i, &expected) in data.iter().enumerate() {
            assert_eq!(input.read_byte().unwrap(), expected, "byte {} of {}", i, size);
        }
    }
}

#[test]
fn test_odd_sized_chunks_with_small_buffer() {
    let (_temp, path) = setup_temp_dir();
    let config = Config::builder().buffer_size(64).build();
    let dir = FsDirectory::open_with_config(&path, config).unwrap();
    let data = pattern(1000);

    let mut out = dir.create_output("chunks").unwrap();
    for chunk in data.chunks(37) {
        out.write_bytes(chunk).unwrap();
    }
    out.close().unwrap();

    let mut input = dir.open_input_with_buffer("chunks", 50).unwrap();
    let mut back = Vec::new();
    for chunk in data.chunks(45) {
        let mut buf = vec![0u8; chunk.len()];
        input.read_bytes(&mut buf).unwrap();
        back.extend_from_slice(&buf);
    }
    assert_eq!(back, data);
}

// =============================================================================
// Large Write Bypass Tests
// =============================================================================

#[test]
fn test_large_write_bypasses_buffer() {
    let sink = RecordingSink::default();
    let mut out = BufferedOutput::new("big", sink.clone(), 16);

    out.write_bytes(&[1, 2, 3]).unwrap();
    out.write_bytes(&pattern(100)).unwrap();
    out.close().unwrap();

    // Pending bytes first, then the big write in one raw call
    assert_eq!(*sink.writes.lock(), vec![3, 100]);

    let mut expected = vec![1, 2, 3];
    expected.extend_from_slice(&pattern(100));
    assert_eq!(*sink.data.lock(), expected);
}

#[test]
fn test_exactly_full_buffer_is_flushed() {
    let sink = RecordingSink::default();
    let mut out = BufferedOutput::new("full", sink.clone(), 8);

    out.write_bytes(&[7; 5]).unwrap();
    out.write_bytes(&[8; 3]).unwrap();
    assert_eq!(*sink.writes.lock(), vec![8]);
    assert_eq!(out.file_pointer(), 8);
}

#[test]
fn test_large_write_after_pending_bytes_on_disk() {
    let (_temp, path) = setup_temp_dir();
    let dir = FsDirectory::open(&path).unwrap();
    let head = pattern(BUFFER_SIZE / 2);
    let big = pattern(BUFFER_SIZE * 3 + 5);

    let mut out = dir.create_output("big").unwrap();
    out.write_bytes(&head).unwrap();
    out.write_bytes(&big).unwrap();
    assert_eq!(out.file_pointer(), (head.len() + big.len()) as u64);
    out.close().unwrap();

    let mut expected = head.clone();
    expected.extend_from_slice(&big);
    assert_eq!(read_all(&dir, "big"), expected);
}

// =============================================================================
// Seek Tests
// =============================================================================

#[test]
fn test_seek_and_overwrite() {
    let (_temp, path) = setup_temp_dir();
    let dir = FsDirectory::open(&path).unwrap();
    let data = pattern(BUFFER_SIZE + 500);

    let mut out = dir.create_output("seek").unwrap();
    out.write_bytes(&data).unwrap();
    out.flush().unwrap();
    out.seek(100).unwrap();
    assert_eq!(out.file_pointer(), 100);
    out.write_bytes(&[0xEE; 10]).unwrap();
    assert_eq!(out.file_pointer(), 110);
    assert_eq!(out.length().unwrap(), data.len() as u64);
    out.close().unwrap();

    let mut expected = data.clone();
    expected[100..110].fill(0xEE);
    assert_eq!(read_all(&dir, "seek"), expected);
}

#[test]
fn test_seek_back_to_patch_header() {
    let dir = RamDirectory::new();

    let mut out = dir.create_output("header").unwrap();
    out.write_int(0).unwrap();
    out.write_bytes(&pattern(300)).unwrap();
    let end = out.file_pointer();
    out.seek(0).unwrap();
    out.write_int(300).unwrap();
    out.seek(end).unwrap();
    out.write_byte(9).unwrap();
    out.close().unwrap();

    let mut input = dir.open_input("header").unwrap();
    assert_eq!(input.read_int().unwrap(), 300);
    input.seek(end).unwrap();
    assert_eq!(input.read_byte().unwrap(), 9);
}

#[test]
fn test_input_seek_inside_and_outside_buffer() {
    let (_temp, path) = setup_temp_dir();
    let dir = FsDirectory::open(&path).unwrap();
    let data = pattern(10_000);

    let mut out = dir.create_output("data").unwrap();
    out.write_bytes(&data).unwrap();
    out.close().unwrap();

    let mut input = dir.open_input_with_buffer("data", 128).unwrap();
    input.seek(10).unwrap();
    assert_eq!(input.read_byte().unwrap(), data[10]);
    input.seek(5).unwrap();
    assert_eq!(input.file_pointer(), 5);
    assert_eq!(input.read_byte().unwrap(), data[5]);

    input.seek(9_000).unwrap();
    let mut buf = [0u8; 500];
    input.read_bytes(&mut buf).unwrap();
    assert_eq!(&buf[..], &data[9_000..9_500]);

    input.skip_bytes(100).unwrap();
    assert_eq!(input.file_pointer(), 9_600);
    assert_eq!(input.read_byte().unwrap(), data[9_600]);

    input.seek(20_000).unwrap();
    assert!(matches!(input.read_byte(), Err(StoreError::ReadPastEof { .. })));
}

#[test]
fn test_small_read_chunk_size() {
    let (_temp, path) = setup_temp_dir();
    let config = Config::builder().read_chunk_size(100).build();
    let dir = FsDirectory::open_with_config(&path, config).unwrap();
    let data = pattern(BUFFER_SIZE * 2 + 77);

    let mut out = dir.create_output("chunked").unwrap();
    out.write_bytes(&data).unwrap();
    out.close().unwrap();

    assert_eq!(read_all(&dir, "chunked"), data);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_write_after_close_fails() {
    let dir = RamDirectory::new();
    let mut out = dir.create_output("closed").unwrap();
    out.write_byte(1).unwrap();
    out.close().unwrap();
    out.close().unwrap();

    assert!(matches!(out.write_byte(2), Err(StoreError::AlreadyClosed(_))));
    assert_eq!(dir.file_length("closed").unwrap(), 1);
}

#[test]
fn test_drop_flushes_pending_bytes() {
    let dir = RamDirectory::new();
    {
        let mut out = dir.create_output("dropped").unwrap();
        out.write_bytes(&[4, 5, 6]).unwrap();
    }
    assert_eq!(read_all(&dir, "dropped"), vec![4, 5, 6]);
}
