//! Checksumming stream wrappers
//!
//! Keep a running CRC-32 of every byte that passes through. Random access
//! would break the running sum, so `seek` is unsupported on both sides.

use crc32fast::Hasher;

use crate::error::{Result, StoreError};

use super::stream::{DataInput, DataOutput, IndexInput, IndexOutput};

/// Output that checksums everything written through it
pub struct ChecksumOutput {
    inner: Box<dyn IndexOutput>,
    hasher: Hasher,
}

impl ChecksumOutput {
    pub fn new(inner: Box<dyn IndexOutput>) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// CRC-32 of the bytes written so far
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Append the current checksum as a Long (not itself checksummed)
    pub fn write_checksum(&mut self) -> Result<u32> {
        let checksum = self.checksum();
        self.inner.write_long(checksum as i64)?;
        Ok(checksum)
    }

    /// Unwrap the underlying output
    pub fn into_inner(self) -> Box<dyn IndexOutput> {
        self.inner
    }
}

impl DataOutput for ChecksumOutput {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.hasher.update(&[b]);
        self.inner.write_byte(b)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.hasher.update(buf);
        self.inner.write_bytes(buf)
    }
}

impl IndexOutput for ChecksumOutput {
    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn file_pointer(&self) -> u64 {
        self.inner.file_pointer()
    }

    fn seek(&mut self, _pos: u64) -> Result<()> {
        Err(StoreError::Unsupported("seek on a checksum output".to_string()))
    }

    fn length(&self) -> Result<u64> {
        self.inner.length()
    }
}

/// Input that checksums everything read through it
pub struct ChecksumInput {
    inner: Box<dyn IndexInput>,
    hasher: Hasher,
}

impl ChecksumInput {
    pub fn new(inner: Box<dyn IndexInput>) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// CRC-32 of the bytes read so far
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Read a trailing checksum Long and compare it with the running sum
    pub fn verify_checksum(&mut self) -> Result<()> {
        let actual = self.checksum();
        let expected = self.inner.read_long()?;
        if expected != actual as i64 {
            return Err(StoreError::Corrupt(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                expected, actual
            )));
        }
        Ok(())
    }
}

impl DataInput for ChecksumInput {
    fn read_byte(&mut self) -> Result<u8> {
        let b = self.inner.read_byte()?;
        self.hasher.update(&[b]);
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_bytes(buf)?;
        self.hasher.update(buf);
        Ok(())
    }
}

impl IndexInput for ChecksumInput {
    fn file_pointer(&self) -> u64 {
        self.inner.file_pointer()
    }

    fn seek(&mut self, _pos: u64) -> Result<()> {
        Err(StoreError::Unsupported("seek on a checksum input".to_string()))
    }

    fn length(&self) -> u64 {
        self.inner.length()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
