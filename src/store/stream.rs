//! Stream contracts
//!
//! `DataOutput`/`DataInput` carry the byte-exact encodings every index format
//! is built from; `IndexOutput`/`IndexInput` add a file cursor on top.
//!
//! ## Encodings
//! ```text
//! Int     4 bytes, big-endian
//! Long    8 bytes: high Int then low Int (big-endian overall)
//! VInt    7 payload bits per byte, low group first, 0x80 = more bytes follow
//! VLong   same as VInt, up to 10 bytes
//! String  VInt byte length + UTF-8 bytes (no NUL, no BOM)
//! Map     Int entry count + (String key, String value) pairs
//! ```
//!
//! VInt/VLong are only defined for non-negative values. Negative values still
//! round-trip bit-for-bit but take the maximum width.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

use super::COPY_BUFFER_SIZE;

/// Longest legal VInt encoding
const MAX_VINT_BYTES: usize = 5;

/// Longest legal VLong encoding
const MAX_VLONG_BYTES: usize = 10;

// =============================================================================
// Output side
// =============================================================================

/// Sink of raw bytes with the index encodings layered on top
pub trait DataOutput: Send {
    /// Write a single byte
    fn write_byte(&mut self, b: u8) -> Result<()>;

    /// Write every byte of `buf`
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Write a 4-byte big-endian int
    fn write_int(&mut self, i: i32) -> Result<()> {
        self.write_bytes(&i.to_be_bytes())
    }

    /// Write an 8-byte long as two big-endian ints, high half first
    fn write_long(&mut self, i: i64) -> Result<()> {
        self.write_int((i >> 32) as i32)?;
        self.write_int(i as i32)
    }

    /// Write a variable-length int (1 to 5 bytes)
    fn write_vint(&mut self, i: i32) -> Result<()> {
        let mut v = i as u32;
        let mut scratch = [0u8; MAX_VINT_BYTES];
        let mut n = 0;
        while v & !0x7F != 0 {
            scratch[n] = (v & 0x7F) as u8 | 0x80;
            v >>= 7;
            n += 1;
        }
        scratch[n] = v as u8;
        self.write_bytes(&scratch[..=n])
    }

    /// Write a variable-length long (1 to 10 bytes)
    fn write_vlong(&mut self, i: i64) -> Result<()> {
        let mut v = i as u64;
        let mut scratch = [0u8; MAX_VLONG_BYTES];
        let mut n = 0;
        while v & !0x7F != 0 {
            scratch[n] = (v & 0x7F) as u8 | 0x80;
            v >>= 7;
            n += 1;
        }
        scratch[n] = v as u8;
        self.write_bytes(&scratch[..=n])
    }

    /// Write a length-prefixed UTF-8 string
    fn write_string(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        let len = i32::try_from(bytes.len()).map_err(|_| {
            StoreError::InvalidArgument(format!("string of {} bytes is too long", bytes.len()))
        })?;
        self.write_vint(len)?;
        self.write_bytes(bytes)
    }

    /// Write a string-to-string map (count, then key/value pairs in key order)
    fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        let count = i32::try_from(map.len()).map_err(|_| {
            StoreError::InvalidArgument(format!("map of {} entries is too large", map.len()))
        })?;
        self.write_int(count)?;
        for (key, value) in map {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Copy `num_bytes` from `input` into this output through a scratch buffer
    fn copy_bytes(&mut self, input: &mut dyn DataInput, num_bytes: i64) -> Result<()> {
        if num_bytes < 0 {
            return Err(StoreError::InvalidArgument(format!(
                "copy_bytes: num_bytes must be >= 0, got {}",
                num_bytes
            )));
        }

        let mut left = num_bytes as u64;
        let mut scratch = vec![0u8; (left.min(COPY_BUFFER_SIZE as u64) as usize).max(1)];
        while left > 0 {
            let chunk = left.min(scratch.len() as u64) as usize;
            input.read_bytes(&mut scratch[..chunk])?;
            self.write_bytes(&scratch[..chunk])?;
            left -= chunk as u64;
        }
        Ok(())
    }
}

/// Write stream bound to one named file
pub trait IndexOutput: DataOutput {
    /// Push buffered bytes to the underlying sink (not an fsync)
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the underlying sink; later writes fail
    fn close(&mut self) -> Result<()>;

    /// Offset the next byte will be written at
    fn file_pointer(&self) -> u64;

    /// Move the write cursor; pending bytes are flushed first
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// High-water mark of bytes written to the file
    fn length(&self) -> Result<u64>;

    /// Pre-size the file. Growing leaves new bytes undefined; shrinking truncates.
    ///
    /// Optional: the default does nothing.
    fn set_length(&mut self, _length: u64) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Input side
// =============================================================================

/// Source of raw bytes with the index decodings layered on top
pub trait DataInput: Send {
    /// Read a single byte
    fn read_byte(&mut self) -> Result<u8>;

    /// Fill `buf` completely or fail with `ReadPastEof`
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read a 4-byte big-endian int
    fn read_int(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_bytes(&mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    /// Read an 8-byte long written as two big-endian ints
    fn read_long(&mut self) -> Result<i64> {
        let high = self.read_int()? as i64;
        let low = self.read_int()? as u32 as i64;
        Ok((high << 32) | low)
    }

    /// Read a variable-length int
    fn read_vint(&mut self) -> Result<i32> {
        let mut b = self.read_byte()?;
        let mut v = (b & 0x7F) as u32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift >= 7 * MAX_VINT_BYTES as u32 {
                return Err(StoreError::Corrupt("vint longer than 5 bytes".to_string()));
            }
            b = self.read_byte()?;
            v |= ((b & 0x7F) as u32).wrapping_shl(shift);
            shift += 7;
        }
        Ok(v as i32)
    }

    /// Read a variable-length long
    fn read_vlong(&mut self) -> Result<i64> {
        let mut b = self.read_byte()?;
        let mut v = (b & 0x7F) as u64;
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift >= 7 * MAX_VLONG_BYTES as u32 {
                return Err(StoreError::Corrupt("vlong longer than 10 bytes".to_string()));
            }
            b = self.read_byte()?;
            v |= ((b & 0x7F) as u64).wrapping_shl(shift);
            shift += 7;
        }
        Ok(v as i64)
    }

    /// Read a length-prefixed UTF-8 string
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()?;
        if len < 0 {
            return Err(StoreError::Corrupt(format!("negative string length {}", len)));
        }
        let mut bytes = vec![0u8; len as usize];
        self.read_bytes(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|e| StoreError::Corrupt(format!("string is not valid UTF-8: {}", e)))
    }

    /// Read a map written by `write_string_map`
    fn read_string_map(&mut self) -> Result<BTreeMap<String, String>> {
        let count = self.read_int()?;
        if count < 0 {
            return Err(StoreError::Corrupt(format!("negative map size {}", count)));
        }
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

/// Read stream bound to one named file
pub trait IndexInput: DataInput {
    /// Offset of the next byte to be read
    fn file_pointer(&self) -> u64;

    /// Move the read cursor. Seeking past the end is allowed; the next read fails.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Total length of the file in bytes
    fn length(&self) -> u64;

    /// Release the underlying source; later reads fail
    fn close(&mut self) -> Result<()>;

    /// Advance the cursor by `n` bytes
    fn skip_bytes(&mut self, n: u64) -> Result<()> {
        let target = self.file_pointer() + n;
        self.seek(target)
    }
}

// =============================================================================
// Boxed streams
// =============================================================================

impl<T: DataOutput + ?Sized> DataOutput for Box<T> {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        (**self).write_byte(b)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_bytes(buf)
    }
}

impl<T: IndexOutput + ?Sized> IndexOutput for Box<T> {
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn file_pointer(&self) -> u64 {
        (**self).file_pointer()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        (**self).seek(pos)
    }

    fn length(&self) -> Result<u64> {
        (**self).length()
    }

    fn set_length(&mut self, length: u64) -> Result<()> {
        (**self).set_length(length)
    }
}

impl<T: DataInput + ?Sized> DataInput for Box<T> {
    fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_bytes(buf)
    }
}

impl<T: IndexInput + ?Sized> IndexInput for Box<T> {
    fn file_pointer(&self) -> u64 {
        (**self).file_pointer()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        (**self).seek(pos)
    }

    fn length(&self) -> u64 {
        (**self).length()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Growable in-memory sink/source for exercising the default methods
    #[derive(Default)]
    struct VecStream {
        data: Vec<u8>,
        pos: usize,
    }

    impl DataOutput for VecStream {
        fn write_byte(&mut self, b: u8) -> Result<()> {
            self.data.push(b);
            Ok(())
        }

        fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
            self.data.extend_from_slice(buf);
            Ok(())
        }
    }

    impl DataInput for VecStream {
        fn read_byte(&mut self) -> Result<u8> {
            let b = *self.data.get(self.pos).ok_or(StoreError::ReadPastEof {
                name: "vec".to_string(),
            })?;
            self.pos += 1;
            Ok(b)
        }

        fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
            let end = self.pos + buf.len();
            if end > self.data.len() {
                return Err(StoreError::ReadPastEof { name: "vec".to_string() });
            }
            buf.copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(())
        }
    }

    #[test]
    fn test_int_is_big_endian() {
        let mut s = VecStream::default();
        s.write_int(0x0102_0304).unwrap();
        assert_eq!(s.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_long_high_half_first() {
        let mut s = VecStream::default();
        s.write_long(0x0102_0304_0506_0708).unwrap();
        assert_eq!(s.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(s.read_long().unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_vint_byte_layout() {
        let mut s = VecStream::default();
        s.write_vint(0).unwrap();
        s.write_vint(127).unwrap();
        s.write_vint(128).unwrap();
        s.write_vint(16_384).unwrap();
        assert_eq!(s.data, vec![0x00, 0x7F, 0x80, 0x01, 0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_vint_max_width() {
        let mut s = VecStream::default();
        s.write_vint(i32::MAX).unwrap();
        assert_eq!(s.data.len(), 5);
        assert_eq!(s.read_vint().unwrap(), i32::MAX);
    }

    #[test]
    fn test_vlong_max_width() {
        let mut s = VecStream::default();
        s.write_vlong(i64::MAX).unwrap();
        assert_eq!(s.data.len(), 9);
        assert_eq!(s.read_vlong().unwrap(), i64::MAX);
    }

    #[test]
    fn test_overlong_vint_is_corrupt() {
        let mut s = VecStream {
            data: vec![0xFF; 6],
            pos: 0,
        };
        assert!(matches!(s.read_vint(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_string_prefix_is_byte_length() {
        let mut s = VecStream::default();
        s.write_string("né").unwrap();
        assert_eq!(s.data, vec![3, b'n', 0xC3, 0xA9]);
        assert_eq!(s.read_string().unwrap(), "né");
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        let mut s = VecStream {
            data: vec![2, 0xC3, 0x28],
            pos: 0,
        };
        assert!(matches!(s.read_string(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_copy_bytes_rejects_negative() {
        let mut src = VecStream::default();
        let mut dst = VecStream::default();
        let err = dst.copy_bytes(&mut src, -1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_copy_bytes_spans_scratch_buffer() {
        let payload: Vec<u8> = (0..COPY_BUFFER_SIZE * 2 + 17).map(|i| i as u8).collect();
        let mut src = VecStream {
            data: payload.clone(),
            pos: 0,
        };
        let mut dst = VecStream::default();
        dst.copy_bytes(&mut src, payload.len() as i64).unwrap();
        assert_eq!(dst.data, payload);
    }
}
