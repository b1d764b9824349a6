//! Buffered streams
//!
//! `BufferedOutput` and `BufferedInput` put a fixed-size buffer in front of a
//! raw byte sink/source so that the small reads and writes issued by index
//! formats turn into few, large raw calls.
//!
//! ## Output bookkeeping
//! ```text
//!   file:   [ ......flushed...... | buffer[0..position] | ]
//!                                 ^ buffer_start
//!   file_pointer = buffer_start + position
//! ```
//! Writes larger than the whole buffer skip it and go straight to the raw sink.

use crate::error::{Result, StoreError};

use super::stream::{DataInput, DataOutput, IndexInput, IndexOutput};

// =============================================================================
// Raw sink / source contracts
// =============================================================================

/// Unbuffered byte sink a `BufferedOutput` flushes into
pub trait RawOutput: Send {
    /// Write all of `buf` at the current raw position and advance past it
    fn write_raw(&mut self, buf: &[u8]) -> Result<()>;

    /// Move the raw position
    fn seek_raw(&mut self, pos: u64) -> Result<()>;

    /// Current length of the underlying file
    fn raw_length(&self) -> Result<u64>;

    /// Resize the underlying file
    fn set_raw_length(&mut self, len: u64) -> Result<()>;

    /// Release the underlying handle
    fn close_raw(&mut self) -> Result<()>;
}

/// Unbuffered positional byte source a `BufferedInput` refills from
pub trait RawInput: Send {
    /// Fill `buf` completely with the bytes starting at `pos`
    fn read_raw(&mut self, pos: u64, buf: &mut [u8]) -> Result<()>;

    /// Length of the underlying file
    fn raw_length(&self) -> u64;

    /// Release the underlying handle
    fn close_raw(&mut self) -> Result<()>;
}

// =============================================================================
// BufferedOutput
// =============================================================================

/// Write stream that batches writes into a fixed-size buffer
pub struct BufferedOutput<W: RawOutput> {
    /// File name, for error messages
    name: String,
    /// Sink that receives flushed bytes
    raw: W,
    /// Fixed-size staging buffer
    buffer: Box<[u8]>,
    /// File offset of buffer[0]
    buffer_start: u64,
    /// Next free slot in the buffer
    buffer_position: usize,
    closed: bool,
}

impl<W: RawOutput> BufferedOutput<W> {
    /// Wrap `raw` with a buffer of `buffer_size` bytes
    pub fn new(name: impl Into<String>, raw: W, buffer_size: usize) -> Self {
        Self {
            name: name.into(),
            raw,
            buffer: vec![0u8; buffer_size.max(1)].into_boxed_slice(),
            buffer_start: 0,
            buffer_position: 0,
            closed: false,
        }
    }

    /// Name of the file this stream writes
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the staging buffer
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::AlreadyClosed(format!("output {}", self.name)));
        }
        Ok(())
    }

    /// Push buffer[0..position] to the raw sink
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer_position > 0 {
            self.raw.write_raw(&self.buffer[..self.buffer_position])?;
            self.buffer_start += self.buffer_position as u64;
            self.buffer_position = 0;
        }
        Ok(())
    }
}

impl<W: RawOutput> DataOutput for BufferedOutput<W> {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.ensure_open()?;
        if self.buffer_position >= self.buffer.len() {
            self.flush_buffer()?;
        }
        self.buffer[self.buffer_position] = b;
        self.buffer_position += 1;
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let len = buf.len();
        let left = self.buffer.len() - self.buffer_position;

        if left >= len {
            // Fits: copy in, flush if that made the buffer exactly full
            self.buffer[self.buffer_position..self.buffer_position + len].copy_from_slice(buf);
            self.buffer_position += len;
            if self.buffer_position == self.buffer.len() {
                self.flush_buffer()?;
            }
        } else if len > self.buffer.len() {
            // Larger than the whole buffer: drain pending bytes, then bypass
            self.flush_buffer()?;
            self.raw.write_raw(buf)?;
            self.buffer_start += len as u64;
        } else {
            // Fill, flush, repeat
            let mut offset = 0;
            while offset < len {
                let chunk = (len - offset).min(self.buffer.len() - self.buffer_position);
                self.buffer[self.buffer_position..self.buffer_position + chunk]
                    .copy_from_slice(&buf[offset..offset + chunk]);
                self.buffer_position += chunk;
                offset += chunk;
                if self.buffer_position == self.buffer.len() {
                    self.flush_buffer()?;
                }
            }
        }
        Ok(())
    }
}

impl<W: RawOutput> IndexOutput for BufferedOutput<W> {
    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_buffer()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let flushed = self.flush_buffer();
        self.closed = true;
        let closed = self.raw.close_raw();
        tracing::trace!(file = %self.name, length = self.buffer_start, "closed output");
        flushed.and(closed)
    }

    fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer_position as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        self.flush_buffer()?;
        self.buffer_start = pos;
        self.raw.seek_raw(pos)
    }

    fn length(&self) -> Result<u64> {
        let raw = self.raw.raw_length()?;
        Ok(raw.max(self.file_pointer()))
    }

    fn set_length(&mut self, length: u64) -> Result<()> {
        self.ensure_open()?;
        self.flush_buffer()?;
        self.raw.set_raw_length(length)
    }
}

impl<W: RawOutput> Drop for BufferedOutput<W> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                tracing::warn!("Failed to close output {} on drop: {}", self.name, e);
            }
        }
    }
}

// =============================================================================
// BufferedInput
// =============================================================================

/// Read stream that refills a fixed-size buffer on miss
pub struct BufferedInput<R: RawInput> {
    /// File name, for error messages
    name: String,
    /// Source the buffer refills from
    raw: R,
    /// Refill buffer; only buffer[0..buffer_length] is valid
    buffer: Box<[u8]>,
    /// File offset of buffer[0]
    buffer_start: u64,
    /// Number of valid bytes in the buffer
    buffer_length: usize,
    /// Next unread byte in the buffer
    buffer_position: usize,
    /// Cached file length
    length: u64,
    closed: bool,
}

impl<R: RawInput> BufferedInput<R> {
    /// Wrap `raw` with a buffer of `buffer_size` bytes
    pub fn new(name: impl Into<String>, raw: R, buffer_size: usize) -> Self {
        let length = raw.raw_length();
        Self {
            name: name.into(),
            raw,
            buffer: vec![0u8; buffer_size.max(1)].into_boxed_slice(),
            buffer_start: 0,
            buffer_length: 0,
            buffer_position: 0,
            length,
            closed: false,
        }
    }

    /// Name of the file this stream reads
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the refill buffer
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::AlreadyClosed(format!("input {}", self.name)));
        }
        Ok(())
    }

    fn past_eof(&self) -> StoreError {
        StoreError::ReadPastEof {
            name: self.name.clone(),
        }
    }

    /// Load the next window of the file into the buffer
    fn refill(&mut self) -> Result<()> {
        let start = self.buffer_start + self.buffer_position as u64;
        let end = (start + self.buffer.len() as u64).min(self.length);
        if end <= start {
            return Err(self.past_eof());
        }
        let new_length = (end - start) as usize;
        self.raw.read_raw(start, &mut self.buffer[..new_length])?;
        self.buffer_start = start;
        self.buffer_length = new_length;
        self.buffer_position = 0;
        Ok(())
    }
}

impl<R: RawInput> DataInput for BufferedInput<R> {
    fn read_byte(&mut self) -> Result<u8> {
        self.ensure_open()?;
        if self.buffer_position >= self.buffer_length {
            self.refill()?;
        }
        let b = self.buffer[self.buffer_position];
        self.buffer_position += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let len = buf.len();
        let available = self.buffer_length - self.buffer_position;

        if len <= available {
            buf.copy_from_slice(&self.buffer[self.buffer_position..self.buffer_position + len]);
            self.buffer_position += len;
            return Ok(());
        }

        // Drain what is buffered first
        if available > 0 {
            buf[..available].copy_from_slice(&self.buffer[self.buffer_position..self.buffer_length]);
            self.buffer_position += available;
        }
        let rest = &mut buf[available..];

        if rest.len() < self.buffer.len() {
            // Small remainder: go through the buffer
            self.refill()?;
            if self.buffer_length < rest.len() {
                return Err(self.past_eof());
            }
            rest.copy_from_slice(&self.buffer[..rest.len()]);
            self.buffer_position = rest.len();
        } else {
            // Large remainder: read straight into the caller's slice
            let start = self.buffer_start + self.buffer_position as u64;
            if start + rest.len() as u64 > self.length {
                return Err(self.past_eof());
            }
            self.raw.read_raw(start, rest)?;
            self.buffer_start = start + rest.len() as u64;
            self.buffer_position = 0;
            self.buffer_length = 0;
        }
        Ok(())
    }
}

impl<R: RawInput> IndexInput for BufferedInput<R> {
    fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer_position as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        if pos >= self.buffer_start && pos < self.buffer_start + self.buffer_length as u64 {
            self.buffer_position = (pos - self.buffer_start) as usize;
        } else {
            self.buffer_start = pos;
            self.buffer_position = 0;
            self.buffer_length = 0;
        }
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.raw.close_raw()
    }
}
