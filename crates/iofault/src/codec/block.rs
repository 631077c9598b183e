// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compressed block streams.
//!
//! # Wire Format
//!
//! Each block:
//!
//! ```text
//! block = magic(2: 0x1F 0x8F) | compressed_len(u32 BE) | uncompressed_len(u32 BE) | deflate_bytes
//! ```
//!
//! The decoder rejects a mismatched magic and caps every allocation at a
//! configurable maximum (default 1 MiB) so a malicious header cannot force
//! an oversized buffer. The uncompressed length is verified after inflation.

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// Two magic bytes opening every block.
pub const BLOCK_MAGIC: [u8; 2] = [0x1F, 0x8F];

/// Default plaintext capacity of one block.
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

/// Default cap on any single buffer allocation while decoding.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1024 * 1024;

// ============================================================================
// Writer
// ============================================================================

/// Writes a stream of compressed blocks.
///
/// Plaintext accumulates up to the block size; a full buffer or a `flush`
/// emits one block. `finish` flushes and hands the sink back.
pub struct CompressedBlockWriter<W: Write> {
    sink: W,
    buf: Vec<u8>,
    block_size: usize,
    level: Compression,
}

impl<W: Write> CompressedBlockWriter<W> {
    /// Writer with the default block size and compression level.
    pub fn new(sink: W) -> Self {
        Self::with_block_size(sink, DEFAULT_BLOCK_SIZE)
    }

    /// Writer emitting blocks of at most `block_size` plaintext bytes.
    pub fn with_block_size(sink: W, block_size: usize) -> Self {
        Self {
            sink,
            buf: Vec::with_capacity(block_size.max(1)),
            block_size: block_size.max(1),
            level: Compression::default(),
        }
    }

    /// Override the deflate compression level.
    #[must_use]
    pub fn with_level(mut self, level: Compression) -> Self {
        self.level = level;
        self
    }

    /// Flush any buffered plaintext and return the underlying sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.sink)
    }

    fn write_block(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
        encoder.write_all(&self.buf)?;
        let compressed = encoder.finish()?;

        let mut header = [0u8; 10];
        header[..2].copy_from_slice(&BLOCK_MAGIC);
        header[2..6].copy_from_slice(&(compressed.len() as u32).to_be_bytes());
        header[6..10].copy_from_slice(&(self.buf.len() as u32).to_be_bytes());

        self.sink.write_all(&header)?;
        self.sink.write_all(&compressed)?;
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> Write for CompressedBlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let room = self.block_size - self.buf.len();
            let take = room.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buf.len() == self.block_size {
                self.write_block()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_block()?;
        self.sink.flush()
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Reads a stream of compressed blocks.
pub struct CompressedBlockReader<R: Read> {
    source: R,
    current: Vec<u8>,
    pos: usize,
    max_block_size: usize,
}

impl<R: Read> CompressedBlockReader<R> {
    /// Reader with the default allocation cap.
    pub fn new(source: R) -> Self {
        Self::with_max_block_size(source, DEFAULT_MAX_BLOCK_SIZE)
    }

    /// Reader rejecting any header that announces more than
    /// `max_block_size` bytes on either side of the compression.
    pub fn with_max_block_size(source: R, max_block_size: usize) -> Self {
        Self {
            source,
            current: Vec::new(),
            pos: 0,
            max_block_size: max_block_size.max(1),
        }
    }

    /// Read the next block into `current`. `Ok(false)` is clean EOF.
    fn read_block(&mut self) -> io::Result<bool> {
        let mut magic = [0u8; 2];
        // EOF at a block boundary is a clean end of stream.
        match self.source.read(&mut magic[..1])? {
            0 => return Ok(false),
            _ => self.source.read_exact(&mut magic[1..])?,
        }
        if magic != BLOCK_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "bad block magic {:#04x} {:#04x}, not a compressed block stream",
                    magic[0], magic[1]
                ),
            ));
        }

        let mut lengths = [0u8; 8];
        self.source.read_exact(&mut lengths)?;
        let compressed_len = u32::from_be_bytes([lengths[0], lengths[1], lengths[2], lengths[3]]) as usize;
        let uncompressed_len = u32::from_be_bytes([lengths[4], lengths[5], lengths[6], lengths[7]]) as usize;

        if compressed_len > self.max_block_size || uncompressed_len > self.max_block_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "block header announces {compressed_len}/{uncompressed_len} bytes, cap is {}",
                    self.max_block_size
                ),
            ));
        }

        let mut compressed = vec![0u8; compressed_len];
        self.source.read_exact(&mut compressed)?;

        let mut plain = Vec::with_capacity(uncompressed_len);
        DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut plain)?;
        if plain.len() != uncompressed_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "block inflated to {} bytes, header announced {uncompressed_len}",
                    plain.len()
                ),
            ));
        }

        self.current = plain;
        self.pos = 0;
        Ok(true)
    }
}

impl<R: Read> Read for CompressedBlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.current.len() {
            if !self.read_block()? {
                return Ok(0);
            }
        }
        let n = (self.current.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ============================================================================
// Tests
// ============================================================================
