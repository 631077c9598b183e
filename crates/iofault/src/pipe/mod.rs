// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Killable byte pipe: a bounded in-process FIFO byte channel.
//!
//! [`pipe`] produces the raw halves — [`PipeReader`] / [`PipeWriter`] — over
//! a shared bounded ring. One producer and one consumer thread are
//! supported; the producer blocks when the ring is full, the consumer blocks
//! when it is empty, and both blocking calls are cancellable through the
//! cooperative interrupt mechanism ([`crate::interrupt`]).
//!
//! [`killable_pipe`] wraps the halves in the revivable stream pair, which
//! adds the kill/revive/queue-error control surface on both ends. The total
//! buffering observed through a killable pipe is roughly `3 * buffer_size`:
//! the ring itself plus the worker-side batching on each endpoint.

use parking_lot::{Condvar, Mutex};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StreamConfig, DEFAULT_POLL_INTERVAL};
use crate::interrupt;
use crate::stream::{RevivableReader, RevivableWriter};

// ============================================================================
// Ring buffer
// ============================================================================

/// Fixed-capacity byte FIFO. Wrap-around bookkeeping only; blocking lives in
/// the pipe halves.
struct Ring {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
    read_closed: bool,
    write_closed: bool,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            head: 0,
            len: 0,
            read_closed: false,
            write_closed: false,
        }
    }

    /// Copy as many bytes as fit from `src`; returns the count accepted.
    fn push_from(&mut self, src: &[u8]) -> usize {
        let cap = self.buf.len();
        let n = (cap - self.len).min(src.len());
        if n == 0 {
            return 0;
        }
        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&src[..first]);
        if n > first {
            self.buf[..n - first].copy_from_slice(&src[first..n]);
        }
        self.len += n;
        n
    }

    /// Copy up to `dst.len()` buffered bytes out; returns the count copied.
    fn pop_into(&mut self, dst: &mut [u8]) -> usize {
        let cap = self.buf.len();
        let n = self.len.min(dst.len());
        if n == 0 {
            return 0;
        }
        let first = n.min(cap - self.head);
        dst[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        if n > first {
            dst[first..n].copy_from_slice(&self.buf[..n - first]);
        }
        self.head = (self.head + n) % cap;
        self.len -= n;
        n
    }
}

struct PipeShared {
    ring: Mutex<Ring>,
    /// Signalled when bytes (or EOF) become available to the reader.
    readable: Condvar,
    /// Signalled when room (or closure) becomes visible to the writer.
    writable: Condvar,
    poll: Duration,
}

impl PipeShared {
    fn close_read(&self) {
        let mut ring = self.ring.lock();
        ring.read_closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    fn close_write(&self) {
        let mut ring = self.ring.lock();
        ring.write_closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

// ============================================================================
// Pipe halves
// ============================================================================

/// Consumer half of a bounded byte pipe.
///
/// Blocking reads; EOF once the write end is closed and the ring drained.
pub struct PipeReader {
    shared: Arc<PipeShared>,
}

impl PipeReader {
    /// Close the read end. Subsequent reads return EOF; subsequent writes on
    /// the peer fail with a broken-pipe error.
    pub fn close(&self) {
        self.shared.close_read();
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut ring = self.shared.ring.lock();
        loop {
            if ring.read_closed {
                return Ok(0);
            }
            let n = ring.pop_into(buf);
            if n > 0 {
                self.shared.writable.notify_all();
                return Ok(n);
            }
            if ring.write_closed {
                return Ok(0);
            }
            interrupt::check("pipe read")?;
            let _ = self.shared.readable.wait_for(&mut ring, self.shared.poll);
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.close_read();
    }
}

/// Producer half of a bounded byte pipe.
///
/// Blocking writes; fails with a broken-pipe error once either end is closed.
pub struct PipeWriter {
    shared: Arc<PipeShared>,
}

impl PipeWriter {
    /// Close the write end. The reader drains remaining bytes, then sees EOF.
    pub fn close(&self) {
        self.shared.close_write();
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut ring = self.shared.ring.lock();
        loop {
            if ring.write_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe write end closed",
                ));
            }
            if ring.read_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe read end closed",
                ));
            }
            let n = ring.push_from(buf);
            if n > 0 {
                self.shared.readable.notify_all();
                return Ok(n);
            }
            interrupt::check("pipe write")?;
            let _ = self.shared.writable.wait_for(&mut ring, self.shared.poll);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.close_write();
    }
}

// ============================================================================
// Factories
// ============================================================================

/// Raw bounded pipe of `capacity` bytes with the default poll interval.
#[must_use]
pub fn pipe(capacity: usize) -> (PipeReader, PipeWriter) {
    pipe_with_poll(capacity, DEFAULT_POLL_INTERVAL)
}

fn pipe_with_poll(capacity: usize, poll: Duration) -> (PipeReader, PipeWriter) {
    let shared = Arc::new(PipeShared {
        ring: Mutex::new(Ring::with_capacity(capacity)),
        readable: Condvar::new(),
        writable: Condvar::new(),
        poll,
    });
    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter { shared },
    )
}

/// Killable pipe: the raw halves wrapped in the revivable stream pair.
///
/// The read end gets an unblock hook so closing the revivable reader aborts
/// a worker read blocked on the empty ring.
#[must_use]
pub fn killable_pipe(buffer_size: usize) -> (RevivableReader, RevivableWriter) {
    killable_pipe_with_config(&StreamConfig::with_buffer_size(buffer_size))
}

/// [`killable_pipe`] with full control over the stream configuration.
#[must_use]
pub fn killable_pipe_with_config(config: &StreamConfig) -> (RevivableReader, RevivableWriter) {
    let (reader, writer) = pipe_with_poll(config.buffer_size, config.poll_interval);
    let unblock = {
        let shared = Arc::clone(&reader.shared);
        move || shared.close_read()
    };
    let revivable_reader = RevivableReader::with_unblock(reader, unblock, config.clone());
    let revivable_writer = RevivableWriter::with_config(writer, config.clone());
    (revivable_reader, revivable_writer)
}

// ============================================================================
// Tests
// ============================================================================
