// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Revivable input stream.
//!
//! Wraps any blocking byte source behind a worker thread that performs the
//! actual reads, so the caller-facing `read` can be aborted out-of-band by
//! `kill()`, made to raise queued faults, or interrupted — all without
//! touching the underlying source.
//!
//! # Worker protocol
//!
//! A mutex-and-condvar pair synchronises requests:
//! 1. The caller, finding no pending batch, records the requested length,
//!    raises the request flag and notifies.
//! 2. The worker takes the request, drops the lock, and performs one
//!    blocking read of at most that many bytes.
//! 3. The worker publishes the outcome (batch, EOF, or terminal fault) and
//!    notifies.
//! 4. The caller wakes and walks the precedence chain: closed, source EOF,
//!    worker fault, kill-state, queued fault, pending batch — in that order.

use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::fault::{self, Fault};
use crate::interrupt;
use crate::stream::worker_name;

/// State guarded by the stream mutex.
struct ReadState {
    /// Most recent batch read by the worker, awaiting handoff.
    pending: Option<Vec<u8>>,
    /// Length the caller asked the worker to read.
    requested: usize,
    /// A request is posted but not yet taken by the worker.
    request_pending: bool,
    /// The worker took a request and is blocked in the underlying read.
    read_in_flight: bool,
    /// Underlying source reached EOF.
    stream_closed: bool,
    /// Terminal fault from the underlying source; sticky.
    worker_fault: Option<Fault>,
    /// `close()` was called on this stream.
    closed: bool,
}

struct ReaderShared {
    state: Mutex<ReadState>,
    cond: Condvar,
    /// Serialises concurrent callers so multi-byte reads are atomic.
    op_lock: Mutex<()>,
    killed: AtomicBool,
    kill_fault: Mutex<Option<Fault>>,
    queued: SegQueue<Fault>,
    decorate: AtomicBool,
    /// Hook that aborts a worker read blocked in the underlying source.
    unblock: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    poll: Duration,
}

/// Revivable input stream handle.
///
/// Clones alias the same stream; reads from any clone are serialised by the
/// stream's own lock, and the control surface may be driven from a clone
/// while another thread is blocked in `read`.
#[derive(Clone)]
pub struct RevivableReader {
    shared: Arc<ReaderShared>,
}

impl RevivableReader {
    /// Wrap `source` with the default configuration.
    pub fn new(source: impl Read + Send + 'static) -> Self {
        Self::with_config(source, StreamConfig::default())
    }

    /// Wrap `source` with an explicit configuration.
    pub fn with_config(source: impl Read + Send + 'static, config: StreamConfig) -> Self {
        Self::build(Box::new(source), None, &config)
    }

    /// Wrap `source`, installing a hook invoked by [`close`](Self::close) to
    /// abort a worker read blocked inside the source (for example shutting
    /// down the socket a `TcpStream` source reads from).
    pub fn with_unblock(
        source: impl Read + Send + 'static,
        on_close: impl FnOnce() + Send + 'static,
        config: StreamConfig,
    ) -> Self {
        Self::build(Box::new(source), Some(Box::new(on_close)), &config)
    }

    fn build(
        source: Box<dyn Read + Send>,
        unblock: Option<Box<dyn FnOnce() + Send>>,
        config: &StreamConfig,
    ) -> Self {
        let shared = Arc::new(ReaderShared {
            state: Mutex::new(ReadState {
                pending: None,
                requested: 0,
                request_pending: false,
                read_in_flight: false,
                stream_closed: false,
                worker_fault: None,
                closed: false,
            }),
            cond: Condvar::new(),
            op_lock: Mutex::new(()),
            killed: AtomicBool::new(false),
            kill_fault: Mutex::new(None),
            queued: SegQueue::new(),
            decorate: AtomicBool::new(config.decorate_errors),
            unblock: Mutex::new(unblock),
            poll: config.poll_interval,
        });

        let worker_shared = Arc::clone(&shared);
        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        thread::Builder::new()
            .name(worker_name("read"))
            .spawn(move || read_worker(source, &worker_shared))
            .expect("Failed to spawn revivable reader worker");

        Self { shared }
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Disable the stream: reads return EOF until [`revive`](Self::revive).
    ///
    /// Data already buffered from the source is withheld while killed.
    pub fn kill(&self) {
        self.set_killed(None);
    }

    /// Disable the stream with a sticky fault re-raised by every read until
    /// revived. A repeated kill replaces the fault.
    pub fn kill_with(&self, error: io::Error) {
        self.set_killed(Some(Fault::new(error)));
    }

    fn set_killed(&self, fault: Option<Fault>) {
        *self.shared.kill_fault.lock() = fault;
        self.shared.killed.store(true, Ordering::Release);
        log::debug!("[revivable] input stream killed");
        self.shared.cond.notify_all();
    }

    /// Re-enable a killed stream; reads resume from the underlying source.
    pub fn revive(&self) {
        self.shared.killed.store(false, Ordering::Release);
        log::debug!("[revivable] input stream revived");
        self.shared.cond.notify_all();
    }

    /// Whether the stream is currently killed.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.shared.killed.load(Ordering::Acquire)
    }

    /// Schedule a one-shot fault raised by exactly one subsequent read.
    ///
    /// Faults fire in insertion order; kill-state pre-empts them.
    pub fn queue_read_error(&self, error: io::Error) {
        self.shared.queued.push(Fault::new(error));
        self.shared.cond.notify_all();
    }

    /// Enable or disable fault decoration (see [`crate::fault`]). On by
    /// default.
    pub fn set_decorate_errors(&self, on: bool) {
        self.shared.decorate.store(on, Ordering::Release);
    }

    /// Always 0: the stream is semantically unbuffered to callers.
    #[must_use]
    pub fn available(&self) -> usize {
        0
    }

    /// Close the stream: aborts the worker (running the unblock hook if one
    /// was installed, which closes the underlying source) and fails
    /// subsequent reads with the fixed "Stream Closed" error. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        if let Some(hook) = self.shared.unblock.lock().take() {
            hook();
        }
        log::debug!("[revivable] input stream closed");
        self.shared.cond.notify_all();
    }

    /// Single-byte read; `None` is end-of-stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn decorate_on(&self) -> bool {
        self.shared.decorate.load(Ordering::Acquire)
    }

    fn read_shared(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let shared = &*self.shared;
        let _op = shared.op_lock.lock();
        let mut state = shared.state.lock();
        loop {
            if state.closed {
                return Err(fault::stream_closed());
            }
            if state.stream_closed {
                return Ok(0);
            }
            if let Some(f) = &state.worker_fault {
                return Err(f.raise(self.decorate_on()));
            }
            if shared.killed.load(Ordering::Acquire) {
                let kill_fault = shared.kill_fault.lock().clone();
                if let Some(f) = kill_fault {
                    return Err(f.raise(self.decorate_on()));
                }
                return Ok(0);
            }
            if let Some(f) = shared.queued.pop() {
                return Err(f.raise(self.decorate_on()));
            }
            if let Some(data) = state.pending.take() {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if data.len() > n {
                    state.pending = Some(data[n..].to_vec());
                }
                return Ok(n);
            }
            if !state.request_pending && !state.read_in_flight {
                state.requested = buf.len();
                state.request_pending = true;
                shared.cond.notify_all();
            }
            interrupt::check("revivable read")?;
            let _ = shared.cond.wait_for(&mut state, shared.poll);
        }
    }
}

impl Read for RevivableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_shared(buf)
    }
}

impl std::fmt::Debug for RevivableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RevivableReader")
            .field("killed", &self.is_killed())
            .field("closed", &state.closed)
            .field("source_eof", &state.stream_closed)
            .finish_non_exhaustive()
    }
}

/// Worker loop: serve read requests until EOF, a terminal fault, or close.
fn read_worker(mut source: Box<dyn Read + Send>, shared: &ReaderShared) {
    log::trace!("[revivable] reader worker started");
    loop {
        let request = {
            let mut state = shared.state.lock();
            loop {
                if state.closed {
                    shared.cond.notify_all();
                    log::trace!("[revivable] reader worker released by close");
                    return;
                }
                if state.request_pending {
                    state.request_pending = false;
                    state.read_in_flight = true;
                    break state.requested.max(1);
                }
                shared.cond.wait(&mut state);
            }
        };

        // The blocking read happens outside the lock so the caller stays
        // responsive to kills and interrupts.
        let mut buf = vec![0u8; request];
        let outcome = source.read(&mut buf);

        let mut state = shared.state.lock();
        state.read_in_flight = false;
        let terminal = match outcome {
            Ok(0) => {
                state.stream_closed = true;
                true
            }
            Ok(n) => {
                #[cfg(feature = "trace")]
                log::trace!("[revivable] published a {n} byte batch");
                buf.truncate(n);
                state.pending = Some(buf);
                false
            }
            Err(e) => {
                log::warn!("[revivable] reader worker terminating: {e}");
                state.worker_fault = Some(Fault::new(e));
                true
            }
        };
        let released = state.closed;
        shared.cond.notify_all();
        if terminal || released {
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
