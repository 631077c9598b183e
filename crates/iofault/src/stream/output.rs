// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Revivable output stream.
//!
//! Accepted bytes travel through a bounded transfer queue into a worker
//! thread that owns the underlying sink, so `write` returns promptly even
//! when the sink is slow, and the caller stays responsive to kills, queued
//! faults and interrupts.
//!
//! # Transfer protocol
//!
//! Queue items are [`TransferItem`]: data bytes plus the FLUSH and EXIT
//! control markers. The worker batches consecutive bytes up to the
//! configured buffer size, delivers a batch before acting on any control
//! marker, answers FLUSH on the flush-reply channel after running the sink's
//! own `flush`, and terminates cleanly on EXIT. A sink failure is terminal:
//! the fault is stored, flush waiters and blocked producers are woken, and
//! the worker exits. While the stream is killed the worker pauses, so no new
//! bytes reach the sink until revival.

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::fault::{self, Fault};
use crate::interrupt;
use crate::stream::worker_name;

/// Transfer-queue element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferItem {
    /// Ordinary data byte.
    Byte(u8),
    /// Deliver everything accepted so far, flush the sink, acknowledge.
    Flush,
    /// Terminate the worker cleanly (the sink is closed by dropping it).
    Exit,
}

/// Flush-reply channel element.
#[derive(Debug, Clone)]
enum FlushReply {
    /// The sink saw every byte accepted before the FLUSH marker, and its own
    /// `flush` completed.
    Done,
    /// Control-surface state changed; the waiter must re-check precedence.
    Poke,
    /// The worker died delivering; the fault is also sticky on the stream.
    Failed(Fault),
}

struct WriterShared {
    transfer_tx: Sender<TransferItem>,
    availability_tx: Sender<()>,
    availability_rx: Receiver<()>,
    flush_tx: Sender<FlushReply>,
    flush_rx: Receiver<FlushReply>,
    killed: AtomicBool,
    closed: AtomicBool,
    kill_fault: Mutex<Option<Fault>>,
    transfer_fault: Mutex<Option<Fault>>,
    queued: SegQueue<Fault>,
    decorate: AtomicBool,
    /// Serialises flush callers so replies are never mixed across them.
    flush_lock: Mutex<()>,
    close_lock: Mutex<()>,
    poll: Duration,
}

/// Revivable output stream handle.
///
/// Clones alias the same stream; bytes written by one thread reach the sink
/// in submission order, and the control surface may be driven from a clone
/// while another thread is blocked in `write` or `flush`.
#[derive(Clone)]
pub struct RevivableWriter {
    shared: Arc<WriterShared>,
}

impl RevivableWriter {
    /// Wrap `sink` with the default configuration.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self::with_config(sink, StreamConfig::default())
    }

    /// Wrap `sink` with an explicit configuration. `buffer_size` fixes both
    /// the transfer-queue capacity and the worker's batch size.
    pub fn with_config(sink: impl Write + Send + 'static, config: StreamConfig) -> Self {
        let capacity = config.buffer_size.max(1);
        let (transfer_tx, transfer_rx) = bounded(capacity);
        let (availability_tx, availability_rx) = bounded(1);
        let (flush_tx, flush_rx) = bounded(1);

        let shared = Arc::new(WriterShared {
            transfer_tx,
            availability_tx,
            availability_rx,
            flush_tx,
            flush_rx,
            killed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            kill_fault: Mutex::new(None),
            transfer_fault: Mutex::new(None),
            queued: SegQueue::new(),
            decorate: AtomicBool::new(config.decorate_errors),
            flush_lock: Mutex::new(()),
            close_lock: Mutex::new(()),
            poll: config.poll_interval,
        });

        let worker_shared = Arc::clone(&shared);
        let sink: Box<dyn Write + Send> = Box::new(sink);
        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        thread::Builder::new()
            .name(worker_name("write"))
            .spawn(move || write_worker(sink, &worker_shared, &transfer_rx, capacity))
            .expect("Failed to spawn revivable writer worker");

        Self { shared }
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Disable the stream: writes fail with the fixed
    /// "Stream [temporarily] killed" error and delivery of already-accepted
    /// bytes pauses until [`revive`](Self::revive).
    pub fn kill(&self) {
        self.set_killed(None);
    }

    /// Disable the stream with a sticky fault re-raised by every write and
    /// flush until revived. A repeated kill replaces the fault.
    pub fn kill_with(&self, error: io::Error) {
        self.set_killed(Some(Fault::new(error)));
    }

    fn set_killed(&self, fault: Option<Fault>) {
        *self.shared.kill_fault.lock() = fault;
        self.shared.killed.store(true, Ordering::Release);
        log::debug!("[revivable] output stream killed");
        self.wake_waiters();
    }

    /// Re-enable a killed stream; paused delivery resumes.
    pub fn revive(&self) {
        self.shared.killed.store(false, Ordering::Release);
        log::debug!("[revivable] output stream revived");
        let _ = self.shared.availability_tx.try_send(());
    }

    /// Whether the stream is currently killed.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.shared.killed.load(Ordering::Acquire)
    }

    /// Whether [`close`](Self::close) has completed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Schedule a one-shot fault raised by exactly one subsequent write or
    /// flush. Faults fire in insertion order; kill-state pre-empts them.
    pub fn queue_write_error(&self, error: io::Error) {
        self.shared.queued.push(Fault::new(error));
        self.wake_waiters();
    }

    /// Enable or disable fault decoration (see [`crate::fault`]). On by
    /// default.
    pub fn set_decorate_errors(&self, on: bool) {
        self.shared.decorate.store(on, Ordering::Release);
    }

    /// Flush accepted bytes, signal the worker to exit, and mark the stream
    /// closed; the worker closes the sink by dropping it. Idempotent.
    ///
    /// A flush failure (kill or sticky fault) is propagated, but the stream
    /// still ends up closed and subsequent operations fail with
    /// "Stream Closed".
    pub fn close(&self) -> io::Result<()> {
        let shared = &*self.shared;
        let _cl = shared.close_lock.lock();
        if shared.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let flush_result = self.flush_impl();
        shared.closed.store(true, Ordering::Release);
        self.push_exit();
        log::debug!("[revivable] output stream closed");
        self.wake_waiters();
        flush_result
    }

    fn wake_waiters(&self) {
        let _ = self.shared.availability_tx.try_send(());
        let _ = self.shared.flush_tx.try_send(FlushReply::Poke);
    }

    /// Enqueue EXIT outside the precedence path. Skipped when the worker is
    /// already gone (terminal fault) or parked by a kill, in which case the
    /// closed flag alone makes it exit.
    fn push_exit(&self) {
        let shared = &*self.shared;
        loop {
            if shared.transfer_fault.lock().is_some() || shared.killed.load(Ordering::Acquire) {
                return;
            }
            match shared.transfer_tx.try_send(TransferItem::Exit) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => {
                    let _ = shared.availability_rx.recv_timeout(shared.poll);
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn decorate_on(&self) -> bool {
        self.shared.decorate.load(Ordering::Acquire)
    }

    /// Precedence walk shared by write, flush and close: closed, sticky
    /// transfer fault, kill-state (with or without fault), queued fault.
    fn check_precedence(&self) -> io::Result<()> {
        let shared = &*self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(fault::stream_closed());
        }
        let transfer_fault = shared.transfer_fault.lock().clone();
        if let Some(f) = transfer_fault {
            return Err(f.raise(self.decorate_on()));
        }
        if shared.killed.load(Ordering::Acquire) {
            let kill_fault = shared.kill_fault.lock().clone();
            if let Some(f) = kill_fault {
                return Err(f.raise(self.decorate_on()));
            }
            return Err(fault::stream_killed());
        }
        if let Some(f) = shared.queued.pop() {
            return Err(f.raise(self.decorate_on()));
        }
        Ok(())
    }

    fn submit(&self, item: TransferItem) -> io::Result<()> {
        let result = self.submit_inner(item);
        // A peer producer may be waiting on the availability slot.
        let _ = self.shared.availability_tx.try_send(());
        result
    }

    fn submit_inner(&self, item: TransferItem) -> io::Result<()> {
        let shared = &*self.shared;
        loop {
            self.check_precedence()?;
            match shared.transfer_tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(_)) => {
                    match shared.availability_rx.recv_timeout(shared.poll) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {
                            interrupt::check("revivable write")?;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(fault::stream_closed());
                        }
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(fault::stream_closed()),
            }
        }
    }

    fn flush_impl(&self) -> io::Result<()> {
        let shared = &*self.shared;
        let _fl = shared.flush_lock.lock();

        // Drop stale replies from an earlier, aborted flush.
        while shared.flush_rx.try_recv().is_ok() {}

        self.submit(TransferItem::Flush)?;
        loop {
            self.check_precedence()?;
            match shared.flush_rx.recv_timeout(shared.poll) {
                Ok(FlushReply::Done) => return Ok(()),
                Ok(FlushReply::Poke) => {}
                Ok(FlushReply::Failed(f)) => return Err(f.raise(self.decorate_on())),
                Err(RecvTimeoutError::Timeout) => interrupt::check("revivable flush")?,
                Err(RecvTimeoutError::Disconnected) => return Err(fault::stream_closed()),
            }
        }
    }
}

impl Write for RevivableWriter {
    /// Byte-by-byte submission: ordering and backpressure are preserved, and
    /// the precedence walk applies to every byte, so a queued fault fires on
    /// the exact write that consumes it.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.submit(TransferItem::Byte(b))?;
        }
        Ok(buf.len())
    }

    /// Blocks until every byte accepted before this call has been delivered
    /// to the underlying sink and the sink's own `flush` has completed.
    fn flush(&mut self) -> io::Result<()> {
        self.flush_impl()
    }
}

impl std::fmt::Debug for RevivableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevivableWriter")
            .field("killed", &self.is_killed())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Worker loop: drain the transfer queue into the sink.
fn write_worker(
    mut sink: Box<dyn Write + Send>,
    shared: &WriterShared,
    rx: &Receiver<TransferItem>,
    batch_capacity: usize,
) {
    log::trace!("[revivable] writer worker started");
    let mut batch: Vec<u8> = Vec::with_capacity(batch_capacity);
    loop {
        let _ = shared.availability_tx.try_send(());

        // Blocking-take, pausing while killed. A kill that arrives during a
        // close makes the worker exit without draining.
        let first = loop {
            if shared.killed.load(Ordering::Acquire) {
                if shared.closed.load(Ordering::Acquire) {
                    log::trace!("[revivable] writer worker abandoning queue (killed + closed)");
                    return;
                }
                thread::sleep(shared.poll);
                continue;
            }
            match rx.recv_timeout(shared.poll) {
                Ok(item) => break item,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        };

        // Accumulate consecutive bytes; stop at a control marker or full batch.
        let mut control = None;
        match first {
            TransferItem::Byte(b) => batch.push(b),
            marker => control = Some(marker),
        }
        while control.is_none() && batch.len() < batch_capacity {
            match rx.try_recv() {
                Ok(TransferItem::Byte(b)) => batch.push(b),
                Ok(marker) => control = Some(marker),
                Err(_) => break,
            }
        }

        // Deliver the batch before acting on any marker; delivery holds
        // while killed so a killed stream feeds the sink nothing new.
        if !batch.is_empty() {
            while shared.killed.load(Ordering::Acquire) {
                if shared.closed.load(Ordering::Acquire) {
                    return;
                }
                thread::sleep(shared.poll);
            }
            if let Err(e) = sink.write_all(&batch) {
                worker_fail(shared, e);
                return;
            }
            #[cfg(feature = "trace")]
            log::trace!("[revivable] delivered a {} byte batch", batch.len());
            batch.clear();
        }

        match control {
            Some(TransferItem::Flush) => {
                if let Err(e) = sink.flush() {
                    worker_fail(shared, e);
                    return;
                }
                let _ = shared.flush_tx.try_send(FlushReply::Done);
            }
            Some(TransferItem::Exit) => {
                log::trace!("[revivable] writer worker exiting cleanly");
                return;
            }
            _ => {}
        }
    }
}

/// Record a terminal sink fault and wake everyone who could be waiting on
/// the dead worker.
fn worker_fail(shared: &WriterShared, error: io::Error) {
    log::warn!("[revivable] writer worker terminating: {error}");
    let fault = Fault::new(error);
    *shared.transfer_fault.lock() = Some(fault.clone());
    let _ = shared.flush_tx.try_send(FlushReply::Failed(fault));
    let _ = shared.availability_tx.try_send(());
}

// ============================================================================
// Tests
// ============================================================================
