// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cooperative per-thread interrupts.
//!
//! Rust threads cannot be interrupted from the outside, so this module
//! carries a cooperative stand-in: every thread owns an interrupt flag, any
//! holder of its [`InterruptHandle`] may raise it, and every blocking wait in
//! this crate polls the flag on a bounded tick. Observing the interrupt
//! consumes it, mirroring `Thread.interrupted()` semantics on the platform
//! this toolkit imitates.
//!
//! Cancellation latency is bounded by the waiter's poll interval
//! ([`crate::config::StreamConfig::poll_interval`]).

use std::cell::RefCell;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Arc<AtomicBool>> = RefCell::new(Arc::new(AtomicBool::new(false)));
}

/// Shared handle to one thread's interrupt flag.
///
/// Cheap to clone; clones alias the same flag.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Fresh handle not yet bound to any thread (see [`install`]).
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raise the interrupt flag.
    ///
    /// The owning thread observes it at its next blocking-wait tick (or call
    /// to [`taken`]/[`check`]) and fails the operation with an
    /// interrupted-I/O error.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether the flag is currently raised (does not consume it).
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear the flag without raising an error.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the calling thread's interrupt flag.
#[must_use]
pub fn handle() -> InterruptHandle {
    CURRENT.with(|cell| InterruptHandle {
        flag: Arc::clone(&cell.borrow()),
    })
}

/// Bind `handle` as the calling thread's interrupt flag.
///
/// Used by task runners that create the handle before spawning the worker,
/// so the spawner can interrupt the worker without a rendezvous.
pub fn install(handle: &InterruptHandle) {
    CURRENT.with(|cell| {
        *cell.borrow_mut() = Arc::clone(&handle.flag);
    });
}

/// Test-and-clear the calling thread's interrupt flag.
#[must_use]
pub fn taken() -> bool {
    CURRENT.with(|cell| cell.borrow().swap(false, Ordering::AcqRel))
}

/// Fail with an interrupted-I/O error if the calling thread was interrupted.
///
/// `op` names the blocked operation for the error message.
pub fn check(op: &str) -> io::Result<()> {
    if taken() {
        Err(crate::fault::interrupted(op))
    } else {
        Ok(())
    }
}
