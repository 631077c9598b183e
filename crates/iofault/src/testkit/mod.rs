// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic test utilities.
//!
//! - [`spawn_async`] runs a closure on a worker thread and hands back an
//!   [`AsyncTask`] for collecting the result with a deadline, or for
//!   interrupting the worker out-of-band.
//! - [`run_with_time_limit`] bounds a closure's execution time.
//! - [`clone_error_add_current_stack`] is the error-decoration primitive,
//!   re-exported from [`crate::fault`].

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::interrupt::{self, InterruptHandle};
use crate::stream::worker_name;

pub use crate::fault::clone_error_add_current_stack;

/// Failure of an asynchronous task.
#[derive(Debug)]
pub enum AsyncError {
    /// The task did not produce a result before the deadline.
    TimedOut(Duration),
    /// The task panicked; carries the panic payload's message.
    Panicked(String),
    /// The worker thread went away without producing a result, or the
    /// result was already collected.
    Vanished,
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut(limit) => write!(f, "task exceeded its {limit:?} time limit"),
            Self::Panicked(msg) => write!(f, "task panicked: {msg}"),
            Self::Vanished => write!(f, "task worker vanished without a result"),
        }
    }
}

impl std::error::Error for AsyncError {}

/// Handle to a closure running on a worker thread.
pub struct AsyncTask<T> {
    rx: mpsc::Receiver<thread::Result<T>>,
    interrupt: InterruptHandle,
}

impl<T> AsyncTask<T> {
    /// Wait up to `timeout` for the task's result. A panic inside the task
    /// surfaces as [`AsyncError::Panicked`].
    pub fn result(&self, timeout: Duration) -> Result<T, AsyncError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(AsyncError::Panicked(panic_message(payload.as_ref()))),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(AsyncError::TimedOut(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(AsyncError::Vanished),
        }
    }

    /// Interrupt the worker thread (cooperatively; see [`crate::interrupt`]).
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// The worker's interrupt handle, for callers that want to interrupt it
    /// later or from yet another thread.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `body` on a named worker thread and return its task handle.
pub fn spawn_async<T, F>(body: F) -> AsyncTask<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = InterruptHandle::new();
    let installed = handle.clone();

    #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
    thread::Builder::new()
        .name(worker_name("task"))
        .spawn(move || {
            interrupt::install(&installed);
            let outcome = catch_unwind(AssertUnwindSafe(body));
            let _ = tx.send(outcome);
        })
        .expect("Failed to spawn async task worker");

    AsyncTask {
        rx,
        interrupt: handle,
    }
}

/// Run `body` on a worker thread with a time limit.
///
/// On timeout the worker is interrupted (it keeps running until it observes
/// the interrupt) and [`AsyncError::TimedOut`] is returned.
pub fn run_with_time_limit<T, F>(limit: Duration, body: F) -> Result<T, AsyncError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let task = spawn_async(body);
    let outcome = task.result(limit);
    if matches!(outcome, Err(AsyncError::TimedOut(_))) {
        task.interrupt();
    }
    outcome
}

// ============================================================================
// Tests
// ============================================================================
