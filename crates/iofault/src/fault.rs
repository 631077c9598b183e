// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Injected-fault carrier and error decoration.
//!
//! Kill and queue-error controls accept any [`std::io::Error`] (which can
//! itself box an arbitrary error type), and sticky faults must be re-raised
//! on every subsequent operation. [`Fault`] makes that possible by holding
//! the injected error behind an `Arc` and producing a fresh `io::Error` per
//! raise, preserving kind and message end-to-end.
//!
//! # Decoration
//!
//! With decoration enabled (the default), a raised fault is a *clone* of the
//! original: same [`io::ErrorKind`], same message, the original reachable via
//! [`std::error::Error::source`], and the sentinel marker
//! [`DECORATION_MARKER`] appended to the rendering so tests can detect that
//! the raise site rewrote the error. With decoration disabled, the raised
//! error reproduces the original verbatim: same kind, same message, no
//! sentinel, no source chain.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Sentinel substring present in the rendering of every decorated fault.
pub const DECORATION_MARKER: &str = "cloneThrowableAddCurrentStack";

/// Fixed message for operations on a closed stream.
pub const STREAM_CLOSED_MSG: &str = "Stream Closed";

/// Fixed message for a write on a killed stream with no kill fault set.
pub const STREAM_KILLED_MSG: &str = "Stream [temporarily] killed";

/// A fault injected into a stream, cloneable so it can be raised repeatedly.
#[derive(Debug, Clone)]
pub struct Fault {
    original: Arc<io::Error>,
}

impl Fault {
    /// Wrap an injected error.
    #[must_use]
    pub fn new(error: io::Error) -> Self {
        Self {
            original: Arc::new(error),
        }
    }

    /// Kind of the injected error.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        self.original.kind()
    }

    /// The injected error itself.
    #[must_use]
    pub fn original(&self) -> &io::Error {
        &self.original
    }

    /// Produce the `io::Error` to hand to the caller.
    ///
    /// Decorated raises clone the fault and chain the original as `source()`;
    /// undecorated raises reproduce it verbatim.
    #[must_use]
    pub fn raise(&self, decorate: bool) -> io::Error {
        if decorate {
            io::Error::new(
                self.original.kind(),
                Decorated {
                    original: Arc::clone(&self.original),
                },
            )
        } else {
            io::Error::new(
                self.original.kind(),
                Verbatim {
                    original: Arc::clone(&self.original),
                },
            )
        }
    }
}

impl From<io::Error> for Fault {
    fn from(error: io::Error) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Payload of a decorated raise: original message plus the sentinel, with
/// the original error as the source.
#[derive(Debug)]
struct Decorated {
    original: Arc<io::Error>,
}

impl fmt::Display for Decorated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.original, DECORATION_MARKER)
    }
}

impl StdError for Decorated {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.original.as_ref())
    }
}

/// Payload of an undecorated raise: renders exactly like the original.
#[derive(Debug)]
struct Verbatim {
    original: Arc<io::Error>,
}

impl fmt::Display for Verbatim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl StdError for Verbatim {}

/// Whether `error` was produced by a decorated raise.
#[must_use]
pub fn is_decorated(error: &io::Error) -> bool {
    error
        .get_ref()
        .is_some_and(|inner| inner.downcast_ref::<Decorated>().is_some())
}

/// Clone `error` into a new instance of the same kind and message, with
/// `error` as its `source()` and [`DECORATION_MARKER`] in the rendering.
///
/// This is the decoration primitive used by the revivable streams; it is
/// also exposed for test code that wants to decorate errors of its own.
#[must_use]
pub fn clone_error_add_current_stack(error: io::Error) -> io::Error {
    Fault::new(error).raise(true)
}

/// The fixed error raised by operations on a closed stream.
#[must_use]
pub fn stream_closed() -> io::Error {
    io::Error::other(STREAM_CLOSED_MSG)
}

/// The fixed error raised by a write on a killed stream with no fault set.
#[must_use]
pub fn stream_killed() -> io::Error {
    io::Error::other(STREAM_KILLED_MSG)
}

/// Interrupted-I/O error for a blocking `op` cut short by a cooperative
/// interrupt.
#[must_use]
pub fn interrupted(op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Interrupted,
        format!("interrupted while blocked in {op}"),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decorated_raise_keeps_kind_and_message() {
        let fault = Fault::new(io::Error::new(io::ErrorKind::NotFound, "intentional"));
        let raised = fault.raise(true);

        assert_eq!(raised.kind(), io::ErrorKind::NotFound);
        assert!(raised.to_string().contains("intentional"));
        assert!(raised.to_string().contains(DECORATION_MARKER));
        assert!(is_decorated(&raised));
    }

    #[test]
    fn test_decorated_raise_chains_original() {
        let fault = Fault::new(io::Error::new(io::ErrorKind::TimedOut, "intentional"));
        let raised = fault.raise(true);

        let source = raised.source().expect("decorated raise must have a source");
        assert_eq!(source.to_string(), "intentional");
    }

    #[test]
    fn test_verbatim_raise_has_no_marker() {
        let fault = Fault::new(io::Error::new(io::ErrorKind::TimedOut, "intentional"));
        let raised = fault.raise(false);

        assert_eq!(raised.kind(), io::ErrorKind::TimedOut);
        assert_eq!(raised.to_string(), "intentional");
        assert!(!is_decorated(&raised));
        assert!(raised.source().is_none());
    }

    #[test]
    fn test_fault_raises_repeatedly() {
        let fault = Fault::new(io::Error::new(io::ErrorKind::BrokenPipe, "sticky"));
        for _ in 0..3 {
            let raised = fault.raise(true);
            assert_eq!(raised.kind(), io::ErrorKind::BrokenPipe);
        }
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(stream_closed().to_string(), STREAM_CLOSED_MSG);
        assert_eq!(stream_killed().to_string(), STREAM_KILLED_MSG);
        assert_eq!(interrupted("read").kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_clone_helper_matches_decorated_raise() {
        let cloned =
            clone_error_add_current_stack(io::Error::new(io::ErrorKind::NotFound, "intentional"));
        assert!(is_decorated(&cloned));
        assert_eq!(cloned.kind(), io::ErrorKind::NotFound);
    }
}
