// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Central configuration for pipes, revivable streams and the mock socket
//! service.
//!
//! All tunables live here so that call sites never hardcode buffer sizes or
//! poll intervals.

use std::time::Duration;

/// Default capacity, in bytes, of a killable pipe and of the write-side
/// transfer queue.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default tick used by every blocking wait to re-check the cooperative
/// interrupt flag and control-surface state.
///
/// Cancellation latency is bounded by this interval; throughput is not,
/// because data arrival wakes waiters through condvars/channels directly.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Whether raised faults are decorated by default (see
/// [`crate::fault::clone_error_add_current_stack`]).
pub const DEFAULT_DECORATE_ERRORS: bool = true;

/// Configuration shared by revivable streams and killable pipes.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Pipe / transfer-queue capacity in bytes. Also the write-side worker's
    /// batch size, so callers observe roughly `3 * buffer_size` of total
    /// buffering on a killable pipe.
    pub buffer_size: usize,
    /// Tick for interrupt/state re-checks inside blocking waits.
    pub poll_interval: Duration,
    /// Initial decoration setting for raised faults.
    pub decorate_errors: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            decorate_errors: DEFAULT_DECORATE_ERRORS,
        }
    }
}

impl StreamConfig {
    /// Configuration with the given buffer size and default everything else.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.decorate_errors);
    }

    #[test]
    fn test_with_buffer_size() {
        let config = StreamConfig::with_buffer_size(4);
        assert_eq!(config.buffer_size, 4);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }
}
