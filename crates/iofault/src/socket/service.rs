// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mock socket service: factory and live registry of connected surrogates.
//!
//! The code under test asks the service for connections; each
//! `connect_socket` builds a fresh [`MockConnection`], records the connect
//! arguments on its facade and appends it to the registry in connection
//! order. The test drains the registry with the clear-/wait- operations.
//! Entries are never removed implicitly.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::StreamConfig;
use crate::interrupt;
use crate::socket::{MockConnection, MockSocket};

/// Misuse of the connection registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A connection was expected and the registry is empty.
    Empty,
    /// Exactly one connection was expected.
    WrongCount(usize),
    /// At most one connection may be present when a wait begins.
    TooManyWaiting(usize),
    /// No connection arrived before the deadline.
    WaitTimeout(Duration),
    /// The waiting thread was interrupted.
    Interrupted,
    /// The registry was expected to be empty.
    NotEmpty(usize),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no connected mock sockets"),
            Self::WrongCount(n) => {
                write!(f, "[{n}] connected mock sockets instead of exactly one")
            }
            Self::TooManyWaiting(n) => {
                write!(f, "[{n}] connected mock sockets instead of one or none")
            }
            Self::WaitTimeout(timeout) => {
                write!(f, "timed out after {timeout:?} waiting for a connected mock socket")
            }
            Self::Interrupted => {
                write!(f, "interrupted while waiting for a connected mock socket")
            }
            Self::NotEmpty(n) => {
                write!(f, "There are {n} connected socket mocks instead of none")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

struct Registry {
    deque: Mutex<VecDeque<MockConnection>>,
    cond: Condvar,
}

/// Factory and registry for mock socket surrogates.
///
/// Clones alias the same registry, so the service handle given to the code
/// under test and the one held by the test observe the same connections.
#[derive(Clone)]
pub struct MockSocketService {
    config: StreamConfig,
    registry: Arc<Registry>,
}

impl MockSocketService {
    /// Service whose surrogates use pipes of `buffer_size` bytes.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self::with_config(StreamConfig::with_buffer_size(buffer_size))
    }

    /// Service with full stream configuration.
    #[must_use]
    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry {
                deque: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Connect with a zero timeout; see
    /// [`connect_socket_with_timeout`](Self::connect_socket_with_timeout).
    pub fn connect_socket(&self, host: &str, port: u16) -> MockSocket {
        self.connect_socket_with_timeout(host, port, Duration::ZERO)
    }

    /// Create a surrogate, record the connect arguments on its facade,
    /// append it to the registry, and return the facade.
    pub fn connect_socket_with_timeout(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> MockSocket {
        let conn = MockConnection::create_with_config(&self.config);
        let socket = conn.socket();
        socket.connect(host, port, timeout);

        let mut deque = self.registry.deque.lock();
        deque.push_back(conn);
        log::debug!(
            "[mocksock] surrogate #{} connected to {host}:{port}",
            deque.len()
        );
        self.registry.cond.notify_all();
        socket
    }

    /// Number of connections currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.deque.lock().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.deque.lock().is_empty()
    }

    /// Snapshot of all connections, in connection order.
    #[must_use]
    pub fn all_connected(&self) -> Vec<MockConnection> {
        self.registry.deque.lock().iter().cloned().collect()
    }

    /// Atomically drain all connections, in connection order. The returned
    /// list is decoupled from subsequent connects.
    #[must_use]
    pub fn take_all_connected(&self) -> Vec<MockConnection> {
        let mut deque = self.registry.deque.lock();
        deque.drain(..).collect()
    }

    /// The most recent connection.
    pub fn last_connected(&self) -> Result<MockConnection, RegistryError> {
        self.registry
            .deque
            .lock()
            .back()
            .cloned()
            .ok_or(RegistryError::Empty)
    }

    /// The single registered connection; an error if there are none or more
    /// than one.
    pub fn only_connected(&self) -> Result<MockConnection, RegistryError> {
        let deque = self.registry.deque.lock();
        if deque.len() > 1 {
            return Err(RegistryError::WrongCount(deque.len()));
        }
        deque.front().cloned().ok_or(RegistryError::Empty)
    }

    /// Pop the oldest connection; an error if it was not the only one (the
    /// pop still happens) or if there was none.
    pub fn take_only_connected(&self) -> Result<MockConnection, RegistryError> {
        let mut deque = self.registry.deque.lock();
        let count = deque.len();
        match deque.pop_front() {
            None => Err(RegistryError::Empty),
            Some(_) if count > 1 => Err(RegistryError::WrongCount(count)),
            Some(conn) => Ok(conn),
        }
    }

    /// Wait up to `timeout` for a single connection and pop it.
    ///
    /// Fails immediately if more than one connection is already present;
    /// fails with a timeout error at the deadline and with an interrupted
    /// error if the waiting thread is interrupted.
    pub fn wait_for_only_connected(
        &self,
        timeout: Duration,
    ) -> Result<MockConnection, RegistryError> {
        let deadline = Instant::now() + timeout;
        let mut deque = self.registry.deque.lock();
        if deque.len() > 1 {
            return Err(RegistryError::TooManyWaiting(deque.len()));
        }
        loop {
            if let Some(conn) = deque.pop_front() {
                return Ok(conn);
            }
            if interrupt::taken() {
                return Err(RegistryError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RegistryError::WaitTimeout(timeout));
            }
            let wait = (deadline - now).min(self.config.poll_interval);
            let _ = self.registry.cond.wait_for(&mut deque, wait);
        }
    }

    /// Fail unless the registry is empty.
    pub fn assert_no_connected(&self) -> Result<(), RegistryError> {
        let count = self.registry.deque.lock().len();
        if count > 0 {
            return Err(RegistryError::NotEmpty(count));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
