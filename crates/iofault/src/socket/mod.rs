// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mock socket surrogate.
//!
//! [`MockSocket`] is the facade handed to the system under test: it looks
//! like a freshly connected socket (streams, peer address, timeouts, close)
//! but records every call for later verification and is backed by two
//! killable in-memory pipes instead of a network. [`MockConnection`] bundles
//! the facade with the test-side ends of both pipes and the fault-injection
//! controls for each direction.
//!
//! # Wiring
//!
//! ```text
//!   test output() == ingress pipe write end ──▶ ingress pipe ──▶ SUT input_stream()
//!   test input()  == egress pipe read end   ◀── egress pipe  ◀── SUT output_stream()
//! ```
//!
//! `socket_input_control()` / `socket_output_control()` alias the very
//! streams the facade hands to the SUT, so the test can kill or queue faults
//! on reads and writes the SUT is performing.

use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::pipe::killable_pipe_with_config;
use crate::stream::{RevivableReader, RevivableWriter};

pub mod service;

pub use service::{MockSocketService, RegistryError};

/// Fixed peer address reported by every mock socket.
pub const MOCK_PEER_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(98, 76, 54, 32));

/// Arguments of a recorded `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectCall {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct SocketState {
    connect_call: Option<ConnectCall>,
    read_timeout: Option<Duration>,
    closed: bool,
}

/// Stand-in socket consumed by the system under test.
///
/// Clones alias the same socket.
#[derive(Clone)]
pub struct MockSocket {
    state: Arc<Mutex<SocketState>>,
    /// SUT-visible input: read end of the ingress pipe.
    ingress_reader: RevivableReader,
    /// SUT-visible output: write end of the egress pipe.
    egress_writer: RevivableWriter,
}

impl MockSocket {
    /// Record a connect call. Never blocks, never fails; the test asserts
    /// the recorded arguments afterwards.
    pub fn connect(&self, host: &str, port: u16, timeout: Duration) {
        let mut state = self.state.lock();
        state.connect_call = Some(ConnectCall {
            host: host.to_string(),
            port,
            timeout,
        });
        log::debug!("[mocksock] connect recorded: {host}:{port} timeout {timeout:?}");
    }

    /// The stream the SUT reads from (whatever the test wrote).
    #[must_use]
    pub fn input_stream(&self) -> RevivableReader {
        self.ingress_reader.clone()
    }

    /// The stream the SUT writes to (whatever the test will read).
    #[must_use]
    pub fn output_stream(&self) -> RevivableWriter {
        self.egress_writer.clone()
    }

    /// Always the fixed literal `98.76.54.32`.
    #[must_use]
    pub fn peer_addr(&self) -> IpAddr {
        MOCK_PEER_ADDR
    }

    /// Record a read timeout; nothing enforces it.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.state.lock().read_timeout = timeout;
    }

    /// The last recorded read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.state.lock().read_timeout
    }

    /// Close both SUT-visible streams. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.ingress_reader.close();
        let _ = self.egress_writer.close();
        log::debug!("[mocksock] socket closed");
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// The recorded connect arguments, if `connect` ran.
    #[must_use]
    pub fn connect_call(&self) -> Option<ConnectCall> {
        self.state.lock().connect_call.clone()
    }
}

impl std::fmt::Debug for MockSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockSocket")
            .field("connect_call", &state.connect_call)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

/// One faked connection: the socket facade plus the test-side stream ends
/// and per-direction fault controls.
#[derive(Clone)]
pub struct MockConnection {
    socket: MockSocket,
    /// Test-side read end of the egress pipe.
    input: RevivableReader,
    /// Test-side write end of the ingress pipe.
    output: RevivableWriter,
}

impl MockConnection {
    /// Build a surrogate over two fresh killable pipes of `buffer_size`
    /// bytes each.
    #[must_use]
    pub fn create(buffer_size: usize) -> Self {
        Self::create_with_config(&StreamConfig::with_buffer_size(buffer_size))
    }

    /// [`create`](Self::create) with full stream configuration.
    #[must_use]
    pub fn create_with_config(config: &StreamConfig) -> Self {
        // Ingress carries test -> SUT bytes, egress carries SUT -> test.
        let (ingress_reader, ingress_writer) = killable_pipe_with_config(config);
        let (egress_reader, egress_writer) = killable_pipe_with_config(config);

        let socket = MockSocket {
            state: Arc::new(Mutex::new(SocketState::default())),
            ingress_reader,
            egress_writer,
        };

        Self {
            socket,
            input: egress_reader,
            output: ingress_writer,
        }
    }

    /// The facade to hand to the system under test.
    #[must_use]
    pub fn socket(&self) -> MockSocket {
        self.socket.clone()
    }

    /// Test-side reader: yields whatever the SUT wrote to its output stream.
    #[must_use]
    pub fn input(&self) -> RevivableReader {
        self.input.clone()
    }

    /// Test-side writer: feeds whatever the SUT will read from its input
    /// stream.
    #[must_use]
    pub fn output(&self) -> RevivableWriter {
        self.output.clone()
    }

    /// Control handle over the very stream the facade returns from
    /// `input_stream()`; kills and queued faults here hit reads the SUT is
    /// performing.
    #[must_use]
    pub fn socket_input_control(&self) -> RevivableReader {
        self.socket.ingress_reader.clone()
    }

    /// Control handle over the very stream the facade returns from
    /// `output_stream()`.
    #[must_use]
    pub fn socket_output_control(&self) -> RevivableWriter {
        self.socket.egress_writer.clone()
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;

    #[test]
    fn test_peer_addr_is_fixed_literal() {
        let conn = MockConnection::create(64);
        assert_eq!(
            conn.socket().peer_addr(),
            IpAddr::V4(Ipv4Addr::new(98, 76, 54, 32))
        );
    }

    #[test]
    fn test_connect_recording() {
        let conn = MockConnection::create(64);
        let socket = conn.socket();
        assert!(socket.connect_call().is_none());

        socket.connect("addr1", 123, Duration::ZERO);
        assert_eq!(
            socket.connect_call(),
            Some(ConnectCall {
                host: "addr1".to_string(),
                port: 123,
                timeout: Duration::ZERO,
            })
        );
    }

    #[test]
    fn test_test_writes_reach_sut_reads() {
        let conn = MockConnection::create(64);
        let mut sut_input = conn.socket().input_stream();
        let mut test_output = conn.output();

        test_output.write_all(b"ping").unwrap();
        test_output.flush().unwrap();

        let mut buf = [0u8; 4];
        sut_input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_sut_writes_reach_test_reads() {
        let conn = MockConnection::create(64);
        let mut sut_output = conn.socket().output_stream();
        let mut test_input = conn.input();

        sut_output.write_all(b"pong").unwrap();
        sut_output.flush().unwrap();

        let mut buf = [0u8; 4];
        test_input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn test_input_control_aliases_sut_stream() {
        let conn = MockConnection::create(64);
        let mut sut_input = conn.socket().input_stream();

        conn.socket_input_control().kill();

        let sut = thread::spawn(move || {
            let mut buf = [0u8; 1];
            sut_input.read(&mut buf)
        });
        assert_eq!(sut.join().unwrap().unwrap(), 0, "killed SUT read sees EOF");
    }

    #[test]
    fn test_read_timeout_recording() {
        let conn = MockConnection::create(64);
        let socket = conn.socket();
        assert_eq!(socket.read_timeout(), None);
        socket.set_read_timeout(Some(Duration::from_millis(250)));
        assert_eq!(socket.read_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let conn = MockConnection::create(64);
        let socket = conn.socket();
        socket.close();
        socket.close();
        assert!(socket.is_closed());

        let mut sut_output = socket.output_stream();
        assert!(sut_output.write(&[1]).is_err(), "closed socket rejects writes");
    }
}
