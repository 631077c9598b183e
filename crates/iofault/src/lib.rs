// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # iofault - Fault injection for blocking byte-stream and socket I/O
//!
//! Production I/O code is hard to test because real sockets cannot be made
//! to fail on demand, cannot be interrupted at chosen points, and cannot be
//! driven from the test thread with deterministic timing. This crate
//! supplies controllable stand-ins: revivable streams wrapping ordinary
//! `Read`/`Write` values, killable in-memory pipes, and a mock socket
//! service the system under test can consume unchanged.
//!
//! ## Quick Start
//!
//! ```rust
//! use iofault::MockSocketService;
//! use std::io::{Read, Write};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = MockSocketService::new(1024);
//!
//!     // The code under test would do this through its connection layer.
//!     let socket = service.connect_socket("db.example", 5432);
//!     let mut sut_output = socket.output_stream();
//!     sut_output.write_all(b"hello")?;
//!     sut_output.flush()?;
//!
//!     // The test drains the registry and reads what the SUT wrote.
//!     let conn = service.take_only_connected()?;
//!     let mut buf = [0u8; 5];
//!     conn.input().read_exact(&mut buf)?;
//!     assert_eq!(&buf, b"hello");
//!
//!     // Faults on demand: the SUT's next read raises this error.
//!     conn.socket_input_control()
//!         .queue_read_error(std::io::Error::other("injected"));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        MockSocketService                           |
//! |        factory + live registry of connected surrogates            |
//! +--------------------------------------------------------------------+
//! |                         MockConnection                             |
//! |   MockSocket facade (SUT side)  |  input()/output() (test side)   |
//! +--------------------------------------------------------------------+
//! |                      killable byte pipes (x2)                      |
//! |   RevivableReader <- bounded ring <- RevivableWriter per direction |
//! +--------------------------------------------------------------------+
//! |                      revivable stream pair                         |
//! |   worker thread per stream | kill/revive | queued faults | flush  |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RevivableReader`] | Blocking reader with kill/revive and queued faults |
//! | [`RevivableWriter`] | Buffered blocking writer with coordinated flush |
//! | [`MockSocket`] | Socket facade handed to the system under test |
//! | [`MockConnection`] | Surrogate bundling both pipe directions and controls |
//! | [`MockSocketService`] | Factory and registry of connected surrogates |
//! | [`StreamConfig`] | Buffer size, poll interval, decoration defaults |
//!
//! ## Modules Overview
//!
//! - [`socket`] - mock socket surrogates and the service (start here)
//! - [`stream`] - the revivable stream pair
//! - [`pipe`] - killable byte pipes
//! - [`fault`] - injected-fault carrier and error decoration
//! - [`interrupt`] - cooperative thread interrupts
//! - [`codec`] - length-prefixed deflate block codec (independent)
//! - [`testkit`] - time-limited execution and async task running

/// Length-prefixed deflate block codec (independent of the core).
pub mod codec;
/// Central configuration for pipes, streams and the service.
pub mod config;
/// Injected-fault carrier, decoration, fixed error messages.
pub mod fault;
/// Cooperative per-thread interrupts.
pub mod interrupt;
/// Killable byte pipes.
pub mod pipe;
/// Mock socket surrogates and the socket service.
pub mod socket;
/// Revivable input/output streams.
pub mod stream;
/// Generic test utilities (time limits, async tasks, error cloning).
pub mod testkit;

pub use config::StreamConfig;
pub use fault::Fault;
pub use interrupt::InterruptHandle;
pub use pipe::{killable_pipe, pipe, PipeReader, PipeWriter};
pub use socket::{ConnectCall, MockConnection, MockSocket, MockSocketService, RegistryError};
pub use stream::{RevivableReader, RevivableWriter};
