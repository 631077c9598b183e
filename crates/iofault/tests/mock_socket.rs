// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mock socket service integration tests.
//!
//! Runs a small system-under-test against surrogate sockets: connect
//! recording, registry draining, waiting for connections with deadlines,
//! and fault injection on the streams the SUT holds.

use iofault::testkit::spawn_async;
use iofault::{ConnectCall, MockSocketService, RegistryError};
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_connect_recording_and_draining() {
    let service = MockSocketService::new(1024);

    let s1 = service.connect_socket("addr1", 123);
    assert_eq!(
        s1.connect_call(),
        Some(ConnectCall {
            host: "addr1".to_string(),
            port: 123,
            timeout: Duration::ZERO,
        })
    );

    let s2 = service.connect_socket_with_timeout("addr2", 234, Duration::from_millis(4567));
    assert_eq!(
        s2.connect_call(),
        Some(ConnectCall {
            host: "addr2".to_string(),
            port: 234,
            timeout: Duration::from_millis(4567),
        })
    );

    assert_eq!(service.all_connected().len(), 2);
    assert_eq!(service.take_all_connected().len(), 2);
    assert!(service.is_empty(), "drain leaves the registry empty");
}

#[test]
fn test_wait_times_out_on_empty_registry() {
    let service = MockSocketService::new(1024);

    let start = Instant::now();
    let err = service
        .wait_for_only_connected(Duration::from_millis(1000))
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, RegistryError::WaitTimeout(_)));
    assert!(
        elapsed >= Duration::from_millis(900) && elapsed < Duration::from_millis(2000),
        "deadline was 1000 ms, waited {elapsed:?}"
    );
}

#[test]
fn test_wait_returns_late_connection() {
    let service = MockSocketService::new(1024);

    let svc = service.clone();
    let connector = spawn_async(move || {
        thread::sleep(Duration::from_millis(2000));
        svc.connect_socket("addr4", 456);
    });

    let start = Instant::now();
    let conn = service
        .wait_for_only_connected(Duration::from_millis(3000))
        .unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed > Duration::from_millis(1000) && elapsed < Duration::from_millis(3000),
        "connection landed after ~2000 ms, waited {elapsed:?}"
    );
    assert_eq!(
        conn.socket().connect_call(),
        Some(ConnectCall {
            host: "addr4".to_string(),
            port: 456,
            timeout: Duration::ZERO,
        })
    );
    connector.result(Duration::from_secs(3)).unwrap();
}

#[test]
fn test_echo_sut_round_trip() {
    let service = MockSocketService::new(256);

    // SUT: connect, echo every byte back, close on EOF.
    let svc = service.clone();
    let sut = spawn_async(move || -> io::Result<()> {
        let socket = svc.connect_socket("echo.example", 7);
        let mut input = socket.input_stream();
        let mut output = socket.output_stream();
        let mut buf = [0u8; 32];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n])?;
            output.flush()?;
        }
        output.close()
    });

    let conn = service
        .wait_for_only_connected(Duration::from_millis(2000))
        .unwrap();

    let mut to_sut = conn.output();
    to_sut.write_all(b"round and round").unwrap();
    to_sut.flush().unwrap();

    let mut from_sut = conn.input();
    let mut buf = [0u8; 15];
    from_sut.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"round and round");

    // EOF towards the SUT ends its loop.
    to_sut.close().unwrap();
    sut.result(Duration::from_secs(2)).unwrap().unwrap();
}

#[test]
fn test_kill_interrupts_sut_read() {
    let service = MockSocketService::new(256);

    let svc = service.clone();
    let sut = spawn_async(move || {
        let socket = svc.connect_socket("dead.example", 9);
        let mut input = socket.input_stream();
        let mut buf = [0u8; 8];
        input.read(&mut buf)
    });

    let conn = service
        .wait_for_only_connected(Duration::from_millis(2000))
        .unwrap();

    thread::sleep(Duration::from_millis(100));
    conn.socket_input_control().kill();

    let n = sut.result(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(n, 0, "the SUT's blocked read sees EOF on kill");
}

#[test]
fn test_queued_fault_hits_sut_write() {
    let service = MockSocketService::new(256);
    let socket = service.connect_socket("flaky.example", 11);
    let conn = service.take_only_connected().unwrap();

    conn.socket_output_control()
        .queue_write_error(io::Error::new(io::ErrorKind::ConnectionReset, "injected"));

    let mut output = socket.output_stream();
    let err = output.write(&[1]).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    assert!(err.to_string().contains("injected"));

    // One-shot: the connection is healthy again.
    output.write_all(b"ok").unwrap();
    output.flush().unwrap();

    let mut from_sut = conn.input();
    let mut buf = [0u8; 2];
    from_sut.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ok");
}

#[test]
fn test_independent_directions() {
    let service = MockSocketService::new(256);
    let socket = service.connect_socket("half.example", 13);
    let conn = service.take_only_connected().unwrap();

    // Killing the SUT's input leaves its output working.
    conn.socket_input_control().kill();

    let mut output = socket.output_stream();
    output.write_all(b"still up").unwrap();
    output.flush().unwrap();

    let mut from_sut = conn.input();
    let mut buf = [0u8; 8];
    from_sut.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"still up");
}

#[test]
fn test_assert_no_connected_after_drain() {
    let service = MockSocketService::new(64);
    service.connect_socket("a", 1);

    let err = service.assert_no_connected().unwrap_err();
    assert_eq!(
        err.to_string(),
        "There are 1 connected socket mocks instead of none"
    );

    let _ = service.take_all_connected();
    assert!(service.assert_no_connected().is_ok());
}

#[test]
fn test_interrupted_wait() {
    let service = MockSocketService::new(64);

    let svc = service.clone();
    let waiter = spawn_async(move || svc.wait_for_only_connected(Duration::from_secs(10)));

    thread::sleep(Duration::from_millis(100));
    waiter.interrupt();

    let outcome = waiter.result(Duration::from_secs(2)).unwrap();
    assert_eq!(outcome.unwrap_err(), RegistryError::Interrupted);
}
