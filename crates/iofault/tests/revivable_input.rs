// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Revivable input stream integration tests.
//!
//! Exercises the fault-injection control surface against live worker
//! threads: queued faults, kill/revive precedence, asynchronous kills of
//! blocked reads, decoration, and cooperative interrupts.

use iofault::fault::{is_decorated, DECORATION_MARKER};
use iofault::testkit::spawn_async;
use iofault::{killable_pipe, RevivableReader};
use std::io::{self, Cursor, Read};
use std::thread;
use std::time::{Duration, Instant};

fn reader_over(bytes: &[u8]) -> RevivableReader {
    RevivableReader::new(Cursor::new(bytes.to_vec()))
}

fn read_byte(reader: &mut RevivableReader) -> io::Result<Option<u8>> {
    reader.read_byte()
}

#[test]
fn test_queued_fault_fires_before_data() {
    let mut reader = reader_over(&[1, 2, 3]);
    reader.queue_read_error(io::Error::new(io::ErrorKind::NotFound, "intentional"));

    let err = read_byte(&mut reader).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert!(err.to_string().contains("intentional"));

    assert_eq!(read_byte(&mut reader).unwrap(), Some(1));
}

#[test]
fn test_kill_overrides_queued_fault() {
    let mut reader = reader_over(&[1, 2, 3]);
    reader.queue_read_error(io::Error::other("x"));
    reader.kill();

    for _ in 0..5 {
        assert_eq!(read_byte(&mut reader).unwrap(), None, "killed read is EOF");
    }

    reader.revive();
    let err = read_byte(&mut reader).unwrap_err();
    assert!(err.to_string().contains('x'), "queued fault fires after revive");

    assert_eq!(read_byte(&mut reader).unwrap(), Some(1));
}

#[test]
fn test_async_kill_unblocks_read() {
    let (reader, _writer) = killable_pipe(100);

    let control = reader.clone();
    let killer = spawn_async(move || {
        thread::sleep(Duration::from_millis(2000));
        control.kill();
    });

    let mut reader = reader;
    let mut buf = [0u8; 1];
    let start = Instant::now();
    let n = reader.read(&mut buf).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(n, 0, "killed read reports EOF");
    assert!(
        elapsed > Duration::from_millis(1000) && elapsed < Duration::from_millis(3000),
        "kill should have landed around the 2000 ms mark, took {elapsed:?}"
    );
    killer.result(Duration::from_secs(2)).unwrap();
}

#[test]
fn test_decoration_contract() {
    // Decoration on (the default): a clone carrying the original as source.
    let mut reader = reader_over(&[1]);
    reader.queue_read_error(io::Error::new(io::ErrorKind::NotFound, "intentional"));
    let err = read_byte(&mut reader).unwrap_err();
    assert!(is_decorated(&err));
    assert!(err.to_string().contains(DECORATION_MARKER));
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    let source = std::error::Error::source(&err).expect("decorated fault has a source");
    assert_eq!(source.to_string(), "intentional");

    // Decoration off: the original, verbatim.
    let mut reader = reader_over(&[1]);
    reader.set_decorate_errors(false);
    reader.queue_read_error(io::Error::new(io::ErrorKind::NotFound, "intentional"));
    let err = read_byte(&mut reader).unwrap_err();
    assert!(!is_decorated(&err));
    assert_eq!(err.to_string(), "intentional");
}

#[test]
fn test_queued_faults_fire_in_order_exactly_once() {
    let mut reader = reader_over(&[9]);
    for msg in ["one", "two", "three"] {
        reader.queue_read_error(io::Error::other(msg));
    }

    for msg in ["one", "two", "three"] {
        let err = read_byte(&mut reader).unwrap_err();
        assert!(err.to_string().contains(msg));
    }
    assert_eq!(read_byte(&mut reader).unwrap(), Some(9));
    assert_eq!(read_byte(&mut reader).unwrap(), None);
}

#[test]
fn test_interrupt_unblocks_read() {
    let (reader, _writer) = killable_pipe(10);

    let mut blocked = reader.clone();
    let task = spawn_async(move || {
        let mut buf = [0u8; 1];
        blocked.read(&mut buf)
    });

    thread::sleep(Duration::from_millis(100));
    task.interrupt();

    let outcome = task.result(Duration::from_secs(2)).unwrap();
    let err = outcome.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Interrupted);
}

#[test]
fn test_kill_does_not_lose_source_data() {
    let (reader, mut writer) = killable_pipe(100);
    use std::io::Write;
    writer.write_all(&[5, 6, 7]).unwrap();
    writer.flush().unwrap();

    let mut reader = reader;
    let mut first = [0u8; 1];
    reader.read_exact(&mut first).unwrap();
    assert_eq!(first[0], 5);

    reader.kill();
    assert_eq!(reader.read_byte().unwrap(), None, "killed reads yield nothing");

    // Revival resumes exactly where the source left off.
    reader.revive();
    assert_eq!(reader.read_byte().unwrap(), Some(6));
    assert_eq!(reader.read_byte().unwrap(), Some(7));
}

#[test]
fn test_close_releases_blocked_worker() {
    let (reader, _writer) = killable_pipe(10);

    // Park a read so the worker is blocked inside the empty pipe.
    let mut blocked = reader.clone();
    let task = spawn_async(move || {
        let mut buf = [0u8; 1];
        blocked.read(&mut buf)
    });
    thread::sleep(Duration::from_millis(100));

    reader.close();
    let outcome = task.result(Duration::from_secs(2)).unwrap();
    assert!(outcome.is_err(), "read on a closed stream fails");
}
