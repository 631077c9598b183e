// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed deflate block codec.
//!
//! Independent of the fault-injection core; it shares the repository because
//! compressed block streams are a common thing to drive through the mock
//! sockets. See [`block`] for the wire format.

mod block;

pub use block::{
    CompressedBlockReader, CompressedBlockWriter, BLOCK_MAGIC, DEFAULT_BLOCK_SIZE,
    DEFAULT_MAX_BLOCK_SIZE,
};
