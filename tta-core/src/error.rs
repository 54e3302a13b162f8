// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `error` module defines the error type returned across the codec
//! boundary.
//!
//! Kept dependency-free (no `thiserror`) so the crate stays usable in
//! constrained environments; collaborator crates further up the stack
//! are free to wrap this in a richer error type.

use core::fmt;

/// `CoreError` enumerates the only two error conditions the codec engine can
/// report. Everything else (I/O, container parsing, allocation) belongs to a
/// collaborator crate and is never seen here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// The trailer CRC read at the end of a decoded frame did not match the
    /// CRC accumulated while decoding it. The frame's PCM output is still
    /// valid bytes; the caller decides whether to surface or mask this.
    CrcMismatch { expected: u32, computed: u32 },
    /// The codec was constructed with a channel count or sample depth it
    /// does not support. Fatal: the instance cannot be used.
    InvalidParameter(&'static str),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CoreError::CrcMismatch { expected, computed } => write!(
                f,
                "frame trailer crc mismatch: expected {:#010x}, computed {:#010x}",
                expected, computed
            ),
            CoreError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

/// Convenience result alias for fallible constructors in this crate.
pub type Result<T> = core::result::Result<T, CoreError>;
