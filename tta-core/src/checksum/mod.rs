// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `checksum` module provides the CRC-32 implementation shared by the
//! frame trailer, the TTA1 header, and the seek table.

mod crc32;

pub use crc32::Crc32;

/// A `Monitor` observes bytes passing through some other operation without
/// taking part in it. The Rice coder folds each byte it emits/consumes into
/// a [`Crc32`] this way; the container layer reuses the same trait to
/// checksum a header or seek table while writing or reading it.
pub trait Monitor {
    fn process_byte(&mut self, byte: u8);

    fn process_buf_bytes(&mut self, buf: &[u8]) {
        for &byte in buf {
            self.process_byte(byte);
        }
    }
}

impl Monitor for Crc32 {
    #[inline]
    fn process_byte(&mut self, byte: u8) {
        self.update_byte(byte);
    }
}
