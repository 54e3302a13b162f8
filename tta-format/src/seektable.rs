// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The seek table that immediately follows a TTA1 header: one
//! little-endian `u32` compressed byte length per frame, followed by a
//! CRC-32 over the raw table bytes.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use tta_core::checksum::Crc32;

use crate::error::{FormatError, Result};

/// Per-frame compressed lengths, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekTable {
    pub frame_lengths: Vec<u32>,
}

impl SeekTable {
    pub fn from_frame_sizes(frame_lengths: Vec<u32>) -> Self {
        SeekTable { frame_lengths }
    }

    /// Reads a table of `frame_count` entries plus its trailing CRC.
    pub fn read_from<R: Read>(reader: &mut R, frame_count: usize) -> Result<Self> {
        let mut raw = vec![0u8; frame_count * 4];
        reader.read_exact(&mut raw)?;

        let crc = reader.read_u32::<LittleEndian>()?;
        let computed = Crc32::of(&raw);
        if crc != computed {
            return Err(FormatError::SeekTableCrcMismatch { expected: crc, computed });
        }

        let frame_lengths = raw.chunks_exact(4).map(LittleEndian::read_u32).collect();
        Ok(SeekTable { frame_lengths })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut raw = Vec::with_capacity(self.frame_lengths.len() * 4);
        for &len in &self.frame_lengths {
            raw.extend_from_slice(&len.to_le_bytes());
        }
        writer.write_all(&raw)?;
        writer.write_u32::<LittleEndian>(Crc32::of(&raw))?;
        Ok(())
    }

    /// Byte offset of frame `index`'s first compressed byte, relative to
    /// the first frame's first byte.
    pub fn frame_byte_offset(&self, index: usize) -> u64 {
        self.frame_lengths[..index].iter().map(|&len| u64::from(len)).sum()
    }

    /// On-disk size of a table with `frame_count` entries, table plus CRC.
    pub fn byte_len(frame_count: usize) -> usize {
        frame_count * 4 + 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let table = SeekTable::from_frame_sizes(vec![1000, 2000, 1500]);
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SeekTable::byte_len(3));

        let read_back = SeekTable::read_from(&mut &buf[..], 3).unwrap();
        assert_eq!(read_back, table);
    }

    #[test]
    fn frame_byte_offset_sums_preceding_lengths() {
        let table = SeekTable::from_frame_sizes(vec![1000, 2000, 1500]);
        assert_eq!(table.frame_byte_offset(0), 0);
        assert_eq!(table.frame_byte_offset(1), 1000);
        assert_eq!(table.frame_byte_offset(2), 3000);
    }

    #[test]
    fn rejects_corrupted_crc() {
        let table = SeekTable::from_frame_sizes(vec![42]);
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let err = SeekTable::read_from(&mut &buf[..], 1).unwrap_err();
        assert!(matches!(err, FormatError::SeekTableCrcMismatch { .. }));
    }
}
