// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The 22-byte TTA1 file header: a 4-byte ASCII preamble, a fixed
//! WAVE-format code, the stream's shape (channels, bit depth, rate,
//! total samples), and a CRC-32 over everything before it.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use tta_core::checksum::Crc32;
use tta_core::SampleDepth;

use crate::error::{FormatError, Result};

const PREAMBLE: &[u8; 4] = b"TTA1";
const WAVE_FORMAT_PCM: u16 = 0x0001;
const BODY_LEN: usize = 18;

/// The parsed contents of a TTA1 header, with the CRC already verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tta1Header {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub total_samples: u32,
}

impl Tta1Header {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut body = [0u8; BODY_LEN];
        reader.read_exact(&mut body)?;
        if &body[0..4] != PREAMBLE {
            return Err(FormatError::NotTta1);
        }
        let format = LittleEndian::read_u16(&body[4..6]);
        if format != WAVE_FORMAT_PCM {
            return Err(FormatError::UnsupportedWaveFormat(format));
        }
        let channels = LittleEndian::read_u16(&body[6..8]);
        let bits_per_sample = LittleEndian::read_u16(&body[8..10]);
        let sample_rate = LittleEndian::read_u32(&body[10..14]);
        let total_samples = LittleEndian::read_u32(&body[14..18]);

        let crc = reader.read_u32::<LittleEndian>()?;
        let computed = Crc32::of(&body);
        if crc != computed {
            return Err(FormatError::HeaderCrcMismatch { expected: crc, computed });
        }

        Ok(Tta1Header { channels, bits_per_sample, sample_rate, total_samples })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut body = [0u8; BODY_LEN];
        body[0..4].copy_from_slice(PREAMBLE);
        LittleEndian::write_u16(&mut body[4..6], WAVE_FORMAT_PCM);
        LittleEndian::write_u16(&mut body[6..8], self.channels);
        LittleEndian::write_u16(&mut body[8..10], self.bits_per_sample);
        LittleEndian::write_u32(&mut body[10..14], self.sample_rate);
        LittleEndian::write_u32(&mut body[14..18], self.total_samples);

        writer.write_all(&body)?;
        writer.write_u32::<LittleEndian>(Crc32::of(&body))?;
        Ok(())
    }

    /// Number of interleaved-sample frames per TTA frame, derived from
    /// this stream's sample rate.
    pub fn frame_length(&self) -> u32 {
        tta_core::frame_length(self.sample_rate)
    }

    /// Total number of frames the stream is split into.
    pub fn frame_count(&self) -> u32 {
        let per_frame = self.frame_length();
        (self.total_samples + per_frame - 1) / per_frame
    }

    pub fn sample_depth(&self) -> Result<SampleDepth> {
        SampleDepth::from_bits(self.bits_per_sample)
            .map_err(|_| FormatError::UnsupportedSampleDepth(self.bits_per_sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let header = Tta1Header { channels: 2, bits_per_sample: 16, sample_rate: 44100, total_samples: 123_456 };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), BODY_LEN + 4);

        let read_back = Tta1Header::read(&mut &buf[..]).unwrap();
        assert_eq!(read_back, header);
    }

    #[test]
    fn rejects_bad_preamble() {
        let mut buf = vec![0u8; BODY_LEN + 4];
        buf[0..4].copy_from_slice(b"OOPS");
        let err = Tta1Header::read(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, FormatError::NotTta1));
    }

    #[test]
    fn rejects_corrupted_crc() {
        let header = Tta1Header { channels: 1, bits_per_sample: 8, sample_rate: 8000, total_samples: 10 };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let err = Tta1Header::read(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, FormatError::HeaderCrcMismatch { .. }));
    }

    #[test]
    fn frame_count_rounds_up() {
        let header = Tta1Header { channels: 1, bits_per_sample: 16, sample_rate: 44100, total_samples: 46081 };
        assert_eq!(header.frame_length(), 46080);
        assert_eq!(header.frame_count(), 2);
    }
}
