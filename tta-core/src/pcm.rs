// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Marshalling between a sample's wire representation (1, 2, or 3 bytes,
//! little-endian, depth-dependent signedness) and the `i32` the rest of
//! this crate computes in.

use crate::SampleDepth;

/// The wire layout of one PCM sample, independent of how many bytes it
/// takes: `Eight` is unsigned (offset by `0x80`), `Sixteen` and
/// `TwentyFour` are signed little-endian.
pub type PcmFormat = SampleDepth;

/// Reads interleaved PCM samples into `i32`s, one call per sample.
#[derive(Debug, Clone, Copy)]
pub struct PcmReader {
    format: PcmFormat,
}

impl PcmReader {
    pub fn new(format: PcmFormat) -> Self {
        PcmReader { format }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self.format {
            SampleDepth::Eight => 1,
            SampleDepth::Sixteen => 2,
            SampleDepth::TwentyFour => 3,
        }
    }

    /// Reads one sample from the front of `bytes`. `bytes` must be at
    /// least [`Self::bytes_per_sample`] long.
    pub fn read(&self, bytes: &[u8]) -> i32 {
        match self.format {
            SampleDepth::Eight => (bytes[0] as i32) - 0x80,
            SampleDepth::Sixteen => {
                let lo = bytes[0] as u32;
                let hi = bytes[1] as i8 as i32;
                (lo as i32) | (hi << 8)
            }
            SampleDepth::TwentyFour => {
                let lo = bytes[0] as u32;
                let mid = bytes[1] as u32;
                let hi = bytes[2] as i8 as i32;
                ((lo | (mid << 8)) as i32) | (hi << 16)
            }
        }
    }
}

/// Writes `i32` samples back to interleaved PCM bytes.
#[derive(Debug, Clone, Copy)]
pub struct PcmWriter {
    format: PcmFormat,
}

impl PcmWriter {
    pub fn new(format: PcmFormat) -> Self {
        PcmWriter { format }
    }

    pub fn bytes_per_sample(&self) -> usize {
        PcmReader::new(self.format).bytes_per_sample()
    }

    /// Writes one sample to the front of `out`. `out` must be at least
    /// [`Self::bytes_per_sample`] long.
    pub fn write(&self, value: i32, out: &mut [u8]) {
        match self.format {
            SampleDepth::Eight => {
                out[0] = (value + 0x80) as u8;
            }
            SampleDepth::Sixteen => {
                out[0] = value as u8;
                out[1] = (value >> 8) as u8;
            }
            SampleDepth::TwentyFour => {
                out[0] = value as u8;
                out[1] = (value >> 8) as u8;
                out[2] = (value >> 16) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_round_trips() {
        let r = PcmReader::new(SampleDepth::Eight);
        let w = PcmWriter::new(SampleDepth::Eight);
        for byte in [0u8, 0x80, 0xFF, 1, 0x7F] {
            let v = r.read(&[byte]);
            let mut out = [0u8; 1];
            w.write(v, &mut out);
            assert_eq!(out[0], byte);
        }
    }

    #[test]
    fn sixteen_bit_sign_extends() {
        let r = PcmReader::new(SampleDepth::Sixteen);
        assert_eq!(r.read(&[0xFF, 0xFF]), -1);
        assert_eq!(r.read(&[0x00, 0x80]), -32768);
        assert_eq!(r.read(&[0xFF, 0x7F]), 32767);

        let w = PcmWriter::new(SampleDepth::Sixteen);
        let mut out = [0u8; 2];
        w.write(-1, &mut out);
        assert_eq!(out, [0xFF, 0xFF]);
        w.write(32767, &mut out);
        assert_eq!(out, [0xFF, 0x7F]);
    }

    #[test]
    fn twentyfour_bit_sign_extends() {
        let r = PcmReader::new(SampleDepth::TwentyFour);
        assert_eq!(r.read(&[0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(r.read(&[0x00, 0x00, 0x80]), -8_388_608);
        assert_eq!(r.read(&[0xFF, 0xFF, 0x7F]), 8_388_607);

        let w = PcmWriter::new(SampleDepth::TwentyFour);
        let mut out = [0u8; 3];
        w.write(-8_388_608, &mut out);
        assert_eq!(out, [0x00, 0x00, 0x80]);
    }
}
