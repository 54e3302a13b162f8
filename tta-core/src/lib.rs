// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-frame encode/decode engine for the TTA lossless audio codec.
//!
//! This crate is a pure data-transform layer: it knows nothing about
//! files, containers, or threads. A caller describes a frame (channel
//! count, sample depth, sample count), then repeatedly presents a pair of
//! buffers — interleaved `i32` PCM samples on one side, TTA bytes on the
//! other — to [`FrameCodec::step`]. The codec consumes as much of each
//! buffer as it can and reports exactly how far it got, so it can be
//! suspended and resumed at any buffer boundary, down to a single byte,
//! without losing state.
//!
//! Container parsing, file I/O, and the CLI surface are collaborators
//! that live in other crates (`tta-format`, `tta-cli`); this crate never
//! touches a file descriptor and never logs (see [`error::CoreError`]).

mod bitcache;
pub mod checksum;
mod error;
mod filter;
mod fixed;
mod frame;
mod pcm;
mod rice;

pub use error::{CoreError, Result};
pub use frame::{FrameCodec, FrameDescriptor, Mode, Progress, Status};
pub use pcm::{PcmFormat, PcmReader, PcmWriter};

/// The largest channel count a [`FrameCodec`] will accept.
///
/// Not part of the wire format (a TTA1 header's channel count is a plain
/// `u16`); this is a sanity limit on how large a per-channel state array
/// this crate is willing to allocate on a caller's behalf.
pub const MAX_CHANNELS: u32 = 256;

/// A PCM sample depth this codec supports. TTA1 has no encoding for any
/// other width, and the adaptive filter's fixed shift (`k = 10`, see
/// [`filter`]) is only meaningful for these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDepth {
    Eight,
    Sixteen,
    TwentyFour,
}

impl SampleDepth {
    /// Constructs a `SampleDepth` from a bits-per-sample value, as read
    /// from a TTA1 or WAVE header.
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(SampleDepth::Eight),
            16 => Ok(SampleDepth::Sixteen),
            24 => Ok(SampleDepth::TwentyFour),
            _ => Err(CoreError::InvalidParameter("unsupported sample depth")),
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            SampleDepth::Eight => 8,
            SampleDepth::Sixteen => 16,
            SampleDepth::TwentyFour => 24,
        }
    }

    /// The initial Rice parameter for both `k0` and `k1` at the start of a
    /// frame. See DESIGN.md / SPEC_FULL.md §4.3.1: the reference source
    /// fragment available to this project does not include the function
    /// that seeds this value, so it is a documented judgement call rather
    /// than a recovered constant.
    pub(crate) fn rice_k_init(self) -> u8 {
        (self.bits() / 2 - 1) as u8
    }
}

/// `frame_len = floor(rate * 1.04489795918367346939 / 256) * 256`
///
/// Part of the TTA1 wire contract: the number of samples-per-channel in
/// every frame of a file except possibly the last, derived from the
/// sample rate alone.
pub fn frame_length(sample_rate: u32) -> u32 {
    const TTA_FRAME_TIME: f64 = 1.044_897_959_183_673_5;
    (((sample_rate as f64) * TTA_FRAME_TIME / 256.0).floor() as u32) * 256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_matches_known_rates() {
        // 44100 Hz is the rate used throughout the seed test suite.
        assert_eq!(frame_length(44_100), 46_080);
        assert_eq!(frame_length(48_000), 50_176);
    }

    #[test]
    fn sample_depth_round_trips_bits() {
        for bits in [8u16, 16, 24] {
            assert_eq!(SampleDepth::from_bits(bits).unwrap().bits(), bits);
        }
        assert!(SampleDepth::from_bits(32).is_err());
    }
}
