// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Everything that can go wrong reading or writing a TTA1/WAV/W64
/// container, as opposed to errors from the codec engine itself
/// (`tta_core::CoreError`), which surface separately.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("not a TTA1 file (bad preamble)")]
    NotTta1,
    #[error("unsupported TTA1 format code {0:#06x} (only PCM, 0x0001, is supported)")]
    UnsupportedWaveFormat(u16),
    #[error("TTA1 header CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    HeaderCrcMismatch { expected: u32, computed: u32 },
    #[error("seek table CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    SeekTableCrcMismatch { expected: u32, computed: u32 },
    #[error("not a RIFF/WAVE file")]
    NotRiffWave,
    #[error("not a Sony Wave64 file")]
    NotWave64,
    #[error("RIFF/WAVE file has no fmt chunk")]
    MissingFmtChunk,
    #[error("RIFF/WAVE file has no data chunk")]
    MissingDataChunk,
    #[error("unsupported PCM sample depth {0} bits (only 8/16/24 are supported)")]
    UnsupportedSampleDepth(u16),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FormatError>;
