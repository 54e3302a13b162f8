// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Container support for the TTA lossless audio codec: the TTA1 file
//! header, its seek table, enough of RIFF/WAVE and Sony Wave64 to pull
//! PCM in and out of those containers, and a tag skipper for the APEv2
//! and ID3v2 tags some encoders prepend.
//!
//! This crate owns wire layout and `std::io`; the bit-exact codec work
//! lives in `tta_core` and is never duplicated here.

pub mod error;
pub mod header;
pub mod seektable;
pub mod tags;
pub mod w64;
pub mod wav;

pub use error::{FormatError, Result};
pub use header::Tta1Header;
pub use seektable::SeekTable;
pub use wav::PcmStreamInfo;
