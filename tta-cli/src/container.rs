// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reads a whole PCM source (WAVE, Wave64, or headerless raw) into
//! memory, and writes decoded PCM back out into one of those same
//! containers. TTA1 itself is handled one frame at a time by
//! [`crate::codec`]; this module only deals with what comes before and
//! after the codec.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::Context as _;
use tta_core::SampleDepth;

use crate::cli::{OutputFormat, RawPcmSpec};

pub struct InputAudio {
    pub depth: SampleDepth,
    pub channels: u16,
    pub sample_rate: u32,
    pub pcm: Vec<u8>,
}

/// Reads `path`, skipping any leading APEv2/ID3v2 tags, then either
/// trusts `rawpcm` or sniffs a WAVE/Wave64 header to learn the PCM
/// shape before reading the sample data itself.
pub fn read_input(path: &Path, rawpcm: Option<RawPcmSpec>) -> anyhow::Result<InputAudio> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    tta_format::tags::skip_leading_tags(&mut file)?;

    if let Some(spec) = rawpcm {
        let mut pcm = Vec::new();
        file.read_to_end(&mut pcm)?;
        return Ok(InputAudio { depth: spec.depth, channels: spec.channels, sample_rate: spec.sample_rate, pcm });
    }

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    file.seek(SeekFrom::Current(-4))?;

    if tta_format::wav::has_magic(&magic) {
        let info = tta_format::wav::read_header(&mut file)?;
        let mut pcm = vec![0u8; info.data_len as usize];
        file.read_exact(&mut pcm)?;
        let depth = SampleDepth::from_bits(info.bits_per_sample)?;
        Ok(InputAudio { depth, channels: info.channels, sample_rate: info.sample_rate, pcm })
    } else if tta_format::w64::has_magic(&magic) {
        let info = tta_format::w64::read_header(&mut file)?;
        let mut pcm = vec![0u8; info.data_len as usize];
        file.read_exact(&mut pcm)?;
        let depth = SampleDepth::from_bits(info.bits_per_sample)?;
        Ok(InputAudio { depth, channels: info.channels, sample_rate: info.sample_rate, pcm })
    } else {
        anyhow::bail!(
            "{}: not a recognized WAVE or Wave64 file; pass --rawpcm to treat it as headerless PCM",
            path.display()
        )
    }
}

pub fn write_output(
    path: &Path,
    format: OutputFormat,
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    pcm: &[u8],
) -> anyhow::Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    match format {
        OutputFormat::Raw => {}
        OutputFormat::Wav => {
            tta_format::wav::write_header(&mut file, channels, bits_per_sample, sample_rate, pcm.len() as u32)?
        }
        OutputFormat::W64 => {
            tta_format::w64::write_header(&mut file, channels, bits_per_sample, sample_rate, pcm.len() as u32)?
        }
    }
    file.write_all(pcm)?;
    Ok(())
}
