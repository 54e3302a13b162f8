// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Argument parsing for the `tta` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tta_core::SampleDepth;

#[derive(Parser, Debug)]
#[command(name = "tta", version, about = "Encode and decode TTA lossless audio.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress PCM audio into a TTA1 stream.
    Encode(EncodeArgs),
    /// Decompress a TTA1 stream back into PCM audio.
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Input file path.
    pub input: PathBuf,

    /// Output file path; defaults to the input path with its extension swapped.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Suppress progress and summary output.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Delete the source file after a successful run.
    #[arg(short = 'd', long = "delete-source")]
    pub delete_source: bool,

    #[command(flatten)]
    pub threading: ThreadingArgs,
}

#[derive(Args, Debug)]
pub struct ThreadingArgs {
    /// Process every frame on the calling thread (default).
    #[arg(short = 'S', long = "single-thread", conflicts_with = "multi_thread")]
    pub single_thread: bool,

    /// Process frames across a worker pool, since frames are independent
    /// of one another once their shape is known.
    #[arg(short = 'M', long = "multi-thread")]
    pub multi_thread: bool,

    /// Worker count for `-M`; defaults to the available parallelism.
    #[arg(short = 't', long = "threads", requires = "multi_thread")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub enum ThreadMode {
    Single,
    Multi { workers: Option<usize> },
}

impl ThreadingArgs {
    pub fn mode(&self) -> ThreadMode {
        if self.multi_thread {
            ThreadMode::Multi { workers: self.threads }
        } else {
            ThreadMode::Single
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Treat the input as headerless raw PCM with the given
    /// `format,rate,channels` (format is one of u8, s16, s24).
    #[arg(long = "rawpcm", value_name = "FORMAT,RATE,CHANNELS")]
    pub rawpcm: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Container to wrap the decoded PCM in.
    #[arg(long = "format", value_enum, default_value = "wav")]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Raw,
    Wav,
    W64,
}

/// A parsed `--rawpcm=format,rate,channels` value.
#[derive(Debug, Clone, Copy)]
pub struct RawPcmSpec {
    pub depth: SampleDepth,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RawPcmSpec {
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let mut fields = spec.split(',');
        let (Some(format), Some(rate), Some(channels), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            anyhow::bail!("--rawpcm expects exactly three comma-separated fields: format,rate,channels");
        };

        let depth = match format {
            "u8" => SampleDepth::Eight,
            "s16" => SampleDepth::Sixteen,
            "s24" => SampleDepth::TwentyFour,
            other => anyhow::bail!("unknown raw PCM format '{other}' (expected u8, s16, or s24)"),
        };
        let sample_rate: u32 = rate.parse()?;
        let channels: u16 = channels.parse()?;
        Ok(RawPcmSpec { depth, sample_rate, channels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rawpcm_parses_valid_spec() {
        let spec = RawPcmSpec::parse("s16,44100,2").unwrap();
        assert_eq!(spec.depth, SampleDepth::Sixteen);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.channels, 2);
    }

    #[test]
    fn rawpcm_rejects_unknown_format() {
        assert!(RawPcmSpec::parse("f32,44100,2").is_err());
    }

    #[test]
    fn rawpcm_rejects_wrong_field_count() {
        assert!(RawPcmSpec::parse("s16,44100").is_err());
        assert!(RawPcmSpec::parse("s16,44100,2,0").is_err());
    }
}
