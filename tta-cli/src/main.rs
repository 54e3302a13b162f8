// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![forbid(unsafe_code)]

mod cli;
mod codec;
mod container;
mod context;

use std::fs::File;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use clap::Parser;

use cli::{Cli, Command, DecodeArgs, EncodeArgs, OutputFormat, RawPcmSpec, ThreadMode};
use context::Context;
use tta_core::{CoreError, FrameDescriptor, SampleDepth};
use tta_format::{SeekTable, Tta1Header};

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let ctx = Context::new(is_quiet(&cli.command));

    if let Err(err) = ctx.install_sigint_handler() {
        log::warn!("failed to install SIGINT handler: {err}");
    }

    let result = match cli.command {
        Command::Encode(args) => run_encode(args, &ctx),
        Command::Decode(args) => run_decode(args, &ctx),
    };

    if let Err(err) = result {
        ctx.error(err);
    }

    std::process::exit(ctx.exit_code());
}

fn is_quiet(command: &Command) -> bool {
    match command {
        Command::Encode(args) => args.common.quiet,
        Command::Decode(args) => args.common.quiet,
    }
}

fn run_encode(args: EncodeArgs, ctx: &Context) -> anyhow::Result<()> {
    let rawpcm = args.rawpcm.as_deref().map(RawPcmSpec::parse).transpose()?;
    let input = container::read_input(&args.common.input, rawpcm)?;

    let bytes_per_sample = input.depth.bits() as usize / 8;
    let sample_slot = input.channels as usize * bytes_per_sample;
    let total_samples = (input.pcm.len() / sample_slot) as u32;
    let frame_samples = tta_core::frame_length(input.sample_rate) as usize;
    let frame_bytes = (frame_samples * sample_slot).max(sample_slot);

    let frames: Vec<&[u8]> = input.pcm.chunks(frame_bytes).collect();
    let descriptors: Vec<FrameDescriptor> = frames
        .iter()
        .map(|chunk| FrameDescriptor {
            channels: input.channels as u32,
            depth: input.depth,
            samples_per_channel: (chunk.len() / sample_slot) as u32,
        })
        .collect();

    let encoded = match args.common.threading.mode() {
        ThreadMode::Single => {
            let mut out = Vec::with_capacity(frames.len());
            for (descriptor, pcm) in descriptors.iter().zip(frames.iter()) {
                out.push(codec::encode_frame(*descriptor, pcm)?);
            }
            out
        }
        ThreadMode::Multi { workers } => encode_parallel(&descriptors, &frames, workers)?,
    };

    let output_path = args.common.output.clone().unwrap_or_else(|| args.common.input.with_extension("tta"));
    ctx.set_current_destination(Some(output_path.clone()));

    let header = Tta1Header {
        channels: input.channels,
        bits_per_sample: input.depth.bits(),
        sample_rate: input.sample_rate,
        total_samples,
    };
    let seek_table = SeekTable::from_frame_sizes(encoded.iter().map(|frame| frame.len() as u32).collect());

    let mut out_file = File::create(&output_path)?;
    header.write(&mut out_file)?;
    seek_table.write_to(&mut out_file)?;
    for frame in &encoded {
        out_file.write_all(frame)?;
    }
    drop(out_file);
    ctx.set_current_destination(None);

    if args.common.delete_source {
        std::fs::remove_file(&args.common.input)?;
    }
    if !args.common.quiet {
        let compressed: usize = encoded.iter().map(Vec::len).sum();
        println!("{}: {} frames, {} -> {} bytes", output_path.display(), encoded.len(), input.pcm.len(), compressed);
    }
    Ok(())
}

fn run_decode(args: DecodeArgs, ctx: &Context) -> anyhow::Result<()> {
    let mut file = File::open(&args.common.input)?;
    tta_format::tags::skip_leading_tags(&mut file)?;
    let header = Tta1Header::read(&mut file)?;
    let depth = SampleDepth::from_bits(header.bits_per_sample)?;
    let frame_count = header.frame_count() as usize;

    let seek_table = SeekTable::read_from(&mut file, frame_count)?;

    let mut tta_bytes = Vec::new();
    file.read_to_end(&mut tta_bytes)?;

    let frame_length = header.frame_length();
    let mut remaining_samples = header.total_samples;
    let mut offset = 0usize;
    let mut frame_slices = Vec::with_capacity(frame_count);
    let mut descriptors = Vec::with_capacity(frame_count);
    for &len in &seek_table.frame_lengths {
        let samples_per_channel = remaining_samples.min(frame_length);
        remaining_samples -= samples_per_channel;
        descriptors.push(FrameDescriptor { channels: header.channels as u32, depth, samples_per_channel });
        frame_slices.push(&tta_bytes[offset..offset + len as usize]);
        offset += len as usize;
    }

    let decoded = match args.common.threading.mode() {
        ThreadMode::Single => {
            let mut out = Vec::with_capacity(descriptors.len());
            for (descriptor, slice) in descriptors.iter().zip(frame_slices.iter()) {
                let (pcm, crc_err) = codec::decode_frame(*descriptor, slice)?;
                if let Some(err) = crc_err {
                    ctx.warn(format!("frame checksum mismatch: {err}"));
                }
                out.push(pcm);
            }
            out
        }
        ThreadMode::Multi { workers } => decode_parallel(&descriptors, &frame_slices, workers, ctx)?,
    };

    let pcm: Vec<u8> = decoded.into_iter().flatten().collect();

    let output_path = args.common.output.clone().unwrap_or_else(|| {
        let ext = match args.format {
            OutputFormat::Raw => "pcm",
            OutputFormat::Wav => "wav",
            OutputFormat::W64 => "w64",
        };
        args.common.input.with_extension(ext)
    });
    ctx.set_current_destination(Some(output_path.clone()));
    container::write_output(&output_path, args.format, header.channels, header.bits_per_sample, header.sample_rate, &pcm)?;
    ctx.set_current_destination(None);

    if args.common.delete_source {
        std::fs::remove_file(&args.common.input)?;
    }
    if !args.common.quiet {
        println!("{}: {} samples", output_path.display(), header.total_samples);
    }
    Ok(())
}

fn encode_parallel(
    descriptors: &[FrameDescriptor],
    frames: &[&[u8]],
    workers: Option<usize>,
) -> anyhow::Result<Vec<Vec<u8>>> {
    let worker_count = worker_count(workers, frames.len());
    let next_index = AtomicUsize::new(0);
    let results: Vec<Mutex<Option<tta_core::Result<Vec<u8>>>>> =
        (0..frames.len()).map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let next_index = &next_index;
            let results = &results;
            scope.spawn(move || loop {
                let idx = next_index.fetch_add(1, Ordering::Relaxed);
                if idx >= frames.len() {
                    break;
                }
                let result = codec::encode_frame(descriptors[idx], frames[idx]);
                *results[idx].lock().unwrap() = Some(result);
            });
        }
    });

    results
        .into_iter()
        .map(|cell| cell.into_inner().unwrap().expect("every frame index is claimed by exactly one worker"))
        .collect::<tta_core::Result<Vec<Vec<u8>>>>()
        .map_err(anyhow::Error::from)
}

fn decode_parallel(
    descriptors: &[FrameDescriptor],
    frames: &[&[u8]],
    workers: Option<usize>,
    ctx: &Context,
) -> anyhow::Result<Vec<Vec<u8>>> {
    let worker_count = worker_count(workers, frames.len());
    let next_index = AtomicUsize::new(0);
    let results: Vec<Mutex<Option<tta_core::Result<(Vec<u8>, Option<CoreError>)>>>> =
        (0..frames.len()).map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let next_index = &next_index;
            let results = &results;
            scope.spawn(move || loop {
                let idx = next_index.fetch_add(1, Ordering::Relaxed);
                if idx >= frames.len() {
                    break;
                }
                let result = codec::decode_frame(descriptors[idx], frames[idx]);
                *results[idx].lock().unwrap() = Some(result);
            });
        }
    });

    let mut out = Vec::with_capacity(results.len());
    for cell in results {
        let (pcm, crc_err) = cell.into_inner().unwrap().expect("every frame index is claimed by exactly one worker")?;
        if let Some(err) = crc_err {
            ctx.warn(format!("frame checksum mismatch: {err}"));
        }
        out.push(pcm);
    }
    Ok(out)
}

fn worker_count(workers: Option<usize>, frame_count: usize) -> usize {
    let requested = workers
        .unwrap_or_else(|| std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1));
    requested.max(1).min(frame_count.max(1))
}
