// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-frame resumable state machine that ties the bit cache, Rice
//! coder, adaptive filter, and fixed predictor together into a single
//! `i32`-PCM <-> TTA-bytes transform.
//!
//! A [`FrameCodec`] is built once per frame (channel count, sample
//! depth, and sample count never change mid-frame) and is driven by
//! repeated calls to [`FrameCodec::encode_step`] or
//! [`FrameCodec::decode_step`], each of which consumes as much of its
//! input and produces as much of its output as the supplied buffers
//! allow, then reports exactly how far it got.
//!
//! Per sample, encoding runs channel decorrelation, then the fixed
//! predictor, then the adaptive filter; decoding runs the same three
//! stages in reverse.

use smallvec::SmallVec;

use crate::bitcache::BitCache;
use crate::checksum::{Crc32, Monitor};
use crate::error::{CoreError, Result};
use crate::filter::Filter;
use crate::fixed::{self, FixedPredictor};
use crate::pcm::{PcmReader, PcmWriter};
use crate::rice::{DecodeOutcome, Decoder, Encoder, RiceState};
use crate::SampleDepth;

/// Static description of a frame: every quantity needed to size its
/// per-channel state and know when it is complete.
#[derive(Debug, Clone, Copy)]
pub struct FrameDescriptor {
    pub channels: u32,
    pub depth: SampleDepth,
    pub samples_per_channel: u32,
}

impl FrameDescriptor {
    fn total_slots(&self) -> u64 {
        self.channels as u64 * self.samples_per_channel as u64
    }

    /// Number of leading channels in each slot that run through the
    /// chained decorrelation transform. A stereo slot chains both
    /// channels; three or more channels chain every channel but the
    /// last, which passes through untouched.
    fn decorrelated_channels(&self) -> usize {
        match self.channels {
            0 | 1 => 0,
            2 => 2,
            n => (n - 1) as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encode,
    Decode,
}

/// What a `*_step` call accomplished before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Stopped because an input or output buffer ran out. Call again
    /// with more of each to continue from exactly this point.
    Suspended,
    /// The frame's samples and trailer CRC have both been fully
    /// produced/consumed. The `FrameCodec` should be discarded or
    /// reused for the next frame via [`FrameCodec::reset`].
    Done,
}

/// How much of this call's buffers were actually used.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub pcm_bytes: usize,
    pub tta_bytes: usize,
}

#[derive(Clone, Copy)]
struct ChannelState {
    filter: Filter,
    fixed: FixedPredictor,
    rice: RiceState,
}

impl ChannelState {
    fn new(depth: SampleDepth) -> Self {
        ChannelState {
            filter: Filter::new(),
            fixed: FixedPredictor::new(),
            rice: RiceState::new(depth),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FramePhase {
    Fresh,
    InProgress,
    TrailerPending,
    Done,
}

pub struct FrameCodec {
    descriptor: FrameDescriptor,
    mode: Mode,
    channels: SmallVec<[ChannelState; 8]>,
    cache: BitCache,
    crc: Crc32,
    pos: u64,
    phase: FramePhase,

    // --- encode-only resumable state ---
    /// The value ready to be pushed through the decorrelator/fixed
    /// predictor/filter for the channel at the current `pos`, once
    /// known.
    encode_value: Option<i32>,
    /// Raw PCM samples read so far for the slot currently being
    /// assembled, in channel order. Filled across possibly several
    /// calls, then drained into `encode_queue` once a full slot (one
    /// sample per channel) has been read.
    encode_slot: SmallVec<[i32; 8]>,
    /// Already-decorrelated values for the current slot, not yet
    /// popped into `encode_value`. Drained front-to-back.
    encode_queue: SmallVec<[i32; 8]>,
    encode_job: Option<Encoder>,

    // --- decode-only resumable state ---
    decode_job: Decoder,
    /// Per-channel values reconstructed (post fixed predictor and
    /// filter) for the slot currently being assembled, in channel
    /// order. Drained into `pcm_queue` once a full slot is ready.
    decode_slot: SmallVec<[i32; 8]>,
    /// PCM samples ready to write but not yet fit in the caller's
    /// buffer. Decoding itself has already fully progressed past them.
    pcm_queue: SmallVec<[i32; 8]>,

    trailer_buf: [u8; 5],
    trailer_len: u8,
    trailer_pos: u8,
}

impl FrameCodec {
    pub fn new(descriptor: FrameDescriptor, mode: Mode) -> Result<Self> {
        if descriptor.channels == 0 || descriptor.channels > crate::MAX_CHANNELS {
            return Err(CoreError::InvalidParameter("channel count out of range"));
        }
        let channels = (0..descriptor.channels)
            .map(|_| ChannelState::new(descriptor.depth))
            .collect();
        Ok(FrameCodec {
            descriptor,
            mode,
            channels,
            cache: BitCache::new(),
            crc: Crc32::new(),
            pos: 0,
            phase: FramePhase::Fresh,
            encode_value: None,
            encode_slot: SmallVec::new(),
            encode_queue: SmallVec::new(),
            encode_job: None,
            decode_job: Decoder::new(),
            decode_slot: SmallVec::new(),
            pcm_queue: SmallVec::new(),
            trailer_buf: [0; 5],
            trailer_len: 0,
            trailer_pos: 0,
        })
    }

    /// Resets all per-channel adaptive state and positions for a new
    /// frame with the same shape, without reallocating.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            *ch = ChannelState::new(self.descriptor.depth);
        }
        self.cache = BitCache::new();
        self.crc = Crc32::new();
        self.pos = 0;
        self.phase = FramePhase::Fresh;
        self.encode_value = None;
        self.encode_slot.clear();
        self.encode_queue.clear();
        self.encode_job = None;
        self.decode_job = Decoder::new();
        self.decode_slot.clear();
        self.pcm_queue.clear();
        self.trailer_buf = [0; 5];
        self.trailer_len = 0;
        self.trailer_pos = 0;
    }

    fn channel_index(&self) -> usize {
        (self.pos % self.descriptor.channels as u64) as usize
    }

    // ---------------------------------------------------------------
    // Encode
    // ---------------------------------------------------------------

    /// Consumes interleaved PCM bytes from `pcm` and produces TTA bytes
    /// into `out`, advancing as far as both buffers allow.
    pub fn encode_step(&mut self, pcm: &[u8], out: &mut [u8]) -> (Progress, Status) {
        debug_assert_eq!(self.mode, Mode::Encode);
        let mut progress = Progress::default();
        let reader = PcmReader::new(self.descriptor.depth);
        let sample_width = reader.bytes_per_sample();

        loop {
            if self.phase == FramePhase::Fresh {
                self.phase = FramePhase::InProgress;
            }

            if self.phase == FramePhase::InProgress {
                if self.pos >= self.descriptor.total_slots() {
                    self.phase = FramePhase::TrailerPending;
                    continue;
                }

                if let Some(mut job) = self.encode_job.take() {
                    let complete =
                        job.drive(&mut self.cache, out, &mut progress.tta_bytes, &mut self.crc);
                    if !complete {
                        self.encode_job = Some(job);
                        return (progress, Status::Suspended);
                    }
                    self.pos += 1;
                    continue;
                }

                if self.encode_value.is_none() {
                    if self.encode_queue.is_empty() {
                        let channels = self.descriptor.channels as usize;
                        while self.encode_slot.len() < channels {
                            if progress.pcm_bytes + sample_width > pcm.len() {
                                return (progress, Status::Suspended);
                            }
                            let raw = reader.read(&pcm[progress.pcm_bytes..]);
                            progress.pcm_bytes += sample_width;
                            self.encode_slot.push(raw);
                        }
                        let mut slot = core::mem::take(&mut self.encode_slot);
                        let m = self.descriptor.decorrelated_channels();
                        fixed::chain_encode(&mut slot[..m]);
                        self.encode_queue = slot;
                    }
                    self.encode_value = Some(self.encode_queue.remove(0));
                }

                let mut value = self.encode_value.take().expect("value prepared above");
                let channel_index = self.channel_index();
                let ch = &mut self.channels[channel_index];
                value = ch.fixed.encode(value);
                value = ch.filter.encode(value);
                let m = zigzag(value);
                let mut job = Encoder::begin(&mut ch.rice, m);
                let complete = job.drive(&mut self.cache, out, &mut progress.tta_bytes, &mut self.crc);
                if !complete {
                    self.encode_job = Some(job);
                    return (progress, Status::Suspended);
                }
                self.pos += 1;
                continue;
            }

            if self.phase == FramePhase::TrailerPending {
                if self.trailer_len == 0 {
                    let mut n = 0u8;
                    if let Some(pad) = self.cache.flush() {
                        self.crc.process_byte(pad);
                        self.trailer_buf[n as usize] = pad;
                        n += 1;
                    }
                    let crc = self.crc.finalize();
                    self.trailer_buf[n as usize..n as usize + 4].copy_from_slice(&crc.to_le_bytes());
                    self.trailer_len = n + 4;
                }
                while self.trailer_pos < self.trailer_len {
                    if progress.tta_bytes >= out.len() {
                        return (progress, Status::Suspended);
                    }
                    out[progress.tta_bytes] = self.trailer_buf[self.trailer_pos as usize];
                    progress.tta_bytes += 1;
                    self.trailer_pos += 1;
                }
                self.phase = FramePhase::Done;
            }

            return (progress, Status::Done);
        }
    }

    // ---------------------------------------------------------------
    // Decode
    // ---------------------------------------------------------------

    /// Consumes TTA bytes from `input` and produces interleaved PCM
    /// bytes into `pcm_out`. Returns `Ok(Status::Done)` only if the
    /// trailer CRC matched; a mismatch is reported once, at the point
    /// the trailer finishes, without discarding the PCM already
    /// written.
    pub fn decode_step(&mut self, input: &[u8], pcm_out: &mut [u8]) -> (Progress, Result<Status>) {
        debug_assert_eq!(self.mode, Mode::Decode);
        let mut progress = Progress::default();
        let writer = PcmWriter::new(self.descriptor.depth);
        let sample_width = writer.bytes_per_sample();

        loop {
            if self.phase == FramePhase::Fresh {
                self.phase = FramePhase::InProgress;
            }

            if self.phase == FramePhase::InProgress {
                if !self.pcm_queue.is_empty() {
                    if progress.pcm_bytes + sample_width > pcm_out.len() {
                        return (progress, Ok(Status::Suspended));
                    }
                    let value = self.pcm_queue.remove(0);
                    writer.write(value, &mut pcm_out[progress.pcm_bytes..]);
                    progress.pcm_bytes += sample_width;
                    if self.pcm_queue.is_empty() && self.pos >= self.descriptor.total_slots() {
                        self.phase = FramePhase::TrailerPending;
                    }
                    continue;
                }

                if self.pos >= self.descriptor.total_slots() {
                    self.phase = FramePhase::TrailerPending;
                    continue;
                }

                let ch_idx = self.channel_index();
                let mut job = self.decode_job;
                let outcome = job.drive(
                    &mut self.channels[ch_idx].rice,
                    &mut self.cache,
                    input,
                    &mut progress.tta_bytes,
                    &mut self.crc,
                );
                let m = match outcome {
                    DecodeOutcome::NeedInput => {
                        self.decode_job = job;
                        return (progress, Ok(Status::Suspended));
                    }
                    DecodeOutcome::Done(m) => m,
                };
                self.decode_job = Decoder::new();

                let mut value = unzigzag(m);
                let ch = &mut self.channels[ch_idx];
                value = ch.filter.decode(value);
                value = ch.fixed.decode(value);

                self.pos += 1;
                self.decode_slot.push(value);

                let channels = self.descriptor.channels as usize;
                if self.decode_slot.len() == channels {
                    let mut slot = core::mem::take(&mut self.decode_slot);
                    let m = self.descriptor.decorrelated_channels();
                    fixed::chain_decode(&mut slot[..m]);
                    self.pcm_queue = slot;
                }
                continue;
            }

            if self.phase == FramePhase::TrailerPending {
                if self.cache.count() > 0 {
                    self.cache.drop_bits(self.cache.count());
                }
                while self.trailer_pos < 4 {
                    if progress.tta_bytes >= input.len() {
                        return (progress, Ok(Status::Suspended));
                    }
                    let byte = input[progress.tta_bytes];
                    progress.tta_bytes += 1;
                    self.trailer_buf[self.trailer_pos as usize] = byte;
                    self.trailer_pos += 1;
                }
                let expected = u32::from_le_bytes([
                    self.trailer_buf[0],
                    self.trailer_buf[1],
                    self.trailer_buf[2],
                    self.trailer_buf[3],
                ]);
                let computed = self.crc.finalize();
                self.phase = FramePhase::Done;
                if expected != computed {
                    return (
                        progress,
                        Err(CoreError::CrcMismatch { expected, computed }),
                    );
                }
                return (progress, Ok(Status::Done));
            }

            return (progress, Ok(Status::Done));
        }
    }
}

/// `m = e > 0 ? 2e - 1 : -2e`, folding a signed residual into an
/// unsigned magnitude with small values (of either sign) staying small.
fn zigzag(e: i32) -> u32 {
    if e > 0 {
        (e as u32).wrapping_mul(2).wrapping_sub(1)
    } else {
        (e as u32).wrapping_neg().wrapping_mul(2)
    }
}

/// Inverse of [`zigzag`].
fn unzigzag(m: u32) -> i32 {
    if m & 1 == 1 {
        ((m >> 1) + 1) as i32
    } else {
        -((m >> 1) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(desc: FrameDescriptor, pcm: &[u8]) -> Vec<u8> {
        let mut codec = FrameCodec::new(desc, Mode::Encode).unwrap();
        let mut out = vec![0u8; pcm.len() * 2 + 64];
        let mut pcm_pos = 0;
        let mut out_pos = 0;
        loop {
            let (progress, status) = codec.encode_step(&pcm[pcm_pos..], &mut out[out_pos..]);
            pcm_pos += progress.pcm_bytes;
            out_pos += progress.tta_bytes;
            if status == Status::Done {
                break;
            }
            assert!(
                progress.pcm_bytes > 0 || progress.tta_bytes > 0,
                "must make progress or the test buffers were undersized"
            );
        }
        out.truncate(out_pos);
        out
    }

    fn decode_all(desc: FrameDescriptor, tta: &[u8], pcm_len: usize) -> Result<Vec<u8>> {
        let mut codec = FrameCodec::new(desc, Mode::Decode).unwrap();
        let mut pcm = vec![0u8; pcm_len];
        let mut in_pos = 0;
        let mut pcm_pos = 0;
        loop {
            let (progress, status) = codec.decode_step(&tta[in_pos..], &mut pcm[pcm_pos..]);
            in_pos += progress.tta_bytes;
            pcm_pos += progress.pcm_bytes;
            match status {
                Ok(Status::Done) => break,
                Ok(Status::Suspended) => {
                    assert!(progress.pcm_bytes > 0 || progress.tta_bytes > 0);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(pcm)
    }

    fn mono_pcm(values: &[i32]) -> Vec<u8> {
        let w = PcmWriter::new(SampleDepth::Sixteen);
        let mut out = vec![0u8; values.len() * 2];
        for (i, &v) in values.iter().enumerate() {
            w.write(v, &mut out[i * 2..]);
        }
        out
    }

    #[test]
    fn mono_round_trip() {
        let values: Vec<i32> = (0..256).map(|i| ((i * 37) % 2000) - 1000).collect();
        let desc = FrameDescriptor {
            channels: 1,
            depth: SampleDepth::Sixteen,
            samples_per_channel: values.len() as u32,
        };
        let pcm = mono_pcm(&values);
        let tta = encode_all(desc, &pcm);
        let back = decode_all(desc, &tta, pcm.len()).unwrap();
        assert_eq!(back, pcm);
    }

    #[test]
    fn stereo_round_trip() {
        let mut values = Vec::new();
        for i in 0..512i32 {
            values.push((i * 13) % 3000 - 1500);
            values.push((i * 29) % 2500 - 1250);
        }
        let desc = FrameDescriptor {
            channels: 2,
            depth: SampleDepth::Sixteen,
            samples_per_channel: 512,
        };
        let pcm = mono_pcm(&values);
        let tta = encode_all(desc, &pcm);
        let back = decode_all(desc, &tta, pcm.len()).unwrap();
        assert_eq!(back, pcm);
    }

    #[test]
    fn three_channel_round_trip_leaves_last_channel_unpaired() {
        let mut values = Vec::new();
        for i in 0..300i32 {
            values.push((i * 11) % 1000 - 500);
            values.push((i * 17) % 900 - 450);
            values.push((i * 23) % 800 - 400);
        }
        let desc = FrameDescriptor {
            channels: 3,
            depth: SampleDepth::Sixteen,
            samples_per_channel: 300,
        };
        let pcm = mono_pcm(&values);
        let tta = encode_all(desc, &pcm);
        let back = decode_all(desc, &tta, pcm.len()).unwrap();
        assert_eq!(back, pcm);
    }

    #[test]
    fn silence_round_trip() {
        let desc = FrameDescriptor {
            channels: 2,
            depth: SampleDepth::TwentyFour,
            samples_per_channel: 4096,
        };
        let pcm = vec![0u8; 4096 * 2 * 3];
        let tta = encode_all(desc, &pcm);
        let back = decode_all(desc, &tta, pcm.len()).unwrap();
        assert_eq!(back, pcm);
    }

    #[test]
    fn corrupted_trailer_is_reported_but_pcm_is_complete() {
        let values: Vec<i32> = (0..64).map(|i| i - 32).collect();
        let desc = FrameDescriptor {
            channels: 1,
            depth: SampleDepth::Sixteen,
            samples_per_channel: values.len() as u32,
        };
        let pcm = mono_pcm(&values);
        let mut tta = encode_all(desc, &pcm);
        let last = tta.len() - 1;
        tta[last] ^= 0xFF;
        let err = decode_all(desc, &tta, pcm.len()).unwrap_err();
        assert!(matches!(err, CoreError::CrcMismatch { .. }));
    }

    #[test]
    fn encode_resumes_one_output_byte_at_a_time() {
        let values: Vec<i32> = (0..2048).map(|i| ((i * 7) % 4000) - 2000).collect();
        let desc = FrameDescriptor {
            channels: 1,
            depth: SampleDepth::Sixteen,
            samples_per_channel: values.len() as u32,
        };
        let pcm = mono_pcm(&values);

        let whole = encode_all(desc, &pcm);

        let mut codec = FrameCodec::new(desc, Mode::Encode).unwrap();
        let mut pcm_pos = 0;
        let mut collected = Vec::new();
        loop {
            let mut one = [0u8; 1];
            let (progress, status) = codec.encode_step(&pcm[pcm_pos..], &mut one);
            pcm_pos += progress.pcm_bytes;
            collected.extend_from_slice(&one[..progress.tta_bytes]);
            if status == Status::Done {
                break;
            }
        }
        assert_eq!(collected, whole);
    }

    #[test]
    fn decode_resumes_one_pcm_byte_at_a_time() {
        let mut values = Vec::new();
        for i in 0..300i32 {
            values.push((i * 13) % 3000 - 1500);
            values.push((i * 29) % 2500 - 1250);
        }
        let desc = FrameDescriptor {
            channels: 2,
            depth: SampleDepth::Sixteen,
            samples_per_channel: 300,
        };
        let pcm = mono_pcm(&values);
        let tta = encode_all(desc, &pcm);

        let mut codec = FrameCodec::new(desc, Mode::Decode).unwrap();
        let mut in_pos = 0;
        let mut collected = Vec::new();
        loop {
            let mut one = [0u8; 1];
            let (progress, status) = codec.decode_step(&tta[in_pos..], &mut one);
            in_pos += progress.tta_bytes;
            collected.extend_from_slice(&one[..progress.pcm_bytes]);
            match status {
                Ok(Status::Done) => break,
                Ok(Status::Suspended) => {}
                Err(e) => panic!("unexpected decode error: {e}"),
            }
        }
        assert_eq!(collected, pcm);
    }

    #[test]
    fn zigzag_round_trips() {
        for e in [-1000i32, -1, 0, 1, 2, 1000, i32::MIN / 2, i32::MAX / 2] {
            assert_eq!(unzigzag(zigzag(e)), e);
        }
    }
}
