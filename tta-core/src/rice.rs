// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The two-level adaptive Golomb-Rice entropy coder.
//!
//! Every residual is zig-zag folded to an unsigned `m`, then coded as
//! either a short "depth 0" code (a zero bit, then `k0` binary bits of
//! `m` itself) or a "depth 1" code (a unary run, a terminating zero,
//! then `k1` binary bits) when `m` is too large for `k0` alone. `k0` and
//! `k1` adapt independently after every sample from a running magnitude
//! sum, so the coder tracks local signal energy without side
//! information.
//!
//! Emission and consumption are expressed as small state machines
//! ([`EncodeJob`], [`DecodeJob`]) so that a single sample's code can be
//! pushed through the shared [`BitCache`] a chunk at a time, suspending
//! whenever the caller's buffer runs out — including mid-sample — and
//! resuming later with no loss of position.

use crate::bitcache::BitCache;
use crate::checksum::{Crc32, Monitor};
use crate::SampleDepth;

/// A long unary run is queued in chunks this wide so that the bit cache,
/// which holds at most 31 meaningful bits, never needs a chunk plus
/// leftover to exceed its width.
const UNARY_CHUNK: u32 = 23;

/// `shift32_bit(k) = 1 << k`, with `k = 0` mapping to `0` rather than `1`
/// so that a just-initialized `k0 = 0` puts every sample straight into
/// the depth-1 path until the adaptive sum has seen enough data to raise
/// it. Matches the reference table's first two entries.
fn shift_bit(k: u8) -> u32 {
    if k == 0 {
        0
    } else {
        1u32.checked_shl(k as u32).unwrap_or(0)
    }
}

/// `shift32p4_bit(k) = k == 0 ? 0 : 1 << min(k + 4, 31)`.
///
/// A separate, coarser table from [`shift_bit`], used only to judge
/// whether the running sum has drifted far enough to nudge `k`. Distinct
/// from the per-sample depth-selection threshold, which always uses
/// [`shift_bit`] directly.
fn shift_bit_plus4(k: u8) -> u32 {
    if k == 0 {
        0
    } else {
        1u32.checked_shl((k as u32 + 4).min(31)).unwrap_or(0)
    }
}

/// The per-channel adaptive state: a running magnitude sum and current
/// Rice parameter for each of the two coding depths.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RiceState {
    sum: [u32; 2],
    k: [u8; 2],
}

impl RiceState {
    pub(crate) fn new(depth: SampleDepth) -> Self {
        let k_init = depth.rice_k_init();
        RiceState {
            sum: [shift_bit_plus4(k_init), shift_bit_plus4(k_init)],
            k: [k_init, k_init],
        }
    }

    /// `sum += v - (sum >> 4)`, then nudge `k` by at most one step if the
    /// sum has drifted outside the band around `shift_bit_plus4(k)`.
    fn adapt(level: &mut u32, k: &mut u8, v: u32) {
        *level = level.wrapping_add(v).wrapping_sub(*level >> 4);
        if *level < shift_bit_plus4(*k) {
            *k = k.saturating_sub(1);
        } else if *level > shift_bit_plus4((*k + 1).min(31)) {
            *k = (*k + 1).min(31);
        }
    }
}

/// Describes the bits still to be pushed into the cache for one sample's
/// Rice code. `Unary` and `Binary` are visited in that order; a code
/// that needs no binary bits (`k == 0`) skips straight to `Done`.
#[derive(Debug, Clone, Copy)]
enum EncodeJob {
    Unary { ones_left: u32 },
    Terminator,
    Binary { value: u32, bits: u8 },
    Done,
}

/// In-flight state for encoding a single sample, carried across calls
/// whenever the output buffer runs out mid-code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Encoder {
    job: EncodeJob,
    binary_value: u32,
    binary_bits: u8,
}

impl Encoder {
    /// Performs the (atomic) adaptive bookkeeping for residual `m` and
    /// returns an `Encoder` ready to drive its bit emission.
    pub(crate) fn begin(state: &mut RiceState, m: u32) -> Self {
        let k0 = state.k[0];
        let threshold = shift_bit(k0);
        RiceState::adapt(&mut state.sum[0], &mut state.k[0], m);

        let (unary, kx, binary_value) = if m >= threshold {
            let reduced = m - threshold;
            let k1 = state.k[1];
            RiceState::adapt(&mut state.sum[1], &mut state.k[1], reduced);
            ((reduced >> k1) + 1, k1, reduced)
        } else {
            (0, k0, m)
        };

        Encoder {
            job: EncodeJob::Unary { ones_left: unary },
            binary_value,
            binary_bits: kx,
        }
    }

    /// Pushes as much of this sample's code as fits in `out[*pos..]`,
    /// draining completed bytes through `crc`. Returns `true` once the
    /// whole code has been queued into the cache (note: queued, not
    /// necessarily drained — [`drain`] empties any remainder on the next
    /// call before new work starts).
    pub(crate) fn drive(
        &mut self,
        cache: &mut BitCache,
        out: &mut [u8],
        pos: &mut usize,
        crc: &mut Crc32,
    ) -> bool {
        loop {
            if !drain(cache, out, pos, crc) {
                return false;
            }
            match self.job {
                EncodeJob::Unary { ones_left } => {
                    if ones_left == 0 {
                        self.job = EncodeJob::Terminator;
                    } else {
                        let chunk = ones_left.min(UNARY_CHUNK);
                        cache.put_bits(u32::MAX, chunk as u8);
                        self.job = EncodeJob::Unary {
                            ones_left: ones_left - chunk,
                        };
                    }
                }
                EncodeJob::Terminator => {
                    cache.put_bits(0, 1);
                    self.job = EncodeJob::Binary {
                        value: self.binary_value,
                        bits: self.binary_bits,
                    };
                }
                EncodeJob::Binary { value, bits } => {
                    if bits > 0 {
                        cache.put_bits(value, bits);
                    }
                    self.job = EncodeJob::Done;
                }
                EncodeJob::Done => return true,
            }
        }
    }
}

/// Drains as many complete bytes as fit in the remaining output, folding
/// each one into `crc`. Returns `false` if the cache still has a full
/// byte ready but the output has no room left for it.
fn drain(cache: &mut BitCache, out: &mut [u8], pos: &mut usize, crc: &mut Crc32) -> bool {
    while cache.count() >= 8 {
        if *pos >= out.len() {
            return false;
        }
        let byte = cache.take_byte();
        crc.process_byte(byte);
        out[*pos] = byte;
        *pos += 1;
    }
    true
}

/// Mirrors [`Encoder`] for decoding: reads a unary run bit-by-bit (it is
/// never known in advance how many bits long it will be), then `k`
/// binary bits, refilling the cache from input only as needed.
#[derive(Debug, Clone, Copy)]
enum DecodeJob {
    Unary { ones: u32 },
    Binary { ones: u32, depth1: bool },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Decoder {
    job: DecodeJob,
}

pub(crate) enum DecodeOutcome {
    NeedInput,
    Done(u32),
}

impl Decoder {
    pub(crate) fn new() -> Self {
        Decoder {
            job: DecodeJob::Unary { ones: 0 },
        }
    }

    /// Advances decoding using whatever bits are already cached plus
    /// whatever remains of `input[*pos..]`. Returns `NeedInput` if it ran
    /// out before finishing the code (the `Decoder` retains its
    /// position and is resumed by calling this again once more input is
    /// available); returns `Done` with the reconstructed residual once
    /// the code is complete, having already applied the adaptive update
    /// to `state`.
    pub(crate) fn drive(
        &mut self,
        state: &mut RiceState,
        cache: &mut BitCache,
        input: &[u8],
        pos: &mut usize,
        crc: &mut Crc32,
    ) -> DecodeOutcome {
        loop {
            match self.job {
                DecodeJob::Unary { ones } => {
                    if cache.count() == 0 {
                        if *pos >= input.len() {
                            return DecodeOutcome::NeedInput;
                        }
                        let byte = input[*pos];
                        *pos += 1;
                        crc.process_byte(byte);
                        cache.feed_byte(byte);
                    }
                    // Scan one bit at a time; long unary runs are rare
                    // in practice since k adapts to local magnitude.
                    let bit = cache.peek_bits(1);
                    cache.drop_bits(1);
                    if bit == 1 {
                        self.job = DecodeJob::Unary { ones: ones + 1 };
                    } else if ones == 0 {
                        self.job = DecodeJob::Binary {
                            ones: 0,
                            depth1: false,
                        };
                    } else {
                        self.job = DecodeJob::Binary {
                            ones,
                            depth1: true,
                        };
                    }
                }
                DecodeJob::Binary { ones, depth1 } => {
                    let k = if depth1 { state.k[1] } else { state.k[0] };
                    if k == 0 {
                        let m = self.finish(state, depth1, ones, 0);
                        self.job = DecodeJob::Unary { ones: 0 };
                        return DecodeOutcome::Done(m);
                    }
                    while cache.count() < k {
                        if *pos >= input.len() {
                            return DecodeOutcome::NeedInput;
                        }
                        let byte = input[*pos];
                        *pos += 1;
                        crc.process_byte(byte);
                        cache.feed_byte(byte);
                    }
                    let binary = cache.peek_bits(k);
                    cache.drop_bits(k);
                    let m = self.finish(state, depth1, ones, binary);
                    self.job = DecodeJob::Unary { ones: 0 };
                    return DecodeOutcome::Done(m);
                }
            }
        }
    }

    fn finish(&self, state: &mut RiceState, depth1: bool, ones: u32, binary: u32) -> u32 {
        if depth1 {
            let k1 = state.k[1];
            // The encoder's unary run is `(reduced >> k1) + 1` ones
            // (`Encoder::begin`), so the count seen here overshoots the
            // true high part by one.
            let reduced = ((ones - 1) << k1) + binary;
            RiceState::adapt(&mut state.sum[1], &mut state.k[1], reduced);
            let m = reduced + shift_bit(state.k[0]);
            RiceState::adapt(&mut state.sum[0], &mut state.k[0], m);
            m
        } else {
            let m = binary;
            RiceState::adapt(&mut state.sum[0], &mut state.k[0], m);
            m
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(depth: SampleDepth, values: &[u32]) {
        let mut enc_state = RiceState::new(depth);
        let mut cache = BitCache::new();
        let mut crc = Crc32::new();
        let mut out = vec![0u8; values.len() * 8 + 16];
        let mut pos = 0;

        for &m in values {
            let mut enc = Encoder::begin(&mut enc_state, m);
            let complete = enc.drive(&mut cache, &mut out, &mut pos, &mut crc);
            assert!(complete, "output buffer sized generously, should not suspend");
        }
        if let Some(byte) = cache.flush() {
            out[pos] = byte;
            pos += 1;
        }
        out.truncate(pos);

        let mut dec_state = RiceState::new(depth);
        let mut cache = BitCache::new();
        let mut crc = Crc32::new();
        let mut in_pos = 0;
        let mut decoded = Vec::new();
        let mut decoder = Decoder::new();
        while decoded.len() < values.len() {
            match decoder.drive(&mut dec_state, &mut cache, &out, &mut in_pos, &mut crc) {
                DecodeOutcome::Done(m) => decoded.push(m),
                DecodeOutcome::NeedInput => panic!("ran out of input before all samples decoded"),
            }
        }
        assert_eq!(decoded, values);
    }

    #[test]
    fn round_trips_small_values() {
        round_trip(SampleDepth::Sixteen, &[0, 1, 2, 3, 0, 0, 5, 100, 1000]);
    }

    #[test]
    fn round_trips_zero_run() {
        round_trip(SampleDepth::Eight, &[0; 64]);
    }

    #[test]
    fn round_trips_large_residuals() {
        round_trip(SampleDepth::TwentyFour, &[1 << 20, 1 << 22, 0, 1, 1 << 24]);
    }

    #[test]
    fn encoder_suspends_on_tiny_output_and_resumes() {
        let depth = SampleDepth::Sixteen;
        let values = [5u32, 90_000, 3, 0, 70_000, 1];
        let mut enc_state = RiceState::new(depth);
        let mut cache = BitCache::new();
        let mut crc = Crc32::new();
        let mut collected = Vec::new();

        for &m in &values {
            let mut enc = Encoder::begin(&mut enc_state, m);
            loop {
                let mut one = [0u8; 1];
                let mut pos = 0;
                let done = enc.drive(&mut cache, &mut one, &mut pos, &mut crc);
                collected.extend_from_slice(&one[..pos]);
                if done {
                    break;
                }
            }
        }
        if let Some(byte) = cache.flush() {
            collected.push(byte);
        }

        // Compare against a single-shot encode with a generously sized buffer.
        let mut enc_state2 = RiceState::new(depth);
        let mut cache2 = BitCache::new();
        let mut crc2 = Crc32::new();
        let mut out2 = vec![0u8; 256];
        let mut pos2 = 0;
        for &m in &values {
            let mut enc = Encoder::begin(&mut enc_state2, m);
            enc.drive(&mut cache2, &mut out2, &mut pos2, &mut crc2);
        }
        if let Some(byte) = cache2.flush() {
            out2[pos2] = byte;
            pos2 += 1;
        }
        out2.truncate(pos2);

        assert_eq!(collected, out2);
    }
}
