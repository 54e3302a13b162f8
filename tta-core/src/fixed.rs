// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed first-order integer predictor and the reversible channel
//! decorrelation applied ahead of it.
//!
//! Decorrelation turns a slot of interleaved channels into a
//! difference stream and an accumulated "mid" stream before
//! prediction, the same trick `symphonia-bundle-flac` uses for its
//! mid/side channel assignment, adapted here to TTA's always-on chain
//! rather than FLAC's per-frame assignment choice. A stereo slot is
//! the chain's base case; longer slots fold additional channels into
//! the same running accumulator, one at a time, left to right.

/// One channel's fixed predictor state: the previous sample, lightly
/// damped rather than carried forward verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FixedPredictor {
    prev: i32,
}

impl FixedPredictor {
    pub(crate) fn new() -> Self {
        FixedPredictor::default()
    }

    pub(crate) fn encode(&mut self, value: i32) -> i32 {
        let residual = value.wrapping_sub((self.prev.wrapping_mul(31)) >> 5);
        self.prev = value;
        residual
    }

    pub(crate) fn decode(&mut self, residual: i32) -> i32 {
        let value = residual.wrapping_add((self.prev.wrapping_mul(31)) >> 5);
        self.prev = value;
        value
    }
}

/// Runs the reversible pairwise decorrelation across a channel slot,
/// in place. `values[0]` is the left-most channel of the chain and
/// `values[i-1]` ends up holding the difference between the running
/// accumulator and `values[i]`, for every `i`; the last slot ends up
/// holding the final accumulator rather than a raw sample.
///
/// For a two-element slice this is exactly the classic mid/side pair:
/// `values[0] = L − R`, `values[1] = R + (values[0] >> 1)`. Longer
/// slices chain the same step left to right, each stage folding its
/// running accumulator against the next raw channel.
pub(crate) fn chain_encode(values: &mut [i32]) {
    if values.len() < 2 {
        return;
    }
    let mut acc = values[0];
    for i in 1..values.len() {
        let side = acc.wrapping_sub(values[i]);
        let mid = values[i].wrapping_add(side >> 1);
        values[i - 1] = side;
        acc = mid;
    }
    *values.last_mut().expect("length checked above") = acc;
}

/// Inverse of [`chain_encode`].
pub(crate) fn chain_decode(values: &mut [i32]) {
    if values.len() < 2 {
        return;
    }
    let mut acc = *values.last().expect("length checked above");
    for i in (1..values.len()).rev() {
        let side = values[i - 1];
        let right = acc.wrapping_sub(side >> 1);
        let left = right.wrapping_add(side);
        values[i] = right;
        acc = left;
    }
    values[0] = acc;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_predictor_round_trips() {
        let mut enc = FixedPredictor::new();
        let mut dec = FixedPredictor::new();
        for v in [0, 10, -5, 12345, -12345, 0, 1, -1] {
            let r = enc.encode(v);
            assert_eq!(dec.decode(r), v);
        }
    }

    #[test]
    fn stereo_decorrelation_round_trips() {
        for (l, r) in [(0, 0), (100, 50), (-100, 50), (i32::MAX, i32::MIN), (7, 7), (-1, 1)] {
            let mut values = [l, r];
            chain_encode(&mut values);
            chain_decode(&mut values);
            assert_eq!(values, [l, r]);
        }
    }

    #[test]
    fn stereo_decorrelation_matches_spec_formula() {
        let (l, r) = (100, 37);
        let mut values = [l, r];
        chain_encode(&mut values);
        let side = l.wrapping_sub(r);
        let mid = r.wrapping_add(side >> 1);
        assert_eq!(values, [side, mid]);
    }

    #[test]
    fn multichannel_chain_round_trips() {
        for slot in [[10, -20, 30, -40], [0, 0, 0, 0], [i32::MAX, i32::MIN, 1, -1]] {
            let mut values = slot;
            chain_encode(&mut values);
            chain_decode(&mut values);
            assert_eq!(values, slot);
        }
        for slot in [[5, -7, 9], [0, 0, 0], [i32::MAX, i32::MIN, 42]] {
            let mut values = slot;
            chain_encode(&mut values);
            chain_decode(&mut values);
            assert_eq!(values, slot);
        }
    }
}
