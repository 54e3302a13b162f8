// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The order-8 sign-LMS adaptive prediction filter.
//!
//! Each channel carries three length-8 `i32` lanes — weights (`qm`),
//! weight-adjustment history (`dx`), and delay-line history (`dl`) —
//! plus a scalar `prev_error`. Every sample nudges each weight by the
//! sign of its paired history entry, forms a dot product against the
//! delay line, and refreshes the history. All arithmetic wraps on
//! overflow, matching how the reference C performs it implicitly on
//! twos-complement hardware.
//!
//! The low 4 taps are a plain FIFO: each step shifts them down by one
//! and pulls in what was tap 4. The high 4 taps are not a shift at
//! all — they are recomputed in place every step straight from the
//! *old* delay line, which is what lets the filter rebuild its own
//! short-term differencing structure without an explicit accumulator.
//!
//! The shift that turns the dot product into a prediction (`k = 10`) is
//! constant across every supported sample depth.
//!
//! The per-sample step is expressed against a [`Kernel`] trait so the
//! same [`GenericFilter`] orchestration works over a plain scalar loop
//! or, behind the `simd` feature, a 4-lane-at-a-time implementation
//! built on `wide`. Both kernels are required to be bit-identical; the
//! scalar one is the default.

use core::cmp::Ordering;

const TAPS: usize = 8;
const SHIFT: u32 = 10;
const ROUND_BIAS: i32 = 1 << (SHIFT - 1);

/// `(b >> 30) | 1` on a twos-complement 32-bit value reduces to a
/// branchless sign with zero mapped to positive, not `0`. Used to seed
/// the high `dx` lanes from the corresponding (same-index, pre-update)
/// `dl` lane.
fn classify(b: i32) -> i32 {
    if b < 0 {
        -1
    } else {
        1
    }
}

/// The per-sample primitives a filter implementation must provide.
/// `GenericFilter` drives these in a fixed order; everything about
/// *how* the 8 taps are stored and combined is up to the kernel.
pub(crate) trait Kernel: Copy {
    fn new() -> Self;
    /// `sum(qm[i] * dl[i])`, wrapping.
    fn round_dot(&self) -> i32;
    /// `qm[i] += sign(error) * dx[i]` for every lane.
    fn adapt(&mut self, error: i32);
    /// Folds `value` into the delay line and refreshes the paired
    /// weight-adjustment history: the low 4 taps shift down by one,
    /// the high 4 are recomputed from the old delay line.
    fn shift_in(&mut self, value: i32);
}

/// One channel's adaptive filter state, generic over the tap-update
/// kernel. [`Filter`] is the scalar instantiation used by default.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GenericFilter<K> {
    kernel: K,
    prev_error: i32,
}

impl<K: Kernel> GenericFilter<K> {
    pub(crate) fn new() -> Self {
        GenericFilter {
            kernel: K::new(),
            prev_error: 0,
        }
    }

    /// Encodes one sample: predicts `value` from history, returns the
    /// residual (`value - prediction`), and updates state from the true
    /// value.
    pub(crate) fn encode(&mut self, value: i32) -> i32 {
        self.kernel.adapt(self.prev_error);
        let round = ROUND_BIAS.wrapping_add(self.kernel.round_dot());
        let prediction = round >> SHIFT;
        let residual = value.wrapping_sub(prediction);
        self.kernel.shift_in(value);
        self.prev_error = residual;
        residual
    }

    /// Decodes one sample: reconstructs the true value from `residual`
    /// and history, then updates state identically to `encode`.
    pub(crate) fn decode(&mut self, residual: i32) -> i32 {
        self.kernel.adapt(self.prev_error);
        let round = ROUND_BIAS.wrapping_add(self.kernel.round_dot());
        let prediction = round >> SHIFT;
        let value = residual.wrapping_add(prediction);
        self.kernel.shift_in(value);
        self.prev_error = residual;
        value
    }
}

/// Scalar tap-update kernel: a plain loop over 8 lanes. Portable,
/// allocation-free, and the default everywhere.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScalarKernel {
    qm: [i32; TAPS],
    dx: [i32; TAPS],
    dl: [i32; TAPS],
}

impl Kernel for ScalarKernel {
    fn new() -> Self {
        ScalarKernel {
            qm: [0; TAPS],
            dx: [0; TAPS],
            dl: [0; TAPS],
        }
    }

    fn round_dot(&self) -> i32 {
        let mut acc: i32 = 0;
        for i in 0..TAPS {
            acc = acc.wrapping_add(self.qm[i].wrapping_mul(self.dl[i]));
        }
        acc
    }

    fn adapt(&mut self, error: i32) {
        match error.cmp(&0) {
            Ordering::Greater => {
                for i in 0..TAPS {
                    self.qm[i] = self.qm[i].wrapping_add(self.dx[i]);
                }
            }
            Ordering::Less => {
                for i in 0..TAPS {
                    self.qm[i] = self.qm[i].wrapping_sub(self.dx[i]);
                }
            }
            Ordering::Equal => {}
        }
    }

    fn shift_in(&mut self, value: i32) {
        let dl = self.dl;
        let dx = self.dx;

        // Low half: a plain shift, pulling in what was the bottom of
        // the high half.
        self.dl[0] = dl[1];
        self.dl[1] = dl[2];
        self.dl[2] = dl[3];
        self.dl[3] = dl[4];
        self.dx[0] = dx[1];
        self.dx[1] = dx[2];
        self.dx[2] = dx[3];
        self.dx[3] = dx[4];

        // High half: recomputed from the old delay line rather than
        // shifted (see the reference's `update_b_hi`/`update_m_hi`).
        self.dl[7] = value;
        self.dl[6] = value.wrapping_sub(dl[7]);
        self.dl[5] = value.wrapping_sub(dl[6]).wrapping_sub(dl[7]);
        self.dl[4] = value.wrapping_sub(dl[5]).wrapping_sub(dl[6]).wrapping_sub(dl[7]);

        self.dx[4] = classify(dl[4]);
        self.dx[5] = classify(dl[5]).wrapping_mul(2);
        self.dx[6] = classify(dl[6]).wrapping_mul(2);
        self.dx[7] = classify(dl[7]).wrapping_mul(4);
    }
}

/// The filter type used throughout the crate. The scalar kernel is
/// always correct and is what every caller outside this module and its
/// tests sees.
pub(crate) type Filter = GenericFilter<ScalarKernel>;

/// 4-lane tap-update kernel built on `wide::i32x4`, grouping the 8 taps
/// into a low half (lanes 0..4) and a high half (lanes 4..8). Must stay
/// bit-identical to [`ScalarKernel`]; `round_dot`'s horizontal sum and
/// `shift_in`'s cross-half carry are the only places that need care to
/// preserve that.
#[cfg(feature = "simd")]
#[derive(Debug, Clone, Copy)]
pub(crate) struct WideKernel {
    qm: [wide::i32x4; 2],
    dx: [wide::i32x4; 2],
    dl: [wide::i32x4; 2],
}

#[cfg(feature = "simd")]
impl Kernel for WideKernel {
    fn new() -> Self {
        WideKernel {
            qm: [wide::i32x4::ZERO; 2],
            dx: [wide::i32x4::ZERO; 2],
            dl: [wide::i32x4::ZERO; 2],
        }
    }

    fn round_dot(&self) -> i32 {
        let products = [self.qm[0] * self.dl[0], self.qm[1] * self.dl[1]];
        let mut acc: i32 = 0;
        for block in products {
            for lane in block.to_array() {
                acc = acc.wrapping_add(lane);
            }
        }
        acc
    }

    fn adapt(&mut self, error: i32) {
        match error.cmp(&0) {
            Ordering::Greater => {
                self.qm[0] += self.dx[0];
                self.qm[1] += self.dx[1];
            }
            Ordering::Less => {
                self.qm[0] -= self.dx[0];
                self.qm[1] -= self.dx[1];
            }
            Ordering::Equal => {}
        }
    }

    fn shift_in(&mut self, value: i32) {
        let dl_lo = self.dl[0].to_array();
        let dl_hi = self.dl[1].to_array();
        let dx_lo = self.dx[0].to_array();
        let dx_hi = self.dx[1].to_array();

        let new_lo = [dl_lo[1], dl_lo[2], dl_lo[3], dl_hi[0]];
        let new_dx_lo = [dx_lo[1], dx_lo[2], dx_lo[3], dx_hi[0]];

        let b7 = value;
        let b6 = value.wrapping_sub(dl_hi[3]);
        let b5 = value.wrapping_sub(dl_hi[2]).wrapping_sub(dl_hi[3]);
        let b4 = value.wrapping_sub(dl_hi[1]).wrapping_sub(dl_hi[2]).wrapping_sub(dl_hi[3]);
        let new_hi = [b4, b5, b6, b7];

        let new_dx_hi = [
            classify(dl_hi[0]),
            classify(dl_hi[1]).wrapping_mul(2),
            classify(dl_hi[2]).wrapping_mul(2),
            classify(dl_hi[3]).wrapping_mul(4),
        ];

        self.dl = [wide::i32x4::new(new_lo), wide::i32x4::new(new_hi)];
        self.dx = [wide::i32x4::new(new_dx_lo), wide::i32x4::new(new_dx_hi)];
    }
}

/// The 4-lane filter, available behind the `simd` feature for callers
/// that want it explicitly; exercised against [`Filter`] in this
/// module's tests to confirm bit-identical output.
#[cfg(feature = "simd")]
#[allow(dead_code)]
pub(crate) type SimdFilter = GenericFilter<WideKernel>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut enc = Filter::new();
        let mut dec = Filter::new();
        let samples: [i32; 16] = [0, 1, -1, 2, -2, 100, -100, 32767, -32768, 0, 5, -5, 9, -9, 1, -1];
        for &s in &samples {
            let residual = enc.encode(s);
            let reconstructed = dec.decode(residual);
            assert_eq!(reconstructed, s);
        }
    }

    #[test]
    fn silence_stays_silent() {
        let mut enc = Filter::new();
        for _ in 0..32 {
            assert_eq!(enc.encode(0), 0);
        }
    }

    #[test]
    fn filter_state_does_not_panic_on_extremes() {
        let mut enc = Filter::new();
        for &s in &[i32::MAX, i32::MIN, i32::MAX, i32::MIN] {
            enc.encode(s);
        }
    }

    #[cfg(feature = "simd")]
    #[test]
    fn simd_kernel_matches_scalar_kernel() {
        let mut scalar = Filter::new();
        let mut simd = SimdFilter::new();
        let samples: [i32; 24] = [
            0, 1, -1, 2, -2, 100, -100, 32767, -32768, 0, 5, -5, 9, -9, 1, -1, 12345, -12345,
            7, -3, 0, 0, 1000, -1000,
        ];
        for &s in &samples {
            assert_eq!(scalar.encode(s), simd.encode(s));
        }
    }
}
