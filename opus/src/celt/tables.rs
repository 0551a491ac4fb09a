// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Band plan, MDCT window, and probability tables for the CELT layer.
//!
//! As with [`crate::silk::tables`], these are generated at startup from
//! closed-form curves rather than transcribed from a reference codec's
//! trained tables: this crate's encoder and decoder only need to agree with
//! each other.

use super::NUM_BANDS;
use once_cell::sync::Lazy;

/// Builds the `NUM_BANDS + 1` band boundary bins (in MDCT bin units at the
/// longest frame size, `LM == 3`) using a Bark-like power-law spread: bands
/// start narrow at low frequency and widen toward the Nyquist edge, the same
/// general shape as a critical-band split.
fn build_band_bounds(total_bins: usize) -> Vec<usize> {
    let mut bounds = Vec::with_capacity(NUM_BANDS + 1);
    for i in 0..=NUM_BANDS {
        let frac = i as f64 / NUM_BANDS as f64;
        let bin = (total_bins as f64 * frac.powf(1.6)).round() as usize;
        bounds.push(bin.min(total_bins));
    }
    // Enforce strict monotonicity (the power-law curve can repeat a bin at
    // very low indices for small `total_bins`).
    for i in 1..bounds.len() {
        if bounds[i] <= bounds[i - 1] {
            bounds[i] = bounds[i - 1] + 1;
        }
    }
    *bounds.last_mut().unwrap() = total_bins;
    bounds
}

/// Band boundaries (in MDCT bin units) for the long-block (`LM == 3`, 960
/// sample / 480 bin) frame size; shorter `LM`s scale every boundary down by
/// `1 << (MAX_LM - LM)`, same as the reference's per-LM `eBands` scaling.
pub static BAND_BOUNDS_LM3: Lazy<Vec<usize>> = Lazy::new(|| build_band_bounds(super::frame_size(3)));

/// Band boundaries (bins) for the given `LM`, derived from the long-block
/// table by the fixed `1 << (MAX_LM - LM)` scaling the reference uses so
/// that a band always covers the same frequency range regardless of block
/// length.
pub fn band_bounds(lm: usize) -> Vec<usize> {
    let shift = super::MAX_LM - lm;
    BAND_BOUNDS_LM3.iter().map(|&b| b >> shift).collect()
}

/// MDCT/TDAC window of length `overlap`, the standard
/// `sin(pi/2 * sin^2(pi/2 * (i+0.5)/overlap))` raised-cosine-of-a-sine
/// used to cross-fade adjacent blocks alias-free.
pub fn mdct_window(overlap: usize) -> Vec<f32> {
    (0..overlap)
        .map(|i| {
            let x = std::f64::consts::FRAC_PI_2 * (i as f64 + 0.5) / overlap as f64;
            (std::f64::consts::FRAC_PI_2 * x.sin().powi(2)).sin() as f32
        })
        .collect()
}

fn icdf_from_weights(weights: &[u32]) -> Vec<u8> {
    let total: u32 = weights.iter().sum();
    let scale = 256u32;
    let mut cumulative = 0u32;
    let mut out = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        let scaled = if i + 1 == weights.len() { scale } else { (u64::from(cumulative) * u64::from(scale) / u64::from(total)) as u32 };
        out.push((scale - scaled.min(scale)) as u8);
    }
    for i in 1..out.len() {
        if out[i] > out[i - 1] {
            out[i] = out[i - 1];
        }
    }
    *out.last_mut().unwrap() = 0;
    out
}

/// 3-symbol spread decision (none/light/normal/aggressive collapsed to 3
/// bins the way the reference's `spread_icdf` is sized).
pub static SPREAD_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&[4, 8, 8, 4]));
/// Per-band TF-change flag, two symbols, mildly biased toward "no change".
pub static TF_SELECT_ICDF: Lazy<Vec<u8>> = Lazy::new(|| icdf_from_weights(&[3, 1]));
/// Per-band Laplace-coded coarse-energy innovation alphabet (signed, a
/// spike at 0 decaying geometrically in both directions).
pub static COARSE_ENERGY_ICDF: Lazy<Vec<u8>> = Lazy::new(|| {
    let half = 20i32;
    let weights: Vec<u32> = (-half..=half).map(|d| ((1.0 / (1.0 + d.unsigned_abs() as f64 * 0.6)) * 1000.0) as u32 + 1).collect();
    icdf_from_weights(&weights)
});
pub const COARSE_ENERGY_ZERO: i32 = 20;
/// Inter-frame energy prediction leak coefficient (Q15-ish `beta`), by LM:
/// shorter blocks predict less from the previous frame.
pub fn coarse_energy_beta(lm: usize) -> f32 {
    [0.75f32, 0.82, 0.88, 0.92][lm.min(3)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_bounds_are_strictly_increasing_and_span_total() {
        let bounds = band_bounds(3);
        assert_eq!(bounds.len(), NUM_BANDS + 1);
        assert_eq!(bounds[0], 0);
        assert_eq!(*bounds.last().unwrap(), super::super::frame_size(3));
        for w in bounds.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn shorter_lm_scales_bounds_down() {
        let long = band_bounds(3);
        let short = band_bounds(1);
        assert_eq!(*short.last().unwrap(), super::super::frame_size(1));
        assert!(short[NUM_BANDS / 2] <= long[NUM_BANDS / 2]);
    }

    #[test]
    fn mdct_window_is_symmetric_energy_preserving() {
        let w = mdct_window(120);
        for i in 0..w.len() {
            let sum = w[i] * w[i] + w[w.len() - 1 - i] * w[w.len() - 1 - i];
            assert!((sum - 1.0).abs() < 1e-3);
        }
    }
}
