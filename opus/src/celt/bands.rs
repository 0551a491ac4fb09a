// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-band energy, normalization, and stereo shape rotation (RFC 6716
//! §4.3 steps 2, 6, 7, 10).

/// Computes `log2` energy per band from MDCT coefficients `coeffs`, sliced
/// by `bounds` (the `NUM_BANDS + 1`-entry boundary list from
/// [`super::tables::band_bounds`]).
pub fn band_log_energy(coeffs: &[f32], bounds: &[usize]) -> Vec<f32> {
    bounds
        .windows(2)
        .map(|w| {
            let band = &coeffs[w[0]..w[1]];
            let energy: f32 = band.iter().map(|&x| x * x).sum();
            (energy.max(1e-27)).log2() * 0.5
        })
        .collect()
}

/// Divides each band of `coeffs` by its linear amplitude (`2^energy`),
/// leaving a unit-ish-norm shape vector ready for PVQ quantization.
pub fn normalize_bands(coeffs: &mut [f32], bounds: &[usize], log_energy: &[f32]) {
    for (w, &e) in bounds.windows(2).zip(log_energy.iter()) {
        let amplitude = 2f32.powf(e).max(1e-20);
        for c in &mut coeffs[w[0]..w[1]] {
            *c /= amplitude;
        }
    }
}

/// Inverse of [`normalize_bands`]: multiplies each band's unit shape back
/// up to its quantized linear amplitude (RFC 6716 §4.3 step 10).
pub fn denormalize_bands(shape: &mut [f32], bounds: &[usize], log_energy: &[f32]) {
    for (w, &e) in bounds.windows(2).zip(log_energy.iter()) {
        let amplitude = 2f32.powf(e);
        for c in &mut shape[w[0]..w[1]] {
            *c *= amplitude;
        }
    }
}

/// Scales `shape` so each band has exact unit L2 norm (PVQ produces
/// integer-pulse vectors whose natural norm is `sqrt(K)`, not `1`).
pub fn renormalize_bands(shape: &mut [f32], bounds: &[usize]) {
    for w in bounds.windows(2) {
        let band = &mut shape[w[0]..w[1]];
        let norm: f32 = band.iter().map(|&x| x * x).sum::<f32>().sqrt();
        if norm > 1e-9 {
            for c in band.iter_mut() {
                *c /= norm;
            }
        }
    }
}

/// Splits interleaved left/right MDCT coefficients into mid/side (RFC 6716
/// calls this the non-intensity stereo path: both channels carry a full
/// shape, energy-coded independently).
pub fn split_mid_side(left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mid: Vec<f32> = left.iter().zip(right.iter()).map(|(&l, &r)| (l + r) * std::f32::consts::FRAC_1_SQRT_2).collect();
    let side: Vec<f32> = left.iter().zip(right.iter()).map(|(&l, &r)| (l - r) * std::f32::consts::FRAC_1_SQRT_2).collect();
    (mid, side)
}

/// Inverse of [`split_mid_side`].
pub fn join_mid_side(mid: &[f32], side: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let left: Vec<f32> = mid.iter().zip(side.iter()).map(|(&m, &s)| (m + s) * std::f32::consts::FRAC_1_SQRT_2).collect();
    let right: Vec<f32> = mid.iter().zip(side.iter()).map(|(&m, &s)| (m - s) * std::f32::consts::FRAC_1_SQRT_2).collect();
    (left, right)
}

/// A spreading rotation (RFC 6716 §4.3 step 6's Householder rotation,
/// simplified to a 2-tap circular rotation of adjacent samples): decorrelates
/// energy spikes so PVQ's uniform-pulse assumption holds up better on tonal
/// material. `angle` in `[0, 1]`; `0` leaves the band untouched.
pub fn apply_spread(band: &mut [f32], angle: f32) {
    if band.len() < 2 || angle <= 0.0 {
        return;
    }
    let (s, c) = (angle * std::f32::consts::FRAC_PI_2).sin_cos();
    for i in 0..band.len() - 1 {
        let a = band[i];
        let b = band[i + 1];
        band[i] = a * c - b * s;
        band[i + 1] = a * s + b * c;
    }
}

/// Inverse of [`apply_spread`] (same rotation run with the angle negated,
/// since a 2-tap rotation is its own inverse under sign flip).
pub fn undo_spread(band: &mut [f32], angle: f32) {
    apply_spread(band, -angle);
}

/// Anti-collapse (RFC 6716 §4.3 step 9): on transient frames, bands that
/// quantized to all-zero shape get a small RNG-seeded noise injection scaled
/// to the band's previous-frame energy, so no band goes perceptually dead.
pub fn anti_collapse(shape: &mut [f32], bounds: &[usize], prev_log_energy: &[f32], rng: &mut u32) {
    for (w, &prev_e) in bounds.windows(2).zip(prev_log_energy.iter()) {
        let band = &mut shape[w[0]..w[1]];
        if band.iter().all(|&x| x == 0.0) {
            let scale = 2f32.powf(prev_e) * 0.05;
            for c in band.iter_mut() {
                *rng = rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = ((*rng >> 16) as f32 / 32768.0 - 1.0) * scale;
                *c = noise;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_then_denormalize_round_trips_energy() {
        let bounds = vec![0, 2, 4];
        let original = vec![3.0f32, 4.0, 1.0, 1.0];
        let energy = band_log_energy(&original, &bounds);
        let mut shape = original.clone();
        normalize_bands(&mut shape, &bounds, &energy);
        denormalize_bands(&mut shape, &bounds, &energy);
        for (a, b) in original.iter().zip(shape.iter()) {
            assert!((a - b).abs() < 1e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn mid_side_round_trips() {
        let left = vec![1.0f32, 2.0, -3.0];
        let right = vec![0.5f32, -1.0, 3.0];
        let (mid, side) = split_mid_side(&left, &right);
        let (l2, r2) = join_mid_side(&mid, &side);
        for (a, b) in left.iter().zip(l2.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
        for (a, b) in right.iter().zip(r2.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn spread_then_undo_round_trips() {
        let mut band = vec![1.0f32, 0.0, -1.0, 2.0];
        let original = band.clone();
        apply_spread(&mut band, 0.3);
        undo_spread(&mut band, 0.3);
        for (a, b) in original.iter().zip(band.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
