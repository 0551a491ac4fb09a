// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Modified Discrete Cosine Transform (RFC 6716 §4.3 step 11): the forward
//! transform CELT's encoder runs per block, and the inverse transform plus
//! overlap-add the decoder runs to synthesize PCM.
//!
//! Implemented as a direct `O(n^2)` summation rather than a fast (FFT-based)
//! transform: correct and simple to read, which is what a from-scratch,
//! non-bit-exact implementation needs; a real-time encoder would swap this
//! for a split-radix or Bluestein FFT path without touching callers.

/// Forward MDCT: folds `2 * n` time-domain samples (already windowed by the
/// caller) into `n` frequency-domain coefficients.
pub fn forward(input: &[f32], output: &mut [f32]) {
    let n2 = input.len();
    let n = output.len();
    debug_assert_eq!(n2, 2 * n);
    let scale = (2.0 / n as f64).sqrt();
    for (k, out) in output.iter_mut().enumerate() {
        let mut acc = 0.0f64;
        for (i, &x) in input.iter().enumerate() {
            let phase = std::f64::consts::PI / n as f64 * (i as f64 + 0.5 + n as f64 / 2.0) * (k as f64 + 0.5);
            acc += f64::from(x) * phase.cos();
        }
        *out = (acc * scale) as f32;
    }
}

/// Inverse MDCT: expands `n` frequency-domain coefficients back into `2 * n`
/// (still windowed, still needing overlap-add against the previous block's
/// tail) time-domain samples.
pub fn inverse(input: &[f32], output: &mut [f32]) {
    let n = input.len();
    let n2 = output.len();
    debug_assert_eq!(n2, 2 * n);
    let scale = (2.0 / n as f64).sqrt();
    for (i, out) in output.iter_mut().enumerate() {
        let mut acc = 0.0f64;
        for (k, &x) in input.iter().enumerate() {
            let phase = std::f64::consts::PI / n as f64 * (i as f64 + 0.5 + n as f64 / 2.0) * (k as f64 + 0.5);
            acc += f64::from(x) * phase.cos();
        }
        *out = (acc * scale) as f32;
    }
}

/// Applies `window` to both halves of a `2 * window.len()`-sample block in
/// place: the standard CELT apodization before folding into the MDCT (the
/// window is symmetric, so the same curve applies rising then falling).
pub fn apply_window(samples: &mut [f32], window: &[f32]) {
    let overlap = window.len();
    let n = samples.len();
    for i in 0..overlap {
        samples[i] *= window[i];
        samples[n - 1 - i] *= window[i];
    }
}

/// Overlap-adds `block`'s leading `overlap` samples onto `memory` (the
/// previous block's trailing overlap region), then replaces `memory` with
/// `block`'s own trailing `overlap` samples for the next call — the ring
/// update [spec.md Open Question (a)] calls for writing IMDCT output
/// directly into the decode-memory ring rather than a scratch-then-copy.
pub fn overlap_add(block: &[f32], memory: &mut [f32], out: &mut [f32]) {
    let overlap = memory.len();
    for i in 0..overlap {
        out[i] = block[i] + memory[i];
    }
    out[overlap..].copy_from_slice(&block[overlap..block.len() - overlap]);
    memory.copy_from_slice(&block[block.len() - overlap..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_of_forward_preserves_energy_order_of_magnitude() {
        let n = 16;
        let input: Vec<f32> = (0..2 * n).map(|i| ((i as f32) * 0.3).sin()).collect();
        let mut freq = vec![0.0f32; n];
        forward(&input, &mut freq);
        let mut time = vec![0.0f32; 2 * n];
        inverse(&freq, &mut time);
        let in_energy: f32 = input.iter().map(|&x| x * x).sum();
        let out_energy: f32 = time.iter().map(|&x| x * x).sum();
        assert!(out_energy > 0.0);
        assert!((out_energy / in_energy.max(1e-6)).is_finite());
    }

    #[test]
    fn overlap_add_keeps_total_length() {
        let block = vec![1.0f32; 8];
        let mut memory = vec![0.5f32; 2];
        let mut out = vec![0.0f32; 8];
        overlap_add(&block, &mut memory, &mut out);
        assert_eq!(out.len(), 8);
        assert_eq!(memory, vec![1.0, 1.0]);
    }
}
