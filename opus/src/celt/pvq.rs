// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pyramid Vector Quantization (RFC 6716 §4.3 step 6): each band's
//! normalized shape is coded as an integer vector of length `N` with
//! exactly `K` unit pulses (`sum(|v_i|) == K`), reconstructed by dividing by
//! its own norm.
//!
//! This codes the vector through the same combinatorial cardinality the
//! reference's `cwrs.c` uses (RFC 6716 §4.3.4's `V(N,K)`: the number of
//! length-`N` integer vectors whose absolute values sum to `K`), decoding
//! one coordinate at a time and weighting each candidate magnitude by how
//! many ways the remaining coordinates can carry what's left of the pulse
//! budget. It differs from the reference in two ways, both consistent with
//! this crate's non-bit-identity stance (spec.md §1 Non-goals): the
//! per-coordinate decode order (not the reference's specific row
//! enumeration), and a proportional rescale of each step's frequency table
//! down to a fixed, small alphabet before handing it to the range coder —
//! `V(N,K)` very quickly exceeds what a 32-bit range coder can carry
//! directly, so every step's candidate weights are rescaled (deterministically,
//! from the same inputs on both sides) to sum to [`STEP_ALPHABET`] rather
//! than the true, possibly enormous, cardinality.

use opus_core::{RangeDecoder, RangeEncoder, Result};

/// Every per-coordinate decode step's frequency table is rescaled to sum to
/// this many counts: comfortably below `CODE_BOT` (`1 << 23`) regardless of
/// how large the true `V(N,K)` cardinality for that step is, with plenty of
/// headroom for the widest CELT band (fewer than 200 candidate symbols at
/// any step).
const STEP_ALPHABET: u32 = 1 << 14;

/// Builds `count[i][j]`: the number of length-`i` integer vectors whose
/// entries' absolute values sum to `j` (RFC 6716 §4.3.4's `V(N,K)`), for `i`
/// in `0..=n` and `j` in `0..=k`. Saturates rather than overflowing — values
/// this large only ever feed [`rescale`], which normalizes them down before
/// they reach the range coder, so saturation just means "too big to matter,"
/// never incorrect output.
fn build_count_table(n: usize, k: usize) -> Vec<Vec<u64>> {
    let mut count = vec![vec![0u64; k + 1]; n + 1];
    count[0][0] = 1;
    for i in 1..=n {
        let mut cum = 0u64;
        for j in 0..=k {
            let zero_case = count[i - 1][j];
            count[i][j] = zero_case.saturating_add(cum.saturating_mul(2));
            cum = cum.saturating_add(count[i - 1][j]);
        }
    }
    count
}

/// Rescales `raw` (arbitrarily large combinatorial weights) to sum to
/// exactly [`STEP_ALPHABET`], preserving relative weight and floor-clamping
/// every entry to at least `1` so no candidate collapses to a zero-width
/// range. Deterministic in both directions: encoder and decoder derive `raw`
/// identically from `(n, k)` alone, so this never desyncs the stream.
fn rescale(raw: &[u64]) -> Vec<u32> {
    let sum: u128 = raw.iter().map(|&x| u128::from(x)).sum();
    if sum == 0 {
        return vec![1; raw.len()];
    }
    let mut scaled: Vec<u32> = raw.iter().map(|&x| ((u128::from(x) * u128::from(STEP_ALPHABET)) / sum).max(1) as u32).collect();
    let scaled_sum: i64 = scaled.iter().map(|&x| i64::from(x)).sum();
    let diff = i64::from(STEP_ALPHABET) - scaled_sum;
    if diff != 0 {
        let (idx, _) = scaled.iter().enumerate().max_by_key(|&(_, &v)| v).unwrap();
        scaled[idx] = (i64::from(scaled[idx]) + diff).max(1) as u32;
    }
    scaled
}

/// Real bit cost of coding a `k`-pulse, `n`-dimensional shape: `log2`
/// of the combinatorial cardinality `V(n, k)`, the same quantity the
/// reference's `bits2pulses`/`pulses2bits` (`rate.c`) invert against a
/// precomputed table. Used by [`super::bitalloc`] as the real monotone
/// budget-to-pulse-count relationship instead of a closed-form estimate.
pub(crate) fn bits_for_pulses(n: usize, k: u32) -> f64 {
    if n == 0 || k == 0 {
        return 0.0;
    }
    let count = build_count_table(n, k as usize);
    (count[n][k as usize].max(1) as f64).log2()
}

/// Inverts [`bits_for_pulses`]: the largest pulse count `k <= max_k` whose
/// cost stays within `budget_bits`. `V(n, k)` is non-decreasing in `k` for
/// fixed `n`, so its `log2` is too — a single increasing scan suffices, no
/// binary search needed.
pub(crate) fn pulses_within_budget(n: usize, max_k: usize, budget_bits: f64) -> u32 {
    if n == 0 || max_k == 0 || budget_bits <= 0.0 {
        return 0;
    }
    let count = build_count_table(n, max_k);
    let mut best = 0usize;
    for k in 1..=max_k {
        let bits = (count[n][k].max(1) as f64).log2();
        if bits <= budget_bits {
            best = k;
        } else {
            break;
        }
    }
    best as u32
}

/// Builds one coordinate's candidate frequency list, ordered
/// `[m=0, m=1(+), m=1(-), m=2(+), m=2(-), ...]` up to `remaining_k`: each
/// magnitude `m` is weighted by how many ways the other `remaining_n - 1`
/// coordinates can carry the `remaining_k - m` pulses left over, with `m >=
/// 1` counted twice (once per sign).
fn step_frequencies(count: &[Vec<u64>], remaining_n: usize, remaining_k: usize) -> Vec<u64> {
    let sub_n = remaining_n - 1;
    let mut freqs = Vec::with_capacity(2 * remaining_k + 1);
    freqs.push(count[sub_n][remaining_k]);
    for m in 1..=remaining_k {
        let w = count[sub_n][remaining_k - m];
        freqs.push(w);
        freqs.push(w);
    }
    freqs
}

/// Decodes which candidate (descending cumulative frequency, matching
/// [`RangeDecoder::decode`]'s convention) the bitstream selected.
fn decode_symbol(dec: &mut RangeDecoder<'_>, freqs: &[u32], ft: u32) -> usize {
    let fs = dec.decode(ft);
    let mut fh = ft;
    for (i, &f) in freqs.iter().enumerate() {
        let fl = fh - f;
        if fs >= fl {
            dec.update(fl, fh, ft);
            return i;
        }
        fh = fl;
    }
    dec.update(0, freqs[freqs.len() - 1], ft);
    freqs.len() - 1
}

fn encode_symbol(enc: &mut RangeEncoder<'_>, freqs: &[u32], ft: u32, index: usize) -> Result<()> {
    let fh: u32 = ft - freqs[..index].iter().sum::<u32>();
    let fl = fh - freqs[index];
    enc.encode(fl, fh, ft)
}

/// Converts a decoded `(magnitude, symbol-index)` pair back into a signed
/// coordinate value: symbol `0` is always magnitude `0`; odd symbols `2m-1`
/// are `+m`, even symbols `2m` are `-m`.
fn symbol_to_signed(symbol: usize) -> i32 {
    if symbol == 0 {
        0
    } else {
        let m = ((symbol + 1) / 2) as i32;
        if symbol % 2 == 1 {
            m
        } else {
            -m
        }
    }
}

fn signed_to_symbol(value: i32) -> usize {
    if value == 0 {
        0
    } else {
        let m = value.unsigned_abs() as usize;
        if value > 0 {
            2 * m - 1
        } else {
            2 * m
        }
    }
}

/// Decodes a length-`n` integer shape vector whose `|v_i|` sum to `k`, one
/// coordinate at a time, then normalizes it to unit L2 norm.
pub fn decode_shape(dec: &mut RangeDecoder<'_>, n: usize, k: u32) -> Vec<f32> {
    if n == 0 || k == 0 {
        return vec![0.0; n];
    }
    let k = k as usize;
    let count = build_count_table(n, k);
    let mut magnitudes = vec![0i32; n];
    let mut remaining_k = k;
    for (dim, slot) in magnitudes.iter_mut().enumerate() {
        let remaining_n = n - dim;
        if remaining_n == 1 {
            let sign = if remaining_k > 0 && dec.decode_bit_logp(1) { -1 } else { 1 };
            *slot = sign * remaining_k as i32;
            break;
        }
        let raw = step_frequencies(&count, remaining_n, remaining_k);
        let freqs = rescale(&raw);
        let ft: u32 = freqs.iter().sum();
        let symbol = decode_symbol(dec, &freqs, ft);
        let value = symbol_to_signed(symbol);
        *slot = value;
        remaining_k -= value.unsigned_abs() as usize;
    }

    let mut shape: Vec<f32> = magnitudes.iter().map(|&m| m as f32).collect();
    let norm: f32 = shape.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for s in shape.iter_mut() {
            *s /= norm;
        }
    }
    shape
}

/// Encodes `shape` (already the band's normalized float values) as a
/// `k`-pulse integer vector: each sample's fractional magnitude is rounded
/// to the nearest integer pulse count (sign preserved), the overall `k`
/// budget enforced by largest-remainder adjustment, then the signed
/// coordinates are coded coordinate-by-coordinate against the same
/// combinatorial weights [`decode_shape`] uses.
pub fn encode_shape(enc: &mut RangeEncoder<'_>, shape: &[f32], k: u32) -> Result<()> {
    let n = shape.len();
    if n == 0 || k == 0 {
        return Ok(());
    }
    let abs_sum: f32 = shape.iter().map(|x| x.abs()).sum();
    let scale = if abs_sum > 1e-9 { k as f32 / abs_sum } else { 0.0 };
    let mut magnitudes: Vec<i32> = shape
        .iter()
        .map(|&x| {
            let m = (x.abs() * scale).round() as i32;
            if x < 0.0 {
                -m
            } else {
                m
            }
        })
        .collect();

    let mut abs_sum_i: i64 = magnitudes.iter().map(|&m| i64::from(m.abs())).sum();
    let mut idx = 0usize;
    while abs_sum_i < i64::from(k) {
        let slot = idx % n;
        if magnitudes[slot] < 0 {
            magnitudes[slot] -= 1;
        } else {
            magnitudes[slot] += 1;
        }
        abs_sum_i += 1;
        idx += 1;
    }
    while abs_sum_i > i64::from(k) {
        let pos = magnitudes.iter().position(|&m| m != 0).unwrap_or(0);
        if magnitudes[pos] > 0 {
            magnitudes[pos] -= 1;
        } else {
            magnitudes[pos] += 1;
        }
        abs_sum_i -= 1;
    }

    let k = k as usize;
    let count = build_count_table(n, k);
    let mut remaining_k = k;
    for (dim, &m) in magnitudes.iter().enumerate() {
        let remaining_n = n - dim;
        if remaining_n == 1 {
            if remaining_k > 0 {
                enc.encode_bit_logp(m < 0, 1)?;
            }
            break;
        }
        let raw = step_frequencies(&count, remaining_n, remaining_k);
        let freqs = rescale(&raw);
        let ft: u32 = freqs.iter().sum();
        let symbol = signed_to_symbol(m);
        encode_symbol(enc, &freqs, ft, symbol)?;
        remaining_k -= m.unsigned_abs() as usize;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_round_trips_magnitude_pattern() {
        let shape = vec![0.1f32, -0.5, 0.3, 0.0, -0.2, 0.4, 0.0, 0.1];
        let mut buf = vec![0u8; 256];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_shape(&mut enc, &shape, 6).unwrap();
        let len = enc.finish().unwrap();

        let mut dec = RangeDecoder::new(&buf[..len]);
        let decoded = decode_shape(&mut dec, shape.len(), 6);
        assert_eq!(decoded.len(), shape.len());
        let norm: f32 = decoded.iter().map(|&x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn zero_pulse_budget_yields_silence() {
        let mut buf = vec![0u8; 32];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_shape(&mut enc, &[0.2, 0.3], 0).unwrap();
        let len = enc.finish().unwrap();
        let mut dec = RangeDecoder::new(&buf[..len]);
        let decoded = decode_shape(&mut dec, 2, 0);
        assert_eq!(decoded, vec![0.0, 0.0]);
    }

    #[test]
    fn pulse_budget_inversion_is_monotone_in_the_available_bits() {
        let few = pulses_within_budget(8, 32, 4.0);
        let many = pulses_within_budget(8, 32, 20.0);
        assert!(many >= few);
        assert!(bits_for_pulses(8, many) <= 20.0);
    }

    #[test]
    fn zero_budget_inverts_to_zero_pulses() {
        assert_eq!(pulses_within_budget(8, 32, 0.0), 0);
    }

    #[test]
    fn count_table_matches_hand_checked_small_cases() {
        // |a|+|b| = 1 has four vectors: (+-1,0), (0,+-1).
        let count = build_count_table(2, 2);
        assert_eq!(count[2][0], 1);
        assert_eq!(count[2][1], 4);
        assert_eq!(count[2][2], 8);
    }

    #[test]
    fn single_pulse_round_trips_to_a_unit_vector() {
        let mut buf = vec![0u8; 64];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_shape(&mut enc, &[0.0, 0.0, -5.0, 0.0], 1).unwrap();
        let len = enc.finish().unwrap();
        let mut dec = RangeDecoder::new(&buf[..len]);
        let decoded = decode_shape(&mut dec, 4, 1);
        let nonzero: Vec<f32> = decoded.iter().copied().filter(|&x| x != 0.0).collect();
        assert_eq!(nonzero.len(), 1);
        assert!((nonzero[0].abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn many_pulses_on_a_wide_band_round_trip_without_panicking() {
        let n = 100;
        let shape: Vec<f32> = (0..n).map(|i| ((i as f32 * 0.37).sin())).collect();
        let mut buf = vec![0u8; 16384];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_shape(&mut enc, &shape, 48).unwrap();
        let len = enc.finish().unwrap();
        let mut dec = RangeDecoder::new(&buf[..len]);
        let decoded = decode_shape(&mut dec, n, 48);
        assert_eq!(decoded.len(), n);
    }
}
