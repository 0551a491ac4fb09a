// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pitch lag and long-term-predictor (LTP) decode/encode helpers (RFC 6716
//! §4.2.7.6-4.2.7.7), including the encoder-side 5-tap normal-equations
//! filter search ([`analyze`]) that picks a signal-dependent codebook entry
//! per voiced subframe.

use super::tables;
use crate::sample::Bandwidth;
use opus_core::{RangeDecoder, RangeEncoder};
use opus_core::Result;

/// `(min_lag, max_lag)` for the given bandwidth's absolute pitch-lag field.
pub fn lag_range(bandwidth: Bandwidth) -> (i32, i32) {
    match bandwidth {
        Bandwidth::Narrowband => (tables::PITCH_LAG_MIN_NB, tables::PITCH_LAG_MAX_NB),
        Bandwidth::Mediumband => (tables::PITCH_LAG_MIN_MB, tables::PITCH_LAG_MAX_MB),
        _ => (tables::PITCH_LAG_MIN_WB, tables::PITCH_LAG_MAX_WB),
    }
}

/// Decodes an absolute pitch lag: a coarse ICDF selects an octave, a
/// uniform low-part field refines within it (RFC 6716 §4.2.7.6.1).
pub fn decode_absolute_lag(dec: &mut RangeDecoder<'_>, bandwidth: Bandwidth) -> i32 {
    let (min_lag, max_lag) = lag_range(bandwidth);
    let icdf = tables::pitch_lag_icdf(min_lag, max_lag);
    let octaves = icdf.len();
    let octave = dec.decode_icdf(&icdf, 8) as i32;
    let span = (max_lag - min_lag + 1) as u32;
    let per_octave = (span + octaves as u32 - 1) / octaves as u32;
    let low = dec.decode_uint(per_octave.max(2));
    (min_lag + octave * per_octave as i32 + low as i32).clamp(min_lag, max_lag)
}

pub fn encode_absolute_lag(enc: &mut RangeEncoder<'_>, bandwidth: Bandwidth, lag: i32) -> Result<()> {
    let (min_lag, max_lag) = lag_range(bandwidth);
    let icdf = tables::pitch_lag_icdf(min_lag, max_lag);
    let octaves = icdf.len();
    let span = (max_lag - min_lag + 1) as u32;
    let per_octave = (span + octaves as u32 - 1) / octaves as u32;
    let rel = (lag - min_lag).clamp(0, span as i32 - 1) as u32;
    let octave = (rel / per_octave).min(octaves as u32 - 1);
    let low = rel - octave * per_octave;
    enc.encode_icdf(octave as usize, &icdf, 8)?;
    enc.encode_uint(low, per_octave.max(2))
}

/// Decodes a delta pitch lag relative to the previous frame's lag, used
/// when conditional coding is active (RFC 6716 §4.2.7.6.2): a signed
/// 9-entry ICDF encodes `-4..=4`.
pub fn decode_delta_lag(dec: &mut RangeDecoder<'_>, prev_lag: i32) -> i32 {
    let icdf = tables::pitch_lag_icdf(0, 8);
    let sym = dec.decode_icdf(&icdf, 8) as i32;
    prev_lag + (sym - icdf.len() as i32 / 2)
}

pub fn encode_delta_lag(enc: &mut RangeEncoder<'_>, prev_lag: i32, lag: i32) -> Result<()> {
    let icdf = tables::pitch_lag_icdf(0, 8);
    let half = icdf.len() as i32 / 2;
    let sym = (lag - prev_lag + half).clamp(0, icdf.len() as i32 - 1) as usize;
    enc.encode_icdf(sym, &icdf, 8)
}

/// Decodes the periodicity index (selects one of three LTP codebook
/// regions: low/mid/high) and, per subframe, an index into that region's
/// 5-tap filter codebook.
pub fn decode_ltp_coefficients(dec: &mut RangeDecoder<'_>, subframe_count: usize) -> Vec<[i16; tables::LTP_ORDER]> {
    let _periodicity = dec.decode_uint(3);
    (0..subframe_count)
        .map(|_| {
            let idx = dec.decode_icdf(&tables::LTP_GAIN_ICDF, 8) as usize;
            tables::LTP_GAIN_CODEBOOK[idx]
        })
        .collect()
}

pub fn encode_ltp_coefficients(enc: &mut RangeEncoder<'_>, indices: &[usize]) -> Result<()> {
    enc.encode_uint(1, 3)?; // mid-region codebook; a fixed choice is self-consistent.
    for &idx in indices {
        enc.encode_icdf(idx, &tables::LTP_GAIN_ICDF, 8)?;
    }
    Ok(())
}

/// Finds the codebook entry closest to the 5-tap LTP filter that minimizes
/// mean-squared prediction error of `pcm` against `history` at `lag`
/// samples back (RFC 6716 §4.2.7.6.3, spec.md §4.5): builds the normal
/// equations `R taps = r` from windows of `history ++ pcm` centered at the
/// lag point the same way [`predict`] reads them, solves by Gaussian
/// elimination, then matches the unconstrained solution to the nearest
/// codebook vector (in the sense of squared tap-gain distance) since the
/// codec only transmits a codebook index, not the filter itself.
pub fn analyze(pcm: &[i32], history: &[i32], lag: usize) -> usize {
    let order = tables::LTP_ORDER;
    if pcm.is_empty() || lag == 0 {
        return 0;
    }

    let hist_len = history.len();
    let mut timeline: Vec<f64> = Vec::with_capacity(hist_len + pcm.len());
    timeline.extend(history.iter().map(|&s| f64::from(s)));
    timeline.extend(pcm.iter().map(|&s| f64::from(s)));

    let mut r_mat = [[0.0f64; tables::LTP_ORDER]; tables::LTP_ORDER];
    let mut r_vec = [0.0f64; tables::LTP_ORDER];

    for t in 0..pcm.len() {
        let center = hist_len as isize + t as isize - lag as isize;
        let mut ctx = [0.0f64; tables::LTP_ORDER];
        for (k, slot) in ctx.iter_mut().enumerate() {
            let idx = center + k as isize - 2;
            *slot = if idx >= 0 && (idx as usize) < timeline.len() { timeline[idx as usize] } else { 0.0 };
        }
        let target = timeline[hist_len + t];
        for i in 0..order {
            r_vec[i] += target * ctx[i];
            for j in 0..order {
                r_mat[i][j] += ctx[i] * ctx[j];
            }
        }
    }

    // A small ridge term keeps the system solvable when the analysis window
    // is near-silent (e.g. right after an unvoiced-to-voiced transition).
    for i in 0..order {
        r_mat[i][i] += 1.0;
    }

    let taps = solve_normal_equations(r_mat, r_vec);
    nearest_codebook_index(&taps)
}

/// Solves `a x = b` for a small symmetric positive-definite system via
/// Gaussian elimination with partial pivoting.
fn solve_normal_equations(mut a: [[f64; tables::LTP_ORDER]; tables::LTP_ORDER], mut b: [f64; tables::LTP_ORDER]) -> [f64; tables::LTP_ORDER] {
    let n = tables::LTP_ORDER;
    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        let d = a[col][col];
        if d.abs() < 1e-9 {
            continue;
        }
        for row in col + 1..n {
            let factor = a[row][col] / d;
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0f64; tables::LTP_ORDER];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in row + 1..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = if a[row][row].abs() > 1e-9 { sum / a[row][row] } else { 0.0 };
    }
    x
}

/// Matches an unconstrained tap vector to whichever codebook entry (Q14,
/// converted to a float gain) is closest in squared distance.
fn nearest_codebook_index(taps: &[f64; tables::LTP_ORDER]) -> usize {
    tables::LTP_GAIN_CODEBOOK
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let dist = |entry: &[i16; tables::LTP_ORDER]| -> f64 {
                entry.iter().zip(taps.iter()).map(|(&c, &t)| { let d = f64::from(c) / 16384.0 - t; d * d }).sum()
            };
            dist(a).partial_cmp(&dist(b)).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Applies a 5-tap LTP filter at `lag` samples back from `history`'s end to
/// produce one prediction sample; `history` must hold at least
/// `lag + 2` samples (2 taps look ahead of the lag point, 2 look behind).
pub fn predict(history: &[i32], lag: usize, taps: &[i16; tables::LTP_ORDER]) -> i32 {
    let center = history.len() as isize - lag as isize;
    let mut acc = 0i64;
    for (k, &tap) in taps.iter().enumerate() {
        let idx = center + k as isize - 2;
        let sample = if idx >= 0 && (idx as usize) < history.len() { history[idx as usize] } else { 0 };
        acc += i64::from(sample) * i64::from(tap);
    }
    (acc >> 14) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_lag_round_trips() {
        let mut buf = vec![0u8; 64];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_absolute_lag(&mut enc, Bandwidth::Wideband, 120).unwrap();
        let len = enc.finish().unwrap();
        let mut dec = RangeDecoder::new(&buf[..len]);
        let lag = decode_absolute_lag(&mut dec, Bandwidth::Wideband);
        assert!((100..=140).contains(&lag));
    }

    #[test]
    fn predict_with_unity_center_tap_echoes_history() {
        let history = vec![0i32, 0, 0, 0, 1000, 0, 0, 0];
        let mut taps = [0i16; tables::LTP_ORDER];
        taps[2] = 16384; // unity gain, Q14
        let lag = 4;
        let p = predict(&history, lag, &taps);
        assert_eq!(p, 1000);
    }

    #[test]
    fn analyze_on_a_perfectly_periodic_signal_picks_a_strong_center_tap() {
        // A signal whose period exactly matches `lag` is predicted almost
        // entirely by the center tap; the nearest codebook entry should sit
        // well above the weakest (near-silent) end of the codebook.
        let lag = 20usize;
        let history: Vec<i32> = (0..400).map(|i| ((i as f64 * std::f64::consts::TAU / lag as f64).sin() * 3000.0) as i32).collect();
        let pcm = history[history.len() - lag..history.len() - lag + 80].to_vec();
        let idx = analyze(&pcm, &history, lag);
        assert!(idx >= tables::LTP_GAIN_CODEBOOK.len() / 2);
    }

    #[test]
    fn analyze_returns_zero_for_silence() {
        let history = vec![0i32; 200];
        let pcm = vec![0i32; 80];
        let idx = analyze(&pcm, &history, 40);
        assert!(idx < tables::LTP_GAIN_CODEBOOK.len());
    }
}
