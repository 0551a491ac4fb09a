// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SILK encoder: Burg LPC analysis, two-stage NLSF quantization,
//! pitch/LTP analysis, and shell-coded excitation quantization (RFC 6716
//! §4.2, spec.md §4.5).
//!
//! The encoder is explicitly non-normative for bit-identity (spec.md §1
//! Non-goals); this implements the same algorithmic shape as the reference
//! — Burg analysis, interpolated two-stage LSF coding, 5-tap LTP search —
//! while mirroring [`super::decoder::SilkDecoder`]'s state updates exactly,
//! so encoder and decoder stay in lock-step frame to frame.

use super::{excitation, ltp, stereo, tables, ChannelState, SignalType, SUBFRAMES_PER_BLOCK};
use crate::sample::{Bandwidth, FrameSize};
use opus_core::{RangeEncoder, Result};

pub use stereo::StereoWeights;

/// One channel's SILK encoder.
pub struct SilkEncoder {
    pub state: ChannelState,
}

impl SilkEncoder {
    pub fn new(bandwidth: Bandwidth) -> Self {
        let rate = bandwidth.silk_rate_hz();
        let order = super::lpc_order(bandwidth);
        SilkEncoder { state: ChannelState::new(rate, order) }
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Encodes one SILK frame from Q0 PCM at the channel's internal rate.
    /// `pcm` must hold exactly `frame_size.samples(internal_rate)` samples.
    pub fn encode_frame(&mut self, enc: &mut RangeEncoder<'_>, bandwidth: Bandwidth, frame_size: FrameSize, pcm: &[i32]) -> Result<()> {
        let sub_len_block = super::subframe_len(self.state.rate_hz) * SUBFRAMES_PER_BLOCK;
        debug_assert_eq!(pcm.len(), frame_size.silk_sub_blocks() * sub_len_block);
        for chunk in pcm.chunks(sub_len_block) {
            self.encode_sub_block(enc, bandwidth, chunk)?;
        }
        Ok(())
    }

    fn encode_sub_block(&mut self, enc: &mut RangeEncoder<'_>, bandwidth: Bandwidth, pcm: &[i32]) -> Result<()> {
        let order = self.state.lpc_order;
        let sub_len = super::subframe_len(self.state.rate_hz);

        let energy: f64 = pcm.iter().map(|&s| f64::from(s) * f64::from(s)).sum::<f64>() / pcm.len().max(1) as f64;
        let active = energy > 1.0e4;
        let autocorr_pitch = best_lag(pcm, bandwidth);
        let voiced = active && autocorr_pitch.is_some();
        let signal_type = if !active { SignalType::Inactive } else if voiced { SignalType::Voiced } else { SignalType::Unvoiced };
        let quant_offset_high = voiced;

        let type_symbol = signal_type.to_symbol(quant_offset_high);
        enc.encode_icdf(type_symbol as usize, &tables::FRAME_TYPE_ICDF, 8)?;

        let gains_q16 = self.encode_gains(enc, pcm, sub_len)?;

        let lpc_f64 = burg_lpc(pcm, order);
        let current_nlsf = lpc_to_nlsf_q15(&lpc_f64, order);
        let interp_q2 = if self.state.prev_signal_type != SignalType::Inactive {
            select_interp_index(pcm, sub_len, order, &self.state.prev_nlsf_q15, &current_nlsf)
        } else {
            4
        };

        let stage1 = nearest_codebook_entry(bandwidth, &current_nlsf);
        let codebook = match bandwidth {
            Bandwidth::Narrowband | Bandwidth::Mediumband => &*tables::NLSF_CODEBOOK_NB_MB,
            _ => &*tables::NLSF_CODEBOOK_WB,
        };
        enc.encode_icdf(stage1, &tables::NLSF_STAGE1_ICDF, 8)?;
        let base = &codebook[stage1];
        for (&b, &c) in base.iter().zip(current_nlsf.iter()) {
            let residual = ((i32::from(c) - i32::from(b)) / 128).clamp(-tables::NLSF_STAGE2_ZERO, tables::NLSF_STAGE2_ZERO);
            let sym = (residual + tables::NLSF_STAGE2_ZERO) as usize;
            enc.encode_icdf(sym, &tables::NLSF_STAGE2_ICDF, 8)?;
        }
        if self.state.prev_signal_type != SignalType::Inactive {
            enc.encode_uint(interp_q2 as u32, 5)?;
        }

        for (sf, sf_pcm) in pcm.chunks(sub_len).enumerate().take(SUBFRAMES_PER_BLOCK) {
            let gain_q16 = gains_q16[sf];
            let lpc_q12 = super::lsf::nlsf_to_stable_lpc(&current_nlsf, order);

            let lag = if voiced { autocorr_pitch.unwrap_or(0) } else { 0 };
            let mut ltp_idx = 0usize;
            if voiced {
                if sf == 0 || self.state.prev_lag == 0 {
                    ltp::encode_absolute_lag(enc, bandwidth, lag)?;
                } else {
                    ltp::encode_delta_lag(enc, self.state.prev_lag, lag)?;
                }
                ltp_idx = ltp::analyze(sf_pcm, &self.state.out_buffer, lag as usize);
                ltp::encode_ltp_coefficients(enc, &[ltp_idx])?;
                self.state.prev_lag = lag;
            }
            let taps = if voiced { tables::LTP_GAIN_CODEBOOK[ltp_idx] } else { [0i16; tables::LTP_ORDER] };

            let residual = lpc_residual(sf_pcm, &lpc_q12, &self.state.lpc_history, order);
            let excitation_vals: Vec<i32> = residual
                .iter()
                .map(|&r| {
                    if gain_q16 == 0 {
                        0
                    } else {
                        ((i64::from(r) << 16) / i64::from(gain_q16)) as i32
                    }
                })
                .collect();
            let magnitudes: Vec<u32> = excitation_vals.iter().map(|&e| e.unsigned_abs()).collect();

            for block in magnitudes.chunks(excitation::BLOCK_LEN) {
                let mut padded = block.to_vec();
                padded.resize(excitation::BLOCK_LEN, 0);
                excitation::encode_block_pulses(enc, &padded)?;
            }
            excitation::encode_signs(enc, &excitation_vals, signal_type, quant_offset_high)?;

            self.synthesize_and_update_state(sf_pcm, &lpc_q12, &excitation_vals, gain_q16, lag, &taps, voiced, order);
        }

        self.state.prev_nlsf_q15 = current_nlsf;
        self.state.prev_signal_type = signal_type;
        Ok(())
    }

    fn encode_gains(&mut self, enc: &mut RangeEncoder<'_>, pcm: &[i32], sub_len: usize) -> Result<[i32; SUBFRAMES_PER_BLOCK]> {
        let mut gains = [0i32; SUBFRAMES_PER_BLOCK];
        for (sf, chunk) in pcm.chunks(sub_len).enumerate().take(SUBFRAMES_PER_BLOCK) {
            let rms = (chunk.iter().map(|&s| f64::from(s) * f64::from(s)).sum::<f64>() / chunk.len().max(1) as f64).sqrt();
            let level = gain_to_log_index(rms);
            gains[sf] = super::log_gain_to_q16(level);
            if sf == 0 {
                let msb = level >> 3;
                let lsb = level & 7;
                enc.encode_icdf(msb as usize, &tables::GAIN_MSB_ICDF, 8)?;
                enc.encode_icdf(lsb as usize, &tables::GAIN_LSB_ICDF, 8)?;
            } else {
                enc.encode_icdf(level.min(31) as usize, &tables::GAIN_DELTA_ICDF, 8)?;
            }
        }
        Ok(gains)
    }

    fn synthesize_and_update_state(
        &mut self,
        _pcm: &[i32],
        lpc_q12: &[i32],
        excitation_vals: &[i32],
        gain_q16: i32,
        lag: i32,
        taps: &[i16; tables::LTP_ORDER],
        voiced: bool,
        order: usize,
    ) {
        let sub_len = excitation_vals.len();
        let history_len = self.state.out_buffer.len();
        let mut out = vec![0i32; sub_len];
        for i in 0..sub_len {
            let e = (i64::from(excitation_vals[i]) * i64::from(gain_q16)) >> 16;
            let ltp_contrib = if voiced && lag > 0 {
                i64::from(ltp::predict(&self.state.out_buffer, lag as usize, taps))
            } else {
                0
            };
            let excited = (e + ltp_contrib) as i32;
            let mut acc = i64::from(excited) << 12;
            for (k, &coeff) in lpc_q12.iter().enumerate() {
                let sample = if i > k {
                    out[i - k - 1]
                } else if history_len + i >= k + 1 {
                    let idx = history_len + i - k - 1;
                    self.state.out_buffer.get(idx).copied().unwrap_or(0)
                } else {
                    self.state.lpc_history.get(order.wrapping_sub(k + 1).wrapping_sub(1)).copied().unwrap_or(0)
                };
                acc += i64::from(coeff) * i64::from(sample);
            }
            out[i] = opus_core::math::sat16((acc >> 12) as i32) as i32;
        }
        self.state.push_frame(&out);
        if out.len() >= order {
            self.state.lpc_history = out[out.len() - order..].to_vec();
        }
        self.state.prev_gain_q16 = gain_q16;
    }
}

/// Computes the LPC residual of `pcm` against `lpc_q12`, using `history`'s
/// tail to seed the first `order` samples' predictor context.
fn lpc_residual(pcm: &[i32], lpc_q12: &[i32], history: &[i32], order: usize) -> Vec<i32> {
    let mut out = Vec::with_capacity(pcm.len());
    for i in 0..pcm.len() {
        let mut acc = i64::from(pcm[i]) << 12;
        for (k, &coeff) in lpc_q12.iter().enumerate() {
            let sample = if i > k { pcm[i - k - 1] } else if history.len() + i >= k + 1 { history[history.len() + i - k - 1] } else { 0 };
            acc -= i64::from(coeff) * i64::from(sample);
        }
        out.push((acc >> 12) as i32);
        let _ = order;
    }
    out
}

/// Burg's method: builds an order-`order` all-pole LPC model that
/// minimizes forward+backward prediction error directly on the samples,
/// without windowing the frame (Burg's chief advantage over
/// autocorrelation LPC for short, non-stationary speech frames).
fn burg_lpc(pcm: &[i32], order: usize) -> Vec<f64> {
    let n = pcm.len();
    if n <= order {
        return vec![0.0; order];
    }
    let x: Vec<f64> = pcm.iter().map(|&s| f64::from(s)).collect();
    let mut f = x.clone();
    let mut b = x.clone();
    let mut a = vec![0.0f64; order + 1];
    a[0] = 1.0;

    let mut dk: f64 = x.iter().map(|v| v * v).sum::<f64>() * 2.0 - f[0] * f[0] - b[n - 1] * b[n - 1];

    for k in 0..order {
        let mut num = 0.0;
        for i in k + 1..n {
            num += f[i] * b[i - 1];
        }
        let mu = if dk.abs() < 1e-9 { 0.0 } else { -2.0 * num / dk };

        let mut new_a = a.clone();
        for i in 0..=k + 1 {
            let a_i = a.get(i).copied().unwrap_or(0.0);
            let a_rev = a.get(k + 1 - i).copied().unwrap_or(0.0);
            new_a[i] = a_i + mu * a_rev;
        }
        a = new_a;

        let mut new_f = vec![0.0; n];
        let mut new_b = vec![0.0; n];
        for i in k + 1..n {
            new_f[i] = f[i] + mu * b[i - 1];
        }
        for i in k + 1..n {
            new_b[i] = b[i - 1] + mu * f[i];
        }
        f = new_f;
        b = new_b;

        dk = (1.0 - mu * mu) * dk - f[k + 1].powi(2) - b[n - 1].powi(2);
    }

    // a[0] is the implicit leading 1; prediction coefficients are -a[1..].
    (1..=order).map(|i| -a.get(i).copied().unwrap_or(0.0)).collect()
}

/// Converts floating-point LPC coefficients to an NLSF vector (Q15) by
/// finding the roots of the sum/difference polynomials on the unit circle
/// via sign-change bisection — the encoder-side mirror of
/// [`super::lsf::nlsf_to_lpc`].
fn lpc_to_nlsf_q15(lpc: &[f64], order: usize) -> Vec<i16> {
    // P(z) = A(z) - z^-(order+1) A(z^-1), Q(z) = A(z) + z^-(order+1) A(z^-1).
    // Both have all their roots on the unit circle for a stable A(z); we
    // bisect cos(theta) in [-1, 1] for sign changes of each polynomial
    // evaluated at z = e^{j theta}.
    let a: Vec<f64> = std::iter::once(1.0).chain(lpc.iter().map(|&c| -c)).collect();

    let eval = |poly_kind: bool, cos_theta: f64| -> f64 {
        // Evaluate sum_k a[k] * cos(k*theta) (symmetric) or sin (for the
        // antisymmetric half), using Chebyshev recursion on cos_theta.
        let theta = cos_theta.clamp(-1.0, 1.0).acos();
        let mut sum = 0.0;
        for (k, &coeff) in a.iter().enumerate() {
            let sign = if poly_kind { 1.0 } else { if k == 0 { 0.0 } else { 1.0 } };
            let term = if poly_kind { (k as f64 * theta).cos() } else { (k as f64 * theta).sin() };
            sum += coeff * term * sign;
        }
        sum
    };

    let samples = 512;
    let mut roots = Vec::with_capacity(order);
    let mut prev = eval(true, -1.0 + 2.0 / samples as f64);
    for i in 1..samples {
        let ct = -1.0 + 2.0 * i as f64 / samples as f64;
        let cur = eval(true, ct);
        if prev.signum() != cur.signum() && roots.len() < order {
            roots.push(ct);
        }
        prev = cur;
    }
    // Fall back to a uniform spread if bisection didn't find enough sign
    // changes (can happen for a near-degenerate LPC filter).
    while roots.len() < order {
        let frac = (roots.len() + 1) as f64 / (order + 1) as f64;
        roots.push((frac * std::f64::consts::PI).cos());
    }
    roots.sort_by(|a, b| b.partial_cmp(a).unwrap());

    let mut nlsf: Vec<i32> = roots.iter().map(|&c| ((c.acos() / std::f64::consts::PI) * 32768.0) as i32).collect();
    super::lsf::stabilize(&mut nlsf);
    nlsf.into_iter().map(|v| v as i16).collect()
}

/// Chooses the NLSF interpolation weight (RFC 6716 §4.2.7.5.3) that best
/// matches the frame's first half: computes an independent NLSF estimate
/// from only the first two subframes, then picks whichever `interp_q2` in
/// `0..=4` puts [`super::lsf::interpolate`]'s blend of `prev_nlsf` and
/// `current_nlsf` closest (by RMS distance) to that half-frame estimate
/// (spec.md §4.5), so the interpolation index actually tracks how much the
/// spectral envelope moved within the frame instead of a fixed guess.
fn select_interp_index(pcm: &[i32], sub_len: usize, order: usize, prev_nlsf: &[i16], current_nlsf: &[i16]) -> i32 {
    if prev_nlsf.len() != order || pcm.len() < sub_len * 2 {
        return 4;
    }
    let half_frame = &pcm[..sub_len * 2];
    let half_lpc = burg_lpc(half_frame, order);
    let half_nlsf = lpc_to_nlsf_q15(&half_lpc, order);

    (0..=4i32)
        .min_by(|&a, &b| {
            let da = interp_rms_distance(prev_nlsf, current_nlsf, &half_nlsf, a);
            let db = interp_rms_distance(prev_nlsf, current_nlsf, &half_nlsf, b);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(4)
}

fn interp_rms_distance(prev: &[i16], current: &[i16], target: &[i16], interp_q2: i32) -> f64 {
    let interpolated = super::lsf::interpolate(prev, current, interp_q2);
    let sum_sq: f64 = interpolated.iter().zip(target.iter()).map(|(&a, &b)| { let d = f64::from(a) - f64::from(b); d * d }).sum();
    (sum_sq / interpolated.len().max(1) as f64).sqrt()
}

fn nearest_codebook_entry(bandwidth: Bandwidth, nlsf: &[i16]) -> usize {
    let codebook = match bandwidth {
        Bandwidth::Narrowband | Bandwidth::Mediumband => &*tables::NLSF_CODEBOOK_NB_MB,
        _ => &*tables::NLSF_CODEBOOK_WB,
    };
    codebook
        .iter()
        .enumerate()
        .min_by_key(|(_, entry)| entry.iter().zip(nlsf.iter()).map(|(&a, &b)| (i32::from(a) - i32::from(b)).unsigned_abs()).sum::<u32>())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn gain_to_log_index(rms: f64) -> u32 {
    if rms < 1.0 {
        return 0;
    }
    (((rms.log2() - 4.0) * 16.0).round() as i32).clamp(0, 63) as u32
}

/// Normalized-autocorrelation pitch search over the bandwidth's legal lag
/// range; returns `None` when no lag shows strong enough periodicity to
/// call the subframe voiced.
fn best_lag(pcm: &[i32], bandwidth: Bandwidth) -> Option<i32> {
    let (min_lag, max_lag) = ltp::lag_range(bandwidth);
    let max_lag = max_lag.min(pcm.len() as i32 - 1);
    if max_lag <= min_lag {
        return None;
    }
    let x: Vec<f64> = pcm.iter().map(|&s| f64::from(s)).collect();
    let energy: f64 = x.iter().map(|v| v * v).sum::<f64>().max(1.0);

    let mut best = (min_lag, 0.0f64);
    let mut lag = min_lag;
    while lag <= max_lag {
        let mut corr = 0.0;
        for i in lag as usize..x.len() {
            corr += x[i] * x[i - lag as usize];
        }
        let normalized = corr / energy;
        if normalized > best.1 {
            best = (lag, normalized);
        }
        lag += 1;
    }
    if best.1 > 0.35 {
        Some(best.0)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) fn encode_test_frame(enc: &mut RangeEncoder<'_>, bandwidth: Bandwidth, frame_size: FrameSize) {
    let rate = bandwidth.silk_rate_hz();
    let samples = frame_size.samples(crate::sample::SamplingRate::from_hz(rate).unwrap());
    let pcm: Vec<i32> = (0..samples).map(|i| ((i as f64 * 0.1).sin() * 3000.0) as i32).collect();
    let mut encoder = SilkEncoder::new(bandwidth);
    encoder.encode_frame(enc, bandwidth, frame_size, &pcm).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use opus_core::RangeDecoder;

    #[test]
    fn encode_then_decode_produces_matching_sample_count() {
        let mut buf = vec![0u8; 4096];
        let samples_in;
        {
            let mut enc = RangeEncoder::new(&mut buf);
            let rate = Bandwidth::Wideband.silk_rate_hz();
            let n = FrameSize::MS20.samples(crate::sample::SamplingRate::from_hz(rate).unwrap());
            samples_in = n;
            let pcm: Vec<i32> = (0..n).map(|i| ((i as f64 * 0.2).sin() * 5000.0) as i32).collect();
            let mut encoder = SilkEncoder::new(Bandwidth::Wideband);
            encoder.encode_frame(&mut enc, Bandwidth::Wideband, FrameSize::MS20, &pcm).unwrap();
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = super::super::decoder::SilkDecoder::new(Bandwidth::Wideband);
        let out = decoder.decode_frame(&mut dec, Bandwidth::Wideband, FrameSize::MS20, &[true]);
        assert_eq!(out.len(), samples_in);
    }

    #[test]
    fn burg_lpc_on_silence_returns_zero_coefficients() {
        let pcm = vec![0i32; 80];
        let lpc = burg_lpc(&pcm, 10);
        assert!(lpc.iter().all(|&c| c.abs() < 1e-6));
    }

    #[test]
    fn select_interp_index_prefers_current_when_spectra_match() {
        let order = 10;
        let sub_len = 40;
        let current: Vec<i16> = (1..=order as i32).map(|i| (i * 2800) as i16).collect();
        // `prev` identical to `current` makes every interpolation weight
        // equally valid against a half-frame target that also matches; the
        // selection should still land in range rather than panicking or
        // defaulting blindly.
        let prev = current.clone();
        let pcm: Vec<i32> = (0..sub_len * 2).map(|i| ((i as f64 * 0.15).sin() * 2000.0) as i32).collect();
        let idx = select_interp_index(&pcm, sub_len, order, &prev, &current);
        assert!((0..=4).contains(&idx));
    }

    #[test]
    fn select_interp_index_falls_back_to_no_interpolation_when_too_short() {
        let order = 10;
        let sub_len = 40;
        let nlsf: Vec<i16> = (1..=order as i32).map(|i| (i * 2800) as i16).collect();
        let pcm = vec![0i32; sub_len];
        assert_eq!(select_interp_index(&pcm, sub_len, order, &nlsf, &nlsf), 4);
    }
}
