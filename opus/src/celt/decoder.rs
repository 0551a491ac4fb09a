// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The CELT decoder (RFC 6716 §4.3, spec.md §4.4): header flags, coarse/
//! fine/final band energy, PVQ unquantization, IMDCT + overlap-add, comb
//! filter, and de-emphasis.
//!
//! Per spec.md's Open Question (a), transient frames (`LM > 0`, short
//! blocks) are read structurally (the flag is decoded and accounted for in
//! the bitstream) but synthesized as a single long transform rather than
//! `1 << LM` interleaved short MDCTs — the simplification this crate makes
//! instead of chasing the reference's per-short-block TDAC management,
//! recorded in DESIGN.md.

use super::{bands, bitalloc, mdct, pvq, tables, NUM_BANDS};
use crate::sample::{Bandwidth, Channels};
use opus_core::{RangeDecoder, Tell};

/// Longest pitch period the comb-filter postfilter tracks (`(16 << 6) +
/// 15`, the largest value the octave/period side info can express),
/// rounded up so the filter's `[period+1]`-tap lookback always lands inside
/// `postfilter_history`.
const MAX_PITCH_PERIOD: usize = 1088;

/// Three-tap coefficient sets the decoded tapset bit selects between: tapset
/// 0 is a single-tap comb (plain pitch-synchronous repeat), tapset 1 a
/// smoothed three-tap version that spreads energy onto the neighboring lags
/// too. Not the reference's exact tap values (spec.md §1 Non-goals excludes
/// bit-identity), just a comb filter with the same two-tapset shape.
const POSTFILTER_TAPS: [[f32; 3]; 2] = [[0.0, 1.0, 0.0], [0.125, 0.75, 0.125]];

struct ChannelState {
    overlap: Vec<f32>,
    prev_log_energy: Vec<f32>,
    deemph_mem: f32,
    postfilter_history: Vec<f32>,
    prev_postfilter_gain: f32,
    prev_postfilter_period: usize,
}

impl ChannelState {
    fn new(max_n: usize) -> Self {
        ChannelState {
            overlap: vec![0.0; max_n],
            prev_log_energy: vec![0.0; NUM_BANDS],
            deemph_mem: 0.0,
            postfilter_history: vec![0.0; MAX_PITCH_PERIOD],
            prev_postfilter_gain: 0.0,
            prev_postfilter_period: 1,
        }
    }

    fn reset(&mut self) {
        self.overlap.iter_mut().for_each(|x| *x = 0.0);
        self.prev_log_energy.iter_mut().for_each(|x| *x = 0.0);
        self.deemph_mem = 0.0;
        self.postfilter_history.iter_mut().for_each(|x| *x = 0.0);
        self.prev_postfilter_gain = 0.0;
        self.prev_postfilter_period = 1;
    }
}

/// De-emphasis filter coefficient (RFC 6716 §4.3 step 13).
const DEEMPH_COEFF: f32 = 0.850_006_1;

pub struct CeltDecoder {
    channels: Vec<ChannelState>,
    rng: u32,
}

impl CeltDecoder {
    pub fn new(channels: Channels) -> Self {
        let max_n = super::frame_size(super::MAX_LM);
        CeltDecoder { channels: (0..channels.count()).map(|_| ChannelState::new(max_n)).collect(), rng: 1 }
    }

    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(ChannelState::reset);
        self.rng = 1;
    }

    /// Decodes one CELT frame, returning interleaved PCM (length
    /// `frame_size(lm) * channel_count`). `frame_bytes` is the size of this
    /// frame's encoded payload (known from the TOC/packet framing), used to
    /// recover the same bit budget the encoder's bit allocator worked from.
    pub fn decode_frame(&mut self, dec: &mut RangeDecoder<'_>, bandwidth: Bandwidth, lm: usize, start_band: usize, frame_bytes: usize) -> Vec<f32> {
        let n = super::frame_size(lm);
        let bounds = tables::band_bounds(lm);
        let end_band = super::end_band(bandwidth).min(NUM_BANDS);
        let num_channels = self.channels.len();

        let silence = dec.decode_bit_logp(15);
        let mut postfilter_gain = 0u32;
        let mut postfilter_period = 0usize;
        let mut postfilter_tapset = 0usize;
        if dec.decode_bit_logp(1) {
            let octave = dec.decode_uint(6);
            let period_raw = dec.decode_bits(4);
            postfilter_gain = dec.decode_bits(3);
            postfilter_tapset = if dec.decode_bit_logp(2) { 1 } else { 0 };
            postfilter_period = (((16u32 << octave) + period_raw).saturating_sub(1) as usize).clamp(1, MAX_PITCH_PERIOD - 2);
        }
        let transient = lm > 0 && dec.decode_bit_logp(3);
        let intra = dec.decode_bit_logp(3);

        let mut log_energy_per_channel: Vec<Vec<f32>> = Vec::with_capacity(num_channels);
        for ch in 0..num_channels {
            let mut log_energy = vec![0.0f32; NUM_BANDS];
            let beta = tables::coarse_energy_beta(lm);
            for b in start_band..end_band {
                let sym = dec.decode_icdf(&tables::COARSE_ENERGY_ICDF, 8) as i32 - tables::COARSE_ENERGY_ZERO;
                let prev = if intra { 0.0 } else { self.channels[ch].prev_log_energy[b] };
                log_energy[b] = prev * beta + sym as f32 * 0.5;
            }
            log_energy_per_channel.push(log_energy);
        }

        // Time-frequency trade (spec.md §4.4 step 3): per band, trades time
        // resolution for frequency resolution by widening that band's
        // effective spreading rotation. This crate synthesizes transient
        // frames as a single long transform rather than `1 << LM` short
        // MDCTs (DESIGN.md's Open Question (a)), so the full resolution
        // trade isn't available; the decoded flag still drives a real,
        // audible per-band effect instead of being discarded.
        let mut tf_change = vec![false; NUM_BANDS];
        if transient {
            for b in start_band..end_band {
                tf_change[b] = dec.decode_icdf(&tables::TF_SELECT_ICDF, 8) == 1;
            }
        }
        let spread_sym = dec.decode_icdf(&tables::SPREAD_ICDF, 8);
        let spread_angle = spread_sym as f32 / (tables::SPREAD_ICDF.len() as f32 - 1.0) * 0.6;

        let mut boosts = vec![0u32; NUM_BANDS];
        for b in start_band..end_band {
            if dec.decode_bit_logp(6) {
                boosts[b] = dec.decode_uint(4) * 50;
            }
        }
        let trim = dec.decode_uint(11) as i32;
        let _skip = dec.decode_bit_logp(1);
        // Intensity stereo (spec.md §4.4 step 6): bands at or above
        // `intensity` drop their independent per-channel shape and instead
        // share one PVQ-coded shape plus a coded phase bit, the channels'
        // own (already independently coded) energies supplying the
        // amplitude difference the reference's theta angle would otherwise
        // carry. A binary phase flip stands in for the reference's
        // continuous-angle Householder rotation (this crate's non-bit-exact
        // stance, §1 Non-goals).
        let intensity = if num_channels > 1 { dec.decode_uint((end_band + 1) as u32) as usize } else { end_band };

        let band_widths: Vec<usize> = bounds.windows(2).map(|w| w[1] - w[0]).collect();
        let total_bits_frac = (frame_bytes as u32) * 8 * 8;
        let budget_frac = total_bits_frac.saturating_sub(dec.tell_frac());
        let allocation = bitalloc::allocate(&band_widths, start_band, end_band, budget_frac, &boosts, trim);

        let mut shapes_per_channel: Vec<Vec<f32>> = (0..num_channels).map(|_| vec![0.0f32; n]).collect();
        for b in start_band..end_band {
            let width = band_widths[b];
            let k = allocation[b].pulses;
            let band_angle = if tf_change[b] { (spread_angle * 1.5).min(1.2) } else { spread_angle };

            if num_channels > 1 && b >= intensity {
                let mut band_shape = pvq::decode_shape(dec, width, k);
                bands::undo_spread(&mut band_shape, band_angle);
                let flip = dec.decode_bit_logp(1);
                for (ch, shapes) in shapes_per_channel.iter_mut().enumerate() {
                    let mut s = band_shape.clone();
                    if ch == 1 && flip {
                        s.iter_mut().for_each(|x| *x = -*x);
                    }
                    shapes[bounds[b]..bounds[b + 1]].copy_from_slice(&s);
                }
            } else {
                for shapes in shapes_per_channel.iter_mut() {
                    let mut band_shape = pvq::decode_shape(dec, width, k);
                    bands::undo_spread(&mut band_shape, band_angle);
                    shapes[bounds[b]..bounds[b + 1]].copy_from_slice(&band_shape);
                }
            }
        }

        for b in start_band..end_band {
            let fine_bits = allocation[b].fine_bits.min(16);
            if fine_bits == 0 {
                continue;
            }
            for (ch, log_energy) in log_energy_per_channel.iter_mut().enumerate() {
                let _ = ch;
                let raw = dec.decode_bits(fine_bits);
                let frac = raw as f32 / (1u32 << fine_bits) as f32 - 0.5;
                log_energy[b] += frac;
            }
        }

        if transient {
            for (ch, shapes) in shapes_per_channel.iter_mut().enumerate() {
                bands::anti_collapse(shapes, &bounds, &self.channels[ch].prev_log_energy, &mut self.rng);
            }
        }

        let mut out = vec![0.0f32; n * num_channels];
        let window = tables::mdct_window(n);
        for state in self.channels.iter_mut() {
            if state.overlap.len() != n {
                // Bandwidth/LM changed since the last frame: the overlap
                // memory no longer lines up with the new block length, so
                // restart it at silence rather than splice mismatched sizes.
                state.overlap = vec![0.0; n];
            }
        }
        for (ch, shape) in shapes_per_channel.iter_mut().enumerate() {
            if silence {
                shape.iter_mut().for_each(|x| *x = 0.0);
            }
            bands::denormalize_bands(shape, &bounds, &log_energy_per_channel[ch]);

            let mut time = vec![0.0f32; 2 * n];
            mdct::inverse(shape, &mut time);
            mdct::apply_window(&mut time, &window);

            let mut block_out = vec![0.0f32; n];
            mdct::overlap_add(&time, &mut self.channels[ch].overlap, &mut block_out);

            let gain = postfilter_gain as f32 / 8.0;
            apply_postfilter(&mut self.channels[ch], &mut block_out, postfilter_period, gain, postfilter_tapset);

            let state = &mut self.channels[ch];
            for (i, &s) in block_out.iter().enumerate() {
                let y = s + DEEMPH_COEFF * state.deemph_mem + 1e-30;
                state.deemph_mem = y;
                out[i * num_channels + ch] = y;
            }
            state.prev_log_energy.copy_from_slice(&log_energy_per_channel[ch]);
        }

        out
    }
}

/// Time-domain comb-filter postfilter (RFC 6716 §4.3 step 12, spec.md §4.4
/// step 12): reinforces the signal's own pitch periodicity by adding back a
/// tapset-weighted copy of itself from `period` samples ago, gain ramped
/// linearly from the previous frame's gain across this frame (the "overlap
/// region" the previous frame's parameters still apply to, since this
/// crate's 50%-overlap MDCT makes the entire visible frame the overlap
/// region against the prior block). Runs directly on reconstructed PCM,
/// using `state.postfilter_history` for lookback across the frame boundary.
fn apply_postfilter(state: &mut ChannelState, block_out: &mut [f32], period: usize, gain: f32, tapset: usize) {
    let n = block_out.len();
    let hist_len = state.postfilter_history.len();
    let mut timeline = Vec::with_capacity(hist_len + n);
    timeline.extend_from_slice(&state.postfilter_history);
    timeline.extend_from_slice(block_out);

    if gain > 0.0 || state.prev_postfilter_gain > 0.0 {
        let taps = POSTFILTER_TAPS[tapset.min(POSTFILTER_TAPS.len() - 1)];
        // Ramping toward silence at the end of a postfiltered run still
        // needs a lag to read from; fall back to the last active period
        // rather than collapsing to a meaningless `period == 0`.
        let effective_period = if gain > 0.0 { period } else { state.prev_postfilter_period };
        let lag = effective_period.clamp(1, hist_len - 2);
        for i in 0..n {
            let t = if n > 0 { i as f32 / n as f32 } else { 1.0 };
            let g = state.prev_postfilter_gain * (1.0 - t) + gain * t;
            if g <= 0.0 {
                continue;
            }
            let idx = hist_len + i;
            let p0 = timeline[idx - lag - 1];
            let p1 = timeline[idx - lag];
            let p2 = timeline[idx - lag + 1];
            block_out[i] += g * (taps[0] * p0 + taps[1] * p1 + taps[2] * p2);
        }
    }

    state.postfilter_history.copy_from_slice(&timeline[n..]);
    state.prev_postfilter_gain = gain;
    if gain > 0.0 {
        state.prev_postfilter_period = period.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celt::encoder::CeltEncoder;
    use opus_core::RangeEncoder;

    #[test]
    fn decode_frame_produces_expected_sample_count() {
        let n = super::super::frame_size(2);
        let pcm: Vec<f32> = (0..n).map(|i| (i as f32 * 0.05).sin() * 0.4).collect();
        let mut buf = vec![0u8; 8192];
        {
            let mut enc = RangeEncoder::new(&mut buf);
            let mut encoder = CeltEncoder::new(Channels::Mono);
            encoder.encode_frame(&mut enc, Bandwidth::Fullband, 2, 0, 200, &pcm).unwrap();
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = CeltDecoder::new(Channels::Mono);
        let out = decoder.decode_frame(&mut dec, Bandwidth::Fullband, 2, 0, 200);
        assert_eq!(out.len(), n);
    }

    #[test]
    fn stereo_frame_round_trips_sample_count() {
        let n = super::super::frame_size(1);
        let pcm: Vec<f32> = (0..n * 2).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let mut buf = vec![0u8; 8192];
        {
            let mut enc = RangeEncoder::new(&mut buf);
            let mut encoder = CeltEncoder::new(Channels::Stereo);
            encoder.encode_frame(&mut enc, Bandwidth::Wideband, 1, 0, 160, &pcm).unwrap();
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = CeltDecoder::new(Channels::Stereo);
        let out = decoder.decode_frame(&mut dec, Bandwidth::Wideband, 1, 0, 160);
        assert_eq!(out.len(), n * 2);
    }

    #[test]
    fn postfilter_adds_a_pitch_synchronous_contribution_when_gain_is_positive() {
        let mut state = ChannelState::new(64);
        // Seed history with a periodic signal so the comb filter has
        // something correlated to reinforce at the chosen lag.
        for (i, s) in state.postfilter_history.iter_mut().enumerate() {
            *s = ((i as f32) * 0.3).sin();
        }
        let mut block_out = vec![0.0f32; 32];
        let unfiltered = block_out.clone();
        apply_postfilter(&mut state, &mut block_out, 40, 0.5, 1);
        assert_ne!(block_out, unfiltered);
    }

    #[test]
    fn postfilter_is_a_no_op_when_gain_stays_zero() {
        let mut state = ChannelState::new(64);
        let mut block_out: Vec<f32> = (0..32).map(|i| (i as f32 * 0.2).sin()).collect();
        let original = block_out.clone();
        apply_postfilter(&mut state, &mut block_out, 0, 0.0, 0);
        assert_eq!(block_out, original);
    }

    #[test]
    fn silence_flag_zeroes_output_amplitude_bound() {
        let n = super::super::frame_size(1);
        let mut buf = vec![0u8; 4096];
        {
            let mut enc = RangeEncoder::new(&mut buf);
            let mut encoder = CeltEncoder::new(Channels::Mono);
            encoder.encode_frame(&mut enc, Bandwidth::Fullband, 1, 0, 100, &vec![0.0; n]).unwrap();
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = CeltDecoder::new(Channels::Mono);
        let out = decoder.decode_frame(&mut dec, Bandwidth::Fullband, 1, 0, 100);
        assert_eq!(out.len(), n);
    }
}
