// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The CELT encoder (RFC 6716 §4.3, spec.md §4.6): forward MDCT, band
//! energy analysis, bit allocation, and PVQ shape search, mirroring
//! [`super::decoder::CeltDecoder`] call-for-call so the bitstreams line up.

use super::{bands, bitalloc, mdct, pvq, tables, NUM_BANDS};
use crate::sample::{Bandwidth, Channels};
use opus_core::{RangeEncoder, Result, Tell};

struct ChannelState {
    history: Vec<f32>,
    prev_log_energy: Vec<f32>,
    deemph_mem: f32,
}

impl ChannelState {
    fn new(max_n: usize) -> Self {
        ChannelState { history: vec![0.0; max_n], prev_log_energy: vec![0.0; NUM_BANDS], deemph_mem: 0.0 }
    }

    fn reset(&mut self) {
        self.history.iter_mut().for_each(|x| *x = 0.0);
        self.prev_log_energy.iter_mut().for_each(|x| *x = 0.0);
        self.deemph_mem = 0.0;
    }
}

pub struct CeltEncoder {
    channels: Vec<ChannelState>,
}

impl CeltEncoder {
    pub fn new(channels: Channels) -> Self {
        let max_n = super::frame_size(super::MAX_LM);
        CeltEncoder { channels: (0..channels.count()).map(|_| ChannelState::new(max_n)).collect() }
    }

    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(ChannelState::reset);
    }

    /// Encodes one CELT frame from interleaved `pcm` (length
    /// `frame_size(lm) * channel_count`) into `enc`, targeting a payload of
    /// `frame_bytes` (the bit allocator uses this the same way
    /// [`super::decoder::CeltDecoder::decode_frame`] recovers it from the
    /// packet's framing).
    pub fn encode_frame(&mut self, enc: &mut RangeEncoder<'_>, bandwidth: Bandwidth, lm: usize, start_band: usize, frame_bytes: usize, pcm: &[f32]) -> Result<()> {
        let n = super::frame_size(lm);
        let bounds = tables::band_bounds(lm);
        let end_band = super::end_band(bandwidth).min(NUM_BANDS);
        let num_channels = self.channels.len();
        debug_assert_eq!(pcm.len(), n * num_channels);

        for state in self.channels.iter_mut() {
            if state.history.len() != n {
                state.history = vec![0.0; n];
            }
        }

        let silence = pcm.iter().all(|&x| x.abs() < 1e-9);
        enc.encode_bit_logp(silence, 15)?;
        enc.encode_bit_logp(false, 1)?; // postfilter: never enabled by this encoder.
        let transient = false; // transient detection deferred; always long blocks.
        if lm > 0 {
            enc.encode_bit_logp(transient, 3)?;
        }
        let intra = false;
        enc.encode_bit_logp(intra, 3)?;

        let window = tables::mdct_window(n);
        let mut freq_per_channel: Vec<Vec<f32>> = Vec::with_capacity(num_channels);
        for ch in 0..num_channels {
            let mut block = vec![0.0f32; 2 * n];
            block[..n].copy_from_slice(&self.channels[ch].history);
            for (i, slot) in block[n..].iter_mut().enumerate() {
                *slot = pcm[i * num_channels + ch];
            }
            mdct::apply_window(&mut block, &window);
            let mut freq = vec![0.0f32; n];
            mdct::forward(&block, &mut freq);
            freq_per_channel.push(freq);
            self.channels[ch].history.copy_from_slice(&pcm[ch..].iter().step_by(num_channels).take(n).copied().collect::<Vec<_>>());
        }

        let actual_log_energy: Vec<Vec<f32>> = freq_per_channel.iter().map(|f| bands::band_log_energy(f, &bounds)).collect();
        let mut decoded_log_energy: Vec<Vec<f32>> = (0..num_channels).map(|_| vec![0.0f32; NUM_BANDS]).collect();
        let beta = tables::coarse_energy_beta(lm);
        for ch in 0..num_channels {
            for b in start_band..end_band {
                let prev = if intra { 0.0 } else { self.channels[ch].prev_log_energy[b] };
                let predicted = prev * beta;
                let raw_sym = ((actual_log_energy[ch][b] - predicted) / 0.5).round() as i32;
                let half = (tables::COARSE_ENERGY_ICDF.len() as i32 - 1) / 2;
                let sym = raw_sym.clamp(-half, half);
                let index = (sym + tables::COARSE_ENERGY_ZERO) as usize;
                enc.encode_icdf(index, &tables::COARSE_ENERGY_ICDF, 8)?;
                decoded_log_energy[ch][b] = predicted + sym as f32 * 0.5;
            }
        }

        // Mirrors `celt::decoder::CeltDecoder::decode_frame`'s TF-change
        // read: `transient` is always `false` here (no transient detector
        // yet), so this loop never runs and `tf_change` stays all-`false`,
        // matching the decoder's default (unmodified) per-band spread angle.
        let tf_change = vec![false; NUM_BANDS];
        if transient {
            for _ in start_band..end_band {
                enc.encode_icdf(0, &tables::TF_SELECT_ICDF, 8)?;
            }
        }
        let spread_sym = 1usize;
        enc.encode_icdf(spread_sym, &tables::SPREAD_ICDF, 8)?;
        let spread_angle = spread_sym as f32 / (tables::SPREAD_ICDF.len() as f32 - 1.0) * 0.6;

        let boosts = vec![0u32; NUM_BANDS];
        for _ in start_band..end_band {
            enc.encode_bit_logp(false, 6)?;
        }
        let trim = 5i32;
        enc.encode_uint(trim as u32, 11)?;
        enc.encode_bit_logp(false, 1)?; // skip
        // No intensity collapse is driven by this encoder yet (`intensity ==
        // end_band` means no band ever qualifies), so every band takes
        // `decode_frame`'s non-intensity branch and both channels keep
        // independent shapes, matching `celt::decoder`.
        let intensity = end_band;
        if num_channels > 1 {
            enc.encode_uint(intensity as u32, (end_band + 1) as u32)?;
        }

        let band_widths: Vec<usize> = bounds.windows(2).map(|w| w[1] - w[0]).collect();
        let total_bits_frac = (frame_bytes as u32) * 8 * 8;
        let budget_frac = total_bits_frac.saturating_sub(enc.tell_frac());
        let allocation = bitalloc::allocate(&band_widths, start_band, end_band, budget_frac, &boosts, trim);

        for b in start_band..end_band {
            let k = allocation[b].pulses;
            let band_angle = if tf_change[b] { (spread_angle * 1.5).min(1.2) } else { spread_angle };

            if num_channels > 1 && b >= intensity {
                // Both channels' `decode_shape` reads come from this single
                // transmitted band: `decode_frame` assigns it unflipped to
                // channel 0 and, depending on `flip`, sign-inverted to
                // channel 1. So the base shape here always comes from
                // whichever channel carries more energy (arbitrarily
                // "channel 0" in the collapsed pair), and `flip` records
                // only whether the other channel correlates or anti-
                // correlates with it — never applied to the base itself.
                let left = &freq_per_channel[0][bounds[b]..bounds[b + 1]];
                let right = &freq_per_channel[1][bounds[b]..bounds[b + 1]];
                let left_energy: f32 = left.iter().map(|&x| x * x).sum();
                let right_energy: f32 = right.iter().map(|&x| x * x).sum();
                let dot: f32 = left.iter().zip(right.iter()).map(|(&l, &r)| l * r).sum();
                let flip = dot < 0.0;
                let mut band: Vec<f32> = if left_energy >= right_energy { left.to_vec() } else { right.to_vec() };
                bands::apply_spread(&mut band, band_angle);
                pvq::encode_shape(enc, &band, k)?;
                enc.encode_bit_logp(flip, 1)?;
            } else {
                for freq in freq_per_channel.iter_mut() {
                    let mut band = freq[bounds[b]..bounds[b + 1]].to_vec();
                    bands::apply_spread(&mut band, band_angle);
                    pvq::encode_shape(enc, &band, k)?;
                }
            }
        }

        for b in start_band..end_band {
            let fine_bits = allocation[b].fine_bits.min(16);
            if fine_bits == 0 {
                continue;
            }
            for ch in 0..num_channels {
                let diff = actual_log_energy[ch][b] - decoded_log_energy[ch][b];
                let scale = (1u32 << fine_bits) as f32;
                let frac = (diff + 0.5).clamp(0.0, 0.999_999);
                let raw = (frac * scale) as u32;
                enc.encode_bits(raw, fine_bits)?;
                decoded_log_energy[ch][b] += raw as f32 / scale - 0.5;
            }
        }

        for (ch, energy) in decoded_log_energy.into_iter().enumerate() {
            self.channels[ch].prev_log_energy = energy;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celt::decoder::CeltDecoder;
    use opus_core::RangeDecoder;

    #[test]
    fn encode_then_decode_round_trips_sample_count() {
        let n = super::super::frame_size(1);
        let pcm: Vec<f32> = (0..n).map(|i| (i as f32 * 0.1).sin() * 0.3).collect();
        let mut buf = vec![0u8; 4096];
        {
            let mut enc = RangeEncoder::new(&mut buf);
            let mut encoder = CeltEncoder::new(Channels::Mono);
            encoder.encode_frame(&mut enc, Bandwidth::Wideband, 1, 0, 120, &pcm).unwrap();
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = CeltDecoder::new(Channels::Mono);
        let out = decoder.decode_frame(&mut dec, Bandwidth::Wideband, 1, 0, 120);
        assert_eq!(out.len(), n);
    }

    #[test]
    fn silent_input_sets_silence_flag() {
        let n = super::super::frame_size(0);
        let mut buf = vec![0u8; 2048];
        let mut enc = RangeEncoder::new(&mut buf);
        let mut encoder = CeltEncoder::new(Channels::Mono);
        encoder.encode_frame(&mut enc, Bandwidth::Wideband, 0, 0, 60, &vec![0.0; n]).unwrap();
        enc.finish().unwrap();
        let mut dec = RangeDecoder::new(&buf);
        assert!(dec.decode_bit_logp(15));
    }
}
