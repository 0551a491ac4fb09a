// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SILK decoder: side-info decode, LSF/LPC reconstruction, pitch/LTP,
//! shell-coded excitation, and subframe synthesis (RFC 6716 §4.2, spec.md
//! §4.3).

use super::{excitation, lsf, ltp, stereo, tables, ChannelState, SignalType, SUBFRAMES_PER_BLOCK};
use crate::sample::{Bandwidth, FrameSize};
use opus_core::RangeDecoder;

/// Per-subframe decoded side info, kept around only long enough to drive
/// synthesis.
struct SubframeInfo {
    signal_type: SignalType,
    quant_offset_high: bool,
    gain_q16: i32,
    lag: i32,
    ltp_taps: [i16; tables::LTP_ORDER],
}

/// One channel's SILK decoder: owns [`ChannelState`] and the per-frame
/// decode pipeline. A stereo stream runs two of these (mid, side) plus the
/// [`stereo`] mixer.
pub struct SilkDecoder {
    pub state: ChannelState,
}

impl SilkDecoder {
    pub fn new(bandwidth: Bandwidth) -> Self {
        let rate = bandwidth.silk_rate_hz();
        let order = super::lpc_order(bandwidth);
        SilkDecoder { state: ChannelState::new(rate, order) }
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Decodes one SILK frame (10/20/40/60 ms, i.e. 1-3 concatenated 20 ms
    /// sub-blocks) and returns Q0 PCM at the channel's internal rate.
    ///
    /// `vad_flags` carries one voice-activity flag per 20 ms sub-block,
    /// captured up front the way spec.md §4.3 describes for 40/60 ms
    /// frames.
    pub fn decode_frame(&mut self, dec: &mut RangeDecoder<'_>, bandwidth: Bandwidth, frame_size: FrameSize, vad_flags: &[bool]) -> Vec<i32> {
        let sub_blocks = frame_size.silk_sub_blocks();
        debug_assert_eq!(vad_flags.len(), sub_blocks);
        let mut out = Vec::with_capacity(frame_size.samples(crate::sample::SamplingRate::from_hz(self.state.rate_hz).unwrap_or(crate::sample::SamplingRate::Hz16000)));

        for &vad in vad_flags.iter().take(sub_blocks) {
            let block = self.decode_sub_block(dec, bandwidth, vad);
            out.extend_from_slice(&block);
        }
        out
    }

    /// Decodes a single 20 ms sub-block (4 subframes).
    fn decode_sub_block(&mut self, dec: &mut RangeDecoder<'_>, bandwidth: Bandwidth, vad_active: bool) -> Vec<i32> {
        let type_sym = dec.decode_icdf(&tables::FRAME_TYPE_ICDF, 8);
        let signal_type = if vad_active { SignalType::from_symbol(2 + (type_sym & 1)) } else { SignalType::Inactive };
        let quant_offset_high = type_sym & 1 != 0;

        let order = self.state.lpc_order;
        let sub_len = super::subframe_len(self.state.rate_hz);

        let gains = self.decode_gains(dec, signal_type);

        let stage1 = dec.decode_icdf(&tables::NLSF_STAGE1_ICDF, 8) as usize;
        let stage2: Vec<i32> = (0..order)
            .map(|_| dec.decode_icdf(&tables::NLSF_STAGE2_ICDF, 8) as i32 - tables::NLSF_STAGE2_ZERO)
            .collect();
        let current_nlsf = lsf::reconstruct_nlsf(bandwidth, stage1, &stage2);
        let interp_q2 = if self.state.prev_signal_type != SignalType::Inactive { dec.decode_uint(5) as i32 } else { 4 };

        let mut out = Vec::with_capacity(sub_len * SUBFRAMES_PER_BLOCK);

        for sf in 0..SUBFRAMES_PER_BLOCK {
            let nlsf_for_subframe = if sf < 2 { lsf::interpolate(&self.state.prev_nlsf_q15, &current_nlsf, interp_q2) } else { current_nlsf.clone() };
            let lpc = lsf::nlsf_to_stable_lpc(&nlsf_for_subframe, order);

            let (lag, ltp_taps) = if signal_type.is_voiced() {
                let lag = if sf == 0 || self.state.prev_lag == 0 {
                    ltp::decode_absolute_lag(dec, bandwidth)
                } else {
                    ltp::decode_delta_lag(dec, self.state.prev_lag)
                };
                let taps = ltp::decode_ltp_coefficients(dec, 1)[0];
                (lag, taps)
            } else {
                (0, [0i16; tables::LTP_ORDER])
            };

            let info = SubframeInfo { signal_type, quant_offset_high, gain_q16: gains[sf], lag, ltp_taps };

            let blocks_needed = (sub_len + excitation::BLOCK_LEN - 1) / excitation::BLOCK_LEN;
            let mut shaped: Vec<u32> = Vec::with_capacity(blocks_needed * excitation::BLOCK_LEN);
            for _ in 0..blocks_needed {
                let (magnitudes, _overflow) = excitation::decode_block_pulses(dec);
                shaped.extend_from_slice(&magnitudes);
            }
            shaped.truncate(sub_len);
            let excitation = excitation::decode_signs(dec, &shaped, signal_type, quant_offset_high);

            self.state.prev_lag = if info.lag != 0 { info.lag } else { self.state.prev_lag };
            let samples = self.synthesize_subframe(&info, &lpc, &excitation, sub_len);
            out.extend_from_slice(&samples);
        }

        self.state.prev_nlsf_q15 = current_nlsf;
        self.state.prev_signal_type = signal_type;
        out
    }

    fn decode_gains(&mut self, dec: &mut RangeDecoder<'_>, signal_type: SignalType) -> [i32; SUBFRAMES_PER_BLOCK] {
        let mut gains_q16 = [0i32; SUBFRAMES_PER_BLOCK];
        for (sf, gain) in gains_q16.iter_mut().enumerate() {
            let level = if sf == 0 {
                let msb = dec.decode_icdf(&tables::GAIN_MSB_ICDF, 8);
                let lsb = dec.decode_icdf(&tables::GAIN_LSB_ICDF, 8);
                (msb << 3) | lsb
            } else {
                dec.decode_icdf(&tables::GAIN_DELTA_ICDF, 8)
            };
            // Logarithmic-to-linear gain table: 64 quantization levels
            // mapped onto a roughly exponential curve in Q16, matching the
            // "logarithmic quantization to 64 levels" spec.md calls for.
            let _ = signal_type;
            *gain = super::log_gain_to_q16(level);
        }
        gains_q16
    }

    fn synthesize_subframe(&mut self, info: &SubframeInfo, lpc_q12: &[i32], excitation: &[i32], sub_len: usize) -> Vec<i32> {
        let order = self.state.lpc_order;
        let history_len = self.state.out_buffer.len();

        let mut excited = vec![0i32; sub_len];
        for i in 0..sub_len {
            let e = (i64::from(excitation[i]) * i64::from(info.gain_q16)) >> 16;
            let ltp_contrib = if info.signal_type.is_voiced() && info.lag > 0 {
                let idx_in_out = history_len + i;
                let mut synthetic_history: Vec<i32> = Vec::with_capacity(idx_in_out);
                synthetic_history.extend_from_slice(&self.state.out_buffer);
                i64::from(ltp::predict(&synthetic_history, info.lag as usize, &info.ltp_taps))
            } else {
                0
            };
            excited[i] = (e + ltp_contrib) as i32;
        }

        let mut out = vec![0i32; sub_len];
        for i in 0..sub_len {
            let mut acc = i64::from(excited[i]) << 12;
            for (k, &coeff) in lpc_q12.iter().enumerate() {
                let sample = if i > k { out[i - k - 1] } else if history_len + i >= k + 1 {
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
        } else {
            self.state.lpc_history.drain(..out.len().min(self.state.lpc_history.len()));
            self.state.lpc_history.extend_from_slice(&out);
        }
        self.state.prev_gain_q16 = info.gain_q16;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SamplingRate;
    use opus_core::RangeEncoder;

    #[test]
    fn decoder_produces_expected_sample_count() {
        // Encode a minimal, self-consistent bitstream by hand using the
        // same primitives the encoder uses, then confirm the decoder
        // produces exactly one 20 ms sub-block's worth of samples.
        let mut buf = vec![0u8; 4096];
        {
            let mut enc = RangeEncoder::new(&mut buf);
            crate::silk::encoder::encode_test_frame(&mut enc, Bandwidth::Wideband, FrameSize::MS20);
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = SilkDecoder::new(Bandwidth::Wideband);
        let samples = decoder.decode_frame(&mut dec, Bandwidth::Wideband, FrameSize::MS20, &[true]);
        assert_eq!(samples.len(), FrameSize::MS20.samples(SamplingRate::Hz16000));
    }
}
