// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hybrid mode (RFC 6716 §4.7, spec.md §4.7): SILK covers the low bands,
//! locked to a 16 kHz internal rate regardless of the packet's outer
//! bandwidth, while CELT covers bands `[17, end)` at its native 48 kHz.
//! Both coders share one range-coded bitstream (SILK's side info first,
//! then CELT's); their PCM outputs are summed after SILK's is upsampled to
//! 48 kHz, matching RFC 6716 §4.7's description of hybrid reconstruction.

use crate::celt::decoder::CeltDecoder;
use crate::celt::encoder::CeltEncoder;
use crate::celt::HYBRID_CROSSOVER_BAND;
use crate::resample::Resampler;
use crate::sample::{Bandwidth, Channels, FrameSize, SamplingRate};
use crate::silk::decoder::SilkDecoder;
use crate::silk::encoder::SilkEncoder;
use crate::silk::StereoState;
use opus_core::{RangeDecoder, RangeEncoder, Result};

/// SILK's fixed internal bandwidth whenever it's driven from hybrid mode
/// (RFC 6716 §4.7: hybrid's low band is always wideband SILK).
const HYBRID_SILK_BANDWIDTH: Bandwidth = Bandwidth::Wideband;

fn fit_len(v: &mut Vec<i32>, len: usize) {
    v.resize(len, 0);
}

pub struct HybridDecoder {
    silk_mid: SilkDecoder,
    silk_side: SilkDecoder,
    stereo: StereoState,
    celt: CeltDecoder,
    up: Vec<Option<Resampler>>,
    channels: Channels,
}

impl HybridDecoder {
    pub fn new(channels: Channels) -> Self {
        HybridDecoder {
            silk_mid: SilkDecoder::new(HYBRID_SILK_BANDWIDTH),
            silk_side: SilkDecoder::new(HYBRID_SILK_BANDWIDTH),
            stereo: StereoState::new(),
            celt: CeltDecoder::new(channels),
            up: (0..channels.count()).map(|_| None).collect(),
            channels,
        }
    }

    pub fn reset(&mut self) {
        self.silk_mid.reset();
        self.silk_side.reset();
        self.stereo.reset();
        self.celt.reset();
        self.up.iter_mut().for_each(|r| *r = None);
    }

    /// Decodes one hybrid frame, returning interleaved PCM at 48 kHz
    /// (length `celt::frame_size(lm) * channel_count`).
    pub fn decode_frame(
        &mut self,
        dec: &mut RangeDecoder<'_>,
        bandwidth: Bandwidth,
        lm: usize,
        frame_size: FrameSize,
        frame_bytes: usize,
        vad_flags: &[bool],
    ) -> Vec<f32> {
        let n_ch = self.channels.count();
        let (low_mid, low_side) = if n_ch == 2 {
            crate::silk::decode_stereo_frame(dec, &mut self.silk_mid, &mut self.silk_side, &mut self.stereo, HYBRID_SILK_BANDWIDTH, frame_size, vad_flags)
        } else {
            (self.silk_mid.decode_frame(dec, HYBRID_SILK_BANDWIDTH, frame_size, vad_flags), Vec::new())
        };

        let celt_out = self.celt.decode_frame(dec, bandwidth, lm, HYBRID_CROSSOVER_BAND, frame_bytes);
        let n48 = celt_out.len() / n_ch;

        let low_per_channel: [&[i32]; 2] = [&low_mid, if n_ch == 2 { &low_side } else { &[] }];
        let mut out = celt_out;
        for ch in 0..n_ch {
            if self.up[ch].is_none() {
                self.up[ch] = Resampler::new(SamplingRate::Hz16000, SamplingRate::Hz48000).ok();
            }
            let low_f32: Vec<f32> = low_per_channel[ch].iter().map(|&s| s as f32 / 32768.0).collect();
            let low_48 = self.up[ch].as_mut().and_then(|r| r.process(&low_f32).ok()).unwrap_or_default();
            for i in 0..n48 {
                out[i * n_ch + ch] += low_48.get(i).copied().unwrap_or(0.0);
            }
        }
        out
    }
}

pub struct HybridEncoder {
    silk_mid: SilkEncoder,
    silk_side: SilkEncoder,
    stereo: StereoState,
    celt: CeltEncoder,
    down: Vec<Option<Resampler>>,
    channels: Channels,
}

impl HybridEncoder {
    pub fn new(channels: Channels) -> Self {
        HybridEncoder {
            silk_mid: SilkEncoder::new(HYBRID_SILK_BANDWIDTH),
            silk_side: SilkEncoder::new(HYBRID_SILK_BANDWIDTH),
            stereo: StereoState::new(),
            celt: CeltEncoder::new(channels),
            down: (0..channels.count()).map(|_| None).collect(),
            channels,
        }
    }

    pub fn reset(&mut self) {
        self.silk_mid.reset();
        self.silk_side.reset();
        self.stereo.reset();
        self.celt.reset();
        self.down.iter_mut().for_each(|r| *r = None);
    }

    /// Encodes one hybrid frame from interleaved 48 kHz `pcm` (length
    /// `celt::frame_size(lm) * channel_count`).
    pub fn encode_frame(
        &mut self,
        enc: &mut RangeEncoder<'_>,
        bandwidth: Bandwidth,
        lm: usize,
        frame_size: FrameSize,
        frame_bytes: usize,
        pcm: &[f32],
    ) -> Result<()> {
        let n_ch = self.channels.count();
        let n48 = pcm.len() / n_ch;
        let target_len = frame_size.samples(SamplingRate::Hz16000);

        let mut low_per_channel: Vec<Vec<i32>> = Vec::with_capacity(n_ch);
        for ch in 0..n_ch {
            if self.down[ch].is_none() {
                self.down[ch] = Resampler::new(SamplingRate::Hz48000, SamplingRate::Hz16000).ok();
            }
            let chan: Vec<f32> = (0..n48).map(|i| pcm[i * n_ch + ch]).collect();
            let low_f32 = self.down[ch].as_mut().and_then(|r| r.process(&chan).ok()).unwrap_or_default();
            let mut low_i32: Vec<i32> = low_f32.iter().map(|&s| (s * 32768.0) as i32).collect();
            fit_len(&mut low_i32, target_len);
            low_per_channel.push(low_i32);
        }

        if n_ch == 2 {
            crate::silk::encode_stereo_frame(enc, &mut self.silk_mid, &mut self.silk_side, &mut self.stereo, HYBRID_SILK_BANDWIDTH, frame_size, &low_per_channel[0], &low_per_channel[1])?;
        } else {
            self.silk_mid.encode_frame(enc, HYBRID_SILK_BANDWIDTH, frame_size, &low_per_channel[0])?;
        }

        self.celt.encode_frame(enc, bandwidth, lm, HYBRID_CROSSOVER_BAND, frame_bytes, pcm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_mono_round_trips_sample_count() {
        let lm = 3; // 20 ms
        let frame_size = FrameSize::MS20;
        let n48 = crate::celt::frame_size(lm);
        let pcm: Vec<f32> = (0..n48).map(|i| (i as f32 * 0.02).sin() * 0.2).collect();

        let mut buf = vec![0u8; 16384];
        {
            let mut enc = RangeEncoder::new(&mut buf);
            let mut encoder = HybridEncoder::new(Channels::Mono);
            encoder.encode_frame(&mut enc, Bandwidth::Fullband, lm, frame_size, 300, &pcm).unwrap();
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = HybridDecoder::new(Channels::Mono);
        let vad = vec![true; frame_size.silk_sub_blocks()];
        let out = decoder.decode_frame(&mut dec, Bandwidth::Fullband, lm, frame_size, 300, &vad);
        assert_eq!(out.len(), n48);
    }

    #[test]
    fn hybrid_stereo_round_trips_sample_count() {
        let lm = 2; // 10 ms
        let frame_size = FrameSize::MS10;
        let n48 = crate::celt::frame_size(lm);
        let pcm: Vec<f32> = (0..n48 * 2).map(|i| (i as f32 * 0.02).sin() * 0.15).collect();

        let mut buf = vec![0u8; 16384];
        {
            let mut enc = RangeEncoder::new(&mut buf);
            let mut encoder = HybridEncoder::new(Channels::Stereo);
            encoder.encode_frame(&mut enc, Bandwidth::Superwideband, lm, frame_size, 250, &pcm).unwrap();
            enc.finish().unwrap();
        }
        let mut dec = RangeDecoder::new(&buf);
        let mut decoder = HybridDecoder::new(Channels::Stereo);
        let vad = vec![true; frame_size.silk_sub_blocks()];
        let out = decoder.decode_frame(&mut dec, Bandwidth::Superwideband, lm, frame_size, 250, &vad);
        assert_eq!(out.len(), n48 * 2);
    }
}
