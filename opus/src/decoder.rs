// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level decoder: TOC-driven dispatch to SILK, CELT, or Hybrid,
//! packet loss concealment when a packet is missing, and a final resample
//! to the caller's configured output rate.
//!
//! Per-mode synthesis state (the SILK channel pair, the CELT decoder, the
//! hybrid decoder) is kept independently and never spliced across a mode
//! change; a bandwidth change rebuilds the SILK pair since its internal
//! rate depends on it. This mirrors the reference decoder's practice of
//! resetting history on a mode switch rather than attempting continuity
//! across coders that don't share state.

use crate::celt::decoder::CeltDecoder;
use crate::control::DecoderConfig;
use crate::error::{Error, Result};
use crate::hybrid::HybridDecoder;
use crate::packet;
use crate::plc::PlcState;
use crate::resample::Resampler;
use crate::sample::{Bandwidth, Channels, CodecMode, FrameSize, Sample, SamplingRate};
use crate::silk::decoder::SilkDecoder;
use crate::silk::{decode_stereo_frame, StereoState};
use opus_core::RangeDecoder;

/// Maps a [`FrameSize`] to CELT's `LM` parameter (RFC 6716 §4.3): `120 <<
/// lm` samples at 48 kHz.
fn celt_lm(frame_size: FrameSize) -> usize {
    match frame_size.0 {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

/// The SILK-only decoding state, rebuilt whenever the packet's bandwidth
/// changes since SILK's internal rate is a function of it.
struct SilkState {
    bandwidth: Bandwidth,
    mid: SilkDecoder,
    side: SilkDecoder,
    stereo: StereoState,
    up: Vec<Option<Resampler>>,
}

impl SilkState {
    fn new(bandwidth: Bandwidth, channels: usize) -> Self {
        SilkState {
            bandwidth,
            mid: SilkDecoder::new(bandwidth),
            side: SilkDecoder::new(bandwidth),
            stereo: StereoState::new(),
            up: (0..channels).map(|_| None).collect(),
        }
    }
}

/// Decodes Opus packets into PCM, dispatching per-frame to SILK, CELT, or
/// Hybrid and concealing losses when handed `None` in place of a packet.
pub struct Decoder {
    config: DecoderConfig,
    silk: Option<SilkState>,
    celt: CeltDecoder,
    hybrid: HybridDecoder,
    plc: PlcState,
    output: Vec<Option<Resampler>>,
    last_frame_len: usize,
}

impl Decoder {
    /// Builds a decoder for `config`'s channel count and output sample
    /// rate. Every packet handed to [`Decoder::decode`] must carry that
    /// same channel count.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        let channels = config.channels();
        Ok(Decoder {
            config,
            silk: None,
            celt: CeltDecoder::new(channels),
            hybrid: HybridDecoder::new(channels),
            plc: PlcState::new(channels),
            output: (0..channels.count()).map(|_| None).collect(),
            last_frame_len: FrameSize::MS20.samples(SamplingRate::Hz48000),
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Drops all per-coder history, as if the decoder were freshly built.
    pub fn reset(&mut self) {
        self.silk = None;
        self.celt.reset();
        self.hybrid.reset();
        self.plc.reset();
        self.output.iter_mut().for_each(|r| *r = None);
        self.last_frame_len = FrameSize::MS20.samples(SamplingRate::Hz48000);
    }

    /// Decodes one packet (or, if `packet` is `None` or empty, conceals its
    /// loss) into `out`, an interleaved buffer in the configured channel
    /// count and sample rate. Returns the number of samples written per
    /// channel.
    pub fn decode<S: Sample>(&mut self, packet: Option<&[u8]>, out: &mut [S]) -> Result<usize> {
        let channels = self.config.channels().count();

        let pcm_48k = match packet {
            Some(p) if !p.is_empty() => match self.decode_packet(p) {
                Ok(pcm) => pcm,
                Err(e) => {
                    log::warn!("dropping malformed packet: {e}");
                    return Err(e);
                }
            },
            _ => {
                log::debug!("concealing lost packet (streak handled by PlcState)");
                self.plc.conceal(self.last_frame_len)
            }
        };

        let final_pcm = self.resample_to_output(&pcm_48k, channels)?;
        let n_frames = final_pcm.len() / channels.max(1);

        if out.len() < final_pcm.len() {
            return Err(Error::BufferTooSmall);
        }

        let gain = 10f32.powf(self.config.gain_q8db() as f32 / 256.0 / 20.0);
        for (dst, &src) in out.iter_mut().zip(final_pcm.iter()) {
            *dst = S::from_f32((src * gain).clamp(-1.0, 1.0));
        }
        Ok(n_frames)
    }

    fn resample_to_output(&mut self, pcm_48k: &[f32], channels: usize) -> Result<Vec<f32>> {
        let out_rate = self.config.sample_rate();
        if out_rate == SamplingRate::Hz48000 || channels == 0 {
            return Ok(pcm_48k.to_vec());
        }

        let n48 = pcm_48k.len() / channels;
        let mut per_channel = Vec::with_capacity(channels);
        for ch in 0..channels {
            if self.output[ch].is_none() {
                self.output[ch] = Resampler::new(SamplingRate::Hz48000, out_rate).ok();
            }
            let chan: Vec<f32> = (0..n48).map(|i| pcm_48k[i * channels + ch]).collect();
            let down = self.output[ch].as_mut().and_then(|r| r.process(&chan).ok()).unwrap_or_default();
            per_channel.push(down);
        }
        let n_out = per_channel.iter().map(Vec::len).min().unwrap_or(0);
        let mut out = Vec::with_capacity(n_out * channels);
        for i in 0..n_out {
            for chan in &per_channel {
                out.push(chan[i]);
            }
        }
        Ok(out)
    }

    fn decode_packet(&mut self, packet: &[u8]) -> Result<Vec<f32>> {
        let parsed = packet::parse_packet(packet, false)?;
        let toc = parsed.toc;
        if toc.channels() != self.config.channels() {
            return Err(Error::InvalidChannels);
        }

        let mode = toc.mode();
        let bandwidth = toc.bandwidth();
        let frame_size = toc.frame_size();
        let channels = toc.channels();
        let lm = celt_lm(frame_size);

        let mut pcm = Vec::with_capacity(parsed.frames.len() * frame_size.samples(SamplingRate::Hz48000) * channels.count());
        for frame in &parsed.frames {
            log::trace!("decoding frame: mode={mode:?} bandwidth={bandwidth:?} frame_size={frame_size:?}");
            let frame_pcm = self.decode_mode_frame(mode, bandwidth, frame_size, lm, channels, frame.data)?;
            self.last_frame_len = (frame_pcm.len() / channels.count()).max(1);
            self.plc.note_good_frame(mode, &frame_pcm);
            pcm.extend_from_slice(&frame_pcm);
        }
        Ok(pcm)
    }

    fn decode_mode_frame(
        &mut self,
        mode: CodecMode,
        bandwidth: Bandwidth,
        frame_size: FrameSize,
        lm: usize,
        channels: Channels,
        frame: &[u8],
    ) -> Result<Vec<f32>> {
        match mode {
            CodecMode::Celt => {
                let mut dec = RangeDecoder::new(frame);
                Ok(self.celt.decode_frame(&mut dec, bandwidth, lm, 0, frame.len()))
            }
            CodecMode::Hybrid => {
                let mut dec = RangeDecoder::new(frame);
                let vad: Vec<bool> = (0..frame_size.silk_sub_blocks()).map(|_| dec.decode_bit_logp(1)).collect();
                Ok(self.hybrid.decode_frame(&mut dec, bandwidth, lm, frame_size, frame.len(), &vad))
            }
            CodecMode::Silk => self.decode_silk_frame(bandwidth, frame_size, channels, frame),
        }
    }

    fn decode_silk_frame(&mut self, bandwidth: Bandwidth, frame_size: FrameSize, channels: Channels, frame: &[u8]) -> Result<Vec<f32>> {
        let mut dec = RangeDecoder::new(frame);
        let vad: Vec<bool> = (0..frame_size.silk_sub_blocks()).map(|_| dec.decode_bit_logp(1)).collect();

        if self.silk.as_ref().map(|s| s.bandwidth) != Some(bandwidth) {
            self.silk = Some(SilkState::new(bandwidth, channels.count()));
        }
        let state = self.silk.as_mut().expect("just constructed above");

        let (left, right) = if channels == Channels::Stereo {
            decode_stereo_frame(&mut dec, &mut state.mid, &mut state.side, &mut state.stereo, bandwidth, frame_size, &vad)
        } else {
            (state.mid.decode_frame(&mut dec, bandwidth, frame_size, &vad), Vec::new())
        };

        let native_rate = SamplingRate::from_hz(bandwidth.silk_rate_hz()).unwrap_or(SamplingRate::Hz16000);
        let left48 = resample_channel(&mut state.up[0], native_rate, &left);
        if channels == Channels::Stereo {
            let right48 = resample_channel(&mut state.up[1], native_rate, &right);
            let n = left48.len().min(right48.len());
            let mut out = Vec::with_capacity(n * 2);
            for i in 0..n {
                out.push(left48[i]);
                out.push(right48[i]);
            }
            Ok(out)
        } else {
            Ok(left48)
        }
    }
}

fn resample_channel(slot: &mut Option<Resampler>, from: SamplingRate, pcm: &[i32]) -> Vec<f32> {
    if slot.is_none() {
        *slot = Resampler::new(from, SamplingRate::Hz48000).ok();
    }
    let as_f32: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
    slot.as_mut().and_then(|r| r.process(&as_f32).ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celt::encoder::CeltEncoder;
    use opus_core::RangeEncoder;

    fn build_celt_packet(channels: Channels, bandwidth: Bandwidth, frame_size: FrameSize, pcm: &[f32]) -> Vec<u8> {
        let toc = packet::Toc::build(CodecMode::Celt, bandwidth, frame_size, channels == Channels::Stereo, 0).unwrap();
        let mut payload = vec![0u8; 4096];
        let len = {
            let mut enc = RangeEncoder::new(&mut payload);
            let mut encoder = CeltEncoder::new(channels);
            encoder.encode_frame(&mut enc, bandwidth, celt_lm(frame_size), 0, 200, pcm).unwrap();
            enc.finish().unwrap()
        };
        let mut packet = vec![toc.to_byte()];
        packet.extend_from_slice(&payload[..len]);
        packet
    }

    #[test]
    fn decode_celt_packet_produces_expected_output_length() {
        let frame_size = FrameSize::MS20;
        let n48 = frame_size.samples(SamplingRate::Hz48000);
        let pcm: Vec<f32> = (0..n48).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let packet = build_celt_packet(Channels::Mono, Bandwidth::Fullband, frame_size, &pcm);

        let config = DecoderConfig::new(SamplingRate::Hz48000, Channels::Mono);
        let mut decoder = Decoder::new(config).unwrap();
        let mut out = vec![0.0f32; n48];
        let written = decoder.decode(Some(&packet), &mut out).unwrap();
        assert_eq!(written, n48);
    }

    #[test]
    fn missing_packet_conceals_without_error() {
        let config = DecoderConfig::new(SamplingRate::Hz48000, Channels::Stereo);
        let mut decoder = Decoder::new(config).unwrap();
        let mut out = vec![0.0f32; 960 * 2];
        let written = decoder.decode::<f32>(None, &mut out).unwrap();
        assert_eq!(written, 960);
    }

    #[test]
    fn undersized_output_buffer_errors() {
        let frame_size = FrameSize::MS20;
        let n48 = frame_size.samples(SamplingRate::Hz48000);
        let pcm = vec![0.1f32; n48];
        let packet = build_celt_packet(Channels::Mono, Bandwidth::Fullband, frame_size, &pcm);

        let config = DecoderConfig::new(SamplingRate::Hz48000, Channels::Mono);
        let mut decoder = Decoder::new(config).unwrap();
        let mut out = vec![0.0f32; n48 - 1];
        assert_eq!(decoder.decode(Some(&packet), &mut out), Err(Error::BufferTooSmall));
    }

    #[test]
    fn downsampled_output_rate_produces_proportional_length() {
        let frame_size = FrameSize::MS20;
        let n48 = frame_size.samples(SamplingRate::Hz48000);
        let pcm: Vec<f32> = (0..n48).map(|i| (i as f32 * 0.03).cos() * 0.2).collect();
        let packet = build_celt_packet(Channels::Mono, Bandwidth::Wideband, frame_size, &pcm);

        let config = DecoderConfig::new(SamplingRate::Hz16000, Channels::Mono);
        let mut decoder = Decoder::new(config).unwrap();
        let mut out = vec![0.0f32; n48];
        let written = decoder.decode(Some(&packet), &mut out).unwrap();
        assert!(written > 0 && written < n48);
    }
}
