// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level encoder: analysis-driven mode selection, per-mode
//! dispatch to SILK, CELT, or Hybrid, and TOC-prefixed packet assembly.
//!
//! Mirrors [`crate::decoder::Decoder`]'s per-mode state split: each coder
//! keeps its own independent history, rebuilt on a bandwidth change for
//! SILK the same way the decoder rebuilds its pair.

use crate::analysis::Analyzer;
use crate::celt::encoder::CeltEncoder;
use crate::control::{Bitrate, EncoderConfig};
use crate::error::{Error, Result};
use crate::hybrid::HybridEncoder;
use crate::packet::Toc;
use crate::resample::Resampler;
use crate::sample::{Application, Bandwidth, Channels, CodecMode, FrameSize, Sample, SamplingRate, SignalHint};
use crate::silk::encoder::SilkEncoder;
use crate::silk::{encode_stereo_frame, StereoState};
use opus_core::RangeEncoder;

/// CELT's fixed MDCT lookahead, `Fs / 400` (2.5 ms), present for every
/// application mode.
const MDCT_LOOKAHEAD_DIVISOR: usize = 400;
/// SILK's extra analysis lookahead, `Fs / 250` (4 ms), added on top of the
/// MDCT lookahead for every application except [`Application::LowDelay`]
/// (spec.md §6/§8 Testable Property 8).
const SILK_LOOKAHEAD_DIVISOR: usize = 250;

fn celt_lm(frame_size: FrameSize) -> usize {
    match frame_size.0 {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

fn fit_len(v: &mut Vec<i32>, len: usize) {
    v.resize(len, 0);
}

struct SilkState {
    bandwidth: Bandwidth,
    mid: SilkEncoder,
    side: SilkEncoder,
    stereo: StereoState,
    down: Vec<Option<Resampler>>,
}

impl SilkState {
    fn new(bandwidth: Bandwidth, channels: usize) -> Self {
        SilkState {
            bandwidth,
            mid: SilkEncoder::new(bandwidth),
            side: SilkEncoder::new(bandwidth),
            stereo: StereoState::new(),
            down: (0..channels).map(|_| None).collect(),
        }
    }
}

/// Encodes PCM into Opus packets, picking mode/bandwidth per frame via
/// [`crate::analysis::Analyzer`] and [`crate::control::ModeController`]
/// unless the caller has pinned them in [`EncoderConfig`].
pub struct Encoder {
    config: EncoderConfig,
    mode_controller: crate::control::ModeController,
    analyzer: Analyzer,
    silk: Option<SilkState>,
    celt: CeltEncoder,
    hybrid: HybridEncoder,
    input: Vec<Option<Resampler>>,
    encoded_once: bool,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Result<Self> {
        let channels = config.channels();
        let mode_controller = crate::control::ModeController::new(config.application());
        Ok(Encoder {
            input: (0..channels.count()).map(|_| None).collect(),
            mode_controller,
            analyzer: Analyzer::new(),
            silk: None,
            celt: CeltEncoder::new(channels),
            hybrid: HybridEncoder::new(channels),
            config,
            encoded_once: false,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Replaces the live configuration, e.g. for a mid-stream bitrate or
    /// complexity change. `sample_rate`, `channels`, and `application` are
    /// locked once the first frame has been encoded (RFC 6716 doesn't
    /// forbid it, but nothing in this crate's per-mode state supports
    /// splicing across those changes mid-stream).
    pub fn reconfigure(&mut self, config: EncoderConfig) -> Result<()> {
        if self.encoded_once
            && (config.sample_rate() != self.config.sample_rate()
                || config.channels() != self.config.channels()
                || config.application() != self.config.application())
        {
            return Err(Error::BadArgument("sample rate, channels, and application are locked after the first encode"));
        }
        self.config = config;
        Ok(())
    }

    /// Algorithmic lookahead in samples at the configured output rate:
    /// `Fs/400` for the MDCT alone (low-delay applications skip SILK
    /// analysis entirely), plus `Fs/250` for SILK's pitch/LSF analysis
    /// window otherwise.
    pub fn lookahead(&self) -> usize {
        let rate = self.config.sample_rate().hz() as usize;
        let mut samples = rate / MDCT_LOOKAHEAD_DIVISOR;
        if self.config.application() != Application::LowDelay {
            samples += rate / SILK_LOOKAHEAD_DIVISOR;
        }
        samples
    }

    /// Drops all per-coder history, as if the encoder were freshly built.
    pub fn reset(&mut self) {
        self.silk = None;
        self.celt = CeltEncoder::new(self.config.channels());
        self.hybrid = HybridEncoder::new(self.config.channels());
        self.input.iter_mut().for_each(|r| *r = None);
        self.analyzer = Analyzer::new();
    }

    /// Encodes exactly one frame's worth of interleaved PCM (length
    /// `config.frame_size().samples(config.sample_rate()) *
    /// config.channels().count()`) into `out`, returning the packet
    /// length in bytes, or `0` for a DTX-elided silent frame.
    pub fn encode<S: Sample>(&mut self, pcm: &[S], out: &mut [u8]) -> Result<usize> {
        let channels = self.config.channels().count();
        let expected = self.config.frame_size().samples(self.config.sample_rate()) * channels;
        if pcm.len() != expected {
            return Err(Error::BadArgument("pcm length doesn't match the configured frame size"));
        }
        if out.is_empty() {
            return Err(Error::BufferTooSmall);
        }

        let pcm_f32: Vec<f32> = pcm.iter().map(|&s| s.to_f32()).collect();
        let pcm_48k = self.resample_to_internal(&pcm_f32, channels)?;
        let n48 = pcm_48k.len() / channels.max(1);

        let peak = pcm_48k.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        if self.config.dtx() && peak < 1e-4 {
            self.encoded_once = true;
            return Ok(0);
        }

        let mono_mix: Vec<f32> = if channels == 2 {
            (0..n48).map(|i| 0.5 * (pcm_48k[i * 2] + pcm_48k[i * 2 + 1])).collect()
        } else {
            pcm_48k.clone()
        };
        let signal = if self.config.signal() != SignalHint::Auto {
            self.config.signal()
        } else if n48 == 960 {
            let features = self.analyzer.analyze(&mono_mix);
            if features.pitch_strength > 0.6 && self.analyzer.music_probability() < 0.4 {
                SignalHint::Voice
            } else if self.analyzer.music_probability() > 0.6 {
                SignalHint::Music
            } else {
                SignalHint::Auto
            }
        } else {
            SignalHint::Auto
        };

        let bitrate_bps = match self.config.bitrate() {
            Bitrate::Auto => 32_000 * channels as u32,
            Bitrate::Max => 510_000,
            Bitrate::Bits(b) => b,
        };
        self.mode_controller.update(signal, bitrate_bps, self.config.max_bandwidth());

        let mode = self.mode_controller.mode();
        let bandwidth = self.config.forced_bandwidth().unwrap_or_else(|| self.mode_controller.bandwidth()).min(self.config.max_bandwidth());
        let frame_size = self.config.frame_size();
        if !frame_size.valid_for(mode) {
            return Err(Error::BadArgument("configured frame size is invalid for the selected mode"));
        }

        let channels_out = match self.config.force_channels() {
            crate::sample::ForceChannels::Mono => Channels::Mono,
            crate::sample::ForceChannels::Stereo => Channels::Stereo,
            crate::sample::ForceChannels::Auto => self.config.channels(),
        };
        let pcm_for_mode = if channels_out == Channels::Mono && channels == 2 {
            mono_mix
        } else {
            pcm_48k
        };

        let frame_bytes = ((bitrate_bps as u64 * u64::from(frame_size.deci_ms()) / 10_000) / 8).max(16) as usize;
        let mut payload = vec![0u8; out.len().saturating_sub(1).max(frame_bytes + 64)];
        let lm = celt_lm(frame_size);
        let encoded_len = {
            let mut enc = RangeEncoder::new(&mut payload);
            self.encode_mode_frame(&mut enc, mode, bandwidth, lm, frame_size, frame_bytes, channels_out, &pcm_for_mode)?;
            enc.finish()?
        };

        if encoded_len + 1 > out.len() {
            return Err(Error::BufferTooSmall);
        }
        let toc = Toc::build(mode, bandwidth, frame_size, channels_out == Channels::Stereo, 0)?;
        out[0] = toc.to_byte();
        out[1..1 + encoded_len].copy_from_slice(&payload[..encoded_len]);
        self.encoded_once = true;
        Ok(1 + encoded_len)
    }

    fn resample_to_internal(&mut self, pcm: &[f32], channels: usize) -> Result<Vec<f32>> {
        let in_rate = self.config.sample_rate();
        if in_rate == SamplingRate::Hz48000 || channels == 0 {
            return Ok(pcm.to_vec());
        }
        let n_in = pcm.len() / channels;
        let mut per_channel = Vec::with_capacity(channels);
        for ch in 0..channels {
            if self.input[ch].is_none() {
                self.input[ch] = Resampler::new(in_rate, SamplingRate::Hz48000).ok();
            }
            let chan: Vec<f32> = (0..n_in).map(|i| pcm[i * channels + ch]).collect();
            let up = self.input[ch].as_mut().and_then(|r| r.process(&chan).ok()).unwrap_or_default();
            per_channel.push(up);
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

    fn encode_mode_frame(
        &mut self,
        enc: &mut RangeEncoder<'_>,
        mode: CodecMode,
        bandwidth: Bandwidth,
        lm: usize,
        frame_size: FrameSize,
        frame_bytes: usize,
        channels: Channels,
        pcm_48k: &[f32],
    ) -> Result<()> {
        match mode {
            CodecMode::Celt => self.celt.encode_frame(enc, bandwidth, lm, 0, frame_bytes, pcm_48k).map_err(Into::into),
            CodecMode::Hybrid => {
                let vad = self.vad_flags(frame_size, pcm_48k, channels.count());
                for &active in &vad {
                    enc.encode_bit_logp(active, 1)?;
                }
                self.hybrid.encode_frame(enc, bandwidth, lm, frame_size, frame_bytes, pcm_48k).map_err(Into::into)
            }
            CodecMode::Silk => {
                let vad = self.vad_flags(frame_size, pcm_48k, channels.count());
                for &active in &vad {
                    enc.encode_bit_logp(active, 1)?;
                }
                self.encode_silk_frame(enc, bandwidth, frame_size, channels, pcm_48k)
            }
        }
    }

    /// A coarse per-20 ms-sub-block activity flag from frame energy. Not
    /// SILK's own internal voiced/unvoiced classification (that stays
    /// inside [`SilkEncoder`]) — this is the side information a decoder
    /// reads before it even knows which coder produced the frame.
    fn vad_flags(&self, frame_size: FrameSize, pcm_48k: &[f32], channels: usize) -> Vec<bool> {
        let sub_blocks = frame_size.silk_sub_blocks();
        let n48 = pcm_48k.len() / channels.max(1);
        let per_block = n48 / sub_blocks.max(1);
        (0..sub_blocks)
            .map(|b| {
                let start = b * per_block * channels;
                let end = ((b + 1) * per_block * channels).min(pcm_48k.len());
                let energy: f32 = pcm_48k[start..end].iter().map(|x| x * x).sum();
                energy / (end - start).max(1) as f32 > 1e-7
            })
            .collect()
    }

    fn encode_silk_frame(&mut self, enc: &mut RangeEncoder<'_>, bandwidth: Bandwidth, frame_size: FrameSize, channels: Channels, pcm_48k: &[f32]) -> Result<()> {
        let native_rate = SamplingRate::from_hz(bandwidth.silk_rate_hz()).unwrap_or(SamplingRate::Hz16000);
        let n_ch = channels.count();
        let n48 = pcm_48k.len() / n_ch;
        let target_len = frame_size.silk_sub_blocks() * crate::silk::subframe_len(native_rate.hz()) * crate::silk::SUBFRAMES_PER_BLOCK;

        if self.silk.as_ref().map(|s| s.bandwidth) != Some(bandwidth) {
            self.silk = Some(SilkState::new(bandwidth, n_ch));
        }
        let state = self.silk.as_mut().expect("just constructed above");

        let mut native_per_channel: Vec<Vec<i32>> = Vec::with_capacity(n_ch);
        for ch in 0..n_ch {
            if state.down[ch].is_none() {
                state.down[ch] = Resampler::new(SamplingRate::Hz48000, native_rate).ok();
            }
            let chan: Vec<f32> = (0..n48).map(|i| pcm_48k[i * n_ch + ch]).collect();
            let native_f32 = state.down[ch].as_mut().and_then(|r| r.process(&chan).ok()).unwrap_or_default();
            let mut native_i32: Vec<i32> = native_f32.iter().map(|&s| (s * 32768.0) as i32).collect();
            fit_len(&mut native_i32, target_len);
            native_per_channel.push(native_i32);
        }

        if channels == Channels::Stereo {
            encode_stereo_frame(enc, &mut state.mid, &mut state.side, &mut state.stereo, bandwidth, frame_size, &native_per_channel[0], &native_per_channel[1]).map_err(Into::into)
        } else {
            state.mid.encode_frame(enc, bandwidth, frame_size, &native_per_channel[0]).map_err(Into::into)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::DecoderConfig;
    use crate::decoder::Decoder;
    use crate::sample::Application;

    #[test]
    fn celt_mode_round_trips_through_decoder() {
        let mut config = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::LowDelay);
        config.set_frame_size(FrameSize::MS20);
        let mut encoder = Encoder::new(config).unwrap();

        let n = FrameSize::MS20.samples(SamplingRate::Hz48000);
        let pcm: Vec<f32> = (0..n).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let mut packet = vec![0u8; 4096];
        let len = encoder.encode(&pcm, &mut packet).unwrap();
        assert!(len > 1);

        let mut decoder = Decoder::new(DecoderConfig::new(SamplingRate::Hz48000, Channels::Mono)).unwrap();
        let mut out = vec![0.0f32; n];
        let written = decoder.decode(Some(&packet[..len]), &mut out).unwrap();
        assert_eq!(written, n);
    }

    #[test]
    fn dtx_elides_silent_frames() {
        let mut config = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::VoIP);
        config.set_frame_size(FrameSize::MS20);
        config.set_dtx(true);
        let mut encoder = Encoder::new(config).unwrap();

        let n = FrameSize::MS20.samples(SamplingRate::Hz48000);
        let pcm = vec![0.0f32; n];
        let mut packet = vec![0u8; 4096];
        let len = encoder.encode(&pcm, &mut packet).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn reconfigure_rejects_application_change_after_first_encode() {
        let config = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::Audio);
        let mut encoder = Encoder::new(config).unwrap();

        let n = FrameSize::MS20.samples(SamplingRate::Hz48000);
        let pcm: Vec<f32> = vec![0.1; n];
        let mut packet = vec![0u8; 4096];
        encoder.encode(&pcm, &mut packet).unwrap();

        let changed = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::VoIP);
        assert!(encoder.reconfigure(changed).is_err());
    }

    #[test]
    fn mismatched_pcm_length_is_rejected() {
        let config = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::Audio);
        let mut encoder = Encoder::new(config).unwrap();
        let mut packet = vec![0u8; 4096];
        assert!(encoder.encode(&vec![0.0f32; 10], &mut packet).is_err());
    }

    #[test]
    fn lookahead_is_positive_and_scales_with_rate() {
        let config48 = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::Audio);
        let config16 = EncoderConfig::new(SamplingRate::Hz16000, Channels::Mono, Application::Audio);
        let enc48 = Encoder::new(config48).unwrap();
        let enc16 = Encoder::new(config16).unwrap();
        assert!(enc48.lookahead() > 0);
        assert!(enc48.lookahead() > enc16.lookahead());
    }

    #[test]
    fn low_delay_lookahead_skips_the_silk_analysis_window() {
        let voip = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::VoIP);
        let low_delay = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::LowDelay);
        let voip_enc = Encoder::new(voip).unwrap();
        let low_delay_enc = Encoder::new(low_delay).unwrap();
        assert_eq!(low_delay_enc.lookahead(), 48_000 / 400);
        assert_eq!(voip_enc.lookahead(), 48_000 / 400 + 48_000 / 250);
    }
}
