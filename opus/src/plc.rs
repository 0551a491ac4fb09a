// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packet loss concealment (RFC 6716 §4.4, spec.md §4.9): fills the gap left
//! by a missing packet with a decaying extrapolation of the last good
//! frame plus a little comfort noise, rather than silence, so an isolated
//! loss doesn't produce an audible gap or click. A long loss streak fades
//! to near-silence instead of looping the same frame forever.

use crate::sample::{Channels, CodecMode};

/// Consecutive-loss count past which concealment gives up on extrapolating
/// the last frame and settles on low-level comfort noise.
const FADE_FRAMES: u32 = 5;
/// Upper bound on the tracked loss streak; concealment behavior is already
/// flat past `FADE_FRAMES`, this just keeps the counter from growing
/// unboundedly across a very long outage.
const MAX_LOSS_STREAK: u32 = 20;

/// Per-decoder concealment state: the last successfully decoded frame (at
/// 48 kHz, post any per-mode synthesis but pre output resample) and a
/// running count of how many frames have been lost in a row.
pub struct PlcState {
    last_pcm: Vec<f32>,
    last_mode: Option<CodecMode>,
    channels: Channels,
    loss_streak: u32,
    rng: u32,
}

impl PlcState {
    pub fn new(channels: Channels) -> Self {
        PlcState { last_pcm: Vec::new(), last_mode: None, channels, loss_streak: 0, rng: 0x2545_f491 }
    }

    pub fn reset(&mut self) {
        self.last_pcm.clear();
        self.last_mode = None;
        self.loss_streak = 0;
    }

    /// Records a successfully decoded frame, resetting the loss streak.
    pub fn note_good_frame(&mut self, mode: CodecMode, pcm_48k: &[f32]) {
        self.last_pcm.clear();
        self.last_pcm.extend_from_slice(pcm_48k);
        self.last_mode = Some(mode);
        self.loss_streak = 0;
    }

    pub fn loss_streak(&self) -> u32 {
        self.loss_streak
    }

    pub fn last_mode(&self) -> Option<CodecMode> {
        self.last_mode
    }

    /// Synthesizes `frame_count` interleaved samples per channel (48 kHz) to
    /// stand in for a lost frame. The first [`FADE_FRAMES`] losses repeat the
    /// last good frame at linearly decaying gain plus a touch of jitter;
    /// beyond that, concealment settles on quiet comfort noise instead of
    /// looping the same shape indefinitely.
    pub fn conceal(&mut self, frame_count: usize) -> Vec<f32> {
        self.loss_streak = (self.loss_streak + 1).min(MAX_LOSS_STREAK);
        let channels = self.channels.count();
        let mut out = vec![0.0f32; frame_count * channels];

        if self.loss_streak > FADE_FRAMES || self.last_pcm.is_empty() {
            for s in out.iter_mut() {
                *s = self.next_noise() * 0.002;
            }
            return out;
        }

        let gain = 1.0 - (self.loss_streak - 1) as f32 / FADE_FRAMES as f32;
        let last_frames = (self.last_pcm.len() / channels).max(1);
        for i in 0..frame_count {
            let src = i % last_frames;
            for ch in 0..channels {
                let base = self.last_pcm.get(src * channels + ch).copied().unwrap_or(0.0);
                out[i * channels + ch] = base * gain + self.next_noise() * 0.01 * gain;
            }
        }
        out
    }

    /// A small xorshift generator: good enough for low-level comfort noise,
    /// no need for a cryptographic or even statistically rigorous PRNG here.
    fn next_noise(&mut self) -> f32 {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 17;
        self.rng ^= self.rng << 5;
        (self.rng as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conceal_produces_requested_sample_count() {
        let mut plc = PlcState::new(Channels::Stereo);
        let out = plc.conceal(240);
        assert_eq!(out.len(), 240 * 2);
    }

    #[test]
    fn loss_streak_fades_to_near_silence() {
        let mut plc = PlcState::new(Channels::Mono);
        plc.note_good_frame(CodecMode::Celt, &vec![0.5f32; 960]);
        let mut last_peak = 1.0f32;
        for _ in 0..FADE_FRAMES {
            let frame = plc.conceal(960);
            let peak = frame.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
            assert!(peak <= last_peak + 1e-3);
            last_peak = peak;
        }
        let silent = plc.conceal(960);
        let peak = silent.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(peak < 0.01);
    }

    #[test]
    fn good_frame_resets_loss_streak() {
        let mut plc = PlcState::new(Channels::Mono);
        plc.conceal(960);
        plc.conceal(960);
        assert_eq!(plc.loss_streak(), 2);
        plc.note_good_frame(CodecMode::Silk, &vec![0.0f32; 960]);
        assert_eq!(plc.loss_streak(), 0);
    }
}
