// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signal analysis: extracts a handful of per-frame features from 48 kHz
//! PCM and turns them into a running voice/music classification the
//! [`crate::control::ModeController`] can act on when the caller leaves
//! [`crate::sample::SignalHint::Auto`].
//!
//! This is deliberately a small linear classifier over hand-picked features
//! (band energy ratios, a zero-crossing rate, and a pitch-strength estimate
//! from frame-to-frame autocorrelation) rather than a trained model — no
//! weight table is being reproduced, just the kind of signal that usually
//! separates voice from music.

const FRAME_LEN: usize = 960; // 20 ms at 48 kHz
const NUM_BANDS: usize = 8;

/// Features extracted from one 20 ms analysis frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameFeatures {
    /// Per-band energy in dB relative to the frame's total energy,
    /// low-to-high.
    pub band_energy_db: [f32; NUM_BANDS],
    /// Zero-crossing rate, `0.0..=1.0`.
    pub zero_crossing_rate: f32,
    /// Normalized lag-1 autocorrelation of the band-energy envelope vs. the
    /// previous frame; speech's pitch periodicity makes this track higher
    /// than most music's broader spectral texture.
    pub pitch_strength: f32,
    /// Overall frame energy, for voice-activity gating.
    pub rms: f32,
}

/// Running analyzer; call [`Analyzer::analyze`] once per 20 ms frame of
/// mono 48 kHz PCM.
#[derive(Clone, Debug, Default)]
pub struct Analyzer {
    prev_band_energy: [f32; NUM_BANDS],
    music_probability: f32,
    have_prev: bool,
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer { music_probability: 0.5, ..Default::default() }
    }

    /// Extracts features from one frame and folds them into the running
    /// music-probability estimate. `pcm` must be exactly [`FRAME_LEN`]
    /// (20 ms at 48 kHz) mono samples; shorter tail frames should be
    /// zero-padded by the caller.
    pub fn analyze(&mut self, pcm: &[f32]) -> FrameFeatures {
        debug_assert_eq!(pcm.len(), FRAME_LEN);

        let band_energy_db = band_energies_db(pcm);
        let zero_crossing_rate = zero_crossing_rate(pcm);
        let rms = rms(pcm);

        let pitch_strength = if self.have_prev {
            normalized_correlation(&self.prev_band_energy, &band_energy_db)
        } else {
            0.0
        };

        self.prev_band_energy = band_energy_db;
        self.have_prev = true;

        let features = FrameFeatures { band_energy_db, zero_crossing_rate, pitch_strength, rms };
        self.update_probability(&features);
        features
    }

    /// A smoothed `0.0` (voice-like) to `1.0` (music-like) estimate.
    pub fn music_probability(&self) -> f32 {
        self.music_probability
    }

    /// Folds this frame's features into [`Self::music_probability`] with a
    /// simple exponential smoother, the same shape CELT's other running
    /// estimators (e.g. band energy smoothing) use.
    fn update_probability(&mut self, features: &FrameFeatures) {
        if features.rms < 1e-6 {
            // Silence carries no evidence either way; let the estimate decay
            // toward neutral instead of chasing noise.
            self.music_probability += (0.5 - self.music_probability) * 0.05;
            return;
        }

        let spectral_tilt = features.band_energy_db[NUM_BANDS - 1] - features.band_energy_db[0];
        // Weighted linear score: high zero-crossing rate, flat/bright tilt,
        // and weak frame-to-frame pitch correlation read as "music-like";
        // strong periodicity and a low-frequency-heavy tilt read as speech.
        let score = 0.6 * features.zero_crossing_rate - 0.5 * features.pitch_strength + 0.1 * (spectral_tilt / 40.0).clamp(-1.0, 1.0);
        let instantaneous = (0.5 + score).clamp(0.0, 1.0);

        const SMOOTHING: f32 = 0.1;
        self.music_probability += (instantaneous - self.music_probability) * SMOOTHING;
    }
}

fn rms(pcm: &[f32]) -> f32 {
    let sum_sq: f32 = pcm.iter().map(|&s| s * s).sum();
    (sum_sq / pcm.len() as f32).sqrt()
}

fn zero_crossing_rate(pcm: &[f32]) -> f32 {
    if pcm.len() < 2 {
        return 0.0;
    }
    let crossings = pcm.windows(2).filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0)).count();
    crossings as f32 / (pcm.len() - 1) as f32
}

/// Splits `pcm` into [`NUM_BANDS`] equal-length time-domain segments and
/// reports each one's energy in dB relative to the frame total. This is a
/// coarse stand-in for a real filterbank — plenty for telling a
/// low-frequency-heavy frame from a bright one, which is all the
/// classifier needs.
fn band_energies_db(pcm: &[f32]) -> [f32; NUM_BANDS] {
    let band_len = pcm.len() / NUM_BANDS;
    let mut energies = [0.0f32; NUM_BANDS];
    let mut total = 0.0f32;
    for (b, energy) in energies.iter_mut().enumerate() {
        let start = b * band_len;
        let end = if b == NUM_BANDS - 1 { pcm.len() } else { start + band_len };
        let e: f32 = pcm[start..end].iter().map(|&s| s * s).sum();
        *energy = e;
        total += e;
    }
    let total_db = 10.0 * (total.max(1e-9)).log10();
    let mut out = [0.0f32; NUM_BANDS];
    for (o, &e) in out.iter_mut().zip(energies.iter()) {
        *o = 10.0 * (e.max(1e-9)).log10() - total_db;
    }
    out
}

fn normalized_correlation(a: &[f32; NUM_BANDS], b: &[f32; NUM_BANDS]) -> f32 {
    let mean_a = a.iter().sum::<f32>() / NUM_BANDS as f32;
    let mean_b = b.iter().sum::<f32>() / NUM_BANDS as f32;
    let mut num = 0.0f32;
    let mut den_a = 0.0f32;
    let mut den_b = 0.0f32;
    for i in 0..NUM_BANDS {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        num += da * db;
        den_a += da * da;
        den_b += db * db;
    }
    let denom = (den_a * den_b).sqrt();
    if denom < 1e-6 {
        0.0
    } else {
        (num / denom).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_frame_relaxes_toward_neutral() {
        let mut analyzer = Analyzer::new();
        analyzer.music_probability = 0.9;
        let silence = vec![0.0f32; FRAME_LEN];
        analyzer.analyze(&silence);
        assert!(analyzer.music_probability() < 0.9);
    }

    #[test]
    fn zero_crossing_rate_is_zero_for_dc_signal() {
        let dc = vec![0.3f32; FRAME_LEN];
        assert_eq!(zero_crossing_rate(&dc), 0.0);
    }

    #[test]
    fn zero_crossing_rate_is_high_for_alternating_signal() {
        let alternating: Vec<f32> = (0..FRAME_LEN).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(zero_crossing_rate(&alternating) > 0.9);
    }

    #[test]
    fn identical_consecutive_frames_correlate_perfectly() {
        let mut analyzer = Analyzer::new();
        let mut pcm = vec![0.0f32; FRAME_LEN];
        for (i, s) in pcm.iter_mut().enumerate() {
            *s = (i as f32 * 0.05).sin() * 0.5;
        }
        analyzer.analyze(&pcm);
        let features = analyzer.analyze(&pcm);
        assert!(features.pitch_strength > 0.99);
    }

    #[test]
    fn band_energies_sum_to_roughly_zero_db_relative_to_total() {
        let mut pcm = vec![0.0f32; FRAME_LEN];
        for (i, s) in pcm.iter_mut().enumerate() {
            *s = (i as f32 * 0.1).sin();
        }
        let bands = band_energies_db(&pcm);
        assert!(bands.iter().any(|&b| b > -40.0));
    }
}
