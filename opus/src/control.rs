// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Encoder/decoder configuration and the mode/bandwidth/frame-size control
//! state machine.
//!
//! There is no file or environment configuration here — a caller builds an
//! [`EncoderConfig`]/[`DecoderConfig`] in memory and hands it to
//! [`crate::Encoder::new`]/[`crate::Decoder::new`], exactly like libopus's
//! CTL interface but as typed setters instead of a variadic ioctl.

use crate::error::{Error, Result};
use crate::sample::{Application, Bandwidth, Channels, CodecMode, ForceChannels, FrameSize, SamplingRate, SignalHint};

/// Target bitrate for the encoder (libopus CTL `OPUS_SET_BITRATE`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bitrate {
    /// Picks a bitrate automatically from the sample rate and channel count.
    Auto,
    /// Uses as many bits as the current bandwidth/channel configuration
    /// allows.
    Max,
    /// A specific target, in bits per second.
    Bits(u32),
}

/// Encoder-side configuration, validated up front so the encoder's hot path
/// never has to reject a setting mid-stream.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    sample_rate: SamplingRate,
    channels: Channels,
    application: Application,
    bitrate: Bitrate,
    complexity: u8,
    frame_size: FrameSize,
    signal: SignalHint,
    force_channels: ForceChannels,
    max_bandwidth: Bandwidth,
    forced_bandwidth: Option<Bandwidth>,
    vbr: bool,
    vbr_constraint: bool,
    dtx: bool,
    inband_fec: bool,
    packet_loss_perc: u8,
    lsb_depth: u8,
    prediction_disabled: bool,
}

impl EncoderConfig {
    /// Starts from libopus's defaults for `application`: VBR enabled,
    /// complexity 10, packet-loss estimate 0%, full bandwidth allowed.
    pub fn new(sample_rate: SamplingRate, channels: Channels, application: Application) -> Self {
        EncoderConfig {
            sample_rate,
            channels,
            application,
            bitrate: Bitrate::Auto,
            complexity: 10,
            frame_size: FrameSize::MS20,
            signal: SignalHint::Auto,
            force_channels: ForceChannels::Auto,
            max_bandwidth: Bandwidth::Fullband,
            forced_bandwidth: None,
            vbr: true,
            vbr_constraint: true,
            dtx: false,
            inband_fec: false,
            packet_loss_perc: 0,
            lsb_depth: 24,
            prediction_disabled: false,
        }
    }

    pub fn sample_rate(&self) -> SamplingRate {
        self.sample_rate
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn application(&self) -> Application {
        self.application
    }

    pub fn bitrate(&self) -> Bitrate {
        self.bitrate
    }

    /// Sets the target bitrate. `Bits` values are clamped to `500..=512000`
    /// per channel, mirroring libopus's accepted range.
    pub fn set_bitrate(&mut self, bitrate: Bitrate) -> Result<()> {
        if let Bitrate::Bits(bps) = bitrate {
            if !(500..=512_000).contains(&bps) {
                return Err(Error::BadArgument("bitrate out of range"));
            }
        }
        self.bitrate = bitrate;
        Ok(())
    }

    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    /// Sets encoder complexity, `0` (cheapest) through `10` (best quality).
    pub fn set_complexity(&mut self, complexity: u8) -> Result<()> {
        if complexity > 10 {
            return Err(Error::BadArgument("complexity must be 0..=10"));
        }
        self.complexity = complexity;
        Ok(())
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    pub fn set_frame_size(&mut self, frame_size: FrameSize) {
        self.frame_size = frame_size;
    }

    pub fn signal(&self) -> SignalHint {
        self.signal
    }

    pub fn set_signal(&mut self, signal: SignalHint) {
        self.signal = signal;
    }

    pub fn force_channels(&self) -> ForceChannels {
        self.force_channels
    }

    pub fn set_force_channels(&mut self, force: ForceChannels) -> Result<()> {
        if force == ForceChannels::Stereo && self.channels == Channels::Mono {
            return Err(Error::InvalidChannels);
        }
        self.force_channels = force;
        Ok(())
    }

    pub fn max_bandwidth(&self) -> Bandwidth {
        self.max_bandwidth
    }

    pub fn set_max_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.max_bandwidth = bandwidth;
    }

    pub fn forced_bandwidth(&self) -> Option<Bandwidth> {
        self.forced_bandwidth
    }

    /// `None` lets the encoder pick a bandwidth per frame; `Some` pins it.
    pub fn set_bandwidth(&mut self, bandwidth: Option<Bandwidth>) {
        self.forced_bandwidth = bandwidth;
    }

    pub fn vbr(&self) -> bool {
        self.vbr
    }

    pub fn set_vbr(&mut self, vbr: bool) {
        self.vbr = vbr;
    }

    pub fn vbr_constraint(&self) -> bool {
        self.vbr_constraint
    }

    pub fn set_vbr_constraint(&mut self, constrained: bool) {
        self.vbr_constraint = constrained;
    }

    pub fn dtx(&self) -> bool {
        self.dtx
    }

    pub fn set_dtx(&mut self, dtx: bool) {
        self.dtx = dtx;
    }

    pub fn inband_fec(&self) -> bool {
        self.inband_fec
    }

    pub fn set_inband_fec(&mut self, fec: bool) {
        self.inband_fec = fec;
    }

    pub fn packet_loss_perc(&self) -> u8 {
        self.packet_loss_perc
    }

    pub fn set_packet_loss_perc(&mut self, perc: u8) -> Result<()> {
        if perc > 100 {
            return Err(Error::BadArgument("packet loss percentage must be 0..=100"));
        }
        self.packet_loss_perc = perc;
        Ok(())
    }

    pub fn lsb_depth(&self) -> u8 {
        self.lsb_depth
    }

    pub fn set_lsb_depth(&mut self, depth: u8) -> Result<()> {
        if !(8..=24).contains(&depth) {
            return Err(Error::BadArgument("LSB depth must be 8..=24"));
        }
        self.lsb_depth = depth;
        Ok(())
    }

    pub fn prediction_disabled(&self) -> bool {
        self.prediction_disabled
    }

    pub fn set_prediction_disabled(&mut self, disabled: bool) {
        self.prediction_disabled = disabled;
    }
}

/// Decoder-side configuration.
#[derive(Clone, Copy, Debug)]
pub struct DecoderConfig {
    sample_rate: SamplingRate,
    channels: Channels,
    gain_q8db: i32,
}

impl DecoderConfig {
    pub fn new(sample_rate: SamplingRate, channels: Channels) -> Self {
        DecoderConfig { sample_rate, channels, gain_q8db: 0 }
    }

    pub fn sample_rate(&self) -> SamplingRate {
        self.sample_rate
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn gain_q8db(&self) -> i32 {
        self.gain_q8db
    }

    /// Sets an output gain in Q8 dB (libopus CTL `OPUS_SET_GAIN`):
    /// `gain_q8db / 256.0` decibels, applied multiplicatively to every
    /// decoded sample.
    pub fn set_gain_q8db(&mut self, gain: i32) {
        self.gain_q8db = gain;
    }
}

/// Tracks the encoder's mode/bandwidth/frame-size decisions across frames so
/// transitions only happen at safe boundaries (RFC 6716 §4.8 allows a mode
/// switch on any frame, but bandwidth and frame-size changes read more
/// cleanly as deliberate, hysteresis-guarded steps than per-frame coin
/// flips).
#[derive(Clone, Debug)]
pub struct ModeController {
    application: Application,
    current_mode: CodecMode,
    current_bandwidth: Bandwidth,
    voice_streak: u32,
    music_streak: u32,
}

impl ModeController {
    pub fn new(application: Application) -> Self {
        let current_mode = match application {
            Application::LowDelay => CodecMode::Celt,
            Application::VoIP => CodecMode::Silk,
            Application::Audio => CodecMode::Hybrid,
        };
        ModeController {
            application,
            current_mode,
            current_bandwidth: Bandwidth::Fullband,
            voice_streak: 0,
            music_streak: 0,
        }
    }

    pub fn mode(&self) -> CodecMode {
        self.current_mode
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.current_bandwidth
    }

    /// Folds one frame's signal classification into the running decision.
    /// `LowDelay` never leaves CELT; otherwise a streak of 5 consecutive
    /// frames classified the same way is required before switching modes,
    /// so a single misclassified frame doesn't thrash the coder.
    pub fn update(&mut self, signal: SignalHint, bitrate_bps: u32, max_bandwidth: Bandwidth) {
        let new_bandwidth = choose_bandwidth(bitrate_bps, max_bandwidth);
        if new_bandwidth != self.current_bandwidth {
            log::debug!("bandwidth transition: {:?} -> {new_bandwidth:?} (bitrate={bitrate_bps})", self.current_bandwidth);
        }
        self.current_bandwidth = new_bandwidth;

        if self.application == Application::LowDelay {
            self.current_mode = CodecMode::Celt;
            return;
        }

        match signal {
            SignalHint::Voice => {
                self.voice_streak += 1;
                self.music_streak = 0;
            }
            SignalHint::Music => {
                self.music_streak += 1;
                self.voice_streak = 0;
            }
            SignalHint::Auto => {
                self.voice_streak = 0;
                self.music_streak = 0;
            }
        }

        const SWITCH_STREAK: u32 = 5;
        let new_mode = if self.voice_streak >= SWITCH_STREAK {
            if self.current_bandwidth <= Bandwidth::Wideband { CodecMode::Silk } else { CodecMode::Hybrid }
        } else if self.music_streak >= SWITCH_STREAK {
            CodecMode::Celt
        } else {
            self.current_mode
        };
        if new_mode != self.current_mode {
            log::debug!("mode transition: {:?} -> {new_mode:?} (signal={signal:?})", self.current_mode);
        }
        self.current_mode = new_mode;
    }
}

/// Picks a bandwidth from the target bitrate, the way libopus's
/// `compute_silk_rate_for_hybrid`/bandwidth-selection tables do: more bits
/// unlock more spectrum, capped by the caller's configured ceiling.
fn choose_bandwidth(bitrate_bps: u32, max_bandwidth: Bandwidth) -> Bandwidth {
    let chosen = if bitrate_bps < 12_000 {
        Bandwidth::Narrowband
    } else if bitrate_bps < 18_000 {
        Bandwidth::Mediumband
    } else if bitrate_bps < 28_000 {
        Bandwidth::Wideband
    } else if bitrate_bps < 40_000 {
        Bandwidth::Superwideband
    } else {
        Bandwidth::Fullband
    };
    chosen.min(max_bandwidth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_validation_rejects_out_of_range() {
        let mut cfg = EncoderConfig::new(SamplingRate::Hz48000, Channels::Stereo, Application::Audio);
        assert!(cfg.set_bitrate(Bitrate::Bits(100)).is_err());
        assert!(cfg.set_bitrate(Bitrate::Bits(64_000)).is_ok());
        assert_eq!(cfg.bitrate(), Bitrate::Bits(64_000));
    }

    #[test]
    fn force_channels_stereo_requires_stereo_config() {
        let mut cfg = EncoderConfig::new(SamplingRate::Hz48000, Channels::Mono, Application::Audio);
        assert!(cfg.set_force_channels(ForceChannels::Stereo).is_err());
    }

    #[test]
    fn low_delay_application_never_leaves_celt() {
        let mut mc = ModeController::new(Application::LowDelay);
        mc.update(SignalHint::Voice, 64_000, Bandwidth::Fullband);
        assert_eq!(mc.mode(), CodecMode::Celt);
    }

    #[test]
    fn sustained_voice_streak_switches_to_silk_or_hybrid() {
        let mut mc = ModeController::new(Application::Audio);
        for _ in 0..6 {
            mc.update(SignalHint::Voice, 20_000, Bandwidth::Wideband);
        }
        assert_eq!(mc.mode(), CodecMode::Silk);
    }

    #[test]
    fn bandwidth_never_exceeds_configured_ceiling() {
        let mut mc = ModeController::new(Application::Audio);
        mc.update(SignalHint::Auto, 256_000, Bandwidth::Wideband);
        assert_eq!(mc.bandwidth(), Bandwidth::Wideband);
    }
}
