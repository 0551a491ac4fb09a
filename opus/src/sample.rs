// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The small vocabulary of enums shared by every public surface: channel
//! count, sample rate, bandwidth, frame size, codec mode, and application
//! hint.

use crate::error::{Error, Result};

/// Lets callers fill PCM buffers in their own sample format; the codec's
/// internal pipeline is always `f32`.
pub trait Sample: Copy {
    /// Converts a `f32` sample in `[-1.0, 1.0]` into this format.
    fn from_f32(float: f32) -> Self;
    /// Converts this format back into `f32`.
    fn to_f32(self) -> f32;
}

impl Sample for f32 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        float
    }
    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }
}

impl Sample for i16 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let scaled = float * 32768.0;
        scaled.clamp(-32768.0, 32767.0) as i16
    }
    #[inline(always)]
    fn to_f32(self) -> f32 {
        f32::from(self) / 32768.0
    }
}

/// Output channel count on the external interface: `1..=8` natively, up to
/// 255 via multistream channel mapping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Channels {
    /// A single channel.
    Mono,
    /// Interleaved left/right.
    Stereo,
}

impl Channels {
    /// Number of PCM samples per frame this variant corresponds to.
    pub fn count(self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

/// External sample rate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SamplingRate {
    /// 8 kHz.
    Hz8000 = 8000,
    /// 12 kHz.
    Hz12000 = 12000,
    /// 16 kHz.
    Hz16000 = 16000,
    /// 24 kHz.
    Hz24000 = 24000,
    /// 48 kHz, the codec's internal rate.
    Hz48000 = 48000,
}

impl SamplingRate {
    /// The rate in Hz as a plain integer.
    pub fn hz(self) -> u32 {
        self as u32
    }

    /// Parses one of the five legal external rates.
    pub fn from_hz(hz: u32) -> Result<Self> {
        match hz {
            8000 => Ok(SamplingRate::Hz8000),
            12000 => Ok(SamplingRate::Hz12000),
            16000 => Ok(SamplingRate::Hz16000),
            24000 => Ok(SamplingRate::Hz24000),
            48000 => Ok(SamplingRate::Hz48000),
            _ => Err(Error::BadArgument("unsupported sample rate")),
        }
    }
}

/// Audio bandwidth, i.e. how much of the spectrum a frame actually encodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Bandwidth {
    /// 4 kHz passband (SILK narrowband).
    Narrowband,
    /// 6 kHz passband (SILK mediumband).
    Mediumband,
    /// 8 kHz passband (SILK/Hybrid wideband).
    Wideband,
    /// 12 kHz passband (Hybrid/CELT super-wideband).
    Superwideband,
    /// 20 kHz passband (CELT fullband).
    Fullband,
}

impl Bandwidth {
    /// SILK's internal sample rate for this bandwidth (NB/MB/WB only apply
    /// to the SILK-only path; Hybrid always runs SILK at 16 kHz).
    pub fn silk_rate_hz(self) -> u32 {
        match self {
            Bandwidth::Narrowband => 8000,
            Bandwidth::Mediumband => 12000,
            _ => 16000,
        }
    }

    /// The highest bandwidth CELT alone can represent for a given
    /// decision; SILK-only mode never exceeds `Wideband`.
    pub fn max_for_silk_only() -> Bandwidth {
        Bandwidth::Wideband
    }
}

/// The 32-entry TOC configuration-number -> bandwidth table (RFC 6716
/// §3.1 Table 2), indexed by the 5-bit `config` field of the TOC byte.
pub(crate) const TOC_BANDWIDTH_TABLE: [Bandwidth; 32] = [
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Mediumband,
    Bandwidth::Mediumband,
    Bandwidth::Mediumband,
    Bandwidth::Mediumband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
];

/// Which layered coder produced (or should produce) a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CodecMode {
    /// SILK-only, bandwidth capped at wideband.
    Silk,
    /// SILK low bands + CELT high bands.
    Hybrid,
    /// CELT-only.
    Celt,
}

/// Frame duration in units of 2.5 ms (so `2` means 5 ms, `8` means 20 ms).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameSize(pub(crate) u8);

impl FrameSize {
    /// 2.5 ms — CELT only.
    pub const MS2_5: FrameSize = FrameSize(1);
    /// 5 ms — CELT only.
    pub const MS5: FrameSize = FrameSize(2);
    /// 10 ms — any mode.
    pub const MS10: FrameSize = FrameSize(4);
    /// 20 ms — any mode.
    pub const MS20: FrameSize = FrameSize(8);
    /// 40 ms — SILK/Hybrid only (two concatenated 20 ms sub-blocks).
    pub const MS40: FrameSize = FrameSize(16);
    /// 60 ms — SILK/Hybrid only (three concatenated 20 ms sub-blocks).
    pub const MS60: FrameSize = FrameSize(24);

    /// Duration in samples at the given sample rate.
    pub fn samples(self, rate: SamplingRate) -> usize {
        (rate.hz() as usize * self.0 as usize) / 400
    }

    /// Duration in tenths of a millisecond (since 2.5 ms isn't a whole
    /// millisecond), i.e. `25` for 2.5 ms, `200` for 20 ms.
    pub fn deci_ms(self) -> u32 {
        u32::from(self.0) * 25
    }

    /// Whether this frame size is legal for `mode`: 40/60 ms
    /// are SILK/Hybrid only; 2.5/5 ms are CELT only.
    pub fn valid_for(self, mode: CodecMode) -> bool {
        match mode {
            CodecMode::Celt => matches!(self.0, 1 | 2 | 4 | 8),
            CodecMode::Silk | CodecMode::Hybrid => matches!(self.0, 4 | 8 | 16 | 24),
        }
    }

    /// Number of 20 ms sub-blocks a SILK/Hybrid frame of this size is
    /// decoded as (40/60 ms frames are 2/3 concatenated 20 ms
    /// sub-blocks, each with its own VAD flag).
    pub fn silk_sub_blocks(self) -> usize {
        match self.0 {
            16 => 2,
            24 => 3,
            _ => 1,
        }
    }
}

/// The encoder's top-level application hint. Locked after
/// the first successful encode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Application {
    /// Tuned for interactive voice, favors SILK.
    VoIP,
    /// Tuned for general audio, favors higher quality over latency.
    Audio,
    /// Forces CELT-only, minimizes algorithmic delay.
    LowDelay,
}

/// `set_signal` hint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalHint {
    /// Let the analyzer decide.
    Auto,
    /// Bias mode/bandwidth selection toward speech.
    Voice,
    /// Bias mode/bandwidth selection toward music.
    Music,
}

/// `set_force_channels`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ForceChannels {
    /// Let the encoder decide per-frame.
    Auto,
    /// Force mono.
    Mono,
    /// Force stereo.
    Stereo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_rate_round_trips() {
        for hz in [8000, 12000, 16000, 24000, 48000] {
            assert_eq!(SamplingRate::from_hz(hz).unwrap().hz(), hz);
        }
        assert!(SamplingRate::from_hz(44100).is_err());
    }

    #[test]
    fn frame_size_samples_at_48k() {
        assert_eq!(FrameSize::MS20.samples(SamplingRate::Hz48000), 960);
        assert_eq!(FrameSize::MS10.samples(SamplingRate::Hz48000), 480);
        assert_eq!(FrameSize::MS2_5.samples(SamplingRate::Hz48000), 120);
    }

    #[test]
    fn frame_size_validity_per_mode() {
        assert!(FrameSize::MS2_5.valid_for(CodecMode::Celt));
        assert!(!FrameSize::MS2_5.valid_for(CodecMode::Silk));
        assert!(FrameSize::MS40.valid_for(CodecMode::Silk));
        assert!(!FrameSize::MS40.valid_for(CodecMode::Celt));
    }
}
