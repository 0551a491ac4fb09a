// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A pure, self-contained implementation of the Opus audio codec (RFC
//! 6716): the SILK, CELT, and Hybrid coders, the top-level encoder/decoder
//! control surface, multistream framing, the repacketizer, and packet loss
//! concealment.
//!
//! Containers (Ogg, WebM), file IO, and audio device capture/playback are
//! out of scope — this crate only turns PCM in and out of Opus packets.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod analysis;
pub mod celt;
pub mod control;
pub mod error;
pub mod hybrid;
pub mod multistream;
pub mod packet;
pub mod plc;
pub mod repacketizer;
pub mod resample;
pub mod sample;
pub mod silk;

mod decoder;
mod encoder;

pub use control::{DecoderConfig, EncoderConfig};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use sample::{
    Application, Bandwidth, Channels, CodecMode, ForceChannels, FrameSize, Sample, SamplingRate,
    SignalHint,
};
