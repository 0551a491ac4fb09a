// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The public error type.

use thiserror::Error;

/// Errors returned by the encoder, decoder, multistream, and repacketizer
/// surfaces.
///
/// Policy: local recovery is used only for packet loss
/// concealment — an absent or malformed packet handed to the decoder never
/// produces an `Err`, it produces concealed audio. Every other structural
/// problem (malformed TOC, range-coder overflow, multistream length
/// mismatches) surfaces here with the offending frame discarded, and the
/// encoder never partial-writes: a frame that would overflow the caller's
/// buffer returns `BufferTooSmall` without mutating encoder state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A caller-supplied argument was out of range or otherwise invalid.
    #[error("bad argument: {0}")]
    BadArgument(&'static str),
    /// The caller's output buffer was too small to hold the result.
    #[error("buffer too small")]
    BufferTooSmall,
    /// The packet's TOC byte or frame framing was malformed.
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),
    /// `set_max_bandwidth` (or a packet's implied bandwidth) was invalid.
    #[error("invalid bandwidth")]
    InvalidBandwidth,
    /// `set_signal` received a value outside `{Auto, Voice, Music}`.
    #[error("invalid signal hint")]
    InvalidSignal,
    /// A channel count fell outside `1..=255` or didn't match configuration.
    #[error("invalid channel count")]
    InvalidChannels,
    /// A multistream `streams`/`coupled_streams` pair was invalid.
    #[error("invalid stream count")]
    InvalidStreams,
    /// A multistream channel mapping entry was out of range or internally
    /// inconsistent.
    #[error("invalid channel mapping")]
    InvalidMapping,
    /// The range decoder detected corrupted or truncated arithmetic-coded
    /// data.
    #[error("range decode error: {0}")]
    RangeDecodeError(&'static str),
    /// A fixed-size working buffer could not be sized at construction.
    #[error("allocation failure: {0}")]
    AllocFailure(&'static str),
    /// An invariant that should never be violated by well-formed input was
    /// violated; indicates a bug in this crate rather than bad input.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(&'static str),
}

impl From<opus_core::Error> for Error {
    fn from(err: opus_core::Error) -> Self {
        match err {
            opus_core::Error::RangeDecode(msg) => Error::RangeDecodeError(msg),
            opus_core::Error::UnexpectedEof => Error::InvalidPacket("unexpected end of packet"),
            opus_core::Error::RegionOverlap => {
                Error::RangeDecodeError("raw bit region overlaps range-coded region")
            }
        }
    }
}

/// The `Result` alias used throughout `opus`.
pub type Result<T> = core::result::Result<T, Error>;
