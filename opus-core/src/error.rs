// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The shared low-level error type.
//!
//! Everything below the top-level `opus::Error` (range coding, bitstream
//! exhaustion) funnels through here so that SILK, CELT, and the range coder
//! itself agree on one vocabulary.

use thiserror::Error;

/// Errors produced by the primitives in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The range decoder's renormalization would read past the end of the
    /// payload and the remaining bits were not all-ones padding, or an
    /// encoded symbol would overflow the range.
    #[error("range coder: {0}")]
    RangeDecode(&'static str),
    /// A raw-bit read or write ran past the buffer boundary reserved for it.
    #[error("bitstream: unexpected end of buffer")]
    UnexpectedEof,
    /// The raw-bit tail cursor and the arithmetic-coded forward cursor
    /// overlapped at finalization.
    #[error("bitstream: raw bit region overlaps range-coded region")]
    RegionOverlap,
}

/// The `Result` alias used throughout `opus-core`.
pub type Result<T> = core::result::Result<T, Error>;
