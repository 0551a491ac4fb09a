// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The CELT transform coder (RFC 6716 §4.3): band energy coarse/fine/final,
//! PVQ shape quantization, transient/TF analysis, MDCT synthesis, and
//! prefilter/postfilter, driven at a fixed 48 kHz internal rate.
//!
//! CELT always runs at 48 kHz internally; the frame size in samples is
//! `120 << LM` where `LM` (0..=3) selects 2.5/5/10/20 ms. Short frames
//! (`LM > 0` when the transient flag is set) split into `1 << LM`
//! interleaved short MDCT blocks of length `120`.

pub mod bands;
pub mod bitalloc;
pub mod decoder;
pub mod encoder;
pub mod mdct;
pub mod pvq;
pub mod tables;

/// Number of perceptual bands CELT divides the spectrum into (RFC 6716
/// §4.3's fixed 21-band split).
pub const NUM_BANDS: usize = 21;
/// Largest supported `LM` (log2 of short blocks per long block): `LM == 3`
/// means a 20 ms frame, the longest CELT supports.
pub const MAX_LM: usize = 3;
/// CELT's fixed internal sample rate.
pub const INTERNAL_RATE_HZ: u32 = 48_000;

/// Frame length in samples (pre-overlap) for a given `LM`.
pub fn frame_size(lm: usize) -> usize {
    120 << lm
}

/// Number of short MDCT blocks a transient frame at this `LM` splits into.
/// Always `1` for non-transient (long-block) frames.
pub fn short_blocks(lm: usize, transient: bool) -> usize {
    if transient {
        1 << lm
    } else {
        1
    }
}

use crate::sample::Bandwidth;

/// The highest CELT band index (exclusive) active for a given bandwidth;
/// narrower bandwidths simply stop allocating bits past this point; the
/// bands themselves are still defined (so hybrid's band-17 crossover works
/// uniformly regardless of outer bandwidth).
pub fn end_band(bandwidth: Bandwidth) -> usize {
    match bandwidth {
        Bandwidth::Narrowband => 13,
        Bandwidth::Mediumband => 15,
        Bandwidth::Wideband => 17,
        Bandwidth::Superwideband => 19,
        Bandwidth::Fullband => NUM_BANDS,
    }
}

/// Band index 17, where hybrid mode hands off from SILK's low bands to
/// CELT's high bands (RFC 6716 §4.7).
pub const HYBRID_CROSSOVER_BAND: usize = 17;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_doubles_per_lm() {
        assert_eq!(frame_size(0), 120);
        assert_eq!(frame_size(3), 960);
    }

    #[test]
    fn end_band_grows_with_bandwidth() {
        assert!(end_band(Bandwidth::Narrowband) < end_band(Bandwidth::Fullband));
        assert_eq!(end_band(Bandwidth::Fullband), NUM_BANDS);
    }
}
