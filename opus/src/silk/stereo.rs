// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mid/side stereo prediction (RFC 6716 §4.2.7.2): two Q13 predictor
//! weights per frame, interpolated sample-by-sample across the first 8 ms
//! and held steady after that, mix mid+side into left/right.

use super::tables;
use opus_core::{RangeDecoder, RangeEncoder};
use opus_core::Result;

/// Number of samples over which the weight ramps from its previous value
/// to the current frame's value (8 ms at 16 kHz, SILK's hybrid-locked
/// internal rate; scaled by rate elsewhere for NB/MB).
pub const INTERP_SAMPLES_16K: usize = 128;

/// Two Q13 mid/side predictor weights for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct StereoWeights {
    pub w0_q13: i32,
    pub w1_q13: i32,
}

/// Decodes the joint stereo predictor index plus two uniform refinement
/// bits into a pair of weights (RFC 6716 §4.2.7.2.1).
pub fn decode_weights(dec: &mut RangeDecoder<'_>) -> StereoWeights {
    let idx0 = dec.decode_icdf(&tables::STEREO_WEIGHT_ICDF, 8) as usize;
    let idx1 = dec.decode_icdf(&tables::STEREO_WEIGHT_ICDF, 8) as usize;
    let refine0 = dec.decode_uint(4) as i32 - 2;
    let refine1 = dec.decode_uint(4) as i32 - 2;
    StereoWeights {
        w0_q13: tables::STEREO_WEIGHT_TABLE[idx0.min(tables::STEREO_WEIGHT_TABLE.len() - 1)] + refine0,
        w1_q13: tables::STEREO_WEIGHT_TABLE[idx1.min(tables::STEREO_WEIGHT_TABLE.len() - 1)] + refine1,
    }
}

pub fn encode_weights(enc: &mut RangeEncoder<'_>, weights: StereoWeights) -> Result<()> {
    let (idx0, refine0) = nearest_weight(weights.w0_q13);
    let (idx1, refine1) = nearest_weight(weights.w1_q13);
    enc.encode_icdf(idx0, &tables::STEREO_WEIGHT_ICDF, 8)?;
    enc.encode_icdf(idx1, &tables::STEREO_WEIGHT_ICDF, 8)?;
    enc.encode_uint((refine0 + 2) as u32, 4)?;
    enc.encode_uint((refine1 + 2) as u32, 4)
}

fn nearest_weight(w_q13: i32) -> (usize, i32) {
    let table = &*tables::STEREO_WEIGHT_TABLE;
    let (idx, &base) =
        table.iter().enumerate().min_by_key(|(_, &v)| (v - w_q13).abs()).expect("stereo weight table is non-empty");
    ((idx, (w_q13 - base).clamp(-2, 2)))
}

/// Mixes a mid/side sample pair into left/right, ramping `weights` in from
/// `prev_weights` across the first `interp_samples` of the frame and
/// holding steady after that (RFC 6716 §4.2.7.2.2's sample-wise
/// interpolation).
pub fn mix_to_lr(mid: i32, side: i32, sample_idx: usize, prev: StereoWeights, current: StereoWeights, interp_samples: usize) -> (i32, i32) {
    let t = sample_idx.min(interp_samples) as i64;
    let denom = interp_samples.max(1) as i64;
    let w0 = prev.w0_q13 as i64 + (current.w0_q13 as i64 - prev.w0_q13 as i64) * t / denom;
    let w1 = prev.w1_q13 as i64 + (current.w1_q13 as i64 - prev.w1_q13 as i64) * t / denom;

    let mid64 = i64::from(mid);
    let side64 = i64::from(side);
    // Predict side from mid using w0, reconstruct the true side sample,
    // then form left/right the standard way: L = mid + side, R = mid -
    // side (both still carrying the prediction removed by w1).
    let predicted_side = (w0 * mid64) >> 13;
    let side_recon = side64 + predicted_side;
    let mid_adjust = (w1 * side_recon) >> 13;
    let left = mid64 + mid_adjust + side_recon;
    let right = mid64 + mid_adjust - side_recon;
    (left as i32, right as i32)
}

/// Inverse of [`mix_to_lr`]: given left/right, recovers (mid, side).
pub fn split_from_lr(left: i32, right: i32, sample_idx: usize, prev: StereoWeights, current: StereoWeights, interp_samples: usize) -> (i32, i32) {
    let t = sample_idx.min(interp_samples) as i64;
    let denom = interp_samples.max(1) as i64;
    let w0 = prev.w0_q13 as i64 + (current.w0_q13 as i64 - prev.w0_q13 as i64) * t / denom;
    let w1 = prev.w1_q13 as i64 + (current.w1_q13 as i64 - prev.w1_q13 as i64) * t / denom;

    let left64 = i64::from(left);
    let right64 = i64::from(right);
    let sum = left64 + right64;
    let diff = left64 - right64;
    // mix_to_lr forms `left = mid + mid_adjust + side_recon`,
    // `right = mid + mid_adjust - side_recon`, so `diff = 2*side_recon`
    // exactly regardless of the weights; `sum` carries the weighted
    // cross-term, solved for `mid` by substitution.
    let side_recon = diff / 2;
    let mid_adjust = (w1 * side_recon) >> 13;
    let mid = sum / 2 - mid_adjust;
    let side = side_recon - ((w0 * mid) >> 13);
    (mid as i32, side as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_round_trips_through_codebook_plus_refinement() {
        let w = StereoWeights { w0_q13: 1201, w1_q13: -4799 };
        let mut buf = vec![0u8; 64];
        let mut enc = RangeEncoder::new(&mut buf);
        encode_weights(&mut enc, w).unwrap();
        let len = enc.finish().unwrap();
        let mut dec = RangeDecoder::new(&buf[..len]);
        let decoded = decode_weights(&mut dec);
        assert!((decoded.w0_q13 - w.w0_q13).abs() <= 2);
        assert!((decoded.w1_q13 - w.w1_q13).abs() <= 2);
    }

    #[test]
    fn zero_weights_mix_is_plain_mid_side() {
        let weights = StereoWeights::default();
        let (l, r) = mix_to_lr(1000, 200, 0, weights, weights, 0);
        assert_eq!(l, 1200);
        assert_eq!(r, 800);
    }
}
