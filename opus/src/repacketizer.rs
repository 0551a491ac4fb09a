// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Merges and splits Opus packets without touching their encoded payload
//! (RFC 6716 §3.2, spec.md §4.11): concatenate several compatible packets'
//! frames into one multi-frame packet, or split a multi-frame packet back
//! into single-frame ones.
//!
//! Merging never re-encodes anything — it only repacks TOC and frame-length
//! bytes around payloads that are copied verbatim, so it's lossless and
//! cheap regardless of how many frames are involved.

use crate::error::{Error, Result};
use crate::packet::{self, Toc, MAX_FRAMES, MAX_PACKET_BYTES};
use crate::sample::SamplingRate;

/// Accumulates frames from one or more packets that share a TOC
/// configuration (mode, bandwidth, frame size, stereo-ness), then emits
/// them as a single repacked Opus packet.
///
/// Mirrors libopus's `OpusRepacketizer`: call [`Repacketizer::cat`] to feed
/// packets in presentation order, then [`Repacketizer::out`] (or
/// [`Repacketizer::out_range`] for a subset) to produce the combined
/// packet. [`Repacketizer::reset`] clears accumulated frames so the same
/// instance can be reused without reallocating.
#[derive(Default)]
pub struct Repacketizer<'a> {
    toc: Option<Toc>,
    frames: Vec<&'a [u8]>,
}

impl<'a> Repacketizer<'a> {
    /// An empty repacketizer, ready for [`Repacketizer::cat`].
    pub fn new() -> Self {
        Repacketizer { toc: None, frames: Vec::new() }
    }

    /// Drops every accumulated frame, keeping the instance's allocation.
    pub fn reset(&mut self) {
        self.toc = None;
        self.frames.clear();
    }

    /// Number of frames accumulated so far.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Appends every frame in `packet` to the accumulated set.
    ///
    /// Returns `InvalidPacket` if `packet`'s mode, bandwidth, frame size, or
    /// stereo flag disagrees with frames already accumulated — RFC 6716
    /// only allows frames with an identical TOC configuration to share a
    /// packet — or if the combined frame count would exceed
    /// [`MAX_FRAMES`].
    pub fn cat(&mut self, packet: &'a [u8]) -> Result<()> {
        let parsed = packet::parse_packet(packet, false)?;
        match self.toc {
            Some(existing) if !configs_match(existing, parsed.toc) => {
                return Err(Error::InvalidPacket("repacketizer: incompatible TOC configuration"));
            }
            Some(_) => {}
            None => self.toc = Some(parsed.toc),
        }
        if self.frames.len() + parsed.frames.len() > MAX_FRAMES {
            return Err(Error::InvalidPacket("repacketizer: combined frame count exceeds 48"));
        }
        self.frames.extend(parsed.frames.iter().map(|f| f.data));
        Ok(())
    }

    /// Emits every accumulated frame as one packet, appended to `out`.
    /// Returns the number of bytes written.
    pub fn out(&self, out: &mut Vec<u8>) -> Result<usize> {
        self.out_range(0, self.frames.len(), out)
    }

    /// Emits accumulated frames `[begin, end)` as one packet, appended to
    /// `out`. Returns the number of bytes written.
    ///
    /// Picks the frame-count code the same way libopus's repacketizer
    /// does: a single frame uses code 0, two equal-length frames use code
    /// 1, two unequal-length frames use code 2, and three or more frames
    /// always use code 3 (CBR if every frame shares a length, VBR
    /// otherwise).
    pub fn out_range(&self, begin: usize, end: usize, out: &mut Vec<u8>) -> Result<usize> {
        let toc = self.toc.ok_or(Error::InvalidPacket("repacketizer: no frames accumulated"))?;
        if begin > end || end > self.frames.len() {
            return Err(Error::BadArgument("repacketizer: frame range out of bounds"));
        }
        let frames = &self.frames[begin..end];
        if frames.is_empty() {
            return Err(Error::BadArgument("repacketizer: empty frame range"));
        }
        for f in frames {
            if f.len() > MAX_PACKET_BYTES {
                return Err(Error::InvalidPacket("repacketizer: frame exceeds 1275 bytes"));
            }
        }
        let frame_samples = toc.frame_size().samples(SamplingRate::Hz48000);
        if frame_samples * frames.len() > 5760 {
            return Err(Error::InvalidPacket("repacketizer: combined duration exceeds 120 ms"));
        }

        let start = out.len();
        let equal_len = frames.iter().all(|f| f.len() == frames[0].len());

        match frames.len() {
            1 => {
                out.push(toc.to_byte() & !0x03);
                out.extend_from_slice(frames[0]);
            }
            2 if equal_len => {
                out.push((toc.to_byte() & !0x03) | 0x01);
                out.extend_from_slice(frames[0]);
                out.extend_from_slice(frames[1]);
            }
            2 => {
                out.push((toc.to_byte() & !0x03) | 0x02);
                packet::write_size(frames[0].len(), out)?;
                out.extend_from_slice(frames[0]);
                out.extend_from_slice(frames[1]);
            }
            n => {
                out.push((toc.to_byte() & !0x03) | 0x03);
                let count_byte = (n as u8) | if equal_len { 0 } else { 0x80 };
                out.push(count_byte);
                if !equal_len {
                    for f in &frames[..n - 1] {
                        packet::write_size(f.len(), out)?;
                    }
                }
                for f in frames {
                    out.extend_from_slice(f);
                }
            }
        }
        Ok(out.len() - start)
    }
}

/// Whether two TOCs share every field a repacketizer must preserve across
/// the packets it merges.
fn configs_match(a: Toc, b: Toc) -> bool {
    a.mode() == b.mode() && a.bandwidth() == b.bandwidth() && a.frame_size() == b.frame_size() && a.stereo() == b.stereo()
}

/// Splits `packet` into one single-frame (code 0) packet per contained
/// frame, each carrying the original TOC configuration.
pub fn split(packet: &[u8]) -> Result<Vec<Vec<u8>>> {
    let parsed = packet::parse_packet(packet, false)?;
    let toc_byte = parsed.toc.to_byte() & !0x03;
    Ok(parsed
        .frames
        .iter()
        .map(|f| {
            let mut p = Vec::with_capacity(1 + f.data.len());
            p.push(toc_byte);
            p.extend_from_slice(f.data);
            p
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Bandwidth, CodecMode, FrameSize};

    fn code0_packet(payload: &[u8]) -> Vec<u8> {
        let toc = Toc::build(CodecMode::Celt, Bandwidth::Fullband, FrameSize::MS2_5, false, 0).unwrap();
        let mut p = vec![toc.to_byte()];
        p.extend_from_slice(payload);
        p
    }

    #[test]
    fn single_packet_passes_through_as_code0() {
        let packet = code0_packet(&[1, 2, 3]);
        let mut rp = Repacketizer::new();
        rp.cat(&packet).unwrap();
        let mut out = Vec::new();
        rp.out(&mut out).unwrap();
        assert_eq!(out, packet);
    }

    #[test]
    fn two_equal_length_frames_merge_to_code1() {
        let a = code0_packet(&[1, 2]);
        let b = code0_packet(&[3, 4]);
        let mut rp = Repacketizer::new();
        rp.cat(&a).unwrap();
        rp.cat(&b).unwrap();
        let mut out = Vec::new();
        rp.out(&mut out).unwrap();
        assert_eq!(out[0] & 0x03, 1);
        assert_eq!(&out[1..], &[1, 2, 3, 4]);
    }

    #[test]
    fn two_unequal_length_frames_merge_to_code2() {
        let a = code0_packet(&[1, 2]);
        let b = code0_packet(&[3, 4, 5]);
        let mut rp = Repacketizer::new();
        rp.cat(&a).unwrap();
        rp.cat(&b).unwrap();
        let mut out = Vec::new();
        rp.out(&mut out).unwrap();
        assert_eq!(out[0] & 0x03, 2);
    }

    #[test]
    fn three_or_more_frames_merge_to_code3() {
        let mut rp = Repacketizer::new();
        for payload in [&[1u8, 1][..], &[2, 2], &[3, 3]] {
            let packet = code0_packet(payload);
            rp.cat(&packet).unwrap();
        }
        let mut out = Vec::new();
        rp.out(&mut out).unwrap();
        assert_eq!(out[0] & 0x03, 3);
        assert_eq!(out[1] & 0x3F, 3);
        assert_eq!(out[1] & 0x80, 0); // equal-length frames stay CBR
    }

    #[test]
    fn incompatible_toc_is_rejected() {
        let celt = code0_packet(&[1, 2]);
        let silk_toc = Toc::build(CodecMode::Silk, Bandwidth::Wideband, FrameSize::MS20, false, 0).unwrap();
        let mut silk = vec![silk_toc.to_byte()];
        silk.extend_from_slice(&[9, 9]);

        let mut rp = Repacketizer::new();
        rp.cat(&celt).unwrap();
        assert!(rp.cat(&silk).is_err());
    }

    #[test]
    fn split_inverts_a_merged_code3_packet() {
        let frames: Vec<Vec<u8>> = vec![vec![1, 1], vec![2, 2], vec![3, 3]];
        let mut rp = Repacketizer::new();
        for f in &frames {
            let packet = code0_packet(f);
            rp.cat(&packet).unwrap();
        }
        let mut merged = Vec::new();
        rp.out(&mut merged).unwrap();

        let parts = split(&merged).unwrap();
        assert_eq!(parts.len(), 3);
        for (part, original) in parts.iter().zip(frames.iter()) {
            assert_eq!(&part[1..], original.as_slice());
        }
    }

    #[test]
    fn out_range_emits_a_frame_subset() {
        let mut rp = Repacketizer::new();
        for payload in [&[1u8][..], &[2], &[3], &[4]] {
            let packet = code0_packet(payload);
            rp.cat(&packet).unwrap();
        }
        let mut out = Vec::new();
        rp.out_range(1, 3, &mut out).unwrap();
        assert_eq!(out[0] & 0x03, 1); // two frames -> code 1
        assert_eq!(&out[1..], &[2, 3]);
    }
}
