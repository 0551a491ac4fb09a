// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packet Table-Of-Contents parsing and framing (RFC 6716 §3 and Appendix B).
//!
//! Covers the four frame-count codes of a standalone packet plus the
//! self-delimited framing variant multistream packets use for every
//! stream but the last.

use crate::error::{Error, Result};
use crate::sample::{Bandwidth, Channels, CodecMode, FrameSize, SamplingRate, TOC_BANDWIDTH_TABLE};

/// The maximum number of frames a single packet may contain (RFC 6716 §3.2.5:
/// a code-3 packet's frame count is limited to 48).
pub const MAX_FRAMES: usize = 48;
/// The maximum size, in bytes, of a single stream's payload within a packet.
pub const MAX_PACKET_BYTES: usize = 1275;

/// A decoded Table-Of-Contents byte (RFC 6716 §3.1): `[5-bit config][1-bit
/// stereo][2-bit code]`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Toc {
    config: u8,
    stereo: bool,
    code: u8,
}

impl Toc {
    /// Decodes the TOC byte at the head of a packet.
    pub fn from_byte(byte: u8) -> Self {
        Toc { config: (byte >> 3) & 0x1F, stereo: byte & 0x04 != 0, code: byte & 0x03 }
    }

    /// Builds a TOC byte selecting `mode`/`bandwidth`/`frame_size`.
    ///
    /// Returns `InvalidBandwidth` if `frame_size` isn't legal for `mode`,
    /// since the config-number table has no representation for it.
    pub fn build(mode: CodecMode, bandwidth: Bandwidth, frame_size: FrameSize, stereo: bool, code: u8) -> Result<Self> {
        let config = config_number(mode, bandwidth, frame_size)?;
        Ok(Toc { config, stereo, code: code & 0x03 })
    }

    /// Re-encodes as a single TOC byte.
    pub fn to_byte(self) -> u8 {
        (self.config << 3) | (u8::from(self.stereo) << 2) | self.code
    }

    /// The 5-bit config number, `0..32`.
    pub fn config(self) -> u8 {
        self.config
    }

    /// Whether the packet carries two interleaved channels.
    pub fn stereo(self) -> bool {
        self.stereo
    }

    /// Raw 2-bit frame-count code.
    pub fn code(self) -> u8 {
        self.code
    }

    /// The bandwidth implied by the config number (RFC 6716 §3.1 Table 2).
    pub fn bandwidth(self) -> Bandwidth {
        TOC_BANDWIDTH_TABLE[self.config as usize]
    }

    /// Which coder produced this config.
    pub fn mode(self) -> CodecMode {
        if self.config < 12 {
            CodecMode::Silk
        } else if self.config < 16 {
            CodecMode::Hybrid
        } else {
            CodecMode::Celt
        }
    }

    /// The frame size this config implies, in units of 2.5 ms.
    pub fn frame_size(self) -> FrameSize {
        FrameSize(frame_size_units(self.config))
    }

    /// Output channel count.
    pub fn channels(self) -> Channels {
        if self.stereo {
            Channels::Stereo
        } else {
            Channels::Mono
        }
    }
}

/// Inverts [`Toc::frame_size`] / [`Toc::mode`] / [`Toc::bandwidth`]: given the
/// three, returns the 5-bit config number, or `InvalidBandwidth` if the
/// combination has no TOC representation.
fn config_number(mode: CodecMode, bandwidth: Bandwidth, frame_size: FrameSize) -> Result<u8> {
    if !frame_size.valid_for(mode) {
        return Err(Error::InvalidBandwidth);
    }
    match mode {
        CodecMode::Silk => {
            let band_idx = match bandwidth {
                Bandwidth::Narrowband => 0u8,
                Bandwidth::Mediumband => 1,
                Bandwidth::Wideband => 2,
                _ => return Err(Error::InvalidBandwidth),
            };
            let size_idx = match frame_size.0 {
                4 => 0u8,
                8 => 1,
                16 => 2,
                24 => 3,
                _ => return Err(Error::InvalidBandwidth),
            };
            Ok(band_idx * 4 + size_idx)
        }
        CodecMode::Hybrid => {
            let band_idx = match bandwidth {
                Bandwidth::Superwideband => 0u8,
                Bandwidth::Fullband => 1,
                _ => return Err(Error::InvalidBandwidth),
            };
            let size_idx = match frame_size.0 {
                4 => 0u8,
                8 => 1,
                _ => return Err(Error::InvalidBandwidth),
            };
            Ok(12 + band_idx * 2 + size_idx)
        }
        CodecMode::Celt => {
            let band_idx = match bandwidth {
                Bandwidth::Narrowband => 0u8,
                Bandwidth::Wideband => 1,
                Bandwidth::Superwideband => 2,
                Bandwidth::Fullband => 3,
                _ => return Err(Error::InvalidBandwidth),
            };
            let size_idx = match frame_size.0 {
                1 => 0u8,
                2 => 1,
                4 => 2,
                8 => 3,
                _ => return Err(Error::InvalidBandwidth),
            };
            Ok(16 + band_idx * 4 + size_idx)
        }
    }
}

fn frame_size_units(config: u8) -> u8 {
    if config < 12 {
        // SILK: groups of 4 configs share {10, 20, 40, 60} ms.
        [4u8, 8, 16, 24][(config % 4) as usize]
    } else if config < 16 {
        // Hybrid: groups of 2 configs share {10, 20} ms.
        [4u8, 8][(config % 2) as usize]
    } else {
        // CELT: groups of 4 configs share {2.5, 5, 10, 20} ms.
        [1u8, 2, 4, 8][(config % 4) as usize]
    }
}

/// Number of PCM samples a single frame of `packet` holds at `rate`.
pub fn samples_per_frame(packet: &[u8], rate: SamplingRate) -> usize {
    Toc::from_byte(packet[0]).frame_size().samples(rate)
}

/// Number of frames a packet's frame-count code implies, without needing to
/// know their individual sizes (RFC 6716 §3.2.5).
pub fn frame_count(packet: &[u8]) -> Result<usize> {
    if packet.is_empty() {
        return Err(Error::InvalidPacket("empty packet"));
    }
    match packet[0] & 0x03 {
        0 => Ok(1),
        1 | 2 => Ok(2),
        _ => {
            if packet.len() < 2 {
                Err(Error::InvalidPacket("code-3 packet missing count byte"))
            } else {
                let count = (packet[1] & 0x3F) as usize;
                if count == 0 || count > MAX_FRAMES {
                    Err(Error::InvalidPacket("code-3 frame count out of range"))
                } else {
                    Ok(count)
                }
            }
        }
    }
}

/// Total PCM sample count across every frame in `packet`, rejecting packets
/// whose implied duration exceeds 120 ms (RFC 6716 §3.2.5).
pub fn sample_count(packet: &[u8], rate: SamplingRate) -> Result<usize> {
    let frames = frame_count(packet)?;
    let per_frame = samples_per_frame(packet, rate);
    let total = frames * per_frame;
    // 120 ms at `rate` Hz; cross-multiplied to avoid a fractional comparison
    // (total*25 > rate*3  <=>  total/rate > 0.12 s).
    if (total as u64) * 25 > u64::from(rate.hz()) * 3 {
        Err(Error::InvalidPacket("packet duration exceeds 120 ms"))
    } else {
        Ok(total)
    }
}

/// One elementary frame's worth of payload, borrowed from the packet it was
/// parsed out of.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub data: &'a [u8],
}

/// The result of parsing a (possibly self-delimited) Opus packet into its
/// constituent frames.
#[derive(Clone, Debug)]
pub struct ParsedPacket<'a> {
    pub toc: Toc,
    pub frames: Vec<Frame<'a>>,
    /// Bytes of code-3 padding consumed (always `0` for codes 0-2).
    pub padding: usize,
}

/// Reads a variable-length frame-size field (RFC 6716 §3.2.1): `0..=251` in
/// one byte, `252..=1275` as `4*b1 + b0` across two bytes. Returns the
/// decoded size and the number of bytes the field itself occupied.
fn parse_size(data: &[u8]) -> Result<(usize, usize)> {
    let b0 = *data.first().ok_or(Error::InvalidPacket("truncated size field"))?;
    if b0 < 252 {
        Ok((b0 as usize, 1))
    } else {
        let b1 = *data.get(1).ok_or(Error::InvalidPacket("truncated size field"))?;
        Ok((4 * usize::from(b1) + usize::from(b0), 2))
    }
}

/// Parses `packet` into its TOC and constituent frames.
///
/// `self_delimited` follows RFC 6716 Appendix B: when true, every frame
/// (including the last) carries an explicit length prefix, which is how all
/// but the final stream of a multistream packet are framed.
pub fn parse_packet(packet: &[u8], self_delimited: bool) -> Result<ParsedPacket<'_>> {
    if packet.is_empty() {
        return Err(Error::InvalidPacket("empty packet"));
    }
    let toc = Toc::from_byte(packet[0]);
    let mut offset = 1usize;
    let mut len = packet.len() - offset;
    let mut sizes = [0usize; MAX_FRAMES];
    let mut last_size = len;
    let mut cbr = false;
    let mut padding = 0usize;
    let count;

    match toc.code() {
        0 => count = 1,
        1 => {
            count = 2;
            cbr = true;
            if !self_delimited {
                if len & 1 != 0 {
                    return Err(Error::InvalidPacket("code-1 packet has odd payload length"));
                }
                last_size = len / 2;
                sizes[0] = last_size;
            }
        }
        2 => {
            count = 2;
            let (size0, used) = parse_size(&packet[offset..])?;
            len = len.checked_sub(used).ok_or(Error::InvalidPacket("truncated code-2 packet"))?;
            if size0 > len {
                return Err(Error::InvalidPacket("code-2 first frame exceeds packet"));
            }
            sizes[0] = size0;
            offset += used;
            last_size = len - size0;
        }
        3 => {
            if len < 1 {
                return Err(Error::InvalidPacket("code-3 packet missing count byte"));
            }
            let ch = packet[offset];
            offset += 1;
            len -= 1;
            count = (ch & 0x3F) as usize;
            if count == 0 || count > MAX_FRAMES {
                return Err(Error::InvalidPacket("code-3 frame count out of range"));
            }
            let frame_samples = toc.frame_size().samples(SamplingRate::Hz48000);
            if frame_samples * count > 5760 {
                return Err(Error::InvalidPacket("code-3 packet exceeds 120 ms"));
            }

            // Padding flag is bit 6.
            if ch & 0x40 != 0 {
                loop {
                    let p = *packet.get(offset).ok_or(Error::InvalidPacket("truncated padding"))?;
                    offset += 1;
                    len = len.checked_sub(1).ok_or(Error::InvalidPacket("truncated padding"))?;
                    let chunk = if p == 255 { 254 } else { usize::from(p) };
                    len = len.checked_sub(chunk).ok_or(Error::InvalidPacket("padding exceeds packet"))?;
                    padding += chunk;
                    if p != 255 {
                        break;
                    }
                }
            }

            cbr = ch & 0x80 == 0;
            if !cbr {
                last_size = len;
                for i in 0..count - 1 {
                    let (size, used) = parse_size(&packet[offset..])?;
                    len = len.checked_sub(used).ok_or(Error::InvalidPacket("truncated VBR size"))?;
                    if size > len {
                        return Err(Error::InvalidPacket("VBR frame exceeds packet"));
                    }
                    sizes[i] = size;
                    offset += used;
                    last_size = last_size.checked_sub(used + size).ok_or(Error::InvalidPacket("VBR sizes exceed packet"))?;
                }
            } else if !self_delimited {
                last_size = len / count;
                if last_size * count != len {
                    return Err(Error::InvalidPacket("code-3 CBR packet not evenly divisible"));
                }
                for s in sizes.iter_mut().take(count - 1) {
                    *s = last_size;
                }
            }
        }
        _ => unreachable!("code is masked to 2 bits"),
    }

    if self_delimited {
        let (size, used) = parse_size(&packet[offset..])?;
        len = len.checked_sub(used).ok_or(Error::InvalidPacket("truncated self-delimited size"))?;
        if size > len {
            return Err(Error::InvalidPacket("self-delimited last frame exceeds packet"));
        }
        sizes[count - 1] = size;
        offset += used;
        if cbr {
            if sizes[count - 1] * count > len {
                return Err(Error::InvalidPacket("self-delimited CBR sizes exceed packet"));
            }
            for i in 0..count - 1 {
                sizes[i] = sizes[count - 1];
            }
        } else if used + sizes[count - 1] > last_size {
            return Err(Error::InvalidPacket("self-delimited VBR sizes exceed packet"));
        }
    } else {
        if last_size > MAX_PACKET_BYTES {
            return Err(Error::InvalidPacket("frame exceeds 1275 bytes"));
        }
        sizes[count - 1] = last_size;
    }

    let mut frames = Vec::with_capacity(count);
    for &size in sizes.iter().take(count) {
        if offset + size > packet.len() {
            return Err(Error::InvalidPacket("frame runs past end of packet"));
        }
        frames.push(Frame { data: &packet[offset..offset + size] });
        offset += size;
    }

    Ok(ParsedPacket { toc, frames, padding })
}

/// Converts a standard single-frame (code 0) packet into self-delimited
/// form (RFC 6716 Appendix B): identical TOC, but with the frame's length
/// — implicit in standard framing, since a code-0 frame simply fills the
/// rest of the packet — made explicit via a size field right after the
/// TOC byte. Used to frame every stream but the last in a multistream
/// packet, whose per-stream encoders always emit single-frame packets.
pub fn to_self_delimited(packet: &[u8]) -> Result<Vec<u8>> {
    let parsed = parse_packet(packet, false)?;
    if parsed.toc.code() != 0 {
        return Err(Error::InvalidPacket("self-delimited conversion only supports single-frame packets"));
    }
    let mut out = vec![parsed.toc.to_byte()];
    write_size(parsed.frames[0].data.len(), &mut out)?;
    out.extend_from_slice(parsed.frames[0].data);
    Ok(out)
}

/// Length, in bytes, of the self-delimited packet occupying the front of
/// `data` (RFC 6716 Appendix B). Used by multistream framing to find where
/// one stream's packet ends and the next begins without re-parsing frame
/// contents.
pub fn self_delimited_packet_len(data: &[u8]) -> Result<usize> {
    let parsed = parse_packet(data, true)?;
    let last = parsed.frames.last().ok_or(Error::InvalidPacket("self-delimited packet has no frames"))?;
    let base = data.as_ptr() as usize;
    let end = last.data.as_ptr() as usize - base + last.data.len();
    Ok(end)
}

/// Splits a self-delimited frame off the front of `buf` (RFC 6716 Appendix
/// B): a length prefix followed by that many bytes of frame payload.
/// Returns the frame slice and the total bytes consumed (prefix + payload).
pub fn split_self_delimited_frame(buf: &[u8]) -> Result<(&[u8], usize)> {
    let (size, used) = parse_size(buf)?;
    if used + size > buf.len() {
        return Err(Error::InvalidPacket("self-delimited frame exceeds buffer"));
    }
    Ok((&buf[used..used + size], used + size))
}

/// Encodes a variable-length size field the way [`parse_size`] decodes it.
pub fn write_size(size: usize, out: &mut Vec<u8>) -> Result<()> {
    if size > MAX_PACKET_BYTES {
        return Err(Error::InvalidPacket("frame size exceeds 1275 bytes"));
    }
    if size < 252 {
        out.push(size as u8);
    } else {
        let size = size - 252;
        out.push(252 + (size & 0x3) as u8);
        out.push((size >> 2) as u8);
    }
    Ok(())
}

/// Grows `packet` to exactly `new_len` bytes by adding (or extending)
/// code-3 padding, converting the packet to code 3 first if it wasn't
/// already. `new_len` must be at least as large as `packet`'s own code-3
/// representation with zero padding bytes requested.
pub fn pad(packet: &[u8], new_len: usize) -> Result<Vec<u8>> {
    if new_len < packet.len() {
        return Err(Error::BadArgument("pad target is shorter than the packet"));
    }
    let parsed = parse_packet(packet, false)?;
    let toc = parsed.toc;
    let frame_count = parsed.frames.len();
    let vbr = parsed.frames.iter().any(|f| f.data.len() != parsed.frames[0].data.len()) || toc.code() == 2;

    let mut unpadded = Vec::with_capacity(packet.len() + 4);
    unpadded.push(toc.to_byte() | 0x03);
    let count_byte = (frame_count as u8 & 0x3F) | if vbr { 0x80 } else { 0 };
    unpadded.push(count_byte);
    if vbr {
        for f in &parsed.frames[..frame_count - 1] {
            write_size(f.data.len(), &mut unpadded)?;
        }
    }
    for f in &parsed.frames {
        unpadded.extend_from_slice(f.data);
    }

    if new_len == unpadded.len() {
        return Ok(unpadded);
    }
    if new_len < unpadded.len() {
        return Err(Error::BadArgument("pad target too short to hold the frames"));
    }

    // RFC 6716 §3.2.4: a run of `k` bytes valued 255 each contribute 254
    // bytes of padding beyond themselves, and a final byte valued `v` in
    // `0..=254` contributes `v` more. Solving
    // `remaining == 255*k + 1 + v` for the smallest `k` gives the unique
    // encoding that exactly consumes `remaining` bytes.
    let remaining = new_len - unpadded.len();
    let rem = remaining - 1;
    let k = rem / 255;
    let v = rem % 255;

    unpadded[1] |= 0x40;
    let mut out = Vec::with_capacity(new_len);
    out.push(unpadded[0]);
    out.push(unpadded[1]);
    for _ in 0..k {
        out.push(255);
    }
    out.push(v as u8);
    out.extend_from_slice(&unpadded[2..]);
    out.resize(new_len, 0);
    Ok(out)
}

/// Removes code-3 padding from `packet`, returning the shortest packet that
/// decodes identically.
pub fn unpad(packet: &[u8]) -> Result<Vec<u8>> {
    let parsed = parse_packet(packet, false)?;
    if parsed.toc.code() != 3 || parsed.padding == 0 {
        return Ok(packet.to_vec());
    }
    let frame_count = parsed.frames.len();
    let vbr = parsed.frames.iter().any(|f| f.data.len() != parsed.frames[0].data.len());

    let mut out = Vec::with_capacity(packet.len());
    out.push(packet[0]);
    out.push(frame_count as u8 & 0x3F | if vbr { 0x80 } else { 0 });
    if vbr {
        for f in &parsed.frames[..frame_count - 1] {
            write_size(f.data.len(), &mut out)?;
        }
    }
    for f in &parsed.frames {
        out.extend_from_slice(f.data);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Bandwidth, CodecMode, FrameSize};

    #[test]
    fn toc_round_trips_for_every_config() {
        for config in 0u8..32 {
            for stereo in [false, true] {
                for code in 0u8..4 {
                    let byte = (config << 3) | (u8::from(stereo) << 2) | code;
                    let toc = Toc::from_byte(byte);
                    assert_eq!(toc.to_byte(), byte);
                    assert_eq!(toc.config(), config);
                    assert_eq!(toc.stereo(), stereo);
                    assert_eq!(toc.code(), code);
                }
            }
        }
    }

    #[test]
    fn toc_build_inverts_mode_bandwidth_frame_size() {
        let toc = Toc::build(CodecMode::Celt, Bandwidth::Fullband, FrameSize::MS20, true, 0).unwrap();
        assert_eq!(toc.mode(), CodecMode::Celt);
        assert_eq!(toc.bandwidth(), Bandwidth::Fullband);
        assert_eq!(toc.frame_size(), FrameSize::MS20);
        assert!(toc.stereo());
    }

    #[test]
    fn code0_single_frame() {
        let mut packet = vec![0u8]; // config 0 (SILK NB 10ms), mono, code 0
        packet.extend_from_slice(&[1, 2, 3, 4]);
        let parsed = parse_packet(&packet, false).unwrap();
        assert_eq!(parsed.frames.len(), 1);
        assert_eq!(parsed.frames[0].data, &[1, 2, 3, 4]);
    }

    #[test]
    fn code1_two_equal_frames() {
        let mut packet = vec![0b0000_0001u8]; // code 1
        packet.extend_from_slice(&[1, 2, 3, 4]);
        let parsed = parse_packet(&packet, false).unwrap();
        assert_eq!(parsed.frames.len(), 2);
        assert_eq!(parsed.frames[0].data, &[1, 2]);
        assert_eq!(parsed.frames[1].data, &[3, 4]);
    }

    #[test]
    fn code2_two_vbr_frames() {
        let mut packet = vec![0b0000_0010u8]; // code 2
        packet.push(2); // first frame is 2 bytes
        packet.extend_from_slice(&[9, 9, 7, 7, 7]);
        let parsed = parse_packet(&packet, false).unwrap();
        assert_eq!(parsed.frames[0].data, &[9, 9]);
        assert_eq!(parsed.frames[1].data, &[7, 7, 7]);
    }

    #[test]
    fn code3_cbr_multi_frame() {
        let mut packet = vec![0b0000_0011u8]; // code 3
        packet.push(3); // 3 frames, no padding, CBR
        packet.extend_from_slice(&[1, 1, 2, 2, 3, 3]);
        let parsed = parse_packet(&packet, false).unwrap();
        assert_eq!(parsed.frames.len(), 3);
        for f in &parsed.frames {
            assert_eq!(f.data.len(), 2);
        }
    }

    #[test]
    fn pad_then_unpad_round_trips() {
        let mut packet = vec![0b0000_0001u8]; // code 1, two equal CBR frames
        packet.extend_from_slice(&[1, 2, 3, 4]);
        let target_len = packet.len() + 20;
        let padded = pad(&packet, target_len).unwrap();
        assert_eq!(padded.len(), target_len);

        let parsed_padded = parse_packet(&padded, false).unwrap();
        assert!(parsed_padded.padding > 0);

        let original_frames = parse_packet(&packet, false).unwrap();
        for (a, b) in original_frames.frames.iter().zip(parsed_padded.frames.iter()) {
            assert_eq!(a.data, b.data);
        }

        let unpadded = unpad(&padded).unwrap();
        let round_trip_frames = parse_packet(&unpadded, false).unwrap();
        assert_eq!(original_frames.frames.len(), round_trip_frames.frames.len());
        for (a, b) in original_frames.frames.iter().zip(round_trip_frames.frames.iter()) {
            assert_eq!(a.data, b.data);
        }
    }

    #[test]
    fn pad_to_same_length_is_a_noop_reencode() {
        let mut packet = vec![0b0000_0000u8]; // code 0, single frame
        packet.extend_from_slice(&[1, 2, 3]);
        // Code-0 up-converted to code-3 costs one extra byte (the count
        // byte); padding to exactly that size adds no actual padding bytes.
        let converted = pad(&packet, packet.len() + 1).unwrap();
        let parsed = parse_packet(&converted, false).unwrap();
        assert_eq!(parsed.padding, 0);
        assert_eq!(parsed.frames[0].data, &[1, 2, 3]);
    }

    #[test]
    fn self_delimited_frame_splits_and_reports_length() {
        let mut buf = vec![5u8]; // length prefix: 5 bytes follow
        buf.extend_from_slice(&[1, 2, 3, 4, 5, 99]);
        let (frame, used) = split_self_delimited_frame(&buf).unwrap();
        assert_eq!(frame, &[1, 2, 3, 4, 5]);
        assert_eq!(used, 6);
    }

    #[test]
    fn malformed_self_delimited_payload_is_rejected() {
        let buf = vec![200u8, 1, 2]; // claims 200 bytes but only 2 follow
        assert!(split_self_delimited_frame(&buf).is_err());
    }

    #[test]
    fn to_self_delimited_round_trips_through_parse() {
        let mut packet = vec![0b0000_0000u8]; // code 0, single frame
        packet.extend_from_slice(&[1, 2, 3, 4, 5]);
        let sd = to_self_delimited(&packet).unwrap();
        let len = self_delimited_packet_len(&sd).unwrap();
        assert_eq!(len, sd.len());
        let parsed = parse_packet(&sd, true).unwrap();
        assert_eq!(parsed.frames[0].data, &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn self_delimited_packet_len_reports_exact_extent() {
        // TOC (code 0) + a 1-byte self-delimited size prefix + 3 payload
        // bytes, with 5 bytes of an unrelated trailing stream appended.
        let mut buf = vec![0b0000_0000u8, 3, 9, 9, 9];
        buf.extend_from_slice(&[0xAA; 5]);
        assert_eq!(self_delimited_packet_len(&buf).unwrap(), 5);
    }
}
