// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multistream framing (RFC 6716 Appendix B) and channel mapping, for
//! surround and ambisonic layouts built out of several elementary Opus
//! streams packed into one packet.
//!
//! A multistream packet concatenates `N` elementary packets: streams
//! `0..N-1` are self-delimited (each carries its own length prefix so the
//! next stream's TOC can be found without decoding the stream itself), and
//! the final stream uses the standard length-implied layout. Coupled
//! streams carry two channels (decoded the same way a stereo [`Decoder`]
//! would); the rest carry one. A channel mapping table routes the union of
//! all streams' channels to the caller's output channel order, with `255`
//! marking a silent (e.g. unused LFE) output channel.

use crate::control::{DecoderConfig, EncoderConfig};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::packet;
use crate::sample::{Channels, Sample};

/// Marks a channel-mapping entry as silent: the output channel is filled
/// with zeroes rather than sourced from any stream.
pub const MAPPING_SILENT: u8 = 255;

/// Routes the channels carried by `streams` coupled/uncoupled Opus decoders
/// to a caller's output channel order (RFC 7845 §5.1.1).
#[derive(Clone, Debug)]
pub struct ChannelMapping {
    streams: u8,
    coupled_streams: u8,
    mapping: Vec<u8>,
}

impl ChannelMapping {
    /// Builds a mapping for `streams` total elementary streams, the first
    /// `coupled_streams` of which are stereo, and `mapping` routing each
    /// output channel to a (stream, sub-channel) pair or [`MAPPING_SILENT`].
    ///
    /// Validates the invariants RFC 6716 Appendix B and RFC 7845 §5.1.1
    /// place on a multistream layout: `coupled_streams <= streams`,
    /// `streams + coupled_streams <= 255`, and every mapping entry either
    /// names one of the `streams + coupled_streams` addressable channels or
    /// is silent.
    pub fn new(streams: u8, coupled_streams: u8, mapping: Vec<u8>) -> Result<Self> {
        if coupled_streams > streams {
            return Err(Error::InvalidStreams);
        }
        if usize::from(streams) + usize::from(coupled_streams) > 255 {
            return Err(Error::InvalidStreams);
        }
        if streams == 0 {
            return Err(Error::InvalidStreams);
        }
        let addressable = u8::from(streams) + coupled_streams;
        for &entry in &mapping {
            if entry != MAPPING_SILENT && entry >= addressable {
                return Err(Error::InvalidMapping);
            }
        }
        Ok(ChannelMapping { streams, coupled_streams, mapping })
    }

    /// A single mono or stereo stream's worth of channels, addressed
    /// directly (mapping `[0, 1, ..]` for stereo, `[0]` for mono) — the
    /// trivial one-stream layout libopus calls "mapping family 0".
    pub fn simple(channels: Channels) -> Self {
        match channels {
            Channels::Mono => ChannelMapping { streams: 1, coupled_streams: 0, mapping: vec![0] },
            Channels::Stereo => ChannelMapping { streams: 1, coupled_streams: 1, mapping: vec![0, 1] },
        }
    }

    pub fn streams(&self) -> u8 {
        self.streams
    }

    pub fn coupled_streams(&self) -> u8 {
        self.coupled_streams
    }

    pub fn channels(&self) -> usize {
        self.mapping.len()
    }

    /// `(stream_index, sub_channel)` a mapping entry addresses, or `None`
    /// for a silent output channel. `sub_channel` is `0`/`1` (left/right)
    /// for a coupled stream's two channels, always `0` for an uncoupled
    /// stream.
    fn resolve(&self, entry: u8) -> Option<(usize, usize)> {
        if entry == MAPPING_SILENT {
            return None;
        }
        let entry = usize::from(entry);
        let coupled = usize::from(self.coupled_streams);
        if entry < 2 * coupled {
            Some((entry / 2, entry % 2))
        } else {
            Some((coupled + (entry - 2 * coupled), 0))
        }
    }

    fn stream_channels(&self, stream: usize) -> Channels {
        if stream < usize::from(self.coupled_streams) {
            Channels::Stereo
        } else {
            Channels::Mono
        }
    }
}

/// Decodes a multistream Opus packet into interleaved PCM across all of a
/// [`ChannelMapping`]'s output channels.
pub struct MultistreamDecoder {
    mapping: ChannelMapping,
    decoders: Vec<Decoder>,
}

impl MultistreamDecoder {
    /// Builds one [`Decoder`] per stream in `mapping`, all sharing
    /// `sample_rate` as their output rate.
    pub fn new(mapping: ChannelMapping, sample_rate: crate::sample::SamplingRate) -> Result<Self> {
        let mut decoders = Vec::with_capacity(usize::from(mapping.streams()));
        for s in 0..mapping.streams() {
            let channels = mapping.stream_channels(usize::from(s));
            decoders.push(Decoder::new(DecoderConfig::new(sample_rate, channels))?);
        }
        Ok(MultistreamDecoder { mapping, decoders })
    }

    pub fn mapping(&self) -> &ChannelMapping {
        &self.mapping
    }

    /// Drops every stream decoder's history, as if freshly built.
    pub fn reset(&mut self) {
        self.decoders.iter_mut().for_each(Decoder::reset);
    }

    /// Decodes one multistream packet (or, if `packet` is `None` or empty,
    /// conceals its loss across every stream) into `out`, interleaved in
    /// the mapping's output channel order. Returns the number of samples
    /// written per output channel.
    pub fn decode<S: Sample>(&mut self, packet: Option<&[u8]>, out: &mut [S]) -> Result<usize> {
        let n_streams = self.decoders.len();
        let mut remaining = packet.filter(|p| !p.is_empty());
        let mut per_stream: Vec<Vec<f32>> = Vec::with_capacity(n_streams);

        for (i, decoder) in self.decoders.iter_mut().enumerate() {
            let is_last = i + 1 == n_streams;
            let this_stream: Option<&[u8]> = match remaining {
                None => None,
                Some(buf) => {
                    if is_last {
                        remaining = None;
                        Some(buf)
                    } else {
                        let len = packet::self_delimited_packet_len(buf)?;
                        let (frame, rest) = buf.split_at(len);
                        remaining = Some(rest);
                        Some(frame)
                    }
                }
            };

            let ch = self.mapping.stream_channels(i).count();
            let mut buf = vec![0.0f32; 5760 * ch];
            let written = decoder.decode::<f32>(this_stream, &mut buf)?;
            buf.truncate(written * ch);
            per_stream.push(buf);
        }

        let n_frames = per_stream
            .iter()
            .enumerate()
            .map(|(i, b)| b.len() / self.mapping.stream_channels(i).count().max(1))
            .max()
            .unwrap_or(0);

        let out_channels = self.mapping.channels();
        let needed = n_frames * out_channels;
        if out.len() < needed {
            return Err(Error::BufferTooSmall);
        }

        for frame in 0..n_frames {
            for (c, &entry) in self.mapping.mapping.iter().enumerate() {
                let sample = match self.mapping.resolve(entry) {
                    None => 0.0,
                    Some((stream, sub)) => {
                        let ch = self.mapping.stream_channels(stream).count();
                        let buf = &per_stream[stream];
                        if frame * ch + sub < buf.len() {
                            buf[frame * ch + sub]
                        } else {
                            0.0
                        }
                    }
                };
                out[frame * out_channels + c] = S::from_f32(sample);
            }
        }
        Ok(n_frames)
    }
}

/// Encodes interleaved PCM across a [`ChannelMapping`]'s input channels into
/// a multistream Opus packet.
pub struct MultistreamEncoder {
    mapping: ChannelMapping,
    encoders: Vec<Encoder>,
}

impl MultistreamEncoder {
    /// Builds one [`Encoder`] per stream in `mapping`, each configured from
    /// `config` except for its channel count, which follows the mapping's
    /// per-stream coupled/uncoupled split.
    pub fn new(mapping: ChannelMapping, config: EncoderConfig) -> Result<Self> {
        if mapping.channels() == 0 {
            return Err(Error::InvalidChannels);
        }
        let mut encoders = Vec::with_capacity(usize::from(mapping.streams()));
        for s in 0..mapping.streams() {
            let channels = mapping.stream_channels(usize::from(s));
            let mut stream_config = EncoderConfig::new(config.sample_rate(), channels, config.application());
            stream_config.set_bitrate(config.bitrate())?;
            stream_config.set_complexity(config.complexity())?;
            stream_config.set_frame_size(config.frame_size());
            stream_config.set_signal(config.signal());
            // Forcing stereo output only makes sense on a coupled stream;
            // silently keep this stream's default rather than reject the
            // whole layout over a setting that doesn't apply to it.
            let _ = stream_config.set_force_channels(config.force_channels());
            stream_config.set_max_bandwidth(config.max_bandwidth());
            stream_config.set_bandwidth(config.forced_bandwidth());
            stream_config.set_vbr(config.vbr());
            stream_config.set_vbr_constraint(config.vbr_constraint());
            stream_config.set_dtx(config.dtx());
            stream_config.set_inband_fec(config.inband_fec());
            stream_config.set_packet_loss_perc(config.packet_loss_perc())?;
            stream_config.set_lsb_depth(config.lsb_depth())?;
            stream_config.set_prediction_disabled(config.prediction_disabled());
            encoders.push(Encoder::new(stream_config)?);
        }
        Ok(MultistreamEncoder { mapping, encoders })
    }

    pub fn mapping(&self) -> &ChannelMapping {
        &self.mapping
    }

    pub fn reset(&mut self) {
        self.encoders.iter_mut().for_each(Encoder::reset);
    }

    /// Encodes one frame's worth of interleaved PCM (length `frame_size *
    /// mapping.channels()`) into `out`. Frame size and sample rate must
    /// match every stream encoder's own configuration.
    pub fn encode<S: Sample>(&mut self, pcm: &[S], out: &mut [u8]) -> Result<usize> {
        let in_channels = self.mapping.channels();
        if in_channels == 0 || pcm.len() % in_channels != 0 {
            return Err(Error::BadArgument("pcm length doesn't match the channel mapping"));
        }
        let n_frames = pcm.len() / in_channels;

        let n_streams = self.encoders.len();
        let mut stream_pcm: Vec<Vec<f32>> = (0..n_streams)
            .map(|s| vec![0.0f32; n_frames * self.mapping.stream_channels(s).count()])
            .collect();

        for frame in 0..n_frames {
            for (c, &entry) in self.mapping.mapping.iter().enumerate() {
                if let Some((stream, sub)) = self.mapping.resolve(entry) {
                    let ch = self.mapping.stream_channels(stream).count();
                    stream_pcm[stream][frame * ch + sub] = pcm[frame * in_channels + c].to_f32();
                }
            }
        }

        let mut payloads: Vec<Vec<u8>> = Vec::with_capacity(n_streams);
        for (encoder, pcm) in self.encoders.iter_mut().zip(stream_pcm.iter()) {
            let mut buf = vec![0u8; 4000];
            let len = encoder.encode(pcm, &mut buf)?;
            buf.truncate(len);
            payloads.push(buf);
        }

        // Streams 0..N-2 carry their frame length explicitly inside their
        // own TOC framing (RFC 6716 Appendix B) so the next stream's TOC
        // can be found without decoding this one; the last stream needs no
        // such conversion since its length is simply "whatever remains".
        let mut assembled = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            if i + 1 < payloads.len() {
                if payload.is_empty() {
                    return Err(Error::BadArgument("a non-final multistream stream can't DTX-elide its frame"));
                }
                assembled.extend_from_slice(&packet::to_self_delimited(payload)?);
            } else {
                assembled.extend_from_slice(payload);
            }
        }

        if assembled.len() > out.len() {
            return Err(Error::BufferTooSmall);
        }
        out[..assembled.len()].copy_from_slice(&assembled);
        Ok(assembled.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Application, SamplingRate};

    #[test]
    fn simple_mapping_matches_plain_stereo() {
        let mapping = ChannelMapping::simple(Channels::Stereo);
        assert_eq!(mapping.streams(), 1);
        assert_eq!(mapping.coupled_streams(), 1);
        assert_eq!(mapping.channels(), 2);
    }

    #[test]
    fn mapping_rejects_coupled_exceeding_streams() {
        assert!(ChannelMapping::new(2, 3, vec![0, 1]).is_err());
    }

    #[test]
    fn mapping_rejects_out_of_range_entry() {
        // 1 stream, 0 coupled: only entry `0` (and 255) are valid.
        assert!(ChannelMapping::new(1, 0, vec![0, 5]).is_err());
    }

    #[test]
    fn mapping_accepts_silent_lfe_entry() {
        let mapping = ChannelMapping::new(2, 1, vec![0, 1, MAPPING_SILENT]).unwrap();
        assert_eq!(mapping.channels(), 3);
    }

    #[test]
    fn five_point_one_round_trips_through_decoder() {
        // channels=6, streams=4, coupled=2, mapping=[0,4,1,2,3,5] (spec.md
        // §8 S3): front L/R and surround L/R are the two coupled streams,
        // center and LFE are the two mono streams.
        let mapping = ChannelMapping::new(4, 2, vec![0, 4, 1, 2, 3, 5]).unwrap();
        let config = EncoderConfig::new(SamplingRate::Hz48000, Channels::Stereo, Application::Audio);
        let mut ms_encoder = MultistreamEncoder::new(mapping.clone(), config).unwrap();

        let n = 960;
        let pcm: Vec<f32> = (0..n * 6).map(|i| ((i as f32) * 0.01).sin() * 0.1).collect();
        let mut packet = vec![0u8; 16384];
        let len = ms_encoder.encode(&pcm, &mut packet).unwrap();
        assert!(len > 0);

        let mut ms_decoder = MultistreamDecoder::new(mapping, SamplingRate::Hz48000).unwrap();
        let mut out = vec![0.0f32; n * 6];
        let written = ms_decoder.decode(Some(&packet[..len]), &mut out).unwrap();
        assert_eq!(written, n);
    }

    #[test]
    fn missing_packet_conceals_across_every_stream() {
        let mapping = ChannelMapping::simple(Channels::Stereo);
        let mut decoder = MultistreamDecoder::new(mapping, SamplingRate::Hz48000).unwrap();
        let mut out = vec![0.0f32; 960 * 2];
        let written = decoder.decode::<f32>(None, &mut out).unwrap();
        assert_eq!(written, 960);
    }
}
