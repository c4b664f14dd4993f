//! WAV stream re-framing
//!
//! Synthesis backends deliver one continuous WAV file: a single 44-byte
//! container header followed by PCM samples. Browsers cannot start playback
//! until they hold a complete file, so the stream is re-framed here into
//! small chunks that are each a valid, independently playable WAV file.
//!
//! The incoming header is stripped once, the PCM payload is sliced into
//! fixed-size blocks (~0.1 s of audio each), and every block gets a freshly
//! computed minimal header. Concatenating the payloads of all emitted chunks
//! reproduces the original PCM byte stream exactly.

use bytes::{BufMut, Bytes, BytesMut};

/// Sample rate of synthesized speech (Hz)
pub const SYNTH_SAMPLE_RATE: u32 = 24_000;

/// Channel count of synthesized speech
pub const SYNTH_CHANNELS: u16 = 1;

/// Bit depth of synthesized speech
pub const SYNTH_BITS_PER_SAMPLE: u16 = 16;

/// Size of a canonical RIFF/fmt/data WAV header
pub const WAV_HEADER_LEN: usize = 44;

/// PCM bytes per emitted chunk.
///
/// At 24 kHz, 16-bit mono: 0.1 s = 2400 samples = 4800 bytes.
pub const CHUNK_PAYLOAD_LEN: usize = 4800;

/// Wrap a PCM block in a minimal WAV container.
///
/// The header advertises the fixed synthesis format (24 kHz / mono / 16-bit)
/// and chunk sizes computed for this block's exact length, so the result is a
/// structurally complete WAV file on its own.
pub fn wav_chunk(pcm: &[u8]) -> Bytes {
    let byte_rate =
        SYNTH_SAMPLE_RATE * u32::from(SYNTH_CHANNELS) * u32::from(SYNTH_BITS_PER_SAMPLE) / 8;
    let block_align = SYNTH_CHANNELS * SYNTH_BITS_PER_SAMPLE / 8;
    let data_size = pcm.len() as u32;

    let mut out = BytesMut::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.put_slice(b"RIFF");
    out.put_u32_le(36 + data_size);
    out.put_slice(b"WAVE");
    out.put_slice(b"fmt ");
    out.put_u32_le(16); // fmt chunk size
    out.put_u16_le(1); // PCM
    out.put_u16_le(SYNTH_CHANNELS);
    out.put_u32_le(SYNTH_SAMPLE_RATE);
    out.put_u32_le(byte_rate);
    out.put_u16_le(block_align);
    out.put_u16_le(SYNTH_BITS_PER_SAMPLE);
    out.put_slice(b"data");
    out.put_u32_le(data_size);
    out.put_slice(pcm);
    out.freeze()
}

/// Incremental WAV re-framer.
///
/// Feed raw bytes from the synthesis stream with [`push`](Self::push); each
/// call returns the complete chunks that became available. Call
/// [`finish`](Self::finish) once the stream ends to flush the short remainder
/// block, if any.
#[derive(Debug, Default)]
pub struct AudioReframer {
    header_stripped: bool,
    pending: BytesMut,
}

impl AudioReframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append stream bytes and drain every full chunk now available.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(data);

        if !self.header_stripped {
            if self.pending.len() < WAV_HEADER_LEN {
                return Vec::new();
            }
            let _ = self.pending.split_to(WAV_HEADER_LEN);
            self.header_stripped = true;
        }

        let mut chunks = Vec::new();
        while self.pending.len() >= CHUNK_PAYLOAD_LEN {
            let block = self.pending.split_to(CHUNK_PAYLOAD_LEN);
            chunks.push(wav_chunk(&block));
        }
        chunks
    }

    /// Flush the final short block, if the stream left one behind.
    ///
    /// A stream that never delivered more than a container header yields
    /// nothing.
    pub fn finish(&mut self) -> Option<Bytes> {
        if !self.header_stripped {
            if self.pending.len() <= WAV_HEADER_LEN {
                self.pending.clear();
                return None;
            }
            let _ = self.pending.split_to(WAV_HEADER_LEN);
            self.header_stripped = true;
        }
        if self.pending.is_empty() {
            return None;
        }
        let rest = self.pending.split();
        Some(wav_chunk(&rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source_wav(pcm_len: usize) -> (Vec<u8>, Vec<u8>) {
        let pcm: Vec<u8> = (0..pcm_len).map(|i| (i % 251) as u8).collect();
        (wav_chunk(&pcm).to_vec(), pcm)
    }

    fn parse_chunk(chunk: &[u8]) -> (hound::WavSpec, usize) {
        let reader = hound::WavReader::new(Cursor::new(chunk)).expect("chunk should parse as WAV");
        (reader.spec(), reader.len() as usize)
    }

    #[test]
    fn test_payloads_reassemble_exactly() {
        // header + 2 full blocks + a remainder
        let (stream, pcm) = source_wav(CHUNK_PAYLOAD_LEN * 2 + 1234);

        let mut reframer = AudioReframer::new();
        let mut chunks = Vec::new();
        // Deliver in uneven slices to exercise buffering
        for piece in stream.chunks(777) {
            chunks.extend(reframer.push(piece));
        }
        chunks.extend(reframer.finish());

        assert_eq!(chunks.len(), 3);
        let reassembled: Vec<u8> = chunks
            .iter()
            .flat_map(|c| c[WAV_HEADER_LEN..].to_vec())
            .collect();
        assert_eq!(reassembled, pcm);
    }

    #[test]
    fn test_each_chunk_is_valid_wav() {
        let (stream, _) = source_wav(CHUNK_PAYLOAD_LEN + 100);

        let mut reframer = AudioReframer::new();
        let mut chunks = reframer.push(&stream);
        chunks.extend(reframer.finish());

        for chunk in &chunks {
            let (spec, samples) = parse_chunk(chunk);
            assert_eq!(spec.sample_rate, SYNTH_SAMPLE_RATE);
            assert_eq!(spec.channels, SYNTH_CHANNELS);
            assert_eq!(spec.bits_per_sample, SYNTH_BITS_PER_SAMPLE);
            assert_eq!(samples * 2, chunk.len() - WAV_HEADER_LEN);
        }
        assert_eq!(chunks[0].len(), WAV_HEADER_LEN + CHUNK_PAYLOAD_LEN);
        assert_eq!(chunks[1].len(), WAV_HEADER_LEN + 100);
    }

    #[test]
    fn test_exact_multiple_leaves_no_remainder() {
        let (stream, _) = source_wav(CHUNK_PAYLOAD_LEN * 3);

        let mut reframer = AudioReframer::new();
        let chunks = reframer.push(&stream);
        assert_eq!(chunks.len(), 3);
        assert!(reframer.finish().is_none());
    }

    #[test]
    fn test_header_only_stream_yields_nothing() {
        let (stream, _) = source_wav(0);
        assert_eq!(stream.len(), WAV_HEADER_LEN);

        let mut reframer = AudioReframer::new();
        assert!(reframer.push(&stream).is_empty());
        assert!(reframer.finish().is_none());
    }

    #[test]
    fn test_truncated_header_yields_nothing() {
        let mut reframer = AudioReframer::new();
        assert!(reframer.push(&[0u8; 10]).is_empty());
        assert!(reframer.finish().is_none());
    }

    #[test]
    fn test_single_byte_delivery() {
        let (stream, pcm) = source_wav(96);

        let mut reframer = AudioReframer::new();
        let mut chunks = Vec::new();
        for b in &stream {
            chunks.extend(reframer.push(std::slice::from_ref(b)));
        }
        chunks.extend(reframer.finish());

        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][WAV_HEADER_LEN..], &pcm[..]);
    }
}
