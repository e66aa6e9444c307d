//! Streaming LZMA2 engines.
//!
//! Thin owners around `liblzma` streams. The container layer only sees
//! [`Progress`] and [`XzError`]; engine status and error codes never leave
//! this module.

use crate::preset::Preset;
use crate::props::{dict_size_from_props, props_from_dict_size};
use liblzma::stream::{self, Filters, LzmaOptions, Stream};
use oxixz_core::error::{Result, XzError};
use oxixz_core::status::Action;

/// Fixed decoder state on top of the dictionary buffer.
const LZMA2_DECODER_OVERHEAD: u64 = 32 * 1024;

/// The `.lzma` header starts with the properties byte and the little-endian
/// dictionary size.
const ALONE_DICT_END: usize = 5;

/// Bytes moved by one engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes produced.
    pub produced: usize,
    /// The requested flush, or the whole stream, is complete.
    pub finished: bool,
}

impl Progress {
    /// Nothing moved and nothing completed.
    pub fn is_idle(&self) -> bool {
        self.consumed == 0 && self.produced == 0 && !self.finished
    }
}

/// Memory an LZMA2 decoder with this dictionary needs, in bytes.
pub fn lzma2_decoder_memusage(dict_size: u32) -> u64 {
    u64::from(dict_size).div_ceil(16) * 16 + LZMA2_DECODER_OVERHEAD
}

fn engine_action(action: Action) -> stream::Action {
    match action {
        Action::Run => stream::Action::Run,
        Action::SyncFlush => stream::Action::SyncFlush,
        Action::FullFlush => stream::Action::FullFlush,
        Action::FullBarrier => stream::Action::FullBarrier,
        Action::Finish => stream::Action::Finish,
    }
}

fn engine_error(err: stream::Error, stream: &Stream) -> XzError {
    match err {
        stream::Error::Data => XzError::corrupted(stream.total_in(), "LZMA data is corrupt"),
        stream::Error::Format => XzError::format("not a valid LZMA stream"),
        stream::Error::Options => XzError::options("options rejected by the LZMA engine"),
        stream::Error::MemLimit => XzError::mem_limit(0, stream.memlimit()),
        stream::Error::Mem => XzError::mem("LZMA engine allocation failed"),
        other => XzError::program(format!("LZMA engine failure: {other}")),
    }
}

fn init_error(err: stream::Error) -> XzError {
    match err {
        stream::Error::Mem => XzError::mem("LZMA engine allocation failed"),
        stream::Error::Options => XzError::options("options rejected by the LZMA engine"),
        other => XzError::program(format!("LZMA engine setup failed: {other}")),
    }
}

fn drive(
    stream: &mut Stream,
    input: &[u8],
    output: &mut [u8],
    action: Action,
) -> Result<Progress> {
    let in_before = stream.total_in();
    let out_before = stream.total_out();
    let status = stream
        .process(input, output, engine_action(action))
        .map_err(|err| engine_error(err, stream))?;
    Ok(Progress {
        consumed: (stream.total_in() - in_before) as usize,
        produced: (stream.total_out() - out_before) as usize,
        finished: matches!(status, stream::Status::StreamEnd),
    })
}

fn lzma2_filters(options: &LzmaOptions) -> Filters {
    let mut filters = Filters::new();
    filters.lzma2(options);
    filters
}

/// Raw LZMA2 encoder (no container framing).
///
/// Accepts [`Action::Run`], [`Action::SyncFlush`] and [`Action::Finish`].
/// A sync flush ends the current LZMA2 chunk so everything fed so far can be
/// decoded; it reports `finished` once all flushed bytes have been produced.
/// Finish writes the LZMA2 end marker.
pub struct Lzma2Encoder {
    stream: Stream,
    dict_size: u32,
}

impl Lzma2Encoder {
    /// Create an encoder for a preset.
    pub fn new(preset: Preset) -> Result<Self> {
        let mut options = LzmaOptions::new_preset(preset.to_raw()).map_err(init_error)?;
        let dict_size = preset.dict_size();
        options.dict_size(dict_size);
        let stream = Stream::new_raw_encoder(&lzma2_filters(&options)).map_err(init_error)?;
        tracing::trace!(%preset, dict_size, "LZMA2 encoder ready");
        Ok(Self { stream, dict_size })
    }

    /// Dictionary size in bytes.
    pub fn dict_size(&self) -> u32 {
        self.dict_size
    }

    /// Property byte for the block header.
    pub fn props(&self) -> u8 {
        props_from_dict_size(self.dict_size)
    }

    /// Feed input and collect output.
    pub fn process(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Progress> {
        drive(&mut self.stream, input, output, action)
    }

    /// Total uncompressed bytes consumed.
    pub fn total_in(&self) -> u64 {
        self.stream.total_in()
    }

    /// Total compressed bytes produced.
    pub fn total_out(&self) -> u64 {
        self.stream.total_out()
    }
}

/// Raw LZMA2 decoder (no container framing).
///
/// Reports `finished` when the LZMA2 end marker has been decoded, and never
/// consumes input past it.
pub struct Lzma2Decoder {
    stream: Stream,
    dict_size: u32,
}

impl Lzma2Decoder {
    /// Create a decoder from the block header's property byte.
    pub fn new(props: u8) -> Result<Self> {
        let dict_size = dict_size_from_props(props)?;
        let mut options = LzmaOptions::new_preset(0).map_err(init_error)?;
        options.dict_size(dict_size);
        let stream = Stream::new_raw_decoder(&lzma2_filters(&options)).map_err(init_error)?;
        Ok(Self { stream, dict_size })
    }

    /// Dictionary size in bytes.
    pub fn dict_size(&self) -> u32 {
        self.dict_size
    }

    /// Feed compressed data and collect decompressed bytes.
    pub fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<Progress> {
        drive(&mut self.stream, input, output, Action::Run)
    }
}

/// Decoder for the legacy `.lzma` format, header included.
///
/// The engine enforces the memory ceiling itself: a stream whose header asks
/// for more fails with [`XzError::MemLimit`] and can be resumed after
/// [`AloneDecoder::set_memlimit`]. The header bytes are consumed before the
/// failure, so the caller resumes from `total_in()`.
pub struct AloneDecoder {
    stream: Stream,
    header: Vec<u8>,
    dict_size: Option<u32>,
}

impl AloneDecoder {
    /// Create a decoder with a memory ceiling.
    pub fn new(memlimit: u64) -> Result<Self> {
        let stream = Stream::new_lzma_decoder(memlimit).map_err(init_error)?;
        Ok(Self {
            stream,
            header: Vec::with_capacity(ALONE_DICT_END),
            dict_size: None,
        })
    }

    /// Feed compressed data and collect decompressed bytes.
    ///
    /// Counters advance even when the call fails.
    pub fn process(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Progress> {
        let in_before = self.stream.total_in();
        let result = drive(&mut self.stream, input, output, action);
        let consumed = (self.stream.total_in() - in_before) as usize;
        self.note_header(&input[..consumed.min(input.len())]);
        result.map_err(|err| match err {
            XzError::MemLimit { limit, .. } => XzError::mem_limit(self.memusage(), limit),
            other => other,
        })
    }

    /// Remember the dictionary size once the header has gone by.
    fn note_header(&mut self, consumed: &[u8]) {
        if self.dict_size.is_some() {
            return;
        }
        let take = (ALONE_DICT_END - self.header.len()).min(consumed.len());
        self.header.extend_from_slice(&consumed[..take]);
        if let Some(field) = self.header.get(1..ALONE_DICT_END) {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(field);
            self.dict_size = Some(u32::from_le_bytes(bytes));
        }
    }

    /// Dictionary size from the header, once it has been read.
    pub fn dict_size(&self) -> Option<u32> {
        self.dict_size
    }

    /// Estimated memory for the stream's dictionary; 0 before the header.
    pub fn memusage(&self) -> u64 {
        self.dict_size.map_or(0, lzma2_decoder_memusage)
    }

    /// Current memory ceiling.
    pub fn memlimit(&self) -> u64 {
        self.stream.memlimit()
    }

    /// Change the memory ceiling.
    pub fn set_memlimit(&mut self, limit: u64) -> Result<()> {
        let needed = self.memusage();
        self.stream
            .set_memlimit(limit)
            .map_err(|err| match engine_error(err, &self.stream) {
                XzError::MemLimit { .. } => XzError::mem_limit(needed, limit),
                other => other,
            })
    }

    /// Total compressed bytes consumed, header included.
    pub fn total_in(&self) -> u64 {
        self.stream.total_in()
    }

    /// Total decompressed bytes produced.
    pub fn total_out(&self) -> u64 {
        self.stream.total_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(encoder: &mut Lzma2Encoder, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        let mut input = data;
        loop {
            let p = encoder.process(input, &mut buf, Action::Finish).unwrap();
            input = &input[p.consumed..];
            out.extend_from_slice(&buf[..p.produced]);
            if p.finished {
                return out;
            }
        }
    }

    fn decode_all(decoder: &mut Lzma2Decoder, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        let mut input = data;
        loop {
            let p = decoder.process(input, &mut buf).unwrap();
            input = &input[p.consumed..];
            out.extend_from_slice(&buf[..p.produced]);
            if p.finished {
                assert!(input.is_empty(), "decoder stopped before the end marker");
                return out;
            }
            assert!(!p.is_idle(), "decoder stalled");
        }
    }

    #[test]
    fn test_raw_roundtrip() {
        let data = b"The quick brown fox jumps over the lazy dog. ".repeat(200);
        let mut encoder = Lzma2Encoder::new(Preset::FAST).unwrap();
        let compressed = encode_all(&mut encoder, &data);
        assert!(compressed.len() < data.len());
        assert_eq!(compressed.last(), Some(&0x00));
        assert_eq!(encoder.total_in(), data.len() as u64);

        let mut decoder = Lzma2Decoder::new(encoder.props()).unwrap();
        assert!(decoder.dict_size() >= encoder.dict_size());
        assert_eq!(decode_all(&mut decoder, &compressed), data);
    }

    #[test]
    fn test_empty_input_is_just_end_marker() {
        let mut encoder = Lzma2Encoder::new(Preset::FAST).unwrap();
        assert_eq!(encode_all(&mut encoder, b""), vec![0x00]);
    }

    #[test]
    fn test_sync_flush_makes_prefix_decodable() {
        let mut encoder = Lzma2Encoder::new(Preset::FAST).unwrap();
        let mut buf = [0u8; 4096];
        let mut flushed = Vec::new();
        let mut input: &[u8] = b"partial payload, partial payload";
        loop {
            let p = encoder.process(input, &mut buf, Action::SyncFlush).unwrap();
            input = &input[p.consumed..];
            flushed.extend_from_slice(&buf[..p.produced]);
            if p.finished {
                break;
            }
        }

        // Chunks so far plus an end marker form a complete LZMA2 stream.
        flushed.push(0x00);
        let mut decoder = Lzma2Decoder::new(encoder.props()).unwrap();
        assert_eq!(
            decode_all(&mut decoder, &flushed),
            b"partial payload, partial payload"
        );
    }

    #[test]
    fn test_corrupt_data_is_data_error() {
        let mut decoder = Lzma2Decoder::new(0).unwrap();
        let mut buf = [0u8; 64];
        // 0x03 is not a valid LZMA2 control byte.
        let err = decoder.process(&[0x03, 0x00, 0x00], &mut buf).unwrap_err();
        assert_eq!(err.status(), oxixz_core::Status::DataError);
    }

    #[test]
    fn test_invalid_props() {
        assert!(Lzma2Decoder::new(41).is_err());
    }

    #[test]
    fn test_memusage_covers_dictionary() {
        assert!(lzma2_decoder_memusage(1 << 23) > 1 << 23);
        assert_eq!(
            lzma2_decoder_memusage(17) - lzma2_decoder_memusage(16),
            16
        );
    }

    #[test]
    fn test_alone_decoder_rejects_garbage() {
        let mut decoder = AloneDecoder::new(u64::MAX).unwrap();
        let mut buf = [0u8; 64];
        // Properties byte above 224 is invalid for .lzma.
        let result = decoder.process(&[0xFF; 13], &mut buf, Action::Run);
        assert!(result.is_err());
    }

    #[test]
    fn test_alone_header_sets_memusage() {
        let mut decoder = AloneDecoder::new(4096).unwrap();
        assert_eq!(decoder.memusage(), 0);
        let mut buf = [0u8; 64];
        // lc=3 lp=0 pb=2, 8 MiB dictionary, unknown size.
        let mut header = vec![0x5D, 0x00, 0x00, 0x80, 0x00];
        header.extend_from_slice(&[0xFF; 8]);

        // Split the dictionary field across calls.
        decoder.process(&header[..3], &mut buf, Action::Run).unwrap();
        assert_eq!(decoder.dict_size(), None);
        let err = decoder.process(&header[3..], &mut buf, Action::Run).unwrap_err();
        assert_eq!(err.status(), oxixz_core::Status::MemlimitError);
        assert_eq!(decoder.total_in(), 13);
        assert_eq!(decoder.dict_size(), Some(1 << 23));
        assert_eq!(decoder.memusage(), lzma2_decoder_memusage(1 << 23));
        assert!(matches!(err, XzError::MemLimit { needed, limit: 4096 } if needed > 1 << 23));
    }
}
