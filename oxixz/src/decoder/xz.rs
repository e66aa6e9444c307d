//! Incremental XZ stream decoder.
//!
//! A stage machine over the container: every stage can stop at any byte
//! boundary and resume on the next call. Fixed-size fields (stream header,
//! block header, padding, check, footer) are gathered into a small buffer
//! first; block data goes straight through the LZMA2 engine into the
//! caller's output.

use crate::config::{DecoderConfig, DecoderFlags};
use crate::xz::{
    BLOCK_HEADER_SIZE_MAX, BlockHeader, INDEX_INDICATOR, IndexDecoder, IndexRecord, RecordDigest,
    STREAM_HEADER_SIZE, StreamFlags, decode_stream_footer, decode_stream_header,
    header_size_from_byte, padding_len,
};
use oxixz_core::check::{Check, CheckKind};
use oxixz_core::error::{Result, XzError};
use oxixz_core::status::{Action, Status};
use oxixz_core::traits::StreamCoder;
use oxixz_lzma::{Lzma2Decoder, dict_size_from_props, lzma2_decoder_memusage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    StreamHeader,
    BlockStart,
    BlockHeader { size: usize },
    BlockInit,
    BlockData,
    BlockPadding,
    BlockCheck,
    Index,
    StreamFooter,
    StreamPadding,
    End,
}

/// The block being decoded.
struct BlockState {
    header: BlockHeader,
    header_size: u64,
    engine: Option<Lzma2Decoder>,
    check: Check,
    compressed: u64,
    uncompressed: u64,
}

/// Decoder for one or more concatenated XZ streams.
pub struct XzDecoder {
    flags: DecoderFlags,
    memlimit: u64,
    memusage: u64,
    stage: Stage,
    field: Vec<u8>,
    stream_flags: Option<StreamFlags>,
    block: Option<BlockState>,
    digest: RecordDigest,
    index: IndexDecoder,
    padding: u64,
    streams: u64,
    total_in: u64,
    total_out: u64,
}

/// Gather up to `size` bytes of a fixed field. Returns `true` once complete.
fn gather(field: &mut Vec<u8>, input: &[u8], in_pos: &mut usize, size: usize) -> bool {
    let take = (size - field.len()).min(input.len() - *in_pos);
    field.extend_from_slice(&input[*in_pos..*in_pos + take]);
    *in_pos += take;
    field.len() == size
}

impl XzDecoder {
    /// Create a decoder.
    pub fn new(config: &DecoderConfig) -> Self {
        tracing::debug!(
            memlimit = config.memlimit,
            flags = config.flags.bits(),
            "XZ decoder initialized"
        );
        Self {
            flags: config.flags,
            memlimit: config.memlimit.max(1),
            memusage: 0,
            stage: Stage::StreamHeader,
            field: Vec::with_capacity(BLOCK_HEADER_SIZE_MAX),
            stream_flags: None,
            block: None,
            digest: RecordDigest::default(),
            index: IndexDecoder::new(),
            padding: 0,
            streams: 0,
            total_in: 0,
            total_out: 0,
        }
    }

    /// Number of streams fully decoded.
    pub fn streams(&self) -> u64 {
        self.streams
    }

    /// Status to report right after a stream header, if any was asked for.
    fn announce_check(&self, flags: StreamFlags) -> Option<Status> {
        if flags.check_id() == CheckKind::None.id() && self.flags.contains(DecoderFlags::TELL_NO_CHECK)
        {
            Some(Status::NoCheck)
        } else if flags.check_kind().is_none()
            && self.flags.contains(DecoderFlags::TELL_UNSUPPORTED_CHECK)
        {
            Some(Status::UnsupportedCheck)
        } else if self.flags.contains(DecoderFlags::TELL_ANY_CHECK) {
            Some(Status::GetCheck)
        } else {
            None
        }
    }

    fn stream_flags(&self) -> Result<StreamFlags> {
        self.stream_flags
            .ok_or_else(|| XzError::program("stream flags are not known yet"))
    }

    fn block_mut(&mut self) -> Result<&mut BlockState> {
        self.block
            .as_mut()
            .ok_or_else(|| XzError::program("no block is being decoded"))
    }

    fn decode(
        &mut self,
        input: &[u8],
        in_pos: &mut usize,
        output: &mut [u8],
        out_pos: &mut usize,
        action: Action,
    ) -> Result<Status> {
        loop {
            let offset = self.total_in + *in_pos as u64;
            match self.stage {
                Stage::StreamHeader => {
                    if !gather(&mut self.field, input, in_pos, STREAM_HEADER_SIZE) {
                        return Ok(Status::Ok);
                    }
                    let flags = match decode_stream_header(&self.field) {
                        Err(XzError::InvalidMagic { .. }) if self.streams > 0 => {
                            return Err(XzError::corrupted(
                                offset,
                                "data after stream padding is not an XZ stream",
                            ));
                        }
                        other => other?,
                    };
                    self.field.clear();
                    self.stream_flags = Some(flags);
                    self.digest = RecordDigest::default();
                    self.stage = Stage::BlockStart;
                    tracing::trace!(
                        stream = self.streams,
                        check_id = flags.check_id(),
                        "stream header decoded"
                    );
                    if let Some(status) = self.announce_check(flags) {
                        return Ok(status);
                    }
                }

                Stage::BlockStart => {
                    let Some(&byte) = input.get(*in_pos) else {
                        return Ok(Status::Ok);
                    };
                    if byte == INDEX_INDICATOR {
                        *in_pos += 1;
                        self.index = IndexDecoder::new();
                        self.stage = Stage::Index;
                    } else {
                        self.stage = Stage::BlockHeader {
                            size: header_size_from_byte(byte),
                        };
                    }
                }

                Stage::BlockHeader { size } => {
                    if !gather(&mut self.field, input, in_pos, size) {
                        return Ok(Status::Ok);
                    }
                    let header = BlockHeader::decode(&self.field)?;
                    self.field.clear();
                    let check = match self.stream_flags()?.check_kind() {
                        Some(kind) if !self.flags.contains(DecoderFlags::IGNORE_CHECK) => {
                            Check::new(kind)
                        }
                        _ => Check::None,
                    };
                    self.block = Some(BlockState {
                        header,
                        header_size: size as u64,
                        engine: None,
                        check,
                        compressed: 0,
                        uncompressed: 0,
                    });
                    self.stage = Stage::BlockInit;
                }

                Stage::BlockInit => {
                    let props = self.block_mut()?.header.props;
                    let needed = lzma2_decoder_memusage(dict_size_from_props(props)?);
                    self.memusage = needed;
                    if needed > self.memlimit {
                        // Stay here; the block is retried once the limit is raised.
                        return Err(XzError::mem_limit(needed, self.memlimit));
                    }
                    self.block_mut()?.engine = Some(Lzma2Decoder::new(props)?);
                    self.stage = Stage::BlockData;
                }

                Stage::BlockData => {
                    let block = self.block_mut()?;
                    let engine = block
                        .engine
                        .as_mut()
                        .ok_or_else(|| XzError::program("block engine missing"))?;

                    let mut avail = &input[*in_pos..];
                    if let Some(declared) = block.header.compressed_size {
                        let left = usize::try_from(declared - block.compressed).unwrap_or(usize::MAX);
                        avail = &avail[..avail.len().min(left)];
                    }

                    let progress = engine.process(avail, &mut output[*out_pos..])?;
                    block
                        .check
                        .update(&output[*out_pos..*out_pos + progress.produced]);
                    block.compressed += progress.consumed as u64;
                    block.uncompressed += progress.produced as u64;
                    *in_pos += progress.consumed;
                    *out_pos += progress.produced;

                    if let Some(declared) = block.header.uncompressed_size {
                        if block.uncompressed > declared {
                            return Err(XzError::corrupted(
                                offset,
                                "block is larger than its declared uncompressed size",
                            ));
                        }
                    }

                    if progress.finished {
                        let sizes_match = block
                            .header
                            .compressed_size
                            .is_none_or(|size| size == block.compressed)
                            && block
                                .header
                                .uncompressed_size
                                .is_none_or(|size| size == block.uncompressed);
                        if !sizes_match {
                            return Err(XzError::corrupted(
                                offset,
                                "block sizes differ from its header",
                            ));
                        }
                        block.engine = None;
                        self.stage = Stage::BlockPadding;
                        continue;
                    }

                    if progress.is_idle() {
                        let limit_reached = block
                            .header
                            .compressed_size
                            .is_some_and(|size| size == block.compressed);
                        if limit_reached && *out_pos < output.len() {
                            return Err(XzError::corrupted(
                                offset,
                                "block data continues past its declared compressed size",
                            ));
                        }
                        return Ok(Status::Ok);
                    }
                }

                Stage::BlockPadding => {
                    let compressed = self.block_mut()?.compressed;
                    if !gather(&mut self.field, input, in_pos, padding_len(compressed)) {
                        return Ok(Status::Ok);
                    }
                    if self.field.iter().any(|&b| b != 0) {
                        return Err(XzError::corrupted(offset, "block padding is not zero"));
                    }
                    self.field.clear();
                    self.stage = Stage::BlockCheck;
                }

                Stage::BlockCheck => {
                    let check_size = self.stream_flags()?.check_size();
                    if !gather(&mut self.field, input, in_pos, check_size) {
                        return Ok(Status::Ok);
                    }
                    let block = self
                        .block
                        .take()
                        .ok_or_else(|| XzError::program("no block is being decoded"))?;
                    block.check.verify(&self.field).or_else(|err| {
                        // Unverified checks decode to `Check::None`, which only
                        // matches an empty field.
                        if self.flags.contains(DecoderFlags::IGNORE_CHECK)
                            || self.stream_flags.and_then(|f| f.check_kind()).is_none()
                        {
                            Ok(())
                        } else {
                            Err(err)
                        }
                    })?;
                    self.field.clear();

                    let record = IndexRecord {
                        unpadded_size: block.header_size + block.compressed + check_size as u64,
                        uncompressed_size: block.uncompressed,
                    };
                    tracing::trace!(
                        unpadded = record.unpadded_size,
                        uncompressed = record.uncompressed_size,
                        "block decoded"
                    );
                    self.digest.add(record);
                    self.stage = Stage::BlockStart;
                }

                Stage::Index => {
                    let (used, done) = self.index.feed(&input[*in_pos..])?;
                    *in_pos += used;
                    if !done {
                        return Ok(Status::Ok);
                    }
                    self.digest.verify(self.index.digest())?;
                    self.stage = Stage::StreamFooter;
                }

                Stage::StreamFooter => {
                    if !gather(&mut self.field, input, in_pos, STREAM_HEADER_SIZE) {
                        return Ok(Status::Ok);
                    }
                    let footer = decode_stream_footer(&self.field)?;
                    self.field.clear();
                    if footer.index_size != self.index.size() {
                        return Err(XzError::corrupted(
                            offset,
                            "backward size does not match the index",
                        ));
                    }
                    if footer.flags != self.stream_flags()? {
                        return Err(XzError::corrupted(
                            offset,
                            "stream footer flags differ from the header",
                        ));
                    }
                    self.streams += 1;
                    tracing::debug!(
                        stream = self.streams,
                        blocks = self.digest.count(),
                        "XZ stream decoded"
                    );
                    if self.flags.contains(DecoderFlags::CONCATENATED) {
                        self.padding = 0;
                        self.stage = Stage::StreamPadding;
                    } else {
                        self.stage = Stage::End;
                        return Ok(Status::StreamEnd);
                    }
                }

                Stage::StreamPadding => {
                    while input.get(*in_pos) == Some(&0x00) {
                        *in_pos += 1;
                        self.padding += 1;
                    }
                    if *in_pos < input.len() || action == Action::Finish {
                        if self.padding % 4 != 0 {
                            return Err(XzError::corrupted(
                                offset,
                                "stream padding is not a multiple of four bytes",
                            ));
                        }
                        self.padding = 0;
                    }
                    if *in_pos < input.len() {
                        self.stage = Stage::StreamHeader;
                    } else if action == Action::Finish {
                        self.stage = Stage::End;
                        return Ok(Status::StreamEnd);
                    } else {
                        return Ok(Status::Ok);
                    }
                }

                Stage::End => return Err(XzError::program("the stream has already ended")),
            }
        }
    }
}

impl StreamCoder for XzDecoder {
    fn code(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Status> {
        let mut in_pos = 0;
        let mut out_pos = 0;
        let result = self.decode(input, &mut in_pos, output, &mut out_pos, action);
        self.total_in += in_pos as u64;
        self.total_out += out_pos as u64;
        result
    }

    fn total_in(&self) -> u64 {
        self.total_in
    }

    fn total_out(&self) -> u64 {
        self.total_out
    }

    fn is_blocked(&self, input_empty: bool, output_empty: bool) -> bool {
        self.stage != Stage::End && (input_empty || output_empty)
    }

    fn check(&self) -> Option<CheckKind> {
        self.stream_flags.and_then(StreamFlags::check_kind)
    }

    fn memusage(&self) -> u64 {
        self.memusage
    }

    fn memlimit(&self) -> u64 {
        self.memlimit
    }

    fn set_memlimit(&mut self, limit: u64) -> Result<()> {
        let limit = limit.max(1);
        if limit < self.memusage {
            return Err(XzError::mem_limit(self.memusage, limit));
        }
        self.memlimit = limit;
        Ok(())
    }
}
