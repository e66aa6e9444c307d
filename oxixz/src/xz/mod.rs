//! XZ container framing.
//!
//! XZ is a container format for LZMA2 compressed data with integrity checks.
//!
//! ## File Structure
//!
//! - Stream Header (12 bytes): Magic + Flags + CRC32
//! - Blocks: Block Header + LZMA2 data + padding + check
//! - Index: one (unpadded size, uncompressed size) record per block
//! - Stream Footer (12 bytes): CRC32 + Backward Size + Flags + Magic
//!
//! Streams may be concatenated, separated by stream padding (NUL bytes in
//! multiples of four).

mod header;
mod index;

pub use header::{
    BLOCK_HEADER_SIZE_MAX, BlockHeader, FILTER_LZMA2, STREAM_HEADER_SIZE, StreamFlags,
    StreamFooter, XZ_FOOTER_MAGIC, XZ_MAGIC, decode_stream_footer, decode_stream_header,
    encode_stream_footer, encode_stream_header, header_size_from_byte, padding_len,
};
pub use index::{
    INDEX_INDICATOR, IndexBuilder, IndexDecoder, IndexRecord, RecordDigest, UNPADDED_SIZE_MAX,
    UNPADDED_SIZE_MIN,
};
