//! Stream header, stream footer and block header.
//!
//! Based on the XZ file format specification:
//! <https://tukaani.org/xz/xz-file-format.txt>

use oxixz_core::check::{CHECK_ID_MAX, CheckKind, check_size};
use oxixz_core::crc::Crc32;
use oxixz_core::error::{Result, XzError};
use oxixz_core::vli::{VLI_MAX, decode_vli, encode_vli};

/// XZ magic bytes: 0xFD, '7', 'z', 'X', 'Z', 0x00
pub const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// XZ footer magic bytes: 'Y', 'Z'
pub const XZ_FOOTER_MAGIC: [u8; 2] = [0x59, 0x5A];

/// Size of the stream header and of the stream footer.
pub const STREAM_HEADER_SIZE: usize = 12;

/// LZMA2 filter ID.
pub const FILTER_LZMA2: u64 = 0x21;

/// Largest encoded block header.
pub const BLOCK_HEADER_SIZE_MAX: usize = 1024;

const BLOCK_FLAG_FILTERS: u8 = 0x03;
const BLOCK_FLAG_COMPRESSED_SIZE: u8 = 0x40;
const BLOCK_FLAG_UNCOMPRESSED_SIZE: u8 = 0x80;
const BLOCK_FLAG_RESERVED: u8 = 0x3C;

/// XZ stream flags.
///
/// Holds the raw 4-bit check ID so streams using a check this crate cannot
/// compute still parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFlags {
    check_id: u8,
}

impl StreamFlags {
    /// Create new stream flags.
    pub fn new(check: CheckKind) -> Self {
        Self {
            check_id: check.id(),
        }
    }

    /// Raw check ID.
    pub fn check_id(self) -> u8 {
        self.check_id
    }

    /// The check kind, if it is one this crate computes.
    pub fn check_kind(self) -> Option<CheckKind> {
        CheckKind::from_id(self.check_id)
    }

    /// Size of each block's check field.
    pub fn check_size(self) -> usize {
        check_size(self.check_id).unwrap_or(0)
    }

    /// Encode stream flags to 2 bytes.
    pub fn encode(self) -> [u8; 2] {
        [0x00, self.check_id]
    }

    /// Decode stream flags from 2 bytes.
    pub fn decode(bytes: [u8; 2]) -> Result<Self> {
        if bytes[0] != 0x00 || bytes[1] > CHECK_ID_MAX {
            return Err(XzError::options(format!(
                "reserved stream flag bits are set: {:02x}{:02x}",
                bytes[0], bytes[1]
            )));
        }
        Ok(Self {
            check_id: bytes[1],
        })
    }
}

/// Encode the stream header.
pub fn encode_stream_header(flags: StreamFlags) -> [u8; STREAM_HEADER_SIZE] {
    let mut header = [0u8; STREAM_HEADER_SIZE];
    header[..6].copy_from_slice(&XZ_MAGIC);
    header[6..8].copy_from_slice(&flags.encode());
    let crc = Crc32::compute(&header[6..8]);
    header[8..].copy_from_slice(&crc.to_le_bytes());
    header
}

/// Decode the stream header.
///
/// Wrong magic is a format error; a bad CRC is a data error.
pub fn decode_stream_header(header: &[u8]) -> Result<StreamFlags> {
    if header.len() != STREAM_HEADER_SIZE {
        return Err(XzError::program("stream header must be 12 bytes"));
    }
    if header[..6] != XZ_MAGIC {
        return Err(XzError::invalid_magic(XZ_MAGIC, &header[..6]));
    }

    let expected = read_u32(&header[8..12]);
    let computed = Crc32::compute(&header[6..8]);
    if expected != computed {
        return Err(XzError::crc_mismatch("stream header", expected, computed));
    }

    StreamFlags::decode([header[6], header[7]])
}

/// Decoded stream footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFooter {
    /// Flags, which must match the header's.
    pub flags: StreamFlags,
    /// Size of the index in bytes.
    pub index_size: u64,
}

/// Encode the stream footer for an index of `index_size` bytes.
pub fn encode_stream_footer(flags: StreamFlags, index_size: u64) -> Result<[u8; STREAM_HEADER_SIZE]> {
    if index_size < 8 || index_size % 4 != 0 || index_size > (1 << 34) {
        return Err(XzError::program(format!("invalid index size {index_size}")));
    }
    let backward_size = (index_size / 4 - 1) as u32;

    let mut footer = [0u8; STREAM_HEADER_SIZE];
    footer[4..8].copy_from_slice(&backward_size.to_le_bytes());
    footer[8..10].copy_from_slice(&flags.encode());
    footer[10..].copy_from_slice(&XZ_FOOTER_MAGIC);
    let crc = Crc32::compute(&footer[4..10]);
    footer[..4].copy_from_slice(&crc.to_le_bytes());
    Ok(footer)
}

/// Decode the stream footer.
pub fn decode_stream_footer(footer: &[u8]) -> Result<StreamFooter> {
    if footer.len() != STREAM_HEADER_SIZE {
        return Err(XzError::program("stream footer must be 12 bytes"));
    }
    if footer[10..12] != XZ_FOOTER_MAGIC {
        return Err(XzError::corrupted(0, "invalid stream footer magic"));
    }

    let expected = read_u32(&footer[..4]);
    let computed = Crc32::compute(&footer[4..10]);
    if expected != computed {
        return Err(XzError::crc_mismatch("stream footer", expected, computed));
    }

    let flags = StreamFlags::decode([footer[8], footer[9]])?;
    let index_size = (u64::from(read_u32(&footer[4..8])) + 1) * 4;
    Ok(StreamFooter { flags, index_size })
}

/// An LZMA2 block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// LZMA2 dictionary property byte.
    pub props: u8,
    /// Declared size of the compressed data, if stored.
    pub compressed_size: Option<u64>,
    /// Declared size of the uncompressed data, if stored.
    pub uncompressed_size: Option<u64>,
}

impl BlockHeader {
    /// Header for a block whose sizes are not known up front.
    pub fn new(props: u8) -> Self {
        Self {
            props,
            compressed_size: None,
            uncompressed_size: None,
        }
    }

    /// Encode the full header: size byte, fields, padding and CRC.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = vec![0x00];

        let mut flags = 0x00; // one filter
        if self.compressed_size.is_some() {
            flags |= BLOCK_FLAG_COMPRESSED_SIZE;
        }
        if self.uncompressed_size.is_some() {
            flags |= BLOCK_FLAG_UNCOMPRESSED_SIZE;
        }
        header.push(flags);

        if let Some(size) = self.compressed_size {
            encode_vli(&mut header, size);
        }
        if let Some(size) = self.uncompressed_size {
            encode_vli(&mut header, size);
        }

        encode_vli(&mut header, FILTER_LZMA2);
        encode_vli(&mut header, 1);
        header.push(self.props);

        // Size byte + fields + CRC, rounded up to a multiple of four.
        let total = (header.len() + 4).div_ceil(4) * 4;
        header.resize(total - 4, 0x00);
        header[0] = (total / 4 - 1) as u8;

        let crc = Crc32::compute(&header);
        header.extend_from_slice(&crc.to_le_bytes());
        header
    }

    /// Decode a full header, size byte included.
    pub fn decode(header: &[u8]) -> Result<Self> {
        let size = match header.first() {
            Some(&byte) if byte != 0 => header_size_from_byte(byte),
            _ => return Err(XzError::program("not a block header")),
        };
        if header.len() != size {
            return Err(XzError::program("block header length mismatch"));
        }

        let (body, crc) = header.split_at(size - 4);
        let expected = read_u32(crc);
        let computed = Crc32::compute(body);
        if expected != computed {
            return Err(XzError::crc_mismatch("block header", expected, computed));
        }

        let flags = body[1];
        if flags & BLOCK_FLAG_RESERVED != 0 {
            return Err(XzError::options("reserved block header flags are set"));
        }

        let mut pos = 2;
        let next_vli = |pos: &mut usize| -> Result<u64> {
            let (value, used) = decode_vli(&body[*pos..])
                .map_err(|_| XzError::corrupted(0, "truncated block header field"))?;
            *pos += used;
            Ok(value)
        };

        let compressed_size = if flags & BLOCK_FLAG_COMPRESSED_SIZE != 0 {
            let size = next_vli(&mut pos)?;
            if size == 0 || size > VLI_MAX {
                return Err(XzError::corrupted(0, "invalid block compressed size"));
            }
            Some(size)
        } else {
            None
        };
        let uncompressed_size = if flags & BLOCK_FLAG_UNCOMPRESSED_SIZE != 0 {
            Some(next_vli(&mut pos)?)
        } else {
            None
        };

        // Only a single LZMA2 filter is supported; anything in front of it
        // is an unsupported filter.
        let filters = (flags & BLOCK_FLAG_FILTERS) + 1;
        let mut props = None;
        for i in 0..filters {
            let id = next_vli(&mut pos)?;
            let props_size = next_vli(&mut pos)?;
            if id != FILTER_LZMA2 {
                return Err(XzError::UnsupportedFilter { id });
            }
            if i + 1 != filters {
                return Err(XzError::options("LZMA2 must be the last filter"));
            }
            if props_size != 1 || pos >= body.len() {
                return Err(XzError::options("invalid LZMA2 filter properties"));
            }
            props = Some(body[pos]);
            pos += 1;
        }
        let props = props.ok_or_else(|| XzError::options("block has no filters"))?;
        if props > oxixz_lzma::props::PROPS_MAX {
            return Err(XzError::options(format!(
                "LZMA2 dictionary property {props} is out of range"
            )));
        }

        if body[pos..].iter().any(|&b| b != 0) {
            return Err(XzError::options("block header padding is not zero"));
        }

        Ok(Self {
            props,
            compressed_size,
            uncompressed_size,
        })
    }
}

/// Real block header size from its first byte.
pub fn header_size_from_byte(byte: u8) -> usize {
    (usize::from(byte) + 1) * 4
}

/// Number of zero bytes that pad `size` to a multiple of four.
pub fn padding_len(size: u64) -> usize {
    ((4 - size % 4) % 4) as usize
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}
