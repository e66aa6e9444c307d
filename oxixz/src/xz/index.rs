//! The stream index.
//!
//! One record per block (unpadded size, uncompressed size), written after
//! the last block and checked against the blocks the decoder actually saw.

use oxixz_core::crc::Crc32;
use oxixz_core::error::{Result, XzError};
use oxixz_core::vli::{VLI_MAX, VliDecoder, encode_vli};

/// First byte of the index; a block header can never start with it.
pub const INDEX_INDICATOR: u8 = 0x00;

/// Smallest valid unpadded block size.
pub const UNPADDED_SIZE_MIN: u64 = 5;

/// Largest valid unpadded block size.
pub const UNPADDED_SIZE_MAX: u64 = VLI_MAX & !3;

/// Sizes of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Header + compressed data + check, without block padding.
    pub unpadded_size: u64,
    /// Bytes of uncompressed data.
    pub uncompressed_size: u64,
}

impl IndexRecord {
    fn validate(&self) -> Result<()> {
        if !(UNPADDED_SIZE_MIN..=UNPADDED_SIZE_MAX).contains(&self.unpadded_size) {
            return Err(XzError::corrupted(0, "invalid unpadded block size"));
        }
        if self.uncompressed_size > VLI_MAX {
            return Err(XzError::corrupted(0, "invalid uncompressed block size"));
        }
        Ok(())
    }
}

/// Order-sensitive summary of a list of records.
///
/// The decoder builds one from the blocks it decodes and one from the
/// stored index; the two must agree.
#[derive(Debug, Clone, Default)]
pub struct RecordDigest {
    count: u64,
    unpadded_sum: u64,
    uncompressed_sum: u64,
    crc: Crc32,
}

impl RecordDigest {
    /// Add the next record.
    pub fn add(&mut self, record: IndexRecord) {
        self.count += 1;
        self.unpadded_sum = self.unpadded_sum.saturating_add(record.unpadded_size);
        self.uncompressed_sum = self
            .uncompressed_sum
            .saturating_add(record.uncompressed_size);

        let mut bytes = Vec::with_capacity(18);
        encode_vli(&mut bytes, record.unpadded_size);
        encode_vli(&mut bytes, record.uncompressed_size);
        self.crc.update(&bytes);
    }

    /// Number of records added.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Compare against another digest, describing the first difference.
    pub fn verify(&self, stored: &RecordDigest) -> Result<()> {
        if self.count != stored.count {
            return Err(XzError::index_mismatch(format!(
                "index lists {} blocks, stream has {}",
                stored.count, self.count
            )));
        }
        if self.uncompressed_sum != stored.uncompressed_sum
            || self.unpadded_sum != stored.unpadded_sum
            || self.crc.value() != stored.crc.value()
        {
            return Err(XzError::index_mismatch(
                "index records disagree with the blocks",
            ));
        }
        Ok(())
    }
}

/// Collects records while encoding and writes the index.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    records: Vec<IndexRecord>,
}

impl IndexBuilder {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the record of the next block.
    pub fn push(&mut self, record: IndexRecord) {
        self.records.push(record);
    }

    /// Records so far.
    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Total uncompressed size of all blocks.
    pub fn uncompressed_size(&self) -> u64 {
        self.records.iter().map(|r| r.uncompressed_size).sum()
    }

    /// Encode: indicator, record count, records, padding, CRC-32.
    pub fn encode(&self) -> Vec<u8> {
        let mut index = vec![INDEX_INDICATOR];
        encode_vli(&mut index, self.records.len() as u64);
        for record in &self.records {
            encode_vli(&mut index, record.unpadded_size);
            encode_vli(&mut index, record.uncompressed_size);
        }
        while index.len() % 4 != 0 {
            index.push(0x00);
        }
        let crc = Crc32::compute(&index);
        index.extend_from_slice(&crc.to_le_bytes());
        index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Count,
    Unpadded,
    Uncompressed,
    Padding,
    Crc,
    Done,
}

/// Incremental index parser.
///
/// Created once the indicator byte has been read; accepts the rest of the
/// index in pieces of any size.
#[derive(Debug, Clone)]
pub struct IndexDecoder {
    field: Field,
    vli: VliDecoder,
    remaining: u64,
    unpadded: u64,
    digest: RecordDigest,
    crc: Crc32,
    size: u64,
    stored_crc: Vec<u8>,
}

impl IndexDecoder {
    /// Start parsing after the indicator byte.
    pub fn new() -> Self {
        let mut crc = Crc32::new();
        crc.update(&[INDEX_INDICATOR]);
        Self {
            field: Field::Count,
            vli: VliDecoder::new(),
            remaining: 0,
            unpadded: 0,
            digest: RecordDigest::default(),
            crc,
            size: 1,
            stored_crc: Vec::with_capacity(4),
        }
    }

    /// Consume index bytes. Returns the bytes used and whether the index is
    /// complete; never reads past the end of the index.
    pub fn feed(&mut self, input: &[u8]) -> Result<(usize, bool)> {
        let mut used = 0;
        while let Some(&byte) = input.get(used) {
            if self.field == Field::Done {
                break;
            }
            used += 1;

            if self.field == Field::Crc {
                self.stored_crc.push(byte);
                if self.stored_crc.len() == 4 {
                    self.finish_crc()?;
                }
                continue;
            }

            self.crc.update(&[byte]);
            self.size += 1;

            if self.field == Field::Padding {
                if byte != 0x00 {
                    return Err(XzError::corrupted(self.size, "index padding is not zero"));
                }
                if self.size % 4 == 0 {
                    self.field = Field::Crc;
                }
                continue;
            }

            let Some(value) = self.vli.push(byte)? else {
                continue;
            };
            match self.field {
                Field::Count => {
                    self.remaining = value;
                    self.next_record();
                }
                Field::Unpadded => {
                    self.unpadded = value;
                    self.field = Field::Uncompressed;
                }
                Field::Uncompressed => {
                    let record = IndexRecord {
                        unpadded_size: self.unpadded,
                        uncompressed_size: value,
                    };
                    record.validate()?;
                    self.digest.add(record);
                    self.remaining -= 1;
                    self.next_record();
                }
                Field::Padding | Field::Crc | Field::Done => {}
            }
        }
        Ok((used, self.field == Field::Done))
    }

    /// Encoded size of the index, once complete.
    pub fn size(&self) -> u64 {
        self.size + self.stored_crc.len() as u64
    }

    /// Summary of the stored records.
    pub fn digest(&self) -> &RecordDigest {
        &self.digest
    }

    fn next_record(&mut self) {
        self.field = if self.remaining > 0 {
            Field::Unpadded
        } else if self.size % 4 == 0 {
            Field::Crc
        } else {
            Field::Padding
        };
    }

    fn finish_crc(&mut self) -> Result<()> {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.stored_crc);
        let expected = u32::from_le_bytes(word);
        let computed = self.crc.value();
        if expected != computed {
            return Err(XzError::crc_mismatch("index", expected, computed));
        }
        self.field = Field::Done;
        Ok(())
    }
}

impl Default for IndexDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexBuilder {
        let mut index = IndexBuilder::new();
        index.push(IndexRecord {
            unpadded_size: 60,
            uncompressed_size: 11,
        });
        index.push(IndexRecord {
            unpadded_size: 1 << 20,
            uncompressed_size: 3 << 20,
        });
        index
    }

    fn parse(bytes: &[u8], piece: usize) -> Result<IndexDecoder> {
        assert_eq!(bytes[0], INDEX_INDICATOR);
        let mut decoder = IndexDecoder::new();
        let mut rest = &bytes[1..];
        loop {
            let take = rest.len().min(piece);
            let (used, done) = decoder.feed(&rest[..take])?;
            rest = &rest[used..];
            if done {
                assert!(rest.is_empty());
                return Ok(decoder);
            }
            assert!(!rest.is_empty(), "index ended early");
        }
    }

    #[test]
    fn test_empty_index() {
        let bytes = IndexBuilder::new().encode();
        // Same 8 bytes xz writes for a stream without blocks.
        assert_eq!(bytes, [0x00, 0x00, 0x00, 0x00, 0x1C, 0xDF, 0x44, 0x21]);
        let decoder = parse(&bytes, 1).unwrap();
        assert_eq!(decoder.size(), 8);
        assert_eq!(decoder.digest().count(), 0);
    }

    #[test]
    fn test_parse_matches_builder() {
        let index = sample();
        let bytes = index.encode();
        assert_eq!(bytes.len() % 4, 0);

        let mut expected = RecordDigest::default();
        for record in index.records() {
            expected.add(*record);
        }

        for piece in [1, 3, bytes.len()] {
            let decoder = parse(&bytes, piece).unwrap();
            assert_eq!(decoder.size(), bytes.len() as u64);
            expected.verify(decoder.digest()).unwrap();
        }
        assert_eq!(index.uncompressed_size(), 11 + (3 << 20));
    }

    #[test]
    fn test_stops_at_end() {
        let mut bytes = sample().encode();
        let len = bytes.len();
        bytes.extend_from_slice(&[0xAA; 8]);
        let mut decoder = IndexDecoder::new();
        assert_eq!(decoder.feed(&bytes[1..]).unwrap(), (len - 1, true));
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            parse(&bytes, 4),
            Err(XzError::CrcMismatch { field: "index", .. })
        ));
    }

    #[test]
    fn test_digest_detects_reordering() {
        let records = sample().records().to_vec();
        let mut forward = RecordDigest::default();
        let mut backward = RecordDigest::default();
        for record in &records {
            forward.add(*record);
        }
        for record in records.iter().rev() {
            backward.add(*record);
        }
        assert!(matches!(
            forward.verify(&backward),
            Err(XzError::IndexMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_record_rejected() {
        let mut index = IndexBuilder::new();
        index.push(IndexRecord {
            unpadded_size: 2,
            uncompressed_size: 0,
        });
        assert!(parse(&index.encode(), 16).is_err());
    }
}
