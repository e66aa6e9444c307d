//! CRC-32 and CRC-64 as used by the XZ container.
//!
//! - **CRC-32 (ISO 3309)** protects the stream header, stream footer, block
//!   headers and the index, and is one of the selectable block checks.
//! - **CRC-64/ECMA-182** is the default block check.
//!
//! Both use slicing-by-8 for inputs of 16 bytes or more and a single table
//! for shorter inputs.

const CRC32_POLY: u32 = 0xEDB8_8320;
const CRC64_POLY: u64 = 0xC96C_5795_D787_0F42;

/// Below this length the single-table loop is faster than slicing-by-8.
const SLICE_THRESHOLD: usize = 16;

const fn crc32_tables() -> [[u32; 256]; 8] {
    let mut tables = [[0u32; 256]; 8];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }
    let mut t = 1;
    while t < 8 {
        let mut i = 0;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = tables[0][(prev & 0xFF) as usize] ^ (prev >> 8);
            i += 1;
        }
        t += 1;
    }
    tables
}

const fn crc64_tables() -> [[u64; 256]; 8] {
    let mut tables = [[0u64; 256]; 8];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC64_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }
    let mut t = 1;
    while t < 8 {
        let mut i = 0;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = tables[0][(prev & 0xFF) as usize] ^ (prev >> 8);
            i += 1;
        }
        t += 1;
    }
    tables
}

static CRC32_TABLES: [[u32; 256]; 8] = crc32_tables();
static CRC64_TABLES: [[u64; 256]; 8] = crc64_tables();

/// CRC-32 calculator (ISO 3309, reflected, init and final XOR `0xFFFFFFFF`).
///
/// # Example
///
/// ```
/// use oxixz_core::crc::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"Hello, ");
/// crc.update(b"World!");
/// assert_eq!(crc.finalize(), 0xEC4AC3D0);
/// ```
#[derive(Debug, Clone)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC-32 calculator.
    pub fn new() -> Self {
        Self { crc: !0 }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        self.crc = !0;
    }

    /// Feed more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        let table = &CRC32_TABLES;
        let mut crc = self.crc;
        let mut rest = data;

        if data.len() >= SLICE_THRESHOLD {
            let chunks = data.chunks_exact(8);
            rest = chunks.remainder();
            for chunk in chunks {
                let lo = crc ^ u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                crc = table[7][(lo & 0xFF) as usize]
                    ^ table[6][((lo >> 8) & 0xFF) as usize]
                    ^ table[5][((lo >> 16) & 0xFF) as usize]
                    ^ table[4][(lo >> 24) as usize]
                    ^ table[3][chunk[4] as usize]
                    ^ table[2][chunk[5] as usize]
                    ^ table[1][chunk[6] as usize]
                    ^ table[0][chunk[7] as usize];
            }
        }

        for &byte in rest {
            crc = table[0][((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.crc = crc;
    }

    /// Current CRC value without consuming the calculator.
    #[inline]
    pub fn value(&self) -> u32 {
        !self.crc
    }

    /// Finalize and return the CRC value.
    #[inline]
    pub fn finalize(self) -> u32 {
        !self.crc
    }

    /// Compute CRC-32 of a slice in one call.
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-64/ECMA-182 calculator, the variant used by XZ (a.k.a. CRC-64/XZ).
///
/// # Example
///
/// ```
/// use oxixz_core::crc::Crc64;
///
/// assert_eq!(Crc64::compute(b"123456789"), 0x995DC9BBDF1939FA);
/// ```
#[derive(Debug, Clone)]
pub struct Crc64 {
    crc: u64,
}

impl Crc64 {
    /// Create a new CRC-64 calculator.
    pub fn new() -> Self {
        Self { crc: !0 }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        self.crc = !0;
    }

    /// Feed more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        let table = &CRC64_TABLES;
        let mut crc = self.crc;
        let mut rest = data;

        if data.len() >= SLICE_THRESHOLD {
            let chunks = data.chunks_exact(8);
            rest = chunks.remainder();
            for chunk in chunks {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                let x = crc ^ u64::from_le_bytes(word);
                crc = table[7][(x & 0xFF) as usize]
                    ^ table[6][((x >> 8) & 0xFF) as usize]
                    ^ table[5][((x >> 16) & 0xFF) as usize]
                    ^ table[4][((x >> 24) & 0xFF) as usize]
                    ^ table[3][((x >> 32) & 0xFF) as usize]
                    ^ table[2][((x >> 40) & 0xFF) as usize]
                    ^ table[1][((x >> 48) & 0xFF) as usize]
                    ^ table[0][(x >> 56) as usize];
            }
        }

        for &byte in rest {
            crc = table[0][((crc ^ byte as u64) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.crc = crc;
    }

    /// Current CRC value without consuming the calculator.
    #[inline]
    pub fn value(&self) -> u64 {
        !self.crc
    }

    /// Finalize and return the CRC value.
    #[inline]
    pub fn finalize(self) -> u64 {
        !self.crc
    }

    /// Compute CRC-64 of a slice in one call.
    pub fn compute(data: &[u8]) -> u64 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for Crc64 {
    fn default() -> Self {
        Self::new()
    }
}
